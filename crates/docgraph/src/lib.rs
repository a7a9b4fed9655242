//! In-memory object-graph manager for metadata-described entities backed by
//! an external persistence layer: one live instance per persisted identity,
//! proxies that hydrate transparently on first access, local mutations
//! tracked apart from persisted state, and to-many sets with batched
//! hydration and full delta bookkeeping.
//!
//! ## Crate layout
//! - `error`: public error taxonomy (kind + origin).
//! - `model`: the Model/Embed facades, property store, and collections.
//! - `obs`: metrics sink boundary for cache and hydration events.
//! - `persist`: the persistence seam (`Persister`, `Record`) and the
//!   in-memory reference backend.
//! - `schema`: the immutable per-session schema view.
//! - `session`: session context, identity cache, and loader.
//! - `value`: typed attribute values and raw-value coercion.

pub mod error;
pub mod model;
pub mod obs;
pub mod persist;
pub mod schema;
pub mod session;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// CONSTANTS
///

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///
/// Domain vocabulary only. No internals, and no collaborator seams beyond
/// the ones callers implement themselves.
///

pub mod prelude {
    pub use crate::{
        error::{Error, ErrorKind, ErrorOrigin},
        model::{
            AnyModel, Embed, Model,
            collection::{EmbedCollection, ModelCollection, ModelReference},
            properties::{AssignValue, PropertyValue},
        },
        persist::{MemoryPersister, Persister, Record},
        schema::{EmbedSchema, EntitySchema, SchemaRegistry},
        session::Session,
        value::{DataType, RawValue, Timestamp, Value},
    };
}
