//! Module: persist
//! Responsibility: the persistence-layer seam: records in, records out.
//! Does not own: caching, identity, or property bookkeeping.
//! Boundary: everything below the loader is reached through `Persister`.

pub mod memory;

pub use memory::MemoryPersister;

use crate::value::{CoercionError, DataType, RawValue, Value, coerce};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// PersistError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum PersistError {
    #[error("no '{type_key}' record found for id '{id}'")]
    NotFound { type_key: String, id: String },

    #[error("persistence backend failure: {0}")]
    Backend(String),
}

impl PersistError {
    #[must_use]
    pub fn not_found(type_key: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            type_key: type_key.into(),
            id: id.into(),
        }
    }
}

///
/// Record
///
/// One persisted entity as the backend sees it: an identifier, the concrete
/// type it was stored under (which may be a subtype of what was asked for),
/// and an uncoerced property map.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Record {
    pub identifier: String,
    pub type_key: String,
    pub properties: BTreeMap<String, RawValue>,
}

impl Record {
    #[must_use]
    pub fn new(type_key: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            type_key: type_key.into(),
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, raw: RawValue) -> Self {
        self.properties.insert(key.into(), raw);
        self
    }
}

///
/// Persister
///
/// Blocking, all-or-nothing persistence collaborator. Calls either return
/// data or fail; transient-error retry policy belongs behind this trait,
/// never in front of it.
///

pub trait Persister {
    /// Fetch a single record; `NotFound` when absent.
    fn retrieve_record(&self, type_key: &str, id: &str) -> Result<Record, PersistError>;

    /// Fetch a batch of records in one round trip. Used for collection
    /// hydration; no ordering guarantee, and absent ids are simply omitted.
    fn retrieve_records(&self, type_key: &str, ids: &[String])
    -> Result<Vec<Record>, PersistError>;

    /// Coerce a raw attribute value into the typed value space.
    fn convert_attribute_value(
        &self,
        data_type: DataType,
        raw: &RawValue,
    ) -> Result<Option<Value>, CoercionError> {
        coerce(data_type, raw)
    }

    /// Normalize an external identifier into model-context form.
    fn convert_id(&self, raw: &str) -> String {
        raw.trim().to_string()
    }
}
