//! Module: session
//! Responsibility: the session-lifetime context: identity cache, loader,
//! persister handle, and schema view, created and torn down together.
//! Does not own: property state or collection deltas (instances own those).
//! Boundary: models hold weak handles back here; a dropped session turns
//! every deferred operation into `SessionClosed` instead of a leak.

pub mod cache;
pub mod loader;

#[cfg(test)]
mod tests;

use crate::{
    error::Error,
    model::{Embed, EmbedToken, Model, collection::CollectionError},
    obs::{MetricsEvent, record as record_metric},
    persist::Persister,
    schema::{EmbedSchema, EntitySchema, SchemaRegistry},
    value::{DataType, RawValue, Value},
};
use cache::IdentityCache;
use loader::Loader;
use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};
use thiserror::Error as ThisError;

///
/// SessionError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum SessionError {
    #[error("the owning session has been dropped")]
    Closed,
}

///
/// Session
///
/// Explicit session/request-lifetime context. One identity cache, one
/// persister handle, one immutable schema view; never a process-wide
/// singleton. The handle is cheap to clone; dropping the last strong handle
/// tears the whole object graph down.
///

#[derive(Clone)]
pub struct Session {
    inner: Rc<SessionInner>,
}

pub(crate) struct SessionInner {
    registry: SchemaRegistry,
    persister: Rc<dyn Persister>,
    cache: RefCell<IdentityCache>,
    embed_tokens: Cell<u64>,
}

impl Session {
    #[must_use]
    pub fn new(registry: SchemaRegistry, persister: Rc<dyn Persister>) -> Self {
        Self {
            inner: Rc::new(SessionInner {
                registry,
                persister,
                cache: RefCell::new(IdentityCache::new()),
                embed_tokens: Cell::new(0),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Public entry points
    // ------------------------------------------------------------------

    /// Fetch one record from the persistence layer and materialize it.
    pub fn find(&self, type_key: &str, id: &str) -> Result<Model, Error> {
        let id = self.convert_id(id);
        record_metric(MetricsEvent::RecordFetch {
            type_key: type_key.to_string(),
        });
        let record = self.inner.persister.retrieve_record(type_key, &id)?;

        self.loader().create_model(type_key, &record)
    }

    /// Obtain a proxy for a known identity without fetching anything.
    pub fn proxy(&self, type_key: &str, id: &str) -> Result<Model, Error> {
        self.loader().create_proxy_model(type_key, id)
    }

    /// Create a New model for an identity that does not exist yet.
    pub fn create(&self, type_key: &str, id: &str) -> Result<Model, Error> {
        self.loader().create_new_model(type_key, id)
    }

    /// Create an empty, New embed instance.
    pub fn create_embed(&self, schema: &Rc<EmbedSchema>) -> Result<Embed, Error> {
        self.loader().create_new_embed(schema)
    }

    /// The loader/identity-cache pair for this session.
    #[must_use]
    pub const fn loader(&self) -> Loader<'_> {
        Loader::new(self)
    }

    /// Look up an entity schema by type key.
    pub fn schema(&self, type_key: &str) -> Result<Rc<EntitySchema>, Error> {
        Ok(self.inner.registry.get(type_key)?)
    }

    /// Number of identities currently held by the cache.
    #[must_use]
    pub fn cached_models(&self) -> usize {
        self.inner.cache.borrow().len()
    }

    // ------------------------------------------------------------------
    // Collaborator seams (crate-internal)
    // ------------------------------------------------------------------

    pub(crate) fn registry(&self) -> &SchemaRegistry {
        &self.inner.registry
    }

    pub(crate) fn persister(&self) -> &dyn Persister {
        self.inner.persister.as_ref()
    }

    pub(crate) fn cache_has(&self, type_key: &str, id: &str) -> bool {
        self.inner.cache.borrow().has(type_key, id)
    }

    pub(crate) fn cache_get(&self, type_key: &str, id: &str) -> Option<Model> {
        self.inner.cache.borrow().get(type_key, id)
    }

    pub(crate) fn cache_push(&self, model: &Model) {
        self.inner.cache.borrow_mut().push(model);
    }

    pub(crate) fn convert_id(&self, raw: &str) -> String {
        self.inner.persister.convert_id(raw)
    }

    pub(crate) fn convert_attribute_value(
        &self,
        data_type: DataType,
        raw: &RawValue,
    ) -> Result<Option<Value>, Error> {
        Ok(self.inner.persister.convert_attribute_value(data_type, raw)?)
    }

    /// Check a candidate member type against a relationship's declared
    /// target, allowing declared polymorphic subtypes.
    pub(crate) fn validate_relationship_set(
        &self,
        target_type: &str,
        candidate: &str,
    ) -> Result<(), Error> {
        if self.inner.registry.allows_type(target_type, candidate)? {
            return Ok(());
        }

        Err(CollectionError::MemberType {
            expected: target_type.to_string(),
            candidate: candidate.to_string(),
        }
        .into())
    }

    /// Embeds are structural, so set compatibility is name equality.
    pub(crate) fn validate_embed_set(&self, expected: &str, candidate: &str) -> Result<(), Error> {
        if expected == candidate {
            return Ok(());
        }

        Err(CollectionError::MemberType {
            expected: expected.to_string(),
            candidate: candidate.to_string(),
        }
        .into())
    }

    pub(crate) fn next_embed_token(&self) -> EmbedToken {
        let next = self.inner.embed_tokens.get() + 1;
        self.inner.embed_tokens.set(next);

        EmbedToken::new(next)
    }

    pub(crate) fn downgrade(&self) -> WeakSession {
        WeakSession(Rc::downgrade(&self.inner))
    }
}

///
/// WeakSession
///
/// Back-reference held by models, embeds, and collections. Must stay weak:
/// the cache holds a strong reference to every live model, so a strong
/// back-edge would cycle.
///

#[derive(Clone)]
pub(crate) struct WeakSession(Weak<SessionInner>);

impl WeakSession {
    pub(crate) fn upgrade(&self) -> Result<Session, SessionError> {
        self.0
            .upgrade()
            .map(|inner| Session { inner })
            .ok_or(SessionError::Closed)
    }
}
