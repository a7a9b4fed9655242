//! Module: model
//! Responsibility: the public Model/Embed facades and their state machine
//! (New / Proxy / Loaded / Deleted).
//! Does not own: instantiation (loader) or schema resolution.
//! Boundary: every accessor runs the touch check at its top; laziness is an
//! explicit, inspectable state transition, not a language trick.

pub mod collection;
pub mod properties;

mod embed;

#[cfg(test)]
mod tests;

pub use embed::{Embed, EmbedToken};

use crate::{
    error::Error,
    model::properties::{AssignValue, PropertySource, PropertyStore, PropertyValue},
    obs::{MetricsEvent, record as record_metric},
    schema::{EntitySchema, PropertySchema},
    session::{WeakSession, cache::composite_key},
    value::RawValue,
};
use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    fmt,
    rc::Rc,
};
use thiserror::Error as ThisError;

///
/// ModelError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ModelError {
    #[error("cannot delete '{composite_key}': the model has never been saved")]
    DeleteNew { composite_key: String },

    #[error("{op} is not implemented at this layer")]
    Unsupported { op: &'static str },
}

///
/// AnyModel
///
/// A model-or-embed handle, as handed to calculated attribute resolvers.
/// Cheap to clone; resolvers may re-enter `get` for sibling properties.
///

#[derive(Clone)]
pub enum AnyModel {
    Model(Model),
    Embed(Embed),
}

impl AnyModel {
    pub fn get(&self, key: &str) -> Result<Option<PropertyValue>, Error> {
        match self {
            Self::Model(model) => model.get(key),
            Self::Embed(embed) => embed.get(key),
        }
    }

    #[must_use]
    pub fn type_key(&self) -> &str {
        match self {
            Self::Model(model) => model.type_key(),
            Self::Embed(embed) => embed.name(),
        }
    }
}

struct ModelInner {
    schema: Rc<EntitySchema>,
    identifier: String,
    session: WeakSession,
    properties: RefCell<PropertyStore>,
    deleted: Cell<bool>,
}

///
/// Model
///
/// Public facade over one persisted identity. Handles are cheap clones of
/// shared state: however many ways a model is reached (cache, relationship,
/// collection), every holder observes the same instance.
///

#[derive(Clone)]
pub struct Model {
    inner: Rc<ModelInner>,
}

impl Model {
    fn with_store(
        schema: Rc<EntitySchema>,
        identifier: String,
        session: WeakSession,
        properties: PropertyStore,
    ) -> Self {
        Self {
            inner: Rc::new(ModelInner {
                schema,
                identifier,
                session,
                properties: RefCell::new(properties),
                deleted: Cell::new(false),
            }),
        }
    }

    /// A model hydrated from a persistence-layer record.
    pub(crate) fn hydrated(
        schema: Rc<EntitySchema>,
        identifier: String,
        session: WeakSession,
        raw: BTreeMap<String, RawValue>,
    ) -> Self {
        let store = PropertyStore::hydrated(
            PropertySource::Entity(schema.clone()),
            session.clone(),
            raw,
        );

        Self::with_store(schema, identifier, session, store)
    }

    /// A proxy: identity known, data deferred to first touch.
    pub(crate) fn proxy(
        schema: Rc<EntitySchema>,
        identifier: String,
        session: WeakSession,
    ) -> Self {
        let store = PropertyStore::proxy(PropertySource::Entity(schema.clone()), session.clone());

        Self::with_store(schema, identifier, session, store)
    }

    /// A New model: no persisted record exists yet.
    pub(crate) fn new_model(
        schema: Rc<EntitySchema>,
        identifier: String,
        session: WeakSession,
    ) -> Self {
        let store =
            PropertyStore::new_instance(PropertySource::Entity(schema.clone()), session.clone());

        Self::with_store(schema, identifier, session, store)
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.identifier
    }

    #[must_use]
    pub fn type_key(&self) -> &str {
        self.inner.schema.type_key()
    }

    /// Composite identity key: `"{type}.{id}"`.
    #[must_use]
    pub fn composite_key(&self) -> String {
        composite_key(self.type_key(), self.id())
    }

    /// Whether two handles reference the same in-memory instance.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.inner.properties.borrow().is_new()
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.inner.properties.borrow().is_loaded()
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.inner.deleted.get()
    }

    /// Graph-wide dirtiness: local property deltas, New state, or any
    /// already-touched nested embed or collection with changes of its own.
    pub fn is_dirty(&self) -> Result<bool, Error> {
        self.inner.properties.borrow().are_dirty()
    }

    // ------------------------------------------------------------------
    // Property access
    // ------------------------------------------------------------------

    /// Current value of a property, hydrating the model first if needed.
    pub fn get(&self, key: &str) -> Result<Option<PropertyValue>, Error> {
        // Calculated attributes bypass every cache and recompute on each
        // access; resolved before any cell borrow so resolvers can re-enter.
        if let Some(resolver) = self
            .inner
            .schema
            .property(key)
            .and_then(PropertySchema::calculated)
        {
            return Ok(resolver(&AnyModel::Model(self.clone()))?.map(PropertyValue::Attribute));
        }

        self.touch(false)?;
        self.inner.properties.borrow_mut().get(key)
    }

    /// Assign a one-cardinality property.
    pub fn set(&self, key: &str, value: impl Into<AssignValue>) -> Result<(), Error> {
        self.touch(false)?;
        self.inner
            .properties
            .borrow_mut()
            .set(key, Some(value.into()))
    }

    /// Clear a property: attributes and one-cardinality slots go to nothing,
    /// collections are emptied in place.
    pub fn clear(&self, key: &str) -> Result<(), Error> {
        self.touch(false)?;

        let is_many = self
            .inner
            .schema
            .property(key)
            .is_some_and(PropertySchema::is_many);
        if !is_many {
            return self.inner.properties.borrow_mut().set(key, None);
        }

        let value = self.inner.properties.borrow_mut().get(key)?;
        match value {
            Some(PropertyValue::RelationshipMany(collection)) => collection.clear()?,
            Some(PropertyValue::EmbedMany(collection)) => collection.clear(),
            _ => {}
        }

        Ok(())
    }

    /// Push a model into a has-many relationship. Direct set is not
    /// supported for has-many keys; to replace a set wholesale, `clear` it
    /// and push the new members.
    pub fn push(&self, key: &str, model: &Model) -> Result<(), Error> {
        self.many_relationship(key)?.push(model)
    }

    /// Remove a model from a has-many relationship.
    pub fn remove(&self, key: &str, model: &Model) -> Result<(), Error> {
        self.many_relationship(key)?.remove(model)
    }

    fn many_relationship(&self, key: &str) -> Result<collection::ModelCollection, Error> {
        self.touch(false)?;

        let value = self.inner.properties.borrow_mut().get(key)?;
        match value {
            Some(PropertyValue::RelationshipMany(collection)) => Ok(collection),
            _ => Err(properties::PropertyError::NotHasMany {
                key: key.to_string(),
            }
            .into()),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Flag the model for deletion. Deletion is terminal for hydration:
    /// every later touch is a no-op, though the instance stays addressable.
    pub fn delete(&self) -> Result<(), Error> {
        if self.is_new() {
            return Err(ModelError::DeleteNew {
                composite_key: self.composite_key(),
            }
            .into());
        }
        self.inner.deleted.set(true);

        Ok(())
    }

    /// Force a refresh from the persistence layer.
    pub fn reload(&self) -> Result<(), Error> {
        self.touch(true)
    }

    /// Persisting is an upstream concern and deliberately unimplemented.
    pub fn save(&self) -> Result<(), Error> {
        Err(ModelError::Unsupported { op: "save" }.into())
    }

    /// Scalar rollback at the model level is deliberately unimplemented;
    /// collections roll back individually.
    pub fn rollback(&self) -> Result<(), Error> {
        Err(ModelError::Unsupported { op: "rollback" }.into())
    }

    /// Change-set export is deliberately unimplemented.
    pub fn change_set(&self) -> Result<(), Error> {
        Err(ModelError::Unsupported { op: "change-set export" }.into())
    }

    /// Hydrate from the persistence layer if unloaded (or when forced).
    /// This is the Proxy → Loaded transition; the instance keeps its
    /// identity while the store is reinitialized underneath it.
    pub(crate) fn touch(&self, force: bool) -> Result<(), Error> {
        if self.inner.deleted.get() {
            return Ok(());
        }
        if self.inner.properties.borrow().is_loaded() && !force {
            return Ok(());
        }

        let session = self.inner.session.upgrade()?;
        record_metric(MetricsEvent::RecordFetch {
            type_key: self.type_key().to_string(),
        });
        let record = session.persister().retrieve_record(self.type_key(), self.id())?;
        self.inner
            .properties
            .borrow_mut()
            .reinitialize(record.properties);

        Ok(())
    }

    pub(crate) fn reinitialize(&self, raw: BTreeMap<String, RawValue>) {
        self.inner.properties.borrow_mut().reinitialize(raw);
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("key", &self.composite_key())
            .field("loaded", &self.is_loaded())
            .field("new", &self.is_new())
            .field("deleted", &self.is_deleted())
            .finish()
    }
}
