//! Module: schema
//! Responsibility: the immutable per-session schema view and subtype rules.
//! Does not own: instantiation, property state, or persistence.
//! Boundary: consumed by the loader, the property store, and set validation.

mod entity;
mod property;

pub use entity::{EmbedSchema, EntitySchema};
pub use property::{
    AttributeSchema, CalculatedFn, EmbeddedSchema, PropertySchema, RelationshipSchema,
};

use std::{collections::BTreeMap, rc::Rc};
use thiserror::Error as ThisError;

///
/// SchemaError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum SchemaError {
    #[error("unknown entity type '{type_key}'")]
    UnknownType { type_key: String },

    #[error("unknown property '{key}' on '{type_key}'")]
    UnknownProperty { type_key: String, key: String },

    #[error("entity type '{type_key}' is already registered")]
    DuplicateType { type_key: String },
}

///
/// SchemaRegistry
///
/// Per-session view of every registered entity type. Registration happens
/// before the session starts; the session takes ownership, so the view is
/// immutable for the session's whole lifetime and shared by handle, never
/// copied per instance.
///

#[derive(Default)]
pub struct SchemaRegistry {
    entities: BTreeMap<String, Rc<EntitySchema>>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: EntitySchema) -> Result<(), SchemaError> {
        let type_key = schema.type_key().to_string();
        if self.entities.contains_key(&type_key) {
            return Err(SchemaError::DuplicateType { type_key });
        }
        self.entities.insert(type_key, Rc::new(schema));

        Ok(())
    }

    #[must_use]
    pub fn has(&self, type_key: &str) -> bool {
        self.entities.contains_key(type_key)
    }

    pub fn get(&self, type_key: &str) -> Result<Rc<EntitySchema>, SchemaError> {
        self.entities
            .get(type_key)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownType {
                type_key: type_key.to_string(),
            })
    }

    /// Whether `candidate` may stand in where `base` is expected: either the
    /// same type, or one of `base`'s declared subtypes.
    pub fn allows_type(&self, base: &str, candidate: &str) -> Result<bool, SchemaError> {
        let schema = self.get(base)?;

        Ok(schema.owns_type(candidate))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rc<EntitySchema>)> {
        self.entities.iter().map(|(k, v)| (k.as_str(), v))
    }
}
