use crate::{
    error::Error,
    model::AnyModel,
    value::{DataType, Value},
};
use std::rc::Rc;

use super::entity::EmbedSchema;

/// Resolver hook for calculated attributes.
///
/// Receives the owning model/embed handle so it can read sibling properties;
/// re-entrant `get` calls are safe because calculated resolution happens
/// before any property-cell borrow.
pub type CalculatedFn = fn(&AnyModel) -> Result<Option<Value>, Error>;

///
/// AttributeSchema
///

#[derive(Clone)]
pub struct AttributeSchema {
    pub data_type: DataType,
    pub default: Option<Value>,
    pub calculated: Option<CalculatedFn>,
}

impl AttributeSchema {
    #[must_use]
    pub const fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            default: None,
            calculated: None,
        }
    }

    #[must_use]
    pub const fn is_calculated(&self) -> bool {
        self.calculated.is_some()
    }
}

///
/// RelationshipSchema
///
/// One side of a declared relationship. The target is a registry type key;
/// polymorphic substitution is resolved through the target's declared
/// subtypes, never through the descriptor itself.
///

#[derive(Clone)]
pub struct RelationshipSchema {
    pub target_type: String,
    /// Inverse sides mirror an owning relationship and are not persisted here.
    pub inverse: bool,
}

impl RelationshipSchema {
    #[must_use]
    pub fn new(target_type: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            inverse: false,
        }
    }
}

///
/// EmbeddedSchema
///

#[derive(Clone)]
pub struct EmbeddedSchema {
    pub embed: Rc<EmbedSchema>,
}

impl EmbeddedSchema {
    #[must_use]
    pub const fn new(embed: Rc<EmbedSchema>) -> Self {
        Self { embed }
    }
}

///
/// PropertySchema
///
/// Closed property descriptor, resolved once at schema-build time. Every
/// convert/get/set path switches exhaustively on this; runtime kind
/// introspection does not exist in this crate.
///

#[derive(Clone)]
pub enum PropertySchema {
    Attribute(AttributeSchema),
    RelationshipOne(RelationshipSchema),
    RelationshipMany(RelationshipSchema),
    EmbedOne(EmbeddedSchema),
    EmbedMany(EmbeddedSchema),
}

impl PropertySchema {
    #[must_use]
    pub const fn is_attribute(&self) -> bool {
        matches!(self, Self::Attribute(_))
    }

    #[must_use]
    pub const fn is_many(&self) -> bool {
        matches!(self, Self::RelationshipMany(_) | Self::EmbedMany(_))
    }

    #[must_use]
    pub const fn as_attribute(&self) -> Option<&AttributeSchema> {
        match self {
            Self::Attribute(attr) => Some(attr),
            _ => None,
        }
    }

    /// The calculated resolver, when this is a calculated attribute.
    #[must_use]
    pub const fn calculated(&self) -> Option<CalculatedFn> {
        match self {
            Self::Attribute(attr) => attr.calculated,
            _ => None,
        }
    }
}
