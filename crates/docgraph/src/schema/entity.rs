use crate::{
    schema::property::{
        AttributeSchema, CalculatedFn, EmbeddedSchema, PropertySchema, RelationshipSchema,
    },
    value::{DataType, Value},
};
use std::{collections::BTreeMap, fmt, rc::Rc};

///
/// EntitySchema
///
/// Immutable, fully-resolved schema for one entity type. Property maps are
/// flattened before registration (mixin composition happens upstream), so
/// nothing here merges at runtime. Built fluently, then frozen inside the
/// registry.
///

pub struct EntitySchema {
    type_key: String,
    is_abstract: bool,
    polymorphic: bool,
    owned_types: Vec<String>,
    properties: BTreeMap<String, PropertySchema>,
}

impl fmt::Debug for EntitySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("type_key", &self.type_key)
            .field("is_abstract", &self.is_abstract)
            .field("polymorphic", &self.polymorphic)
            .field("owned_types", &self.owned_types)
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EntitySchema {
    #[must_use]
    pub fn new(type_key: impl Into<String>) -> Self {
        Self {
            type_key: type_key.into(),
            is_abstract: false,
            polymorphic: false,
            owned_types: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Build surface
    // ------------------------------------------------------------------

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, data_type: DataType) -> Self {
        self.properties.insert(
            key.into(),
            PropertySchema::Attribute(AttributeSchema::new(data_type)),
        );
        self
    }

    #[must_use]
    pub fn with_default(mut self, key: impl Into<String>, data_type: DataType, default: Value) -> Self {
        let mut attr = AttributeSchema::new(data_type);
        attr.default = Some(default);
        self.properties
            .insert(key.into(), PropertySchema::Attribute(attr));
        self
    }

    #[must_use]
    pub fn with_calculated(
        mut self,
        key: impl Into<String>,
        data_type: DataType,
        resolver: CalculatedFn,
    ) -> Self {
        let mut attr = AttributeSchema::new(data_type);
        attr.calculated = Some(resolver);
        self.properties
            .insert(key.into(), PropertySchema::Attribute(attr));
        self
    }

    #[must_use]
    pub fn with_has_one(mut self, key: impl Into<String>, target_type: impl Into<String>) -> Self {
        self.properties.insert(
            key.into(),
            PropertySchema::RelationshipOne(RelationshipSchema::new(target_type)),
        );
        self
    }

    #[must_use]
    pub fn with_has_many(mut self, key: impl Into<String>, target_type: impl Into<String>) -> Self {
        self.properties.insert(
            key.into(),
            PropertySchema::RelationshipMany(RelationshipSchema::new(target_type)),
        );
        self
    }

    #[must_use]
    pub fn with_embed_one(mut self, key: impl Into<String>, embed: Rc<EmbedSchema>) -> Self {
        self.properties
            .insert(key.into(), PropertySchema::EmbedOne(EmbeddedSchema::new(embed)));
        self
    }

    #[must_use]
    pub fn with_embed_many(mut self, key: impl Into<String>, embed: Rc<EmbedSchema>) -> Self {
        self.properties.insert(
            key.into(),
            PropertySchema::EmbedMany(EmbeddedSchema::new(embed)),
        );
        self
    }

    /// Mark this type abstract: it participates in polymorphic resolution but
    /// may never be instantiated directly as a new model.
    #[must_use]
    pub const fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Declare the concrete subtypes substitutable where this type is expected.
    #[must_use]
    pub fn polymorphic(mut self, owned_types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.polymorphic = true;
        self.owned_types = owned_types.into_iter().map(Into::into).collect();
        self
    }

    // ------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------

    #[must_use]
    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    #[must_use]
    pub const fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    #[must_use]
    pub const fn is_polymorphic(&self) -> bool {
        self.polymorphic
    }

    #[must_use]
    pub fn owned_types(&self) -> &[String] {
        &self.owned_types
    }

    /// Whether `candidate` may stand in for this type.
    #[must_use]
    pub fn owns_type(&self, candidate: &str) -> bool {
        self.type_key == candidate || self.owned_types.iter().any(|t| t == candidate)
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&PropertySchema> {
        self.properties.get(key)
    }

    #[must_use]
    pub const fn properties(&self) -> &BTreeMap<String, PropertySchema> {
        &self.properties
    }
}

///
/// EmbedSchema
///
/// Schema for an identity-less sub-document. Embeds are structural: they are
/// owned by a parent property, carry no registry identity, and are matched by
/// name rather than through a subtype graph.
///

pub struct EmbedSchema {
    name: String,
    properties: BTreeMap<String, PropertySchema>,
}

impl EmbedSchema {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, data_type: DataType) -> Self {
        self.properties.insert(
            key.into(),
            PropertySchema::Attribute(AttributeSchema::new(data_type)),
        );
        self
    }

    #[must_use]
    pub fn with_calculated(
        mut self,
        key: impl Into<String>,
        data_type: DataType,
        resolver: CalculatedFn,
    ) -> Self {
        let mut attr = AttributeSchema::new(data_type);
        attr.calculated = Some(resolver);
        self.properties
            .insert(key.into(), PropertySchema::Attribute(attr));
        self
    }

    #[must_use]
    pub fn with_embed_one(mut self, key: impl Into<String>, embed: Rc<EmbedSchema>) -> Self {
        self.properties
            .insert(key.into(), PropertySchema::EmbedOne(EmbeddedSchema::new(embed)));
        self
    }

    #[must_use]
    pub fn with_embed_many(mut self, key: impl Into<String>, embed: Rc<EmbedSchema>) -> Self {
        self.properties.insert(
            key.into(),
            PropertySchema::EmbedMany(EmbeddedSchema::new(embed)),
        );
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&PropertySchema> {
        self.properties.get(key)
    }

    #[must_use]
    pub const fn properties(&self) -> &BTreeMap<String, PropertySchema> {
        &self.properties
    }
}
