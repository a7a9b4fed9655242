use crate::{
    error::Error,
    model::{
        Embed, Model,
        collection::{EmbedCollection, ModelCollection, ModelReference},
    },
    schema::{EmbedSchema, EntitySchema, PropertySchema, SchemaError},
    session::WeakSession,
    value::{self, RawValue, Timestamp, Value},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    rc::Rc,
};
use thiserror::Error as ThisError;

///
/// PropertyError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum PropertyError {
    #[error("'{key}' is a many-cardinality property; use push/remove/clear")]
    ManyCardinality { key: String },

    #[error("'{key}' is not a has-many relationship; push/remove apply only to has-many keys")]
    NotHasMany { key: String },

    #[error("'{key}' expects {expected}")]
    ValueKind { key: String, expected: &'static str },

    #[error("malformed reference or sub-document under '{key}'")]
    MalformedReference { key: String },
}

///
/// PropertyValue
///
/// One converted property value. Model/collection variants are cheap-clone
/// handles onto shared state; cloning a `PropertyValue` never copies an
/// object graph.
///

#[derive(Clone)]
pub enum PropertyValue {
    Attribute(Value),
    RelationshipOne(Model),
    RelationshipMany(ModelCollection),
    EmbedOne(Embed),
    EmbedMany(EmbedCollection),
}

impl fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attribute(value) => f.debug_tuple("Attribute").field(value).finish(),
            Self::RelationshipOne(_) => f.write_str("RelationshipOne(..)"),
            Self::RelationshipMany(_) => f.write_str("RelationshipMany(..)"),
            Self::EmbedOne(_) => f.write_str("EmbedOne(..)"),
            Self::EmbedMany(_) => f.write_str("EmbedMany(..)"),
        }
    }
}

impl PropertyValue {
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Attribute(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_model(&self) -> Option<&Model> {
        match self {
            Self::RelationshipOne(model) => Some(model),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_models(&self) -> Option<&ModelCollection> {
        match self {
            Self::RelationshipMany(collection) => Some(collection),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_embed(&self) -> Option<&Embed> {
        match self {
            Self::EmbedOne(embed) => Some(embed),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_embeds(&self) -> Option<&EmbedCollection> {
        match self {
            Self::EmbedMany(collection) => Some(collection),
            _ => None,
        }
    }
}

///
/// AssignValue
///
/// What a caller may assign to a one-cardinality property. Many-cardinality
/// keys have no assignable form at all: direct sets on them are
/// unrepresentable, not merely checked.
///

pub enum AssignValue {
    Value(Value),
    Model(Model),
    Embed(Embed),
}

impl From<Value> for AssignValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<bool> for AssignValue {
    fn from(value: bool) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<i64> for AssignValue {
    fn from(value: i64) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<f64> for AssignValue {
    fn from(value: f64) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<&str> for AssignValue {
    fn from(value: &str) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<String> for AssignValue {
    fn from(value: String) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<Timestamp> for AssignValue {
    fn from(value: Timestamp) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<Model> for AssignValue {
    fn from(model: Model) -> Self {
        Self::Model(model)
    }
}

impl From<&Model> for AssignValue {
    fn from(model: &Model) -> Self {
        Self::Model(model.clone())
    }
}

impl From<Embed> for AssignValue {
    fn from(embed: Embed) -> Self {
        Self::Embed(embed)
    }
}

impl From<&Embed> for AssignValue {
    fn from(embed: &Embed) -> Self {
        Self::Embed(embed.clone())
    }
}

///
/// PropertySource
///
/// The descriptor map a store answers to: an entity schema or an embed
/// schema. Shared by handle; descriptors are never copied per instance.
///

#[derive(Clone)]
pub(crate) enum PropertySource {
    Entity(Rc<EntitySchema>),
    Embed(Rc<EmbedSchema>),
}

impl PropertySource {
    fn property(&self, key: &str) -> Option<&PropertySchema> {
        match self {
            Self::Entity(schema) => schema.property(key),
            Self::Embed(schema) => schema.property(key),
        }
    }

    fn type_label(&self) -> &str {
        match self {
            Self::Entity(schema) => schema.type_key(),
            Self::Embed(schema) => schema.name(),
        }
    }
}

///
/// PropertyStore
///
/// Per-instance dirty-tracking value cache over one entity's or embed's
/// property set.
///
/// Invariants:
/// - A key is in at most one of `modified` / `removed`; setting one clears
///   the other.
/// - `touched` marks keys converted exactly once per raw snapshot and is
///   only reset by `reinitialize`, which swaps the snapshot wholesale.
///

pub(crate) struct PropertyStore {
    source: PropertySource,
    session: WeakSession,

    /// Raw property snapshot as received from the persistence layer.
    raw: BTreeMap<String, RawValue>,
    /// Converted originals; entries exist only for touched keys that
    /// converted to something.
    converted: BTreeMap<String, PropertyValue>,
    /// Keys whose raw value has been converted (even if to nothing).
    touched: BTreeSet<String>,
    /// Locally modified values, always in converted form.
    modified: BTreeMap<String, PropertyValue>,
    /// Keys flagged for removal.
    removed: BTreeSet<String>,

    loaded: bool,
    new: bool,
}

impl PropertyStore {
    fn with_flags(
        source: PropertySource,
        session: WeakSession,
        raw: BTreeMap<String, RawValue>,
        loaded: bool,
        new: bool,
    ) -> Self {
        Self {
            source,
            session,
            raw,
            converted: BTreeMap::new(),
            touched: BTreeSet::new(),
            modified: BTreeMap::new(),
            removed: BTreeSet::new(),
            loaded,
            new,
        }
    }

    /// A store hydrated from a persistence-layer record.
    pub(crate) fn hydrated(
        source: PropertySource,
        session: WeakSession,
        raw: BTreeMap<String, RawValue>,
    ) -> Self {
        Self::with_flags(source, session, raw, true, false)
    }

    /// A store for a proxy: identity known, nothing fetched.
    pub(crate) fn proxy(source: PropertySource, session: WeakSession) -> Self {
        Self::with_flags(source, session, BTreeMap::new(), false, false)
    }

    /// A store for a New instance: loaded (there is nothing to fetch) and
    /// dirty by construction.
    pub(crate) fn new_instance(source: PropertySource, session: WeakSession) -> Self {
        Self::with_flags(source, session, BTreeMap::new(), true, true)
    }

    pub(crate) const fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub(crate) const fn is_new(&self) -> bool {
        self.new
    }

    /// Replace the raw snapshot and discard all conversion and modification
    /// state. This is the proxy-upgrade primitive: the instance keeps its
    /// identity while its data is swapped underneath it.
    pub(crate) fn reinitialize(&mut self, raw: BTreeMap<String, RawValue>) {
        self.raw = raw;
        self.converted.clear();
        self.touched.clear();
        self.modified.clear();
        self.removed.clear();
        self.loaded = true;
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Current value of a property. Resolution order: removal flag, local
    /// modification, then the lazily converted original. Calculated
    /// attributes never reach this; the facades resolve them first.
    pub(crate) fn get(&mut self, key: &str) -> Result<Option<PropertyValue>, Error> {
        let source = self.source.clone();
        let descriptor = self.descriptor(&source, key)?;

        if self.removed.contains(key) {
            return self.removed_default(descriptor);
        }
        if let Some(value) = self.modified.get(key) {
            return Ok(Some(value.clone()));
        }

        self.original_value(descriptor, key)
    }

    /// A removed key still answers: to-many kinds with an empty collection
    /// (never "nothing"), attributes with their converted default.
    fn removed_default(&self, descriptor: &PropertySchema) -> Result<Option<PropertyValue>, Error> {
        match descriptor {
            PropertySchema::Attribute(attr) => {
                Ok(attr.default.clone().map(PropertyValue::Attribute))
            }
            PropertySchema::RelationshipMany(rel) => {
                let session = self.session.upgrade()?;
                let collection = session.loader().create_model_collection(rel, Vec::new())?;

                Ok(Some(PropertyValue::RelationshipMany(collection)))
            }
            PropertySchema::EmbedMany(embedded) => {
                let session = self.session.upgrade()?;
                let collection = session
                    .loader()
                    .create_embed_collection(&embedded.embed, Vec::new())?;

                Ok(Some(PropertyValue::EmbedMany(collection)))
            }
            PropertySchema::RelationshipOne(_) | PropertySchema::EmbedOne(_) => Ok(None),
        }
    }

    /// The converted original for a key, materializing it exactly once per
    /// raw snapshot.
    fn original_value(
        &mut self,
        descriptor: &PropertySchema,
        key: &str,
    ) -> Result<Option<PropertyValue>, Error> {
        if !self.touched.contains(key) {
            let converted = self.convert(descriptor, key)?;
            self.touched.insert(key.to_string());
            if let Some(value) = converted {
                self.converted.insert(key.to_string(), value);
            }
        }

        Ok(self.converted.get(key).cloned())
    }

    /// Convert one raw property value into the typed space, recursing into
    /// the loader for relationships and embeds. Absent raws fall back to the
    /// kind's default: attribute default, empty collection, or nothing.
    fn convert(
        &self,
        descriptor: &PropertySchema,
        key: &str,
    ) -> Result<Option<PropertyValue>, Error> {
        let session = self.session.upgrade()?;
        let raw = self.raw.get(key);

        match descriptor {
            PropertySchema::Attribute(attr) => match raw {
                Some(raw) => Ok(session
                    .convert_attribute_value(attr.data_type, raw)?
                    .map(PropertyValue::Attribute)),
                None => Ok(attr.default.clone().map(PropertyValue::Attribute)),
            },

            PropertySchema::RelationshipOne(rel) => match raw {
                Some(raw) => {
                    let reference = ModelReference::from_raw(raw).ok_or_else(|| {
                        PropertyError::MalformedReference {
                            key: key.to_string(),
                        }
                    })?;
                    let type_key = reference
                        .type_key
                        .unwrap_or_else(|| rel.target_type.clone());
                    let model = session.loader().create_proxy_model(&type_key, &reference.id)?;

                    Ok(Some(PropertyValue::RelationshipOne(model)))
                }
                None => Ok(None),
            },

            PropertySchema::RelationshipMany(rel) => {
                let references = match raw {
                    Some(RawValue::Array(items)) => items
                        .iter()
                        .filter_map(ModelReference::from_raw)
                        .collect(),
                    Some(_) => {
                        return Err(PropertyError::MalformedReference {
                            key: key.to_string(),
                        }
                        .into());
                    }
                    None => Vec::new(),
                };
                let collection = session.loader().create_model_collection(rel, references)?;

                Ok(Some(PropertyValue::RelationshipMany(collection)))
            }

            PropertySchema::EmbedOne(embedded) => match raw {
                Some(RawValue::Object(map)) => {
                    let data = map
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    let embed = session.loader().create_embed_model(&embedded.embed, data)?;

                    Ok(Some(PropertyValue::EmbedOne(embed)))
                }
                Some(_) => Err(PropertyError::MalformedReference {
                    key: key.to_string(),
                }
                .into()),
                None => Ok(None),
            },

            PropertySchema::EmbedMany(embedded) => {
                let docs = match raw {
                    Some(RawValue::Array(items)) => items
                        .iter()
                        .map(|item| match item {
                            RawValue::Object(map) => Ok(map
                                .iter()
                                .map(|(k, v)| (k.clone(), v.clone()))
                                .collect()),
                            _ => Err(PropertyError::MalformedReference {
                                key: key.to_string(),
                            }),
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    Some(_) => {
                        return Err(PropertyError::MalformedReference {
                            key: key.to_string(),
                        }
                        .into());
                    }
                    None => Vec::new(),
                };
                let collection = session
                    .loader()
                    .create_embed_collection(&embedded.embed, docs)?;

                Ok(Some(PropertyValue::EmbedMany(collection)))
            }
        }
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Assign a one-cardinality property. `None` flags the key for removal;
    /// a value equal to the materialized original clears any pending change
    /// instead of recording a spurious one.
    pub(crate) fn set(&mut self, key: &str, value: Option<AssignValue>) -> Result<(), Error> {
        let source = self.source.clone();
        let descriptor = self.descriptor(&source, key)?;

        if descriptor.is_many() {
            return Err(PropertyError::ManyCardinality {
                key: key.to_string(),
            }
            .into());
        }

        let Some(value) = value else {
            self.modified.remove(key);
            self.removed.insert(key.to_string());
            return Ok(());
        };
        self.removed.remove(key);

        let session = self.session.upgrade()?;
        let candidate = match (descriptor, value) {
            (PropertySchema::Attribute(attr), AssignValue::Value(value)) => {
                PropertyValue::Attribute(value::normalize(attr.data_type, value)?)
            }
            (PropertySchema::RelationshipOne(rel), AssignValue::Model(model)) => {
                session.validate_relationship_set(&rel.target_type, model.type_key())?;
                PropertyValue::RelationshipOne(model)
            }
            (PropertySchema::EmbedOne(embedded), AssignValue::Embed(embed)) => {
                session.validate_embed_set(embedded.embed.name(), embed.name())?;
                PropertyValue::EmbedOne(embed)
            }
            (descriptor, _) => {
                return Err(PropertyError::ValueKind {
                    key: key.to_string(),
                    expected: expected_assign(descriptor),
                }
                .into());
            }
        };

        let original = self.original_value(descriptor, key)?;
        if self.equals_original(&candidate, original.as_ref())? {
            self.modified.remove(key);
        } else {
            self.modified.insert(key.to_string(), candidate);
        }

        Ok(())
    }

    /// Equality against the original: attributes by value (dates are
    /// timestamps, so reconstructed dates compare equal), relationship-one
    /// by composite identity, embed-one by structural hash.
    fn equals_original(
        &self,
        candidate: &PropertyValue,
        original: Option<&PropertyValue>,
    ) -> Result<bool, Error> {
        let equal = match (candidate, original) {
            (PropertyValue::Attribute(a), Some(PropertyValue::Attribute(b))) => a == b,
            (PropertyValue::RelationshipOne(a), Some(PropertyValue::RelationshipOne(b))) => {
                a.composite_key() == b.composite_key()
            }
            (PropertyValue::EmbedOne(a), Some(PropertyValue::EmbedOne(b))) => {
                a.structural_hash()? == b.structural_hash()?
            }
            _ => false,
        };

        Ok(equal)
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Graph-wide dirtiness: New instances, local deltas, and (for keys
    /// that have already been touched) nested embed-one and to-many
    /// collection state. Untouched keys are never materialized by this.
    pub(crate) fn are_dirty(&self) -> Result<bool, Error> {
        if self.new || !self.modified.is_empty() || !self.removed.is_empty() {
            return Ok(true);
        }

        for value in self.converted.values() {
            let dirty = match value {
                PropertyValue::EmbedOne(embed) => embed.is_dirty()?,
                PropertyValue::RelationshipMany(collection) => collection.is_dirty(),
                PropertyValue::EmbedMany(collection) => collection.is_dirty()?,
                PropertyValue::Attribute(_) | PropertyValue::RelationshipOne(_) => false,
            };
            if dirty {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn descriptor<'s>(
        &self,
        source: &'s PropertySource,
        key: &str,
    ) -> Result<&'s PropertySchema, Error> {
        source.property(key).ok_or_else(|| {
            SchemaError::UnknownProperty {
                type_key: source.type_label().to_string(),
                key: key.to_string(),
            }
            .into()
        })
    }
}

const fn expected_assign(descriptor: &PropertySchema) -> &'static str {
    match descriptor {
        PropertySchema::Attribute(_) => "an attribute value",
        PropertySchema::RelationshipOne(_) | PropertySchema::RelationshipMany(_) => "a model",
        PropertySchema::EmbedOne(_) | PropertySchema::EmbedMany(_) => "an embed",
    }
}
