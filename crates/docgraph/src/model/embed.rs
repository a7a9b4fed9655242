use crate::{
    error::Error,
    model::{
        AnyModel,
        properties::{AssignValue, PropertySource, PropertyStore, PropertyValue},
    },
    schema::{EmbedSchema, PropertySchema},
    session::WeakSession,
    value::{RawValue, Value},
};
use std::{cell::RefCell, collections::BTreeMap, fmt, rc::Rc};
use xxhash_rust::xxh3::Xxh3;

///
/// EmbedToken
///
/// Ephemeral per-session identity for an embed. Embeds are sub-documents
/// owned by a parent: they have no persisted identity, only a token that
/// keeps them distinguishable inside collections for one session.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EmbedToken(u64);

impl EmbedToken {
    pub(crate) const fn new(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for EmbedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "embed#{}", self.0)
    }
}

struct EmbedInner {
    schema: Rc<EmbedSchema>,
    token: EmbedToken,
    properties: RefCell<PropertyStore>,
}

///
/// Embed
///
/// Facade over one identity-less sub-document. Embeds arrive inline with
/// their parent, so they are always constructed loaded: there is no Proxy
/// state, no touch fetch, and no independent delete. The parent owns the
/// lifecycle end to end.
///

#[derive(Clone)]
pub struct Embed {
    inner: Rc<EmbedInner>,
}

impl Embed {
    /// An embed hydrated from an inline sub-document.
    pub(crate) fn loaded(
        schema: Rc<EmbedSchema>,
        token: EmbedToken,
        session: WeakSession,
        raw: BTreeMap<String, RawValue>,
    ) -> Self {
        let store = PropertyStore::hydrated(PropertySource::Embed(schema.clone()), session, raw);

        Self {
            inner: Rc::new(EmbedInner {
                schema,
                token,
                properties: RefCell::new(store),
            }),
        }
    }

    /// A fresh, New embed awaiting population.
    pub(crate) fn new_embed(
        schema: Rc<EmbedSchema>,
        token: EmbedToken,
        session: WeakSession,
    ) -> Self {
        let store = PropertyStore::new_instance(PropertySource::Embed(schema.clone()), session);

        Self {
            inner: Rc::new(EmbedInner {
                schema,
                token,
                properties: RefCell::new(store),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Identity & state
    // ------------------------------------------------------------------

    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.schema.name()
    }

    #[must_use]
    pub fn token(&self) -> EmbedToken {
        self.inner.token
    }

    /// Embeds are always loaded.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        true
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.inner.properties.borrow().is_new()
    }

    pub fn is_dirty(&self) -> Result<bool, Error> {
        self.inner.properties.borrow().are_dirty()
    }

    // ------------------------------------------------------------------
    // Property access
    // ------------------------------------------------------------------

    pub fn get(&self, key: &str) -> Result<Option<PropertyValue>, Error> {
        if let Some(resolver) = self
            .inner
            .schema
            .property(key)
            .and_then(PropertySchema::calculated)
        {
            return Ok(resolver(&AnyModel::Embed(self.clone()))?.map(PropertyValue::Attribute));
        }

        self.inner.properties.borrow_mut().get(key)
    }

    pub fn set(&self, key: &str, value: impl Into<AssignValue>) -> Result<(), Error> {
        self.inner
            .properties
            .borrow_mut()
            .set(key, Some(value.into()))
    }

    /// Clear a property: attributes and one-cardinality slots go to nothing,
    /// embed collections are emptied in place.
    pub fn clear(&self, key: &str) -> Result<(), Error> {
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
            Some(PropertyValue::EmbedMany(collection)) => collection.clear(),
            Some(PropertyValue::RelationshipMany(collection)) => collection.clear()?,
            _ => {}
        }

        Ok(())
    }

    /// Deleting an embed is a no-op: its lifecycle is owned by the parent.
    pub const fn delete(&self) -> Result<(), Error> {
        Ok(())
    }

    // ------------------------------------------------------------------
    // Structural identity
    // ------------------------------------------------------------------

    /// Content hash over the embed's attribute and nested-embed properties,
    /// in key order. Two embeds with equal hashes are interchangeable for
    /// change detection; embed-one no-op edits are recognized through this.
    pub fn structural_hash(&self) -> Result<u64, Error> {
        let mut hasher = Xxh3::new();
        self.feed_hash(&mut hasher)?;

        Ok(hasher.digest())
    }

    fn feed_hash(&self, hasher: &mut Xxh3) -> Result<(), Error> {
        let schema = self.inner.schema.clone();
        for (key, descriptor) in schema.properties() {
            match descriptor {
                PropertySchema::Attribute(_) => {
                    hasher.update(key.as_bytes());
                    match self.get(key)? {
                        Some(PropertyValue::Attribute(value)) => feed_value(hasher, &value),
                        _ => hasher.update(&[0x00]),
                    }
                }
                PropertySchema::EmbedOne(_) => {
                    hasher.update(key.as_bytes());
                    match self.get(key)? {
                        Some(PropertyValue::EmbedOne(embed)) => {
                            hasher.update(&embed.structural_hash()?.to_be_bytes());
                        }
                        _ => hasher.update(&[0x00]),
                    }
                }
                PropertySchema::EmbedMany(_) => {
                    hasher.update(key.as_bytes());
                    if let Some(PropertyValue::EmbedMany(collection)) = self.get(key)? {
                        for embed in collection.embeds() {
                            hasher.update(&embed.structural_hash()?.to_be_bytes());
                        }
                    }
                }
                // Relationships carry identity, not content; they stay out
                // of the structural hash.
                PropertySchema::RelationshipOne(_) | PropertySchema::RelationshipMany(_) => {}
            }
        }

        Ok(())
    }
}

fn feed_value(hasher: &mut Xxh3, value: &Value) {
    match value {
        Value::Bool(b) => {
            hasher.update(&[0x01, u8::from(*b)]);
        }
        Value::Int(i) => {
            hasher.update(&[0x02]);
            hasher.update(&i.to_be_bytes());
        }
        Value::Float(f) => {
            hasher.update(&[0x03]);
            hasher.update(&f.to_bits().to_be_bytes());
        }
        Value::Text(s) => {
            hasher.update(&[0x04]);
            hasher.update(s.as_bytes());
        }
        Value::Date(ts) => {
            hasher.update(&[0x05]);
            hasher.update(&ts.seconds().to_be_bytes());
        }
        Value::List(items) => {
            hasher.update(&[0x06]);
            for item in items {
                feed_value(hasher, item);
            }
        }
        Value::Object(map) => {
            hasher.update(&[0x07]);
            for (key, item) in map {
                hasher.update(key.as_bytes());
                feed_value(hasher, item);
            }
        }
        Value::Mixed(raw) => {
            hasher.update(&[0x08]);
            hasher.update(raw.to_string().as_bytes());
        }
    }
}

impl fmt::Debug for Embed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Embed")
            .field("name", &self.name())
            .field("token", &self.inner.token)
            .field("new", &self.is_new())
            .finish()
    }
}
