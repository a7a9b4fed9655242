use crate::{
    error::Error,
    model::{
        Embed, Model,
        collection::{EmbedCollection, ModelCollection, ModelReference, ResolvedReference},
    },
    obs::{MetricsEvent, record as record_metric},
    persist::Record,
    schema::{EmbedSchema, RelationshipSchema},
    session::{Session, cache::composite_key},
    value::RawValue,
};
use std::{collections::BTreeMap, rc::Rc};
use thiserror::Error as ThisError;

///
/// LoaderError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum LoaderError {
    #[error("record type '{actual}' is not '{expected}' or one of its subtypes")]
    SchemaMismatch { expected: String, actual: String },

    #[error("a model is already registered for identity '{composite_key}'")]
    IdentityConflict { composite_key: String },

    #[error("'{type_key}' is abstract and cannot be instantiated directly")]
    AbstractInstantiation { type_key: String },
}

///
/// Loader
///
/// Every instantiation path in the engine. All model creation consults the
/// identity cache first, so reference identity is preserved across repeated
/// loads; embeds are the exception and are always constructed fresh.
///

pub struct Loader<'a> {
    session: &'a Session,
}

impl<'a> Loader<'a> {
    pub(crate) const fn new(session: &'a Session) -> Self {
        Self { session }
    }

    // ------------------------------------------------------------------
    // Models
    // ------------------------------------------------------------------

    /// Create (or upgrade) a model from a persistence-layer record.
    ///
    /// An unloaded cached instance is reinitialized in place so every holder
    /// of the proxy observes the hydration; a loaded cached instance is
    /// returned unchanged, so a second fetch never overwrites local state.
    pub fn create_model(&self, requested_type: &str, rec: &Record) -> Result<Model, Error> {
        if !self
            .session
            .registry()
            .allows_type(requested_type, &rec.type_key)?
        {
            return Err(LoaderError::SchemaMismatch {
                expected: requested_type.to_string(),
                actual: rec.type_key.clone(),
            }
            .into());
        }

        // Resolve the schema from the record's own type to cover polymorphic
        // models stored under a subtype.
        let schema = self.session.registry().get(&rec.type_key)?;
        let id = self.session.convert_id(&rec.identifier);

        if let Some(model) = self.session.cache_get(&rec.type_key, &id) {
            if !model.is_loaded() {
                record_metric(MetricsEvent::ProxyUpgrade {
                    composite_key: model.composite_key(),
                });
                model.reinitialize(rec.properties.clone());
            }
            return Ok(model);
        }

        let model = Model::hydrated(schema, id, self.session.downgrade(), rec.properties.clone());
        self.session.cache_push(&model);

        Ok(model)
    }

    /// Create models for a whole record set.
    pub fn create_models(
        &self,
        requested_type: &str,
        records: &[Record],
    ) -> Result<Vec<Model>, Error> {
        records
            .iter()
            .map(|rec| self.create_model(requested_type, rec))
            .collect()
    }

    /// Create a proxy model: identity known, data unfetched.
    pub fn create_proxy_model(&self, type_key: &str, id: &str) -> Result<Model, Error> {
        let id = self.session.convert_id(id);
        if let Some(model) = self.session.cache_get(type_key, &id) {
            return Ok(model);
        }

        let schema = self.session.registry().get(type_key)?;
        let model = Model::proxy(schema, id, self.session.downgrade());
        self.session.cache_push(&model);

        Ok(model)
    }

    /// Create proxy models for a set of identifiers.
    pub fn create_proxy_models(&self, type_key: &str, ids: &[String]) -> Result<Vec<Model>, Error> {
        ids.iter()
            .map(|id| self.create_proxy_model(type_key, id))
            .collect()
    }

    /// Create a New model: one with no corresponding persisted record yet.
    pub fn create_new_model(&self, type_key: &str, id: &str) -> Result<Model, Error> {
        let schema = self.session.registry().get(type_key)?;
        if schema.is_abstract() {
            return Err(LoaderError::AbstractInstantiation {
                type_key: type_key.to_string(),
            }
            .into());
        }

        let id = self.session.convert_id(id);
        if self.session.cache_has(type_key, &id) {
            return Err(LoaderError::IdentityConflict {
                composite_key: composite_key(type_key, &id),
            }
            .into());
        }

        let model = Model::new_model(schema, id, self.session.downgrade());
        self.session.cache_push(&model);

        Ok(model)
    }

    // ------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------

    /// Build a to-many relationship collection from lightweight references.
    ///
    /// A reference without a type falls back to the relationship's declared
    /// target, which is how polymorphic reference sets stay loadable.
    pub fn create_model_collection(
        &self,
        rel: &RelationshipSchema,
        references: Vec<ModelReference>,
    ) -> Result<ModelCollection, Error> {
        // Fail fast on unknown targets; members resolve lazily later.
        let schema = self.session.registry().get(&rel.target_type)?;

        let resolved: Vec<ResolvedReference> = references
            .into_iter()
            .map(|reference| ResolvedReference {
                type_key: reference
                    .type_key
                    .unwrap_or_else(|| rel.target_type.clone()),
                id: self.session.convert_id(&reference.id),
            })
            .collect();

        Ok(ModelCollection::from_references(
            schema,
            self.session.downgrade(),
            resolved,
        ))
    }

    // ------------------------------------------------------------------
    // Embeds
    // ------------------------------------------------------------------

    /// Create an embed from an inline sub-document. Embeds never enter the
    /// identity cache and are always constructed loaded.
    pub fn create_embed_model(
        &self,
        schema: &Rc<EmbedSchema>,
        data: BTreeMap<String, RawValue>,
    ) -> Result<Embed, Error> {
        Ok(Embed::loaded(
            schema.clone(),
            self.session.next_embed_token(),
            self.session.downgrade(),
            data,
        ))
    }

    /// Create an empty, New embed (for population before a parent save).
    pub fn create_new_embed(&self, schema: &Rc<EmbedSchema>) -> Result<Embed, Error> {
        Ok(Embed::new_embed(
            schema.clone(),
            self.session.next_embed_token(),
            self.session.downgrade(),
        ))
    }

    /// Build an embed collection from inline sub-documents.
    pub fn create_embed_collection(
        &self,
        schema: &Rc<EmbedSchema>,
        docs: Vec<BTreeMap<String, RawValue>>,
    ) -> Result<EmbedCollection, Error> {
        let embeds = docs
            .into_iter()
            .map(|doc| self.create_embed_model(schema, doc))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EmbedCollection::from_embeds(
            schema.clone(),
            self.session.downgrade(),
            embeds,
        ))
    }
}
