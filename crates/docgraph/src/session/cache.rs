use crate::{
    model::Model,
    obs::{MetricsEvent, record},
};
use std::collections::BTreeMap;

/// Composite identity key for a persisted model: `"{type}.{id}"`.
#[must_use]
pub fn composite_key(type_key: &str, id: &str) -> String {
    format!("{type_key}.{id}")
}

///
/// IdentityCache
///
/// Session-scoped map from composite identity to the one live instance for
/// that identity. First registration wins: an instance that may already hold
/// local, unsaved modifications is never silently replaced. No eviction;
/// the cache lives exactly as long as its session.
///

#[derive(Default)]
pub struct IdentityCache {
    models: BTreeMap<String, Model>,
}

impl IdentityCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has(&self, type_key: &str, id: &str) -> bool {
        self.models.contains_key(&composite_key(type_key, id))
    }

    #[must_use]
    pub fn get(&self, type_key: &str, id: &str) -> Option<Model> {
        let model = self.models.get(&composite_key(type_key, id)).cloned();
        if let Some(model) = &model {
            record(MetricsEvent::CacheHit {
                composite_key: model.composite_key(),
            });
        }

        model
    }

    /// Register `model` under its composite key if the slot is unoccupied.
    pub fn push(&mut self, model: &Model) {
        self.models
            .entry(model.composite_key())
            .or_insert_with(|| model.clone());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
