use super::{CollectionMember, Membership};
use crate::{
    error::Error,
    model::Model,
    obs::{MetricsEvent, record as record_metric},
    schema::EntitySchema,
    session::WeakSession,
    value::RawValue,
};
use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

///
/// ModelReference
///
/// Lightweight `{id, type?}` reference as stored inside a parent record.
/// A missing type means "the relationship's declared target".
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModelReference {
    pub id: String,
    pub type_key: Option<String>,
}

impl ModelReference {
    /// Parse a raw reference. Returns `None` when there is no usable id;
    /// such entries are skipped, not failed, matching how reference arrays
    /// degrade in the wild.
    #[must_use]
    pub fn from_raw(raw: &RawValue) -> Option<Self> {
        let map = raw.as_object()?;
        let id = match map.get("id")? {
            RawValue::String(s) => s.clone(),
            RawValue::Number(n) => n.to_string(),
            _ => return None,
        };
        let type_key = map
            .get("type")
            .and_then(RawValue::as_str)
            .map(str::to_string);

        Some(Self { id, type_key })
    }
}

/// A reference with its type defaulted and its id normalized.
#[derive(Clone)]
pub(crate) struct ResolvedReference {
    pub(crate) type_key: String,
    pub(crate) id: String,
}

impl CollectionMember for Model {
    fn member_key(&self) -> String {
        self.composite_key()
    }

    fn member_loaded(&self) -> bool {
        self.is_loaded()
    }
}

struct ModelCollectionInner {
    schema: Rc<EntitySchema>,
    session: WeakSession,
    references: Vec<ResolvedReference>,
    membership: Membership<Model>,
    proxied: bool,
    loaded: bool,
}

///
/// ModelCollection
///
/// To-many relationship container with a two-phase lifecycle: `proxied`
/// (membership known from reference identifiers, nothing fetched) and
/// `loaded` (member data fetched in one batch, never per member). The two
/// phases are independent; counting needs the first, iteration pays the
/// second.
///

#[derive(Clone)]
pub struct ModelCollection {
    inner: Rc<RefCell<ModelCollectionInner>>,
}

impl ModelCollection {
    pub(crate) fn from_references(
        schema: Rc<EntitySchema>,
        session: WeakSession,
        references: Vec<ResolvedReference>,
    ) -> Self {
        let total = references.len();

        Self {
            inner: Rc::new(RefCell::new(ModelCollectionInner {
                schema,
                session,
                references,
                membership: Membership::new(total),
                proxied: false,
                loaded: false,
            })),
        }
    }

    /// The declared member type of this slot.
    #[must_use]
    pub fn type_key(&self) -> String {
        self.inner.borrow().schema.type_key().to_string()
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Push a model into the collection. Validated against the declared
    /// target type (polymorphic subtypes allowed); idempotent on members
    /// already visible; the symmetric undo of a prior `remove`.
    pub fn push(&self, model: &Model) -> Result<(), Error> {
        self.proxy()?;
        self.validate_member(model)?;
        self.inner.borrow_mut().membership.push(model.clone());

        Ok(())
    }

    /// Remove a model from the collection. No-op if already removed; added
    /// members evict entirely, original members are flagged removed.
    pub fn remove(&self, model: &Model) -> Result<(), Error> {
        self.proxy()?;
        self.validate_member(model)?;
        self.inner.borrow_mut().membership.remove(model);

        Ok(())
    }

    /// Bulk-remove every visible member.
    pub fn clear(&self) -> Result<(), Error> {
        self.proxy()?;
        self.inner.borrow_mut().membership.clear();

        Ok(())
    }

    /// Discard all deltas and restore the original member set.
    pub fn rollback(&self) -> Result<(), Error> {
        self.proxy()?;
        self.inner.borrow_mut().membership.rollback();

        Ok(())
    }

    // ------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------

    pub fn has(&self, model: &Model) -> Result<bool, Error> {
        self.proxy()?;

        Ok(self
            .inner
            .borrow()
            .membership
            .has_current(&model.composite_key()))
    }

    /// Number of currently visible members. Proxies first: membership must
    /// be knowable without fetching any member data.
    pub fn len(&self) -> Result<usize, Error> {
        self.proxy()?;

        Ok(self.inner.borrow().membership.len())
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    /// The 'total' member count, as if no offset or limit had been applied.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.inner.borrow().membership.total()
    }

    /// First visible member, if any.
    pub fn get_single(&self) -> Result<Option<Model>, Error> {
        self.proxy()?;

        Ok(self.inner.borrow().membership.first_current())
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.inner.borrow().loaded
    }

    #[must_use]
    pub fn is_proxied(&self) -> bool {
        self.inner.borrow().proxied
    }

    /// Whether this collection carries membership deltas.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.borrow().membership.is_dirty()
    }

    /// Whether any currently visible member is itself dirty. Hydrates the
    /// collection first.
    pub fn has_dirty_models(&self) -> Result<bool, Error> {
        self.touch()?;
        for model in self.snapshot_current() {
            if model.is_dirty()? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// All visible members, hydrated.
    pub fn models(&self) -> Result<Vec<Model>, Error> {
        self.touch()?;

        Ok(self.snapshot_current())
    }

    /// Iterate visible members. Proxies immediately so the membership is
    /// fixed; data hydration is deferred until the first dereference.
    pub fn iter(&self) -> Result<ModelIter, Error> {
        self.proxy()?;
        let items = self.snapshot_current();

        Ok(ModelIter {
            collection: self.clone(),
            items,
            pos: 0,
            hydrated: false,
        })
    }

    // ------------------------------------------------------------------
    // Lifecycle phases
    // ------------------------------------------------------------------

    /// Phase one: expand reference identifiers into identity-cached proxy
    /// models, so membership is knowable without any data fetch.
    fn proxy(&self) -> Result<(), Error> {
        {
            if self.inner.borrow().proxied {
                return Ok(());
            }
        }

        let (session, references) = {
            let inner = self.inner.borrow();
            (inner.session.clone(), inner.references.clone())
        };
        let session = session.upgrade()?;
        let loader = session.loader();

        let mut proxies = Vec::with_capacity(references.len());
        for reference in &references {
            proxies.push(loader.create_proxy_model(&reference.type_key, &reference.id)?);
        }

        let mut inner = self.inner.borrow_mut();
        for proxy in proxies {
            inner.membership.seed(proxy);
        }
        inner.proxied = true;

        Ok(())
    }

    /// Phase two: hydrate member data. Collects the subset of original
    /// members not yet individually loaded and issues exactly one batched
    /// fetch for it, never one fetch per member. Already-loaded members are
    /// left untouched.
    pub(crate) fn touch(&self) -> Result<(), Error> {
        self.proxy()?;

        let (session, type_key, unloaded) = {
            let inner = self.inner.borrow();
            if inner.loaded {
                return Ok(());
            }
            let unloaded: Vec<(String, String)> = inner
                .membership
                .original_entries()
                .filter(|(_, member)| !member.member_loaded())
                .map(|(key, member)| (key.clone(), member.id().to_string()))
                .collect();

            (
                inner.session.clone(),
                inner.schema.type_key().to_string(),
                unloaded,
            )
        };

        if !unloaded.is_empty() {
            let session = session.upgrade()?;
            let ids: Vec<String> = unloaded.iter().map(|(_, id)| id.clone()).collect();

            record_metric(MetricsEvent::BatchFetch {
                type_key: type_key.clone(),
                ids: ids.len(),
            });
            let records = session.persister().retrieve_records(&type_key, &ids)?;
            let models = session.loader().create_models(&type_key, &records)?;

            // Proxies upgrade in place, so most entries need nothing here.
            // A polymorphic record that resolved under a subtype gets a new
            // identity and must be re-keyed into the membership.
            let by_id: BTreeMap<String, Model> = models
                .into_iter()
                .map(|model| (model.id().to_string(), model))
                .collect();

            let mut inner = self.inner.borrow_mut();
            for (old_key, id) in &unloaded {
                if let Some(model) = by_id.get(id)
                    && model.composite_key() != *old_key
                {
                    inner.membership.replace(old_key, model.clone());
                }
            }
        }

        self.inner.borrow_mut().loaded = true;

        Ok(())
    }

    fn validate_member(&self, model: &Model) -> Result<(), Error> {
        let (session, target) = {
            let inner = self.inner.borrow();
            (inner.session.clone(), inner.schema.type_key().to_string())
        };

        session
            .upgrade()?
            .validate_relationship_set(&target, model.type_key())
    }

    fn snapshot_current(&self) -> Vec<Model> {
        self.inner.borrow().membership.current_values()
    }
}

///
/// ModelIter
///
/// Iterator over a collection snapshot. The first dereference pays the
/// batched hydration cost; every later step is free.
///

pub struct ModelIter {
    collection: ModelCollection,
    items: Vec<Model>,
    pos: usize,
    hydrated: bool,
}

impl Iterator for ModelIter {
    type Item = Result<Model, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.items.len() {
            return None;
        }
        if !self.hydrated {
            self.hydrated = true;
            if let Err(err) = self.collection.touch() {
                return Some(Err(err));
            }
            // Hydration can re-key polymorphic members; refresh the snapshot.
            self.items = self.collection.snapshot_current();
            if self.items.is_empty() {
                return None;
            }
        }

        let item = self.items[self.pos].clone();
        self.pos += 1;

        Some(Ok(item))
    }
}
