//! Module: collection
//! Responsibility: to-many containers and their added/removed/original
//! delta bookkeeping.
//! Does not own: member instantiation (loader) or member state (stores).
//! Boundary: membership is keyed by composite identity, never by object
//! reference, so equivalent references can never double-count.

mod embeds;
mod models;


pub use embeds::EmbedCollection;
pub use models::{ModelCollection, ModelIter, ModelReference};

pub(crate) use models::ResolvedReference;

use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// CollectionError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum CollectionError {
    #[error("'{candidate}' is not assignable to a '{expected}' set")]
    MemberType { expected: String, candidate: String },
}

///
/// CollectionMember
///
/// The seam between the delta engine and its member type: models key by
/// composite identity, embeds by ephemeral token.
///

pub(crate) trait CollectionMember: Clone {
    fn member_key(&self) -> String;
    fn member_loaded(&self) -> bool;
}

///
/// Membership
///
/// Delta state for one to-many slot. `current = (original ∪ added) \
/// removed`, maintained incrementally; `total` counts as if no offset or
/// limit had been applied to the original member set and is adjusted in
/// step with `current`.
///

pub(crate) struct Membership<M> {
    original: BTreeMap<String, M>,
    added: BTreeMap<String, M>,
    removed: BTreeMap<String, M>,
    current: BTreeMap<String, M>,
    total: usize,
    base_total: usize,
}

impl<M: CollectionMember> Membership<M> {
    pub(crate) const fn new(base_total: usize) -> Self {
        Self {
            original: BTreeMap::new(),
            added: BTreeMap::new(),
            removed: BTreeMap::new(),
            current: BTreeMap::new(),
            total: base_total,
            base_total,
        }
    }

    /// Install one member as part of the original set. Used only while a
    /// collection is materializing; never adjusts `total`.
    pub(crate) fn seed(&mut self, member: M) {
        let key = member.member_key();
        self.current.insert(key.clone(), member.clone());
        self.original.insert(key, member);
    }

    /// Add a member. Idempotent for members already visible; re-adding a
    /// removed member is the symmetric undo of its removal.
    pub(crate) fn push(&mut self, member: M) {
        let key = member.member_key();
        if self.added.contains_key(&key) {
            return;
        }
        if self.removed.remove(&key).is_some() {
            self.insert_current(key, member);
            return;
        }
        if self.original.contains_key(&key) {
            return;
        }

        self.added.insert(key.clone(), member.clone());
        self.insert_current(key, member);
    }

    /// Remove a member. Added members evict entirely (they were never
    /// persisted); original members move into `removed`.
    pub(crate) fn remove(&mut self, member: &M) {
        let key = member.member_key();
        if self.removed.contains_key(&key) {
            return;
        }
        if self.added.remove(&key).is_some() {
            self.evict_current(&key);
            return;
        }
        if let Some(original) = self.original.get(&key).cloned() {
            self.evict_current(&key);
            self.removed.insert(key, original);
        }
    }

    /// Bulk-remove every visible member.
    pub(crate) fn clear(&mut self) {
        self.total = self.total.saturating_sub(self.current.len());
        self.removed = self.original.clone();
        self.current.clear();
        self.added.clear();
    }

    /// Discard all deltas and restore the original member set.
    pub(crate) fn rollback(&mut self) {
        self.current = self.original.clone();
        self.added.clear();
        self.removed.clear();
        self.total = self.base_total;
    }

    /// Swap an original entry for its hydrated, possibly re-typed
    /// replacement (a polymorphic record may resolve under a subtype key).
    pub(crate) fn replace(&mut self, old_key: &str, member: M) {
        let new_key = member.member_key();
        if self.original.remove(old_key).is_some() {
            self.original.insert(new_key.clone(), member.clone());
        }
        if self.current.remove(old_key).is_some() {
            self.current.insert(new_key.clone(), member.clone());
        }
        if self.removed.remove(old_key).is_some() {
            self.removed.insert(new_key, member);
        }
    }

    fn insert_current(&mut self, key: String, member: M) {
        if self.current.insert(key, member).is_none() {
            self.total += 1;
        }
    }

    fn evict_current(&mut self, key: &str) {
        if self.current.remove(key).is_some() {
            self.total = self.total.saturating_sub(1);
        }
    }

    // ------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------

    pub(crate) fn has_current(&self, key: &str) -> bool {
        self.current.contains_key(key)
    }

    pub(crate) fn current_values(&self) -> Vec<M> {
        self.current.values().cloned().collect()
    }

    pub(crate) fn original_entries(&self) -> impl Iterator<Item = (&String, &M)> {
        self.original.iter()
    }

    pub(crate) fn first_current(&self) -> Option<M> {
        self.current.values().next().cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.current.len()
    }

    pub(crate) const fn total(&self) -> usize {
        self.total
    }

    pub(crate) fn is_dirty(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}
