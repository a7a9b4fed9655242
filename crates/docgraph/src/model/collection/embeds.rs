use super::{CollectionMember, Membership};
use crate::{error::Error, model::Embed, schema::EmbedSchema, session::WeakSession};
use std::{cell::RefCell, rc::Rc};

impl CollectionMember for Embed {
    fn member_key(&self) -> String {
        self.token().to_string()
    }

    fn member_loaded(&self) -> bool {
        // Embeds arrive inline with their parent; there is nothing to fetch.
        true
    }
}

struct EmbedCollectionInner {
    schema: Rc<EmbedSchema>,
    session: WeakSession,
    membership: Membership<Embed>,
}

///
/// EmbedCollection
///
/// To-many embed container. Unlike relationship collections, this is
/// constructed fully loaded (inline sub-documents cannot be fetched
/// separately), so it has no proxy/load phases, and its dirtiness folds in
/// each member's own state.
///

#[derive(Clone)]
pub struct EmbedCollection {
    inner: Rc<RefCell<EmbedCollectionInner>>,
}

impl EmbedCollection {
    pub(crate) fn from_embeds(
        schema: Rc<EmbedSchema>,
        session: WeakSession,
        embeds: Vec<Embed>,
    ) -> Self {
        let mut membership = Membership::new(embeds.len());
        for embed in embeds {
            membership.seed(embed);
        }

        Self {
            inner: Rc::new(RefCell::new(EmbedCollectionInner {
                schema,
                session,
                membership,
            })),
        }
    }

    /// The embed name this collection accepts.
    #[must_use]
    pub fn name(&self) -> String {
        self.inner.borrow().schema.name().to_string()
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    pub fn push(&self, embed: &Embed) -> Result<(), Error> {
        self.validate_member(embed)?;
        self.inner.borrow_mut().membership.push(embed.clone());

        Ok(())
    }

    pub fn remove(&self, embed: &Embed) -> Result<(), Error> {
        self.validate_member(embed)?;
        self.inner.borrow_mut().membership.remove(embed);

        Ok(())
    }

    /// Bulk-remove every visible member.
    pub fn clear(&self) {
        self.inner.borrow_mut().membership.clear();
    }

    /// Discard all deltas and restore the original member set.
    pub fn rollback(&self) {
        self.inner.borrow_mut().membership.rollback();
    }

    /// Create a fresh, New embed of this collection's type. The caller
    /// populates and pushes it; creation alone does not change membership.
    pub fn create_new_embed(&self) -> Result<Embed, Error> {
        let (session, schema) = {
            let inner = self.inner.borrow();
            (inner.session.clone(), inner.schema.clone())
        };

        session.upgrade()?.loader().create_new_embed(&schema)
    }

    // ------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------

    #[must_use]
    pub fn has(&self, embed: &Embed) -> bool {
        self.inner
            .borrow()
            .membership
            .has_current(&embed.token().to_string())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().membership.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The 'total' member count, as if no offset or limit had been applied.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.inner.borrow().membership.total()
    }

    #[must_use]
    pub fn get_single(&self) -> Option<Embed> {
        self.inner.borrow().membership.first_current()
    }

    /// Embed collections are always loaded.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        true
    }

    /// Membership deltas, plus any member's own dirtiness: an embed edited
    /// in place dirties the collection that owns it.
    pub fn is_dirty(&self) -> Result<bool, Error> {
        if self.inner.borrow().membership.is_dirty() {
            return Ok(true);
        }

        self.has_dirty_models()
    }

    pub fn has_dirty_models(&self) -> Result<bool, Error> {
        for embed in self.embeds() {
            if embed.is_dirty()? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// All visible members.
    #[must_use]
    pub fn embeds(&self) -> Vec<Embed> {
        self.inner.borrow().membership.current_values()
    }

    pub fn iter(&self) -> impl Iterator<Item = Embed> {
        self.embeds().into_iter()
    }

    fn validate_member(&self, embed: &Embed) -> Result<(), Error> {
        let (session, expected) = {
            let inner = self.inner.borrow();
            (inner.session.clone(), inner.schema.name().to_string())
        };

        session.upgrade()?.validate_embed_set(&expected, embed.name())
    }
}
