//! Admission policy: pure functions over persisted contact and grant
//! state.
//!
//! The lobby consults these before reacting to a knock; nothing here
//! mutates anything.

use crate::contact::{ContactState, Pubkey};
use crate::store::{ContactStore, GrantStore, StoreError};

/// What the store knows about a pubkey
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactStanding {
    /// Never seen
    Unknown,
    /// Known and active
    Active,
    /// Known but muted
    Paused,
    /// Known and refused
    Blocked,
}

/// Read-only policy view over the stores
pub struct Policy<'a> {
    contacts: &'a dyn ContactStore,
    grants: &'a dyn GrantStore,
}

impl<'a> Policy<'a> {
    /// Build a policy view
    #[must_use]
    pub fn new(contacts: &'a dyn ContactStore, grants: &'a dyn GrantStore) -> Self {
        Self { contacts, grants }
    }

    /// The standing of a pubkey.
    ///
    /// # Errors
    ///
    /// Forwarded store failures.
    pub fn contact_state(&self, pubkey: &Pubkey) -> Result<ContactStanding, StoreError> {
        Ok(match self.contacts.find_by_pubkey(pubkey)? {
            None => ContactStanding::Unknown,
            Some(contact) => match contact.state {
                ContactState::Active => ContactStanding::Active,
                ContactState::Paused => ContactStanding::Paused,
                ContactState::Blocked => ContactStanding::Blocked,
            },
        })
    }

    /// Whether a pubkey is on the project's allow-list.
    ///
    /// # Errors
    ///
    /// Forwarded store failures.
    pub fn is_allowed(&self, project_id: &str, pubkey: &Pubkey) -> Result<bool, StoreError> {
        Ok(self
            .grants
            .get(project_id)?
            .is_some_and(|grant| grant.allowed_pubkeys.contains(pubkey)))
    }

    /// Whether a knock from this pubkey should be admitted without
    /// asking: allow-listed and the project opted into auto-admission.
    ///
    /// # Errors
    ///
    /// Forwarded store failures.
    pub fn should_auto_admit(&self, project_id: &str, pubkey: &Pubkey) -> Result<bool, StoreError> {
        let Some(grant) = self.grants.get(project_id)? else {
            return Ok(false);
        };
        Ok(grant.auto_admit && grant.allowed_pubkeys.contains(pubkey))
    }
}
