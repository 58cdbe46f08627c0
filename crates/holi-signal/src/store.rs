//! The persistence contract, as traits.
//!
//! The core never writes storage directly: it invokes these operations
//! on an external store and trusts them to be transactional. The
//! in-memory [`MemoryStore`] is the reference implementation, used by
//! tests and by hosts that keep everything ephemeral.
//!
//! Timestamps are supplied by the caller (ms); nothing here reads a
//! clock.

use crate::contact::{Contact, ContactState, DmConfig, ProjectGrant, Pubkey};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Store operation failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record with the given id
    #[error("record not found")]
    NotFound,

    /// The backing store failed
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Contact persistence operations
pub trait ContactStore {
    /// All contacts
    fn list(&self) -> Result<Vec<Contact>, StoreError>;

    /// Create a contact; local-only when `pubkey` is `None`
    fn add(
        &mut self,
        alias: &str,
        pubkey: Option<Pubkey>,
        now_ms: u64,
    ) -> Result<Contact, StoreError>;

    /// Attach an identity key to a local-only contact
    fn bind_pubkey(&mut self, id: &str, pubkey: Pubkey, now_ms: u64) -> Result<(), StoreError>;

    /// Install DM configuration after a handshake
    fn set_dm(&mut self, id: &str, dm: DmConfig, now_ms: u64) -> Result<(), StoreError>;

    /// Change the display alias
    fn rename(&mut self, id: &str, alias: &str, now_ms: u64) -> Result<(), StoreError>;

    /// Change the lifecycle state
    fn set_state(&mut self, id: &str, state: ContactState, now_ms: u64) -> Result<(), StoreError>;

    /// Kill-switch: delete the contact and its DM key material
    fn remove(&mut self, id: &str) -> Result<(), StoreError>;

    /// Look a contact up by identity key
    fn find_by_pubkey(&self, pubkey: &Pubkey) -> Result<Option<Contact>, StoreError>;
}

/// Project grant persistence operations
pub trait GrantStore {
    /// The grant for a project, if any
    fn get(&self, project_id: &str) -> Result<Option<ProjectGrant>, StoreError>;

    /// Add a pubkey to a project's allow-list (creating the grant)
    fn allow(&mut self, project_id: &str, pubkey: Pubkey, now_ms: u64) -> Result<(), StoreError>;

    /// Remove a pubkey from a project's allow-list
    fn remove_allow(
        &mut self,
        project_id: &str,
        pubkey: &Pubkey,
        now_ms: u64,
    ) -> Result<(), StoreError>;

    /// Toggle auto-admission (creating the grant)
    fn set_auto_admit(
        &mut self,
        project_id: &str,
        auto_admit: bool,
        now_ms: u64,
    ) -> Result<(), StoreError>;

    /// Delete a project's grant entirely
    fn remove_grant(&mut self, project_id: &str) -> Result<(), StoreError>;
}

/// A persisted chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Message id
    pub id: String,
    /// Project (or DM channel) it belongs to
    pub project_id: String,
    /// Sender label
    pub sender: String,
    /// Message kind discriminator ("text", "file", ...)
    pub kind: String,
    /// Body
    pub content: String,
    /// Timestamp (ms)
    pub ts: u64,
}

/// Message-log persistence operations
pub trait MessageStore {
    /// Append a message
    fn save(&mut self, message: StoredMessage) -> Result<(), StoreError>;

    /// All messages for a project, in save order
    fn list(&self, project_id: &str) -> Result<Vec<StoredMessage>, StoreError>;
}

/// Vault file persistence operations. Paths are opaque labels here;
/// sanitizing them into filesystem-safe names is the adapter's duty.
pub trait VaultFileStore {
    /// Write a blob
    fn save(&mut self, project_id: &str, path: &str, blob: Vec<u8>) -> Result<(), StoreError>;

    /// Read a blob back
    fn read(&self, project_id: &str, path: &str) -> Result<Vec<u8>, StoreError>;

    /// All paths stored for a project
    fn list(&self, project_id: &str) -> Result<Vec<String>, StoreError>;
}

/// In-memory reference store implementing all four contracts
#[derive(Debug, Default)]
pub struct MemoryStore {
    contacts: BTreeMap<String, Contact>,
    next_contact: u64,
    grants: BTreeMap<String, ProjectGrant>,
    messages: Vec<StoredMessage>,
    files: BTreeMap<(String, String), Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn contact_mut(&mut self, id: &str) -> Result<&mut Contact, StoreError> {
        self.contacts.get_mut(id).ok_or(StoreError::NotFound)
    }

    fn grant_mut(&mut self, project_id: &str, now_ms: u64) -> &mut ProjectGrant {
        self.grants
            .entry(project_id.to_owned())
            .or_insert_with(|| ProjectGrant {
                project_id: project_id.to_owned(),
                allowed_pubkeys: BTreeSet::new(),
                auto_admit: false,
                created_at: now_ms,
                updated_at: now_ms,
            })
    }
}

impl ContactStore for MemoryStore {
    fn list(&self) -> Result<Vec<Contact>, StoreError> {
        Ok(self.contacts.values().cloned().collect())
    }

    fn add(
        &mut self,
        alias: &str,
        pubkey: Option<Pubkey>,
        now_ms: u64,
    ) -> Result<Contact, StoreError> {
        self.next_contact += 1;
        let contact = Contact {
            id: format!("c-{}", self.next_contact),
            alias: alias.to_owned(),
            state: ContactState::Active,
            pubkey,
            dm: None,
            created_at: now_ms,
            updated_at: now_ms,
        };
        self.contacts.insert(contact.id.clone(), contact.clone());
        Ok(contact)
    }

    fn bind_pubkey(&mut self, id: &str, pubkey: Pubkey, now_ms: u64) -> Result<(), StoreError> {
        let contact = self.contact_mut(id)?;
        contact.pubkey = Some(pubkey);
        contact.updated_at = now_ms;
        Ok(())
    }

    fn set_dm(&mut self, id: &str, dm: DmConfig, now_ms: u64) -> Result<(), StoreError> {
        let contact = self.contact_mut(id)?;
        contact.dm = Some(dm);
        contact.updated_at = now_ms;
        Ok(())
    }

    fn rename(&mut self, id: &str, alias: &str, now_ms: u64) -> Result<(), StoreError> {
        let contact = self.contact_mut(id)?;
        contact.alias = alias.to_owned();
        contact.updated_at = now_ms;
        Ok(())
    }

    fn set_state(&mut self, id: &str, state: ContactState, now_ms: u64) -> Result<(), StoreError> {
        let contact = self.contact_mut(id)?;
        contact.state = state;
        contact.updated_at = now_ms;
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<(), StoreError> {
        // Removing the record removes the dm key material with it.
        self.contacts.remove(id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    fn find_by_pubkey(&self, pubkey: &Pubkey) -> Result<Option<Contact>, StoreError> {
        Ok(self
            .contacts
            .values()
            .find(|c| c.pubkey.as_ref() == Some(pubkey))
            .cloned())
    }
}

impl GrantStore for MemoryStore {
    fn get(&self, project_id: &str) -> Result<Option<ProjectGrant>, StoreError> {
        Ok(self.grants.get(project_id).cloned())
    }

    fn allow(&mut self, project_id: &str, pubkey: Pubkey, now_ms: u64) -> Result<(), StoreError> {
        let grant = self.grant_mut(project_id, now_ms);
        grant.allowed_pubkeys.insert(pubkey);
        grant.updated_at = now_ms;
        Ok(())
    }

    fn remove_allow(
        &mut self,
        project_id: &str,
        pubkey: &Pubkey,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        let grant = self.grants.get_mut(project_id).ok_or(StoreError::NotFound)?;
        grant.allowed_pubkeys.remove(pubkey);
        grant.updated_at = now_ms;
        Ok(())
    }

    fn set_auto_admit(
        &mut self,
        project_id: &str,
        auto_admit: bool,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        let grant = self.grant_mut(project_id, now_ms);
        grant.auto_admit = auto_admit;
        grant.updated_at = now_ms;
        Ok(())
    }

    fn remove_grant(&mut self, project_id: &str) -> Result<(), StoreError> {
        self.grants
            .remove(project_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

impl MessageStore for MemoryStore {
    fn save(&mut self, message: StoredMessage) -> Result<(), StoreError> {
        self.messages.push(message);
        Ok(())
    }

    fn list(&self, project_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        Ok(self
            .messages
            .iter()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect())
    }
}

impl VaultFileStore for MemoryStore {
    fn save(&mut self, project_id: &str, path: &str, blob: Vec<u8>) -> Result<(), StoreError> {
        self.files
            .insert((project_id.to_owned(), path.to_owned()), blob);
        Ok(())
    }

    fn read(&self, project_id: &str, path: &str) -> Result<Vec<u8>, StoreError> {
        self.files
            .get(&(project_id.to_owned(), path.to_owned()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn list(&self, project_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .files
            .keys()
            .filter(|(p, _)| p == project_id)
            .map(|(_, path)| path.clone())
            .collect())
    }
}
