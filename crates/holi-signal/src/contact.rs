//! Contact, grant, and manifest data shapes.
//!
//! These are the records the signaling choreographies read and emit;
//! the persistence layer that durably owns them is external (§ store
//! traits). Key-shaped fields render as hex in JSON so bus payloads
//! stay readable and byte-order unambiguous.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An identity public key (Ed25519-shaped, opaque to this layer)
pub type Pubkey = [u8; 32];

/// Hex (de)serialization for 32-byte keys in JSON payloads
pub mod serde_hex32 {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    /// Serialize a 32-byte value as lowercase hex
    pub fn serialize<S: Serializer>(bytes: &[u8; 32], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&hex::encode(bytes))
    }

    /// Deserialize lowercase hex into a 32-byte value
    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(de)?;
        let raw = hex::decode(&text).map_err(D::Error::custom)?;
        raw.try_into()
            .map_err(|_| D::Error::custom("expected 32 bytes of hex"))
    }
}

/// DM session configuration: the pairwise relationship material.
///
/// Generated once by the inviter during the friend handshake; both
/// ends persist the identical value so the next session converges on
/// one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmConfig {
    /// Stable id for the DM channel
    #[serde(rename = "sessionId")]
    pub session_id: String,
    /// 32-byte session key
    #[serde(with = "serde_hex32")]
    pub key: [u8; 32],
}

/// Contact lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactState {
    /// Normal relationship
    Active,
    /// Muted but retained
    Paused,
    /// Traffic refused
    Blocked,
}

/// A persisted contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Store-assigned id
    pub id: String,
    /// Display alias
    pub alias: String,
    /// Lifecycle state
    pub state: ContactState,
    /// Identity key; absent for local-only contacts
    pub pubkey: Option<Pubkey>,
    /// DM configuration; present once a handshake completed
    pub dm: Option<DmConfig>,
    /// Creation time (ms)
    pub created_at: u64,
    /// Last mutation time (ms)
    pub updated_at: u64,
}

impl Contact {
    /// Whether this contact can open a DM session
    #[must_use]
    pub fn is_dm_capable(&self) -> bool {
        self.pubkey.is_some() && self.dm.is_some()
    }
}

/// The identity card peers exchange during signaling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCard {
    /// Identity public key
    #[serde(with = "serde_hex32")]
    pub pubkey: Pubkey,
    /// Display name
    pub name: String,
}

/// Per-project admission grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectGrant {
    /// Project this grant covers
    pub project_id: String,
    /// Pubkeys allowed to join
    pub allowed_pubkeys: BTreeSet<Pubkey>,
    /// Admit allowed knockers without asking
    pub auto_admit: bool,
    /// Creation time (ms)
    pub created_at: u64,
    /// Last mutation time (ms)
    pub updated_at: u64,
}

/// One file a vault holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Vault-relative path (a hint; sanitization is the persistence
    /// adapter's job, never this layer's)
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// MIME type, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Last modification time (ms), if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<u64>,
}

/// A vault's file listing, exchanged to reconcile missing files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Files present
    pub files: Vec<FileEntry>,
    /// When this listing was generated (ms)
    pub generated_at: u64,
}

impl Manifest {
    /// Entries present in `theirs` but absent here, by path; the set a
    /// vault requests via `req-files` after a manifest exchange
    #[must_use]
    pub fn missing_from<'a>(&self, theirs: &'a Manifest) -> Vec<&'a FileEntry> {
        theirs
            .files
            .iter()
            .filter(|entry| !self.files.iter().any(|mine| mine.path == entry.path))
            .collect()
    }
}
