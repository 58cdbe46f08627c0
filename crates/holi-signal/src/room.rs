//! The pub/sub rendezvous room contract.
//!
//! The bus itself is external: an untrusted best-effort broadcast
//! service with per-peer addressing. The host adapter translates bus
//! callbacks into [`RoomEvent`]s and [`RoomSend`]s into bus calls; the
//! choreographies in this crate never see the wire.

use serde_json::Value;

/// Opaque peer identifier assigned by the bus
pub type PeerId = String;

/// Action name for friend-handshake contact cards
pub const ACTION_CONTACT_INFO: &str = "contact-info";
/// Action name for lobby knocks
pub const ACTION_KNOCK: &str = "knock";
/// Action name for lobby admits
pub const ACTION_ADMIT: &str = "admit";
/// Action name for vault chat relay
pub const ACTION_CHAT: &str = "chat";
/// Action name for vault file blobs
pub const ACTION_FILE: &str = "file";
/// Action name for vault manifests
pub const ACTION_MANIFEST: &str = "manifest";
/// Action name for vault file requests
pub const ACTION_REQ_FILES: &str = "req-files";
/// Action name for vault identity announcements
pub const ACTION_IDENTITY: &str = "identity";
/// Action name for vault metadata
pub const ACTION_METADATA: &str = "metadata";
/// Action name for vault metadata requests
pub const ACTION_REQ_META: &str = "req-meta";
/// Action name for vault sync blobs
pub const ACTION_SYNC: &str = "sync";

/// Something that happened in a joined room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// A peer appeared in the room
    PeerJoined {
        /// The new peer
        peer: PeerId,
    },
    /// A peer left (or the bus lost it)
    PeerLeft {
        /// The departed peer
        peer: PeerId,
    },
    /// A message arrived on an action channel
    Message {
        /// Action name
        action: String,
        /// Structured payload, untrusted
        payload: Value,
        /// Sending peer
        from: PeerId,
    },
}

/// An instruction for the host's bus adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSend {
    /// Action name
    pub action: &'static str,
    /// Structured payload
    pub payload: Value,
    /// `Some(peer)` addresses one peer; `None` broadcasts
    pub to: Option<PeerId>,
}

impl RoomSend {
    /// Addressed send to a single peer
    #[must_use]
    pub fn to_peer(action: &'static str, payload: Value, peer: PeerId) -> Self {
        Self {
            action,
            payload,
            to: Some(peer),
        }
    }

    /// Room-wide broadcast
    #[must_use]
    pub fn broadcast(action: &'static str, payload: Value) -> Self {
        Self {
            action,
            payload,
            to: None,
        }
    }
}
