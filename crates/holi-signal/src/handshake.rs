//! Friend handshake: a short-lived rendezvous over an untrusted
//! pub/sub room whose id is the capability.
//!
//! Both peers exchange one `contact-info` card. The inviter is the
//! sole authority for the DM configuration — it pre-generates the key
//! before hosting, sends it to the joiner, and stores the same value
//! itself, so both ends converge on one key and split-brain is
//! impossible. The joiner never emits a DM config.
//!
//! The machine is event-driven: the host feeds [`RoomEvent`]s, drains
//! [`RoomSend`]s, and advances the joiner timeout with `tick(now_ms)`.

use crate::contact::{DmConfig, IdentityCard, Pubkey, serde_hex32};
use crate::room::{ACTION_CONTACT_INFO, RoomEvent, RoomSend};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

/// Default rendezvous timeout for the joiner
pub const HANDSHAKE_TIMEOUT_MS: u64 = 30_000;

/// Handshake failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// The inviter's card carried no DM configuration
    #[error("contact-info is missing the dm configuration")]
    MissingDm,

    /// The rendezvous window elapsed without an accepted card
    #[error("handshake timed out")]
    Timeout,
}

/// Which side of the rendezvous this peer is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRole {
    /// Hosts the room and owns the DM configuration
    Inviter,
    /// Joins via the capability token; sends only its identity
    Joiner,
}

/// The accepted peer: what the caller persists as a new contact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerContact {
    /// Peer identity key
    pub pubkey: Pubkey,
    /// Peer display name
    pub name: String,
    /// The converged DM configuration (the inviter's, on both ends)
    pub dm: DmConfig,
}

/// The one message of the choreography
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContactInfoMessage {
    #[serde(with = "serde_hex32")]
    pubkey: Pubkey,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dm: Option<DmConfig>,
}

/// Role state; the inviter carries the DM configuration it owns
enum RoleState {
    Inviter { dm: DmConfig },
    Joiner,
}

/// Friend handshake state machine
pub struct FriendHandshake {
    role: RoleState,
    identity: IdentityCard,
    timeout_ms: u64,
    started_at_ms: Option<u64>,
    outbox: VecDeque<RoomSend>,
    outcome: Option<PeerContact>,
    failed: bool,
}

impl FriendHandshake {
    /// Host a rendezvous. The DM configuration must be generated
    /// before hosting; it is the value both ends will store.
    #[must_use]
    pub fn inviter(identity: IdentityCard, dm: DmConfig) -> Self {
        Self {
            role: RoleState::Inviter { dm },
            identity,
            timeout_ms: HANDSHAKE_TIMEOUT_MS,
            started_at_ms: None,
            outbox: VecDeque::new(),
            outcome: None,
            failed: false,
        }
    }

    /// Join a rendezvous via its capability token
    #[must_use]
    pub fn joiner(identity: IdentityCard) -> Self {
        Self {
            role: RoleState::Joiner,
            identity,
            timeout_ms: HANDSHAKE_TIMEOUT_MS,
            started_at_ms: None,
            outbox: VecDeque::new(),
            outcome: None,
            failed: false,
        }
    }

    /// Override the joiner timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// This peer's role
    #[must_use]
    pub fn role(&self) -> HandshakeRole {
        match self.role {
            RoleState::Inviter { .. } => HandshakeRole::Inviter,
            RoleState::Joiner => HandshakeRole::Joiner,
        }
    }

    /// The accepted peer, once the handshake completed
    #[must_use]
    pub fn outcome(&self) -> Option<&PeerContact> {
        self.outcome.as_ref()
    }

    /// Whether the handshake reached an outcome (time to leave the room)
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.outcome.is_some()
    }

    /// Next message for the host's bus adapter
    pub fn poll_send(&mut self) -> Option<RoomSend> {
        self.outbox.pop_front()
    }

    /// Feed a room event. Returns the accepted peer when this event
    /// completed the handshake.
    ///
    /// # Errors
    ///
    /// [`HandshakeError::MissingDm`] when a joiner receives a card
    /// without a DM configuration; the handshake is failed.
    pub fn handle_event(
        &mut self,
        event: RoomEvent,
    ) -> Result<Option<PeerContact>, HandshakeError> {
        if self.failed || self.is_done() {
            return Ok(None);
        }

        match event {
            RoomEvent::PeerJoined { peer } => {
                self.send_card(peer);
                Ok(None)
            }
            RoomEvent::PeerLeft { .. } => Ok(None),
            RoomEvent::Message { action, payload, from } => {
                if action != ACTION_CONTACT_INFO {
                    return Ok(None);
                }
                let card: ContactInfoMessage = match serde_json::from_value(payload) {
                    Ok(card) => card,
                    Err(err) => {
                        // Anyone with the token can throw junk in; only
                        // a well-formed card counts.
                        tracing::warn!(%from, %err, "ignoring malformed contact-info");
                        return Ok(None);
                    }
                };
                self.accept_card(card)
            }
        }
    }

    /// Advance the rendezvous timeout. Only the joiner times out; the
    /// inviter listens until its caller cancels it.
    ///
    /// # Errors
    ///
    /// [`HandshakeError::Timeout`] once the window elapses.
    pub fn tick(&mut self, now_ms: u64) -> Result<(), HandshakeError> {
        if self.failed || self.is_done() || matches!(self.role, RoleState::Inviter { .. }) {
            return Ok(());
        }
        let started = *self.started_at_ms.get_or_insert(now_ms);
        if now_ms.saturating_sub(started) > self.timeout_ms {
            self.failed = true;
            return Err(HandshakeError::Timeout);
        }
        Ok(())
    }

    /// Send our card, addressed to the newly joined peer
    fn send_card(&mut self, peer: String) {
        let card = ContactInfoMessage {
            pubkey: self.identity.pubkey,
            name: self.identity.name.clone(),
            // The joiner MUST NOT emit a dm; the inviter always does.
            dm: match &self.role {
                RoleState::Inviter { dm } => Some(dm.clone()),
                RoleState::Joiner => None,
            },
        };
        let payload = match serde_json::to_value(&card) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(%err, "failed to encode contact-info");
                return;
            }
        };
        self.outbox
            .push_back(RoomSend::to_peer(ACTION_CONTACT_INFO, payload, peer));
    }

    /// First accepted card wins; later ones are ignored upstream.
    fn accept_card(
        &mut self,
        card: ContactInfoMessage,
    ) -> Result<Option<PeerContact>, HandshakeError> {
        let dm = match &self.role {
            // Authority rule: our own dm, never the peer's.
            RoleState::Inviter { dm } => dm.clone(),
            RoleState::Joiner => match card.dm {
                Some(dm) => dm,
                None => {
                    self.failed = true;
                    return Err(HandshakeError::MissingDm);
                }
            },
        };

        let peer = PeerContact {
            pubkey: card.pubkey,
            name: card.name,
            dm,
        };
        tracing::debug!(role = ?self.role(), peer = %peer.name, "handshake complete");
        self.outcome = Some(peer.clone());
        Ok(Some(peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(name: &str) -> IdentityCard {
        IdentityCard {
            pubkey: [name.len() as u8; 32],
            name: name.into(),
        }
    }

    fn dm() -> DmConfig {
        DmConfig {
            session_id: "dm-s1".into(),
            key: [0xD3; 32],
        }
    }

    /// Run the full choreography over an in-memory "room".
    #[test]
    fn test_both_ends_converge_on_inviter_dm() {
        let mut alice = FriendHandshake::inviter(card("Alice"), dm());
        let mut bob = FriendHandshake::joiner(card("Bob"));

        // Both sides observe the join.
        alice
            .handle_event(RoomEvent::PeerJoined { peer: "bob".into() })
            .unwrap();
        bob.handle_event(RoomEvent::PeerJoined { peer: "alice".into() })
            .unwrap();

        // Deliver Alice's card to Bob and vice versa.
        let alice_send = alice.poll_send().unwrap();
        assert_eq!(alice_send.to.as_deref(), Some("bob"));
        let bob_outcome = bob
            .handle_event(RoomEvent::Message {
                action: alice_send.action.into(),
                payload: alice_send.payload,
                from: "alice".into(),
            })
            .unwrap()
            .unwrap();

        let bob_send = bob.poll_send().unwrap();
        let alice_outcome = alice
            .handle_event(RoomEvent::Message {
                action: bob_send.action.into(),
                payload: bob_send.payload,
                from: "bob".into(),
            })
            .unwrap()
            .unwrap();

        // Inviter stored the joiner's identity with its own dm; joiner
        // stored the inviter's identity and dm. Identical dm both ends.
        assert_eq!(alice_outcome.name, "Bob");
        assert_eq!(bob_outcome.name, "Alice");
        assert_eq!(alice_outcome.dm, dm());
        assert_eq!(bob_outcome.dm, dm());
        assert!(alice.is_done() && bob.is_done());
    }

    #[test]
    fn test_joiner_never_emits_dm() {
        let mut bob = FriendHandshake::joiner(card("Bob"));
        bob.handle_event(RoomEvent::PeerJoined { peer: "alice".into() })
            .unwrap();

        let send = bob.poll_send().unwrap();
        assert!(send.payload.get("dm").is_none());
    }

    #[test]
    fn test_missing_dm_rejected_by_joiner() {
        let mut bob = FriendHandshake::joiner(card("Bob"));
        let bare = serde_json::json!({
            "pubkey": "11".repeat(32),
            "name": "Mallory",
        });
        let err = bob
            .handle_event(RoomEvent::Message {
                action: ACTION_CONTACT_INFO.into(),
                payload: bare,
                from: "mallory".into(),
            })
            .unwrap_err();
        assert_eq!(err, HandshakeError::MissingDm);
        assert!(!bob.is_done());
    }

    #[test]
    fn test_first_card_wins() {
        let mut alice = FriendHandshake::inviter(card("Alice"), dm());
        let first = serde_json::json!({"pubkey": "22".repeat(32), "name": "Bob"});
        let second = serde_json::json!({"pubkey": "33".repeat(32), "name": "Eve"});

        let outcome = alice
            .handle_event(RoomEvent::Message {
                action: ACTION_CONTACT_INFO.into(),
                payload: first,
                from: "bob".into(),
            })
            .unwrap()
            .unwrap();
        assert_eq!(outcome.name, "Bob");

        let duplicate = alice
            .handle_event(RoomEvent::Message {
                action: ACTION_CONTACT_INFO.into(),
                payload: second,
                from: "eve".into(),
            })
            .unwrap();
        assert!(duplicate.is_none());
        assert_eq!(alice.outcome().unwrap().name, "Bob");
    }

    #[test]
    fn test_malformed_card_ignored() {
        let mut alice = FriendHandshake::inviter(card("Alice"), dm());
        let junk = serde_json::json!({"pubkey": 42});
        let outcome = alice
            .handle_event(RoomEvent::Message {
                action: ACTION_CONTACT_INFO.into(),
                payload: junk,
                from: "noise".into(),
            })
            .unwrap();
        assert!(outcome.is_none());
        assert!(!alice.is_done());
    }

    #[test]
    fn test_joiner_times_out() {
        let mut bob = FriendHandshake::joiner(card("Bob"));
        bob.tick(1_000).unwrap();
        bob.tick(31_000).unwrap();
        assert_eq!(bob.tick(31_001).unwrap_err(), HandshakeError::Timeout);

        // Failed handshakes ignore later cards.
        let late = serde_json::json!({
            "pubkey": "44".repeat(32),
            "name": "Alice",
            "dm": {"sessionId": "s", "key": "55".repeat(32)},
        });
        let outcome = bob
            .handle_event(RoomEvent::Message {
                action: ACTION_CONTACT_INFO.into(),
                payload: late,
                from: "alice".into(),
            })
            .unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn test_inviter_never_times_out() {
        let mut alice = FriendHandshake::inviter(card("Alice"), dm());
        alice.tick(0).unwrap();
        alice.tick(10_000_000).unwrap();
    }

    #[test]
    fn test_other_actions_ignored() {
        let mut alice = FriendHandshake::inviter(card("Alice"), dm());
        let outcome = alice
            .handle_event(RoomEvent::Message {
                action: "knock".into(),
                payload: serde_json::json!({}),
                from: "x".into(),
            })
            .unwrap();
        assert!(outcome.is_none());
    }
}
