//! Vault lobby: the public-room knock/admit choreography gating a
//! private project room.
//!
//! Guests knock with their identity; the host consults policy and
//! either drops the knock (blocked), admits automatically
//! (allow-listed with auto-admit), or surfaces it for a human
//! decision. Admits carry the project master key wrapped for the
//! guest's pubkey by a host-supplied primitive and are always
//! addressed to one peer, never broadcast.
//!
//! Only the host role emits admits; a guest calling [`VaultLobby::admit`]
//! is a programmer error and asserts.

use crate::contact::{IdentityCard, Pubkey, serde_hex32};
use crate::policy::{ContactStanding, Policy};
use crate::room::{ACTION_ADMIT, ACTION_KNOCK, PeerId, RoomEvent, RoomSend};
use crate::store::StoreError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Lobby failures (store access only; malformed bus traffic is dropped)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LobbyError {
    /// Policy could not be consulted
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Which side of the lobby this peer is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyRole {
    /// Owns the project and the admit authority
    Host,
    /// Wants in
    Guest,
}

/// Wraps the project master key for a specific guest identity.
///
/// Supplied by a higher layer; the lobby only requires that the output
/// be bound to the given pubkey.
pub trait SecretWrapper {
    /// Produce the encrypted secret for this guest
    fn wrap_for(&self, pubkey: &Pubkey) -> Vec<u8>;
}

impl<F: Fn(&Pubkey) -> Vec<u8>> SecretWrapper for F {
    fn wrap_for(&self, pubkey: &Pubkey) -> Vec<u8> {
        self(pubkey)
    }
}

/// Events the lobby surfaces to its host application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyEvent {
    /// A knock needs a human decision
    KnockReceived {
        /// Bus peer id to admit or deny
        peer: PeerId,
        /// Claimed display name
        name: String,
        /// Claimed identity key
        pubkey: Pubkey,
    },
    /// A blocked contact knocked; dropped on the wire, surfaced for audit
    KnockBlocked {
        /// Bus peer id
        peer: PeerId,
        /// Claimed identity key
        pubkey: Pubkey,
    },
    /// Guest side: we were admitted
    Admitted {
        /// The wrapped project master key
        encrypted_secret: Vec<u8>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KnockMessage {
    name: String,
    #[serde(with = "serde_hex32")]
    pubkey: Pubkey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AdmitMessage {
    /// Base64 so the JSON payload stays compact and copy-safe
    #[serde(rename = "encryptedSecret")]
    encrypted_secret: String,
}

/// Knock/admit state machine for one lobby room
pub struct VaultLobby {
    role: LobbyRole,
    project_id: String,
    outbox: VecDeque<RoomSend>,
    /// Host: knocks awaiting a human decision
    pending: HashMap<PeerId, (String, Pubkey)>,
    /// Guest: set once admitted
    admitted: bool,
}

impl VaultLobby {
    /// Host a lobby for a project
    #[must_use]
    pub fn host(project_id: &str) -> Self {
        Self {
            role: LobbyRole::Host,
            project_id: project_id.to_owned(),
            outbox: VecDeque::new(),
            pending: HashMap::new(),
            admitted: false,
        }
    }

    /// Join a lobby as a guest; the knock is enqueued immediately
    #[must_use]
    pub fn guest(project_id: &str, identity: &IdentityCard) -> Self {
        let mut lobby = Self {
            role: LobbyRole::Guest,
            project_id: project_id.to_owned(),
            outbox: VecDeque::new(),
            pending: HashMap::new(),
            admitted: false,
        };
        lobby.send_knock(identity);
        lobby
    }

    /// This peer's role
    #[must_use]
    pub fn role(&self) -> LobbyRole {
        self.role
    }

    /// The project this lobby fronts
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Guest: whether an admit has arrived (time to leave the lobby)
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        self.admitted
    }

    /// Host: knocks awaiting a decision
    #[must_use]
    pub fn pending_knocks(&self) -> Vec<(PeerId, String, Pubkey)> {
        self.pending
            .iter()
            .map(|(peer, (name, pubkey))| (peer.clone(), name.clone(), *pubkey))
            .collect()
    }

    /// Next message for the host's bus adapter
    pub fn poll_send(&mut self) -> Option<RoomSend> {
        self.outbox.pop_front()
    }

    /// Feed a room event.
    ///
    /// The host consults `policy` on knocks and uses `wrapper` to
    /// synthesize auto-admits; guests ignore both.
    ///
    /// # Errors
    ///
    /// Forwarded store failures from the policy lookup.
    pub fn handle_event(
        &mut self,
        event: RoomEvent,
        policy: &Policy<'_>,
        wrapper: &dyn SecretWrapper,
    ) -> Result<Vec<LobbyEvent>, LobbyError> {
        match event {
            RoomEvent::PeerLeft { peer } => {
                self.pending.remove(&peer);
                Ok(Vec::new())
            }
            RoomEvent::PeerJoined { .. } => Ok(Vec::new()),
            RoomEvent::Message { action, payload, from } => match (self.role, action.as_str()) {
                (LobbyRole::Host, ACTION_KNOCK) => self.on_knock(payload, from, policy, wrapper),
                (LobbyRole::Guest, ACTION_ADMIT) => Ok(self.on_admit(payload)),
                _ => Ok(Vec::new()),
            },
        }
    }

    /// Host decision: admit a pending knocker.
    ///
    /// # Panics
    ///
    /// Asserts that this lobby is the host; only the host role holds
    /// the admit authority.
    pub fn admit(&mut self, peer: &PeerId, wrapper: &dyn SecretWrapper) {
        assert!(
            self.role == LobbyRole::Host,
            "admit is the host's authority; guests never emit it"
        );
        let Some((_, pubkey)) = self.pending.remove(peer) else {
            tracing::debug!(%peer, "admit for unknown knock ignored");
            return;
        };
        self.push_admit(peer.clone(), &pubkey, wrapper);
    }

    /// Host decision: drop a pending knock without a wire reply
    pub fn deny(&mut self, peer: &PeerId) {
        self.pending.remove(peer);
    }

    fn on_knock(
        &mut self,
        payload: serde_json::Value,
        from: PeerId,
        policy: &Policy<'_>,
        wrapper: &dyn SecretWrapper,
    ) -> Result<Vec<LobbyEvent>, LobbyError> {
        let Ok(knock) = serde_json::from_value::<KnockMessage>(payload) else {
            tracing::warn!(%from, "ignoring malformed knock");
            return Ok(Vec::new());
        };

        if policy.contact_state(&knock.pubkey)? == ContactStanding::Blocked {
            // Silent on the wire: a blocked contact learns nothing.
            tracing::debug!(%from, "knock from blocked contact dropped");
            return Ok(vec![LobbyEvent::KnockBlocked {
                peer: from,
                pubkey: knock.pubkey,
            }]);
        }

        if policy.should_auto_admit(&self.project_id, &knock.pubkey)? {
            tracing::debug!(%from, "auto-admitting allow-listed knock");
            self.push_admit(from, &knock.pubkey, wrapper);
            return Ok(Vec::new());
        }

        self.pending
            .insert(from.clone(), (knock.name.clone(), knock.pubkey));
        Ok(vec![LobbyEvent::KnockReceived {
            peer: from,
            name: knock.name,
            pubkey: knock.pubkey,
        }])
    }

    fn on_admit(&mut self, payload: serde_json::Value) -> Vec<LobbyEvent> {
        if self.admitted {
            return Vec::new();
        }
        let Ok(admit) = serde_json::from_value::<AdmitMessage>(payload) else {
            tracing::warn!("ignoring malformed admit");
            return Vec::new();
        };
        let Ok(encrypted_secret) = STANDARD.decode(&admit.encrypted_secret) else {
            tracing::warn!("ignoring admit with undecodable secret");
            return Vec::new();
        };
        self.admitted = true;
        vec![LobbyEvent::Admitted { encrypted_secret }]
    }

    fn send_knock(&mut self, identity: &IdentityCard) {
        let knock = KnockMessage {
            name: identity.name.clone(),
            pubkey: identity.pubkey,
        };
        match serde_json::to_value(&knock) {
            Ok(payload) => self.outbox.push_back(RoomSend::broadcast(ACTION_KNOCK, payload)),
            Err(err) => tracing::warn!(%err, "failed to encode knock"),
        }
    }

    /// Admits are always addressed to one peer; the secret never
    /// broadcasts.
    fn push_admit(&mut self, peer: PeerId, pubkey: &Pubkey, wrapper: &dyn SecretWrapper) {
        let admit = AdmitMessage {
            encrypted_secret: STANDARD.encode(wrapper.wrap_for(pubkey)),
        };
        match serde_json::to_value(&admit) {
            Ok(payload) => self
                .outbox
                .push_back(RoomSend::to_peer(ACTION_ADMIT, payload, peer)),
            Err(err) => tracing::warn!(%err, "failed to encode admit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ContactStore, GrantStore, MemoryStore};

    fn wrapper() -> impl SecretWrapper {
        |pubkey: &Pubkey| {
            let mut out = b"wrapped:".to_vec();
            out.extend_from_slice(&pubkey[..4]);
            out
        }
    }

    fn knock_event(name: &str, pubkey: Pubkey, from: &str) -> RoomEvent {
        RoomEvent::Message {
            action: ACTION_KNOCK.into(),
            payload: serde_json::json!({"name": name, "pubkey": hex::encode(pubkey)}),
            from: from.into(),
        }
    }

    #[test]
    fn test_guest_knocks_on_join() {
        let identity = IdentityCard {
            pubkey: [7u8; 32],
            name: "Bob".into(),
        };
        let mut guest = VaultLobby::guest("proj", &identity);

        let send = guest.poll_send().unwrap();
        assert_eq!(send.action, ACTION_KNOCK);
        assert_eq!(send.to, None);
        assert_eq!(send.payload["name"], "Bob");
    }

    #[test]
    fn test_auto_admit_is_addressed_to_knocker() {
        let mut store = MemoryStore::new();
        store.allow("proj", [7u8; 32], 0).unwrap();
        store.set_auto_admit("proj", true, 1).unwrap();
        let policy = Policy::new(&store, &store);

        let mut host = VaultLobby::host("proj");
        let events = host
            .handle_event(knock_event("Bob", [7u8; 32], "peer-bob"), &policy, &wrapper())
            .unwrap();
        assert!(events.is_empty());

        let send = host.poll_send().unwrap();
        assert_eq!(send.action, ACTION_ADMIT);
        assert_eq!(send.to.as_deref(), Some("peer-bob"));
        // No further sends: the secret went to exactly one peer.
        assert!(host.poll_send().is_none());
    }

    #[test]
    fn test_unlisted_knock_surfaces_for_decision() {
        let store = MemoryStore::new();
        let policy = Policy::new(&store, &store);

        let mut host = VaultLobby::host("proj");
        let events = host
            .handle_event(knock_event("Eve", [9u8; 32], "peer-eve"), &policy, &wrapper())
            .unwrap();
        assert_eq!(
            events,
            vec![LobbyEvent::KnockReceived {
                peer: "peer-eve".into(),
                name: "Eve".into(),
                pubkey: [9u8; 32],
            }]
        );
        assert!(host.poll_send().is_none());
        assert_eq!(host.pending_knocks().len(), 1);
    }

    #[test]
    fn test_blocked_knock_dropped_silently() {
        let mut store = MemoryStore::new();
        let contact = store.add("Mallory", Some([3u8; 32]), 0).unwrap();
        store
            .set_state(&contact.id, crate::contact::ContactState::Blocked, 1)
            .unwrap();
        let policy = Policy::new(&store, &store);

        let mut host = VaultLobby::host("proj");
        let events = host
            .handle_event(knock_event("Mallory", [3u8; 32], "peer-m"), &policy, &wrapper())
            .unwrap();
        assert_eq!(
            events,
            vec![LobbyEvent::KnockBlocked {
                peer: "peer-m".into(),
                pubkey: [3u8; 32],
            }]
        );
        // Nothing on the wire, nothing pending.
        assert!(host.poll_send().is_none());
        assert!(host.pending_knocks().is_empty());
    }

    #[test]
    fn test_manual_admit_flow() {
        let store = MemoryStore::new();
        let policy = Policy::new(&store, &store);

        let mut host = VaultLobby::host("proj");
        host.handle_event(knock_event("Bob", [7u8; 32], "peer-bob"), &policy, &wrapper())
            .unwrap();

        host.admit(&"peer-bob".into(), &wrapper());
        let send = host.poll_send().unwrap();
        assert_eq!(send.to.as_deref(), Some("peer-bob"));
        assert!(host.pending_knocks().is_empty());

        // Admitting again is a no-op (knock consumed).
        host.admit(&"peer-bob".into(), &wrapper());
        assert!(host.poll_send().is_none());
    }

    #[test]
    fn test_deny_drops_knock() {
        let store = MemoryStore::new();
        let policy = Policy::new(&store, &store);

        let mut host = VaultLobby::host("proj");
        host.handle_event(knock_event("Eve", [9u8; 32], "peer-eve"), &policy, &wrapper())
            .unwrap();
        host.deny(&"peer-eve".into());
        assert!(host.pending_knocks().is_empty());
        assert!(host.poll_send().is_none());
    }

    #[test]
    fn test_peer_leave_clears_pending_knock() {
        let store = MemoryStore::new();
        let policy = Policy::new(&store, &store);

        let mut host = VaultLobby::host("proj");
        host.handle_event(knock_event("Bob", [7u8; 32], "peer-bob"), &policy, &wrapper())
            .unwrap();
        host.handle_event(
            RoomEvent::PeerLeft { peer: "peer-bob".into() },
            &policy,
            &wrapper(),
        )
        .unwrap();
        assert!(host.pending_knocks().is_empty());
    }

    #[test]
    fn test_guest_receives_admit() {
        let store = MemoryStore::new();
        let policy = Policy::new(&store, &store);
        let identity = IdentityCard {
            pubkey: [7u8; 32],
            name: "Bob".into(),
        };

        let mut guest = VaultLobby::guest("proj", &identity);
        let secret = STANDARD.encode(b"wrapped-master-key");
        let events = guest
            .handle_event(
                RoomEvent::Message {
                    action: ACTION_ADMIT.into(),
                    payload: serde_json::json!({"encryptedSecret": secret}),
                    from: "peer-host".into(),
                },
                &policy,
                &wrapper(),
            )
            .unwrap();
        assert_eq!(
            events,
            vec![LobbyEvent::Admitted {
                encrypted_secret: b"wrapped-master-key".to_vec()
            }]
        );
        assert!(guest.is_admitted());

        // A duplicate admit is ignored.
        let events = guest
            .handle_event(
                RoomEvent::Message {
                    action: ACTION_ADMIT.into(),
                    payload: serde_json::json!({"encryptedSecret": STANDARD.encode(b"other")}),
                    from: "peer-host".into(),
                },
                &policy,
                &wrapper(),
            )
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    #[should_panic(expected = "admit is the host's authority")]
    fn test_guest_admit_asserts() {
        let identity = IdentityCard {
            pubkey: [7u8; 32],
            name: "Bob".into(),
        };
        let mut guest = VaultLobby::guest("proj", &identity);
        guest.admit(&"someone".into(), &wrapper());
    }

    #[test]
    fn test_host_ignores_admit_and_guest_ignores_knock() {
        let store = MemoryStore::new();
        let policy = Policy::new(&store, &store);

        let mut host = VaultLobby::host("proj");
        let events = host
            .handle_event(
                RoomEvent::Message {
                    action: ACTION_ADMIT.into(),
                    payload: serde_json::json!({"encryptedSecret": ""}),
                    from: "x".into(),
                },
                &policy,
                &wrapper(),
            )
            .unwrap();
        assert!(events.is_empty());

        let identity = IdentityCard {
            pubkey: [7u8; 32],
            name: "Bob".into(),
        };
        let mut guest = VaultLobby::guest("proj", &identity);
        guest.poll_send();
        let events = guest
            .handle_event(knock_event("Eve", [9u8; 32], "peer-eve"), &policy, &wrapper())
            .unwrap();
        assert!(events.is_empty());
    }
}
