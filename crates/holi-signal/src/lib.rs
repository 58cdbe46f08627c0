//! # Holi Signal
//!
//! The short-lived signaling choreographies that bootstrap Holi
//! sessions, plus the policy layer that gates vault admission.
//!
//! This crate provides:
//! - **Room contract**: typed events and addressed sends over an
//!   untrusted pub/sub rendezvous bus the host supplies
//! - **FriendHandshake**: capability-token rendezvous exchanging
//!   contact cards; the inviter is the sole DM-config authority
//! - **VaultLobby**: public-room knock/admit choreography; only the
//!   host emits admits
//! - **Policy**: pure admission rules over persisted contact and grant
//!   state
//! - **Stores**: the persistence contract as traits, with an in-memory
//!   reference implementation
//! - **Tokens**: capability identifiers (friend room ids, vault room
//!   derivation, instant links)
//!
//! Both choreographies are deterministic state machines: the host feeds
//! [`room::RoomEvent`]s in, drains [`room::RoomSend`]s out, and advances
//! timeouts with explicit `tick(now_ms)` calls. Nothing here touches a
//! clock, a socket, or a disk.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod contact;
pub mod handshake;
pub mod lobby;
pub mod policy;
pub mod room;
pub mod store;
pub mod token;

pub use contact::{
    Contact, ContactState, DmConfig, FileEntry, IdentityCard, Manifest, ProjectGrant, Pubkey,
};
pub use handshake::{FriendHandshake, HandshakeError, HandshakeRole, PeerContact};
pub use lobby::{LobbyError, LobbyEvent, LobbyRole, SecretWrapper, VaultLobby};
pub use policy::{ContactStanding, Policy};
pub use room::{PeerId, RoomEvent, RoomSend};
pub use store::{
    ContactStore, GrantStore, MemoryStore, MessageStore, StoreError, StoredMessage, VaultFileStore,
};
