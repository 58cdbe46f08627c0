//! The ordered event stream surfaced by a session.
//!
//! Rather than heterogeneous observer registration, `handle_incoming`
//! and `tick` return ordered event lists; the host renders or persists
//! them as it sees fit. Events never carry key material.

use crate::payload::{FileOffer, TransferId};

/// Session-local message identifier (fresh per message, both directions)
pub type MessageId = u64;

/// Who produced a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    /// This peer (synchronous local echo)
    Local,
    /// The remote peer
    Peer,
}

/// Why a session disconnected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The host reported the transport closed
    TransportClosed,
    /// The peer went silent past the heartbeat timeout
    Silent,
    /// The session was terminated explicitly, with detail
    Explicit(String),
}

/// An event produced by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A chat message, local echo or peer text
    Message {
        /// Message origin
        sender: Sender,
        /// Fresh session-local id
        id: MessageId,
        /// Message body
        text: String,
    },

    /// An incoming offer awaiting a manual decision
    FileOffered {
        /// The offer metadata
        offer: FileOffer,
    },

    /// The peer accepted our offer
    FileAccepted {
        /// Transfer id
        id: TransferId,
    },

    /// Our offer was rejected (by the peer, or locally on timeout)
    FileRejected {
        /// Transfer id
        id: TransferId,
        /// Reason text
        reason: String,
    },

    /// Receive progress; monotone non-decreasing, terminates at `total`
    FileProgress {
        /// Transfer id
        id: TransferId,
        /// Bytes received so far
        transferred: u64,
        /// Offered size
        total: u64,
    },

    /// A transfer completed; `data` holds the reassembled bytes
    FileReceived {
        /// Transfer id
        id: TransferId,
        /// The originating offer
        offer: FileOffer,
        /// Reassembled file contents
        data: Vec<u8>,
    },

    /// An outgoing transfer finished streaming
    FileSent {
        /// Transfer id
        id: TransferId,
    },

    /// A transfer tore down before completion
    FileAborted {
        /// Transfer id
        id: TransferId,
        /// Reason text
        reason: String,
    },

    /// A plaintext frame arrived on a keyed session (reported once)
    EncryptionMismatch,

    /// An envelope failed to authenticate; the session is closing
    EncryptionError {
        /// Failure detail, no secrets
        detail: String,
    },

    /// The peer violated the protocol; the session is closing
    ProtocolViolation {
        /// Violation detail
        detail: String,
    },

    /// The session ended
    Disconnected {
        /// Why
        reason: DisconnectReason,
    },
}
