//! # Holi Core
//!
//! The P2P collaboration session layer: a compact binary wire protocol,
//! an authenticated-encryption envelope, and the chat / pull-only
//! file-transfer state machines that run over a host-provided ordered
//! byte duplex.
//!
//! This crate provides:
//! - **Codec**: frame encoding/decoding with strict memory caps and
//!   resynchronization across partial reads
//! - **Envelope**: XChaCha20-Poly1305 wrapping of inner frames with
//!   per-direction nonce discipline
//! - **Session**: the single entry point owning sequence counters, the
//!   heartbeat clock, and both engines
//! - **FileTransferEngine**: receiver-driven admission, bounded
//!   in-flight buffers, cooperative backpressure
//! - **HeartbeatKeeper**: ping/pong liveness with a silent-stall watchdog
//!
//! ## Quick start
//!
//! ```no_run
//! use holi_core::{Session, SessionConfig};
//!
//! let mut session = Session::new(SessionConfig::default());
//!
//! // Host duplex glue: feed received bytes in, write pending bytes out.
//! let events = session.handle_incoming(&[]);
//! for event in events {
//!     println!("{event:?}");
//! }
//! while let Some(bytes) = session.poll_outgoing() {
//!     // transport.send(bytes)
//!     let _ = bytes;
//! }
//! ```
//!
//! The session never owns the transport: the host calls
//! [`Session::handle_incoming`] with received bytes, drains
//! [`Session::poll_outgoing`] into its send path, reports
//! `buffered_amount` through the [`Backpressure`] handle, and advances
//! time with [`Session::tick`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod backpressure;
pub mod chat;
pub mod config;
pub mod envelope;
pub mod error;
pub mod event;
pub mod frame;
pub mod heartbeat;
pub mod payload;
pub mod session;
pub mod transfer;
pub mod varint;

pub use backpressure::Backpressure;
pub use config::{AcceptPolicy, SessionConfig};
pub use error::{CodecError, EnvelopeError, SessionError, TransferError, TransportClosed};
pub use event::{DisconnectReason, Event, MessageId, Sender};
pub use frame::{Frame, FrameReader, FrameType};
pub use heartbeat::HeartbeatKeeper;
pub use payload::{FileOffer, Payload, TransferId};
pub use session::{Session, SessionStats};
pub use transfer::{TransferHandle, TransferProgress};

/// Wire magic, first two bytes of every frame (`"HO"`)
pub const MAGIC: [u8; 2] = [0x48, 0x4F];

/// Wire protocol version
pub const VERSION: u8 = 1;

/// Hard cap on a single frame's payload length
pub const FRAME_MAX: usize = 4 * 1024 * 1024;

/// Cap on a chat text payload
pub const CHAT_MAX: usize = 64 * 1024;

/// Cap on a single file chunk
pub const CHUNK_MAX: usize = 64 * 1024;

/// Cap on an offered file size
pub const FILE_MAX: u64 = 2 * 1024 * 1024 * 1024;

/// Cap on the number of chunks a single transfer may span
pub const MAX_CHUNKS: u64 = 1 << 28;

/// Default auto-accept ceiling for incoming offers
pub const AUTO_ACCEPT_MAX: u64 = 50 * 1024 * 1024;

/// Default transport high-water mark (bytes enqueued ahead)
pub const HIGH_WATER: u64 = 1024 * 1024;

/// Default transport low-water mark (drain resolution point)
pub const LOW_WATER: u64 = 256 * 1024;

/// Cap on an offered filename (bytes of UTF-8)
pub const NAME_MAX: usize = 1024;

/// Cap on an offered MIME type (bytes of UTF-8)
pub const MIME_MAX: usize = 256;

/// Cap on a reject reason (bytes of UTF-8)
pub const REASON_MAX: usize = 256;

/// Cap on a protocol-error reason (bytes of UTF-8)
pub const ERROR_REASON_MAX: usize = 1024;

/// Length of the bare pre-key heartbeat shape on the wire
pub const BARE_HEARTBEAT_LEN: usize = 9;
