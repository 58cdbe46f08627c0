//! Error types for the Holi session layer.

use thiserror::Error;

/// Frame- and field-level codec errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// First two bytes were not the protocol magic
    #[error("bad frame magic")]
    BadMagic,

    /// Unsupported protocol version byte
    #[error("bad protocol version: {0}")]
    BadVersion(u8),

    /// Unknown frame type in strict mode
    #[error("unknown frame type: 0x{0:02X}")]
    UnknownType(u8),

    /// Varint was not in minimal form
    #[error("non-minimal varint encoding")]
    NonMinimalVarint,

    /// Varint ran past ten bytes or overflowed 64 bits
    #[error("varint too long")]
    VarintTooLong,

    /// Declared length exceeds the configured cap
    #[error("length {len} exceeds cap {cap}")]
    LenExceedsCap {
        /// Declared length
        len: u64,
        /// Configured cap
        cap: u64,
    },

    /// Payload ended before its declared structure was complete
    #[error("truncated payload")]
    TruncatedPayload,

    /// A length-prefixed field exceeds its cap
    #[error("{field} length {len} exceeds cap {cap}")]
    FieldLengthExceedsCap {
        /// Field name
        field: &'static str,
        /// Declared length
        len: u64,
        /// Configured cap
        cap: u64,
    },

    /// A text field was not valid UTF-8
    #[error("text field is not valid UTF-8")]
    NonUtf8Text,

    /// Reserved flag bits were set
    #[error("reserved flag bits set: 0b{0:08b}")]
    FlagBitsReserved(u8),
}

/// Errors from wrapping or unwrapping encrypted envelopes
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Inner frame codec error
    #[error("envelope codec error: {0}")]
    Codec(#[from] CodecError),

    /// AEAD failure, nonce misuse, or counter exhaustion
    #[error("envelope crypto error: {0}")]
    Crypto(#[from] holi_crypto::CryptoError),
}

/// File-transfer errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The peer rejected the offer
    #[error("transfer rejected: {reason}")]
    Rejected {
        /// Peer-supplied reason
        reason: String,
    },

    /// The transfer was aborted before completion
    #[error("transfer aborted: {reason}")]
    Aborted {
        /// Local reason
        reason: String,
    },

    /// No accept or reject arrived within the accept window
    #[error("accept timed out")]
    AcceptTimeout,

    /// Offered size exceeds a configured cap
    #[error("file of {size} bytes exceeds cap {max}")]
    TooLarge {
        /// Offered size
        size: u64,
        /// Configured cap
        max: u64,
    },

    /// Offered size does not match the supplied data
    #[error("offer declares {declared} bytes but data has {actual}")]
    SizeMismatch {
        /// Size field of the offer
        declared: u64,
        /// Length of the supplied blob
        actual: u64,
    },

    /// A transfer with this id already exists in this direction
    #[error("duplicate transfer id")]
    DuplicateId,

    /// No live transfer with this id
    #[error("unknown transfer id")]
    UnknownTransfer,

    /// The offer was already accepted or rejected
    #[error("transfer already decided")]
    AlreadyDecided,

    /// Offer field validation failed
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Session-surface errors (synchronous API failures only; wire problems
/// become events)
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session has been closed; all operations are rejected
    #[error("session closed")]
    Closed,

    /// Argument validation failed at the codec layer
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Argument validation failed at the transfer layer
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Sealing an outbound frame failed
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// The transport closed while a drain wait was pending
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("transport closed")]
pub struct TransportClosed;
