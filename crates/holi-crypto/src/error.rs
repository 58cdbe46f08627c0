//! Error types for Holi cryptographic operations.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption or authentication failed
    #[error("decryption failed")]
    DecryptionFailed,

    /// The outbound nonce counter is exhausted; the session must end
    #[error("nonce counter exhausted")]
    NonceExhausted,

    /// An inbound nonce counter was not strictly greater than the last
    /// accepted one
    #[error("nonce replayed or out of order")]
    NonceReplayed,

    /// An inbound nonce carried the wrong direction prefix
    #[error("nonce direction mismatch")]
    DirectionMismatch,
}
