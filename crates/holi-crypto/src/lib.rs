//! # Holi Crypto
//!
//! Cryptographic primitives for the Holi session layer.
//!
//! This crate provides:
//! - **Envelope AEAD**: XChaCha20-Poly1305 with 24-byte nonces
//! - **Directional sealing state**: per-session nonce discipline with
//!   monotone counters and duplicate rejection
//! - **Key handling**: session keys that zeroize on drop
//!
//! Key agreement is deliberately absent: session keys are supplied by a
//! higher layer (capability token derivation or a future PAKE) and
//! installed as opaque 32-byte values.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod aead;
pub mod error;
pub mod seal;

pub use aead::AeadCipher;
pub use error::CryptoError;
pub use seal::{SessionKey, SessionRole, SessionSeal};

/// Session key size in bytes
pub const KEY_SIZE: usize = 32;

/// AEAD nonce size in bytes (XChaCha20-Poly1305)
pub const NONCE_SIZE: usize = 24;

/// AEAD authentication tag size in bytes
pub const TAG_SIZE: usize = 16;
