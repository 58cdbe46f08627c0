//! Directional sealing state for a keyed session.
//!
//! One [`SessionSeal`] owns one session key and the nonce discipline for
//! both directions: a strictly monotone send counter and a high-water
//! mark for inbound counters. Nonces are `direction_prefix(1) ‖
//! counter_be(23)`; the prefix partitions the nonce space so that the
//! two peers can share a single key without collision, and a reflected
//! envelope fails the direction check before any decryption is
//! attempted.

use crate::aead::AeadCipher;
use crate::error::CryptoError;
use crate::{KEY_SIZE, NONCE_SIZE};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Width of the big-endian counter portion of a nonce
pub const COUNTER_SIZE: usize = NONCE_SIZE - 1;

/// A 32-byte session key, zeroized on drop.
///
/// Keys are opaque to this crate; provisioning belongs to a higher
/// layer. Never reuse a key across sessions: counters restart at zero
/// and nonces would repeat.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Wrap raw key bytes
    #[must_use]
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Which end of the session this peer is.
///
/// The role fixes the nonce direction prefixes: the initiator seals
/// with prefix `0x00` and expects `0x01` inbound; the responder the
/// reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// The peer that created the session (prefix `0x00` outbound)
    Initiator,
    /// The peer that accepted the session (prefix `0x01` outbound)
    Responder,
}

impl SessionRole {
    /// Nonce prefix for this peer's outbound direction
    #[must_use]
    pub fn send_prefix(self) -> u8 {
        match self {
            Self::Initiator => 0x00,
            Self::Responder => 0x01,
        }
    }

    /// Nonce prefix expected on inbound envelopes
    #[must_use]
    pub fn recv_prefix(self) -> u8 {
        match self {
            Self::Initiator => 0x01,
            Self::Responder => 0x00,
        }
    }
}

/// Bidirectional sealing state for one session.
pub struct SessionSeal {
    cipher: AeadCipher,
    role: SessionRole,
    /// Next outbound counter value
    send_counter: u64,
    /// Highest inbound counter accepted so far (full 23-byte width)
    recv_high: Option<[u8; COUNTER_SIZE]>,
}

impl SessionSeal {
    /// Create sealing state from a session key and role
    #[must_use]
    pub fn new(key: &SessionKey, role: SessionRole) -> Self {
        Self {
            cipher: AeadCipher::new(key.as_bytes()),
            role,
            send_counter: 0,
            recv_high: None,
        }
    }

    /// Seal a plaintext, consuming the next outbound counter.
    ///
    /// Returns the nonce used and the ciphertext (with tag).
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::NonceExhausted` once the send counter
    /// reaches its ceiling; the session must terminate.
    /// Returns `CryptoError::EncryptionFailed` on AEAD failure.
    pub fn seal(
        &mut self,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<([u8; NONCE_SIZE], Vec<u8>), CryptoError> {
        if self.send_counter == u64::MAX {
            return Err(CryptoError::NonceExhausted);
        }

        let nonce = encode_nonce(self.role.send_prefix(), self.send_counter);
        let ciphertext = self.cipher.encrypt(&nonce, plaintext, aad)?;
        self.send_counter += 1;

        Ok((nonce, ciphertext))
    }

    /// Open an inbound envelope.
    ///
    /// The counter from the wire is untrusted: the AEAD tag is
    /// authoritative. Monotonicity is checked up front so duplicates
    /// are dropped without decryption work, but the high-water mark
    /// moves only after the tag verifies.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DirectionMismatch` if the nonce carries
    /// this peer's own send prefix (reflection).
    /// Returns `CryptoError::NonceReplayed` if the counter is not
    /// strictly greater than the last accepted one.
    /// Returns `CryptoError::DecryptionFailed` on authentication failure.
    pub fn open(
        &mut self,
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if nonce[0] != self.role.recv_prefix() {
            return Err(CryptoError::DirectionMismatch);
        }

        let mut counter = [0u8; COUNTER_SIZE];
        counter.copy_from_slice(&nonce[1..]);

        if let Some(high) = &self.recv_high {
            if counter <= *high {
                return Err(CryptoError::NonceReplayed);
            }
        }

        let plaintext = self.cipher.decrypt(nonce, ciphertext, aad)?;
        self.recv_high = Some(counter);

        Ok(plaintext)
    }

    /// Number of envelopes sealed so far
    #[must_use]
    pub fn sealed_count(&self) -> u64 {
        self.send_counter
    }

    /// This peer's session role
    #[must_use]
    pub fn role(&self) -> SessionRole {
        self.role
    }
}

impl std::fmt::Debug for SessionSeal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSeal")
            .field("role", &self.role)
            .field("send_counter", &self.send_counter)
            .finish_non_exhaustive()
    }
}

/// Build a nonce from a direction prefix and a counter.
///
/// The counter occupies the low-order bytes of the 23-byte big-endian
/// field; the high bytes stay zero for the lifetime of any realistic
/// session.
fn encode_nonce(prefix: u8, counter: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[0] = prefix;
    nonce[NONCE_SIZE - 8..].copy_from_slice(&counter.to_be_bytes());
    nonce
}
