//! Encrypted envelope: a `0x50` frame whose payload is
//! `nonce(24) ‖ ciphertext`.
//!
//! The plaintext is a complete inner frame starting at the type byte;
//! the outer frame header is the associated data, binding the envelope
//! to its own framing.

use crate::error::{CodecError, EnvelopeError};
use crate::frame::{Frame, FrameType, encode_header};
use crate::FRAME_MAX;
use holi_crypto::{NONCE_SIZE, SessionSeal, TAG_SIZE};

/// Wrap an inner frame into an encrypted envelope, consuming the next
/// outbound nonce.
///
/// Returns the full wire bytes of the outer frame.
///
/// # Errors
///
/// `LenExceedsCap` if the sealed payload would exceed [`FRAME_MAX`],
/// `NonceExhausted` once the outbound counter is spent, or an AEAD
/// failure.
pub fn wrap(seal: &mut SessionSeal, inner: &Frame) -> Result<Vec<u8>, EnvelopeError> {
    let plaintext = inner.encode_inner();
    let payload_len = NONCE_SIZE + plaintext.len() + TAG_SIZE;
    if payload_len > FRAME_MAX {
        return Err(CodecError::LenExceedsCap {
            len: payload_len as u64,
            cap: FRAME_MAX as u64,
        }
        .into());
    }

    let header = encode_header(FrameType::Envelope as u8, 0, payload_len);
    let (nonce, ciphertext) = seal.seal(&plaintext, &header)?;

    let mut out = header;
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Unwrap an envelope frame into its inner frame.
///
/// The counter inside the nonce is untrusted; the AEAD tag decides.
///
/// # Errors
///
/// `TruncatedPayload` for an envelope too short to carry a nonce and
/// tag, crypto errors from the seal (direction, replay, decrypt), and
/// codec errors from the inner frame.
pub fn unwrap(seal: &mut SessionSeal, envelope: &Frame) -> Result<Frame, EnvelopeError> {
    debug_assert_eq!(envelope.frame_type, FrameType::Envelope as u8);

    if envelope.payload.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CodecError::TruncatedPayload.into());
    }

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&envelope.payload[..NONCE_SIZE]);
    let ciphertext = &envelope.payload[NONCE_SIZE..];

    let header = encode_header(FrameType::Envelope as u8, envelope.flags, envelope.payload.len());
    let plaintext = seal.open(&nonce, ciphertext, &header)?;

    Ok(Frame::decode_inner(&plaintext)?)
}
