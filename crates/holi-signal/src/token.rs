//! Capability identifiers.
//!
//! Possession of these strings is the authorization: a friend room id
//! admits one handshake attempt, an instant link carries a project's
//! master key. None of them are ever logged by this crate.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Prefix of friend rendezvous room ids
pub const FRIEND_ROOM_PREFIX: &str = "holi-fr-";

/// Entropy of a friend room token in bytes
pub const FRIEND_TOKEN_LEN: usize = 16;

/// A malformed capability link or token
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Not a recognizable instant link
    #[error("malformed instant link")]
    MalformedLink,
    /// The key portion did not decode to 32 bytes
    #[error("instant link key is not 32 bytes")]
    BadKey,
}

/// Mint a fresh friend rendezvous room id: `holi-fr-<base64url(16B)>`
#[must_use]
pub fn friend_room_id() -> String {
    let mut token = [0u8; FRIEND_TOKEN_LEN];
    rand::thread_rng().fill_bytes(&mut token);
    format!("{FRIEND_ROOM_PREFIX}{}", URL_SAFE_NO_PAD.encode(token))
}

/// Check that a string is a well-formed friend room id
#[must_use]
pub fn is_friend_room_id(candidate: &str) -> bool {
    candidate
        .strip_prefix(FRIEND_ROOM_PREFIX)
        .and_then(|token| URL_SAFE_NO_PAD.decode(token).ok())
        .is_some_and(|raw| raw.len() == FRIEND_TOKEN_LEN)
}

/// Derive the public vault room id for a project:
/// `sha256("vault-" ‖ projectId ‖ "-" ‖ masterKey)` as lowercase hex.
///
/// The master key enters the preimage as raw bytes; the id reveals
/// nothing about it.
#[must_use]
pub fn vault_room_id(project_id: &str, master_key: &[u8; 32]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"vault-");
    hasher.update(project_id.as_bytes());
    hasher.update(b"-");
    hasher.update(master_key);
    hex::encode(hasher.finalize())
}

/// Render an instant link fragment: `#<projectId>.<base64url key>`
#[must_use]
pub fn render_instant_link(project_id: &str, master_key: &[u8; 32]) -> String {
    format!("#{project_id}.{}", URL_SAFE_NO_PAD.encode(master_key))
}

/// Parse an instant link fragment back into its parts.
///
/// # Errors
///
/// [`LinkError::MalformedLink`] without the `#` or `.` structure,
/// [`LinkError::BadKey`] when the key portion is not 32 bytes.
pub fn parse_instant_link(fragment: &str) -> Result<(String, [u8; 32]), LinkError> {
    let body = fragment.strip_prefix('#').ok_or(LinkError::MalformedLink)?;
    let (project_id, key_b64) = body.rsplit_once('.').ok_or(LinkError::MalformedLink)?;
    if project_id.is_empty() {
        return Err(LinkError::MalformedLink);
    }
    let raw = URL_SAFE_NO_PAD
        .decode(key_b64)
        .map_err(|_| LinkError::BadKey)?;
    let key: [u8; 32] = raw.try_into().map_err(|_| LinkError::BadKey)?;
    Ok((project_id.to_owned(), key))
}
