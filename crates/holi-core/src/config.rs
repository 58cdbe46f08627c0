//! Session configuration parameters.

use crate::{AUTO_ACCEPT_MAX, CHAT_MAX, CHUNK_MAX, FILE_MAX, FRAME_MAX, HIGH_WATER, LOW_WATER, MAX_CHUNKS};

/// How incoming file offers are decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptPolicy {
    /// Accept offers up to `max_size` bytes, reject larger ones with
    /// reason "File too large"
    Auto {
        /// Auto-accept ceiling in bytes
        max_size: u64,
    },
    /// Surface every offer as a `FileOffered` event and wait for
    /// `accept_file` / `reject_file`
    Manual,
}

/// Session configuration parameters
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Hard cap on a single frame payload (bytes)
    pub frame_max: usize,
    /// Cap on chat text (bytes)
    pub chat_max: usize,
    /// Cap on a file chunk (bytes)
    pub chunk_max: usize,
    /// Cap on an offered file (bytes)
    pub file_max: u64,
    /// Cap on chunks per transfer
    pub max_chunks: u64,
    /// Incoming offer decision policy
    pub accept_policy: AcceptPolicy,
    /// How long an offer waits for accept/reject (ms)
    pub accept_timeout_ms: u64,
    /// Heartbeat send interval (ms)
    pub heartbeat_interval_ms: u64,
    /// Silence threshold before `Disconnected{Silent}` (ms)
    pub heartbeat_timeout_ms: u64,
    /// Stop enqueueing chunks past this many buffered bytes
    pub high_water: u64,
    /// Drain waits resolve at or below this buffered level
    pub low_water: u64,
    /// Reject unknown inbound frame types instead of dropping them
    pub strict_types: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_max: FRAME_MAX,
            chat_max: CHAT_MAX,
            chunk_max: CHUNK_MAX,
            file_max: FILE_MAX,
            max_chunks: MAX_CHUNKS,
            accept_policy: AcceptPolicy::Auto {
                max_size: AUTO_ACCEPT_MAX,
            },
            accept_timeout_ms: 10_000,
            heartbeat_interval_ms: 5_000,
            heartbeat_timeout_ms: 20_000,
            high_water: HIGH_WATER,
            low_water: LOW_WATER,
            strict_types: false,
        }
    }
}
