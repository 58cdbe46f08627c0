//! Heartbeat and silent-stall watchdog.
//!
//! The keeper never reads a clock: the host advances it with
//! `tick(now_ms)` at least once per interval, and every inbound
//! heartbeat refreshes the liveness mark. A peer that stays silent past
//! the timeout is reported exactly once.

/// What the session should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Enqueue a ping carrying this timestamp
    SendPing {
        /// Sender wall-clock ms to embed
        ts: u64,
    },
    /// The peer has been silent past the timeout; close the session
    TimedOut,
}

/// Periodic ping scheduler and last-pong watchdog
#[derive(Debug)]
pub struct HeartbeatKeeper {
    interval_ms: u64,
    timeout_ms: u64,
    /// First tick time; the silence baseline before any pong
    epoch_ms: Option<u64>,
    last_ping_sent_ms: Option<u64>,
    last_seen_ms: Option<u64>,
    /// Round-trip of the most recent echoed pong
    last_rtt_ms: Option<u64>,
}

impl HeartbeatKeeper {
    /// Create a keeper with the given interval and timeout
    #[must_use]
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval_ms,
            timeout_ms,
            epoch_ms: None,
            last_ping_sent_ms: None,
            last_seen_ms: None,
            last_rtt_ms: None,
        }
    }

    /// Advance the keeper. Timeout takes precedence over sending.
    pub fn tick(&mut self, now_ms: u64) -> Option<HeartbeatAction> {
        let epoch = *self.epoch_ms.get_or_insert(now_ms);
        let last_seen = self.last_seen_ms.unwrap_or(epoch);

        if now_ms.saturating_sub(last_seen) > self.timeout_ms {
            return Some(HeartbeatAction::TimedOut);
        }

        let due = match self.last_ping_sent_ms {
            None => true,
            Some(sent) => now_ms.saturating_sub(sent) >= self.interval_ms,
        };
        if due {
            self.last_ping_sent_ms = Some(now_ms);
            return Some(HeartbeatAction::SendPing { ts: now_ms });
        }

        None
    }

    /// An inbound ping arrived; returns the timestamp to echo in the pong
    pub fn on_ping(&mut self, ts: Option<u64>, now_ms: u64) -> Option<u64> {
        self.last_seen_ms = Some(now_ms);
        ts
    }

    /// An inbound pong arrived
    pub fn on_pong(&mut self, echoed_ts: Option<u64>, now_ms: u64) {
        self.last_seen_ms = Some(now_ms);
        if let Some(ts) = echoed_ts {
            self.last_rtt_ms = Some(now_ms.saturating_sub(ts));
        }
    }

    /// Milliseconds since the peer was last heard, as of `now_ms`
    #[must_use]
    pub fn silence_ms(&self, now_ms: u64) -> u64 {
        let baseline = self.last_seen_ms.or(self.epoch_ms).unwrap_or(now_ms);
        now_ms.saturating_sub(baseline)
    }

    /// Most recent measured round-trip, if any
    #[must_use]
    pub fn last_rtt_ms(&self) -> Option<u64> {
        self.last_rtt_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keeper() -> HeartbeatKeeper {
        HeartbeatKeeper::new(5_000, 20_000)
    }

    #[test]
    fn test_first_tick_sends_ping() {
        let mut hb = keeper();
        assert_eq!(hb.tick(1_000), Some(HeartbeatAction::SendPing { ts: 1_000 }));
        // Within the interval: quiet.
        assert_eq!(hb.tick(2_000), None);
        // Interval elapsed: ping again.
        assert_eq!(hb.tick(6_000), Some(HeartbeatAction::SendPing { ts: 6_000 }));
    }

    #[test]
    fn test_timeout_without_pong() {
        let mut hb = keeper();
        hb.tick(0);
        assert_eq!(hb.tick(20_000), Some(HeartbeatAction::SendPing { ts: 20_000 }));
        assert_eq!(hb.tick(20_001), Some(HeartbeatAction::TimedOut));
    }

    #[test]
    fn test_pong_defers_timeout() {
        let mut hb = keeper();
        hb.tick(0);
        hb.on_pong(Some(0), 15_000);
        // 20 s after the pong, not after the epoch.
        assert_ne!(hb.tick(30_000), Some(HeartbeatAction::TimedOut));
        assert_eq!(hb.tick(35_001), Some(HeartbeatAction::TimedOut));
    }

    #[test]
    fn test_ping_also_counts_as_liveness() {
        let mut hb = keeper();
        hb.tick(0);
        let echo = hb.on_ping(Some(19_000), 19_500);
        assert_eq!(echo, Some(19_000));
        assert_ne!(hb.tick(21_000), Some(HeartbeatAction::TimedOut));
    }

    #[test]
    fn test_rtt_measured_from_echo() {
        let mut hb = keeper();
        hb.tick(1_000);
        hb.on_pong(Some(1_000), 1_042);
        assert_eq!(hb.last_rtt_ms(), Some(42));
    }

    #[test]
    fn test_silence_accounting() {
        let mut hb = keeper();
        hb.tick(0);
        hb.on_pong(None, 4_000);
        assert_eq!(hb.silence_ms(9_000), 5_000);
    }
}
