//! Cooperative backpressure against the host transport.
//!
//! The host owns the real send buffer; this component mirrors its
//! `buffered_amount` and exposes exactly one async primitive:
//! [`Backpressure::drain`], which resolves once the mirrored level is
//! at or below the low-water mark. The wait is woken only by the
//! host's low-water signal (or a buffered-amount report) — it never
//! polls.

use crate::error::TransportClosed;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug)]
struct State {
    buffered: u64,
    closed: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
    high_water: u64,
    low_water: u64,
}

/// Shared backpressure view over the host transport's send buffer.
///
/// Clones share state; the session holds one and the host may hold
/// another to report buffer levels from its transport callbacks.
#[derive(Debug, Clone)]
pub struct Backpressure {
    shared: Arc<Shared>,
}

impl Backpressure {
    /// Create with the given watermarks
    #[must_use]
    pub fn new(high_water: u64, low_water: u64) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    buffered: 0,
                    closed: false,
                }),
                notify: Notify::new(),
                high_water,
                low_water,
            }),
        }
    }

    /// Host report: the transport's current `buffered_amount`
    pub fn update_buffered(&self, amount: u64) {
        let mut state = self.lock();
        state.buffered = amount;
        if amount <= self.shared.low_water {
            self.shared.notify.notify_waiters();
        }
    }

    /// Host signal: the transport crossed below the low-water mark
    pub fn low_water_reached(&self) {
        let mut state = self.lock();
        state.buffered = state.buffered.min(self.shared.low_water);
        self.shared.notify.notify_waiters();
    }

    /// Session bookkeeping: bytes just enqueued toward the transport
    pub(crate) fn record_enqueued(&self, bytes: u64) {
        let mut state = self.lock();
        state.buffered = state.buffered.saturating_add(bytes);
    }

    /// Whether `extra` more bytes may be enqueued without exceeding the
    /// high-water mark
    #[must_use]
    pub fn can_enqueue(&self, extra: u64) -> bool {
        let state = self.lock();
        !state.closed && state.buffered.saturating_add(extra) <= self.shared.high_water
    }

    /// Current mirrored buffer level
    #[must_use]
    pub fn buffered(&self) -> u64 {
        self.lock_buffered()
    }

    /// Mark the transport closed; all pending and future drains reject
    pub fn close(&self) {
        self.lock().closed = true;
        self.shared.notify.notify_waiters();
    }

    /// Whether the transport has closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Wait until the buffer level is at or below the low-water mark.
    ///
    /// # Errors
    ///
    /// Rejects with [`TransportClosed`] if the transport closes before
    /// (or while) the wait resolves.
    pub async fn drain(&self) -> Result<(), TransportClosed> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a signal between the check
            // and the await cannot be missed.
            notified.as_mut().enable();
            {
                let state = self.lock();
                if state.closed {
                    return Err(TransportClosed);
                }
                if state.buffered <= self.shared.low_water {
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // Held only for field reads/writes; never across an await.
        self.shared.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_buffered(&self) -> u64 {
        self.lock().buffered
    }
}
