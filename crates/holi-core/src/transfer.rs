//! Pull-only file transfer state machines.
//!
//! Sender: `offer_file` → await accept → stream chunks under
//! backpressure → end. Receiver: admission is receiver-driven; nothing
//! streams until an explicit accept, unsolicited chunks are protocol
//! violations, and accumulated bytes are bounded by the offered size.
//!
//! Both directions are owned by one engine so a session can route
//! frames by transfer id regardless of direction.

use crate::backpressure::Backpressure;
use crate::config::{AcceptPolicy, SessionConfig};
use crate::error::TransferError;
use crate::event::Event;
use crate::frame::Frame;
use crate::payload::{FileOffer, Payload, TransferId};
use std::collections::{HashMap, VecDeque};
use tokio::sync::oneshot;

/// Reason used when the auto policy or size caps reject an offer
pub const REASON_TOO_LARGE: &str = "File too large";

/// Reason used when a receiver cancels an accepted transfer
pub const REASON_USER_ABORTED: &str = "user aborted";

/// Reason used when a sender cancels its own offer
pub const REASON_CANCELLED: &str = "cancelled";

/// Estimated per-chunk wire overhead (frame header + envelope nonce,
/// tag, and inner header), used for backpressure accounting
const CHUNK_WIRE_OVERHEAD: u64 = 64;

/// A protocol violation attributable to the peer; fatal to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Human-readable detail, no secrets
    pub detail: String,
}

impl Violation {
    fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }
}

/// Completion handle returned by `offer_file`.
///
/// Resolves once the peer accepts and the stream finishes, or with the
/// reject/abort/timeout outcome.
#[derive(Debug)]
pub struct TransferHandle {
    id: TransferId,
    done: oneshot::Receiver<Result<(), TransferError>>,
}

impl TransferHandle {
    /// The transfer id this handle tracks
    #[must_use]
    pub fn id(&self) -> TransferId {
        self.id
    }

    /// Wait for the transfer outcome.
    ///
    /// # Errors
    ///
    /// The reject/abort/timeout outcome; a dropped session resolves as
    /// an abort.
    pub async fn done(self) -> Result<(), TransferError> {
        match self.done.await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransferError::Aborted {
                reason: "session closed".into(),
            }),
        }
    }

    /// Non-blocking probe of the outcome
    ///
    /// # Errors
    ///
    /// Same as [`Self::done`] once resolved.
    pub fn try_done(&mut self) -> Option<Result<(), TransferError>> {
        match self.done.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(TransferError::Aborted {
                reason: "session closed".into(),
            })),
        }
    }
}

/// Point-in-time progress of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes moved so far
    pub transferred: u64,
    /// Offered size
    pub total: u64,
    /// Chunks moved so far
    pub chunks_done: u64,
    /// Total chunks the transfer spans
    pub chunks_total: u64,
}

impl TransferProgress {
    /// Progress as a percentage (100.0 for empty files)
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.transferred as f64 / self.total as f64) * 100.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutboundState {
    AwaitAccept,
    Streaming,
}

struct Outbound {
    offer: FileOffer,
    data: Vec<u8>,
    state: OutboundState,
    next_chunk: u64,
    /// Stamped from the session clock; `None` until the first tick
    /// observes the offer, so a host that ticks with wall-clock time
    /// cannot instantly expire offers made before its first tick
    offered_at_ms: Option<u64>,
    done: Option<oneshot::Sender<Result<(), TransferError>>>,
}

impl Outbound {
    fn resolve(&mut self, outcome: Result<(), TransferError>) {
        if let Some(done) = self.done.take() {
            let _ = done.send(outcome);
        }
    }
}

struct Inbound {
    offer: FileOffer,
    accepted: bool,
    received: u64,
    next_index: u64,
    data: Vec<u8>,
}

/// Offer / accept / reject / chunk / end state machines for both
/// directions of one session
pub struct FileTransferEngine {
    chunk_max: usize,
    file_max: u64,
    max_chunks: u64,
    accept_policy: AcceptPolicy,
    accept_timeout_ms: u64,
    outbound: HashMap<TransferId, Outbound>,
    inbound: HashMap<TransferId, Inbound>,
    /// Round-robin order for streaming transfers
    queue: VecDeque<TransferId>,
}

impl FileTransferEngine {
    /// Create an engine from session configuration
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            chunk_max: config.chunk_max,
            file_max: config.file_max,
            max_chunks: config.max_chunks,
            accept_policy: config.accept_policy,
            accept_timeout_ms: config.accept_timeout_ms,
            outbound: HashMap::new(),
            inbound: HashMap::new(),
            queue: VecDeque::new(),
        }
    }

    fn chunk_count(&self, size: u64) -> u64 {
        size.div_ceil(self.chunk_max as u64)
    }

    /// Register an outgoing offer and produce its wire frame.
    ///
    /// # Errors
    ///
    /// `SizeMismatch`, `TooLarge`, `DuplicateId`, or field-cap failures
    /// from the offer metadata.
    pub fn offer(
        &mut self,
        offer: FileOffer,
        data: Vec<u8>,
        now_ms: Option<u64>,
    ) -> Result<(TransferHandle, Frame), TransferError> {
        offer.validate()?;
        if offer.size != data.len() as u64 {
            return Err(TransferError::SizeMismatch {
                declared: offer.size,
                actual: data.len() as u64,
            });
        }
        if offer.size > self.file_max {
            return Err(TransferError::TooLarge {
                size: offer.size,
                max: self.file_max,
            });
        }
        if self.chunk_count(offer.size) > self.max_chunks {
            return Err(TransferError::TooLarge {
                size: offer.size,
                max: self.max_chunks * self.chunk_max as u64,
            });
        }
        if self.outbound.contains_key(&offer.id) {
            return Err(TransferError::DuplicateId);
        }

        let (tx, rx) = oneshot::channel();
        let id = offer.id;
        let frame = Payload::Offer(offer.clone()).into_frame();
        self.outbound.insert(
            id,
            Outbound {
                offer,
                data,
                state: OutboundState::AwaitAccept,
                next_chunk: 0,
                offered_at_ms: now_ms,
                done: Some(tx),
            },
        );
        tracing::debug!(id = %hex::encode(id), "file offered");
        Ok((TransferHandle { id, done: rx }, frame))
    }

    /// Peer accepted one of our offers
    pub fn handle_accept(&mut self, id: TransferId) -> (Vec<Frame>, Vec<Event>) {
        match self.outbound.get_mut(&id) {
            Some(transfer) if transfer.state == OutboundState::AwaitAccept => {
                transfer.state = OutboundState::Streaming;
                self.queue.push_back(id);
                (Vec::new(), vec![Event::FileAccepted { id }])
            }
            Some(_) => {
                // Redundant accept while streaming; ignore.
                (Vec::new(), Vec::new())
            }
            None => {
                // Late accept for a cancelled or timed-out offer: tell
                // the receiver to release its state.
                tracing::debug!(id = %hex::encode(id), "late accept, synthesizing reject");
                let reject = Payload::Reject {
                    id,
                    reason: REASON_CANCELLED.into(),
                }
                .into_frame();
                (vec![reject], Vec::new())
            }
        }
    }

    /// Peer rejected our offer, or cancelled a transfer it was sending us
    pub fn handle_reject(&mut self, id: TransferId, reason: String) -> Vec<Event> {
        if let Some(mut transfer) = self.outbound.remove(&id) {
            transfer.resolve(Err(TransferError::Rejected {
                reason: reason.clone(),
            }));
            return vec![Event::FileRejected { id, reason }];
        }
        if self.inbound.remove(&id).is_some() {
            return vec![Event::FileAborted { id, reason }];
        }
        // Unknown id: already torn down on this side.
        Vec::new()
    }

    /// Peer offered us a file.
    ///
    /// # Errors
    ///
    /// A [`Violation`] when the id collides with a live inbound
    /// transfer.
    pub fn handle_offer(&mut self, offer: FileOffer) -> Result<(Vec<Frame>, Vec<Event>), Violation> {
        let id = offer.id;
        if self.inbound.contains_key(&id) {
            return Err(Violation::new("duplicate file offer id"));
        }

        let oversized =
            offer.size > self.file_max || self.chunk_count(offer.size) > self.max_chunks;
        if oversized {
            tracing::debug!(id = %hex::encode(id), size = offer.size, "rejecting oversized offer");
            let reject = Payload::Reject {
                id,
                reason: REASON_TOO_LARGE.into(),
            }
            .into_frame();
            return Ok((vec![reject], Vec::new()));
        }

        match self.accept_policy {
            AcceptPolicy::Auto { max_size } => {
                if offer.size <= max_size {
                    let total = offer.size;
                    self.inbound.insert(
                        id,
                        Inbound {
                            offer,
                            accepted: true,
                            received: 0,
                            next_index: 0,
                            data: Vec::new(),
                        },
                    );
                    let accept = Payload::Accept { id }.into_frame();
                    let progress = Event::FileProgress {
                        id,
                        transferred: 0,
                        total,
                    };
                    Ok((vec![accept], vec![progress]))
                } else {
                    let reject = Payload::Reject {
                        id,
                        reason: REASON_TOO_LARGE.into(),
                    }
                    .into_frame();
                    Ok((vec![reject], Vec::new()))
                }
            }
            AcceptPolicy::Manual => {
                let event = Event::FileOffered { offer: offer.clone() };
                self.inbound.insert(
                    id,
                    Inbound {
                        offer,
                        accepted: false,
                        received: 0,
                        next_index: 0,
                        data: Vec::new(),
                    },
                );
                Ok((Vec::new(), vec![event]))
            }
        }
    }

    /// Local decision: accept a pending inbound offer.
    ///
    /// # Errors
    ///
    /// `UnknownTransfer` or `AlreadyDecided`.
    pub fn accept(&mut self, id: TransferId) -> Result<(Frame, Vec<Event>), TransferError> {
        let transfer = self
            .inbound
            .get_mut(&id)
            .ok_or(TransferError::UnknownTransfer)?;
        if transfer.accepted {
            return Err(TransferError::AlreadyDecided);
        }
        transfer.accepted = true;
        let progress = Event::FileProgress {
            id,
            transferred: 0,
            total: transfer.offer.size,
        };
        Ok((Payload::Accept { id }.into_frame(), vec![progress]))
    }

    /// Local decision: reject a pending inbound offer.
    ///
    /// # Errors
    ///
    /// `UnknownTransfer` when no live inbound transfer has this id.
    pub fn reject(&mut self, id: TransferId, reason: &str) -> Result<Frame, TransferError> {
        if self.inbound.remove(&id).is_none() {
            return Err(TransferError::UnknownTransfer);
        }
        Ok(Payload::Reject {
            id,
            reason: truncate_reason(reason),
        }
        .into_frame())
    }

    /// Cancel a transfer in either direction. Idempotent.
    pub fn cancel(&mut self, id: TransferId) -> (Vec<Frame>, Vec<Event>) {
        if let Some(mut transfer) = self.outbound.remove(&id) {
            transfer.resolve(Err(TransferError::Aborted {
                reason: REASON_CANCELLED.into(),
            }));
            // The offer frame is already on the wire; the reject tells
            // the receiver to release its state.
            let reject = Payload::Reject {
                id,
                reason: REASON_CANCELLED.into(),
            }
            .into_frame();
            return (
                vec![reject],
                vec![Event::FileAborted {
                    id,
                    reason: REASON_CANCELLED.into(),
                }],
            );
        }
        if self.inbound.remove(&id).is_some() {
            let reject = Payload::Reject {
                id,
                reason: REASON_USER_ABORTED.into(),
            }
            .into_frame();
            return (
                vec![reject],
                vec![Event::FileAborted {
                    id,
                    reason: REASON_USER_ABORTED.into(),
                }],
            );
        }
        (Vec::new(), Vec::new())
    }

    /// Peer streamed a chunk at us.
    ///
    /// # Errors
    ///
    /// A [`Violation`] for unknown ids, index gaps or duplicates,
    /// oversize chunks, and size overflow.
    pub fn handle_chunk(
        &mut self,
        id: TransferId,
        index: u64,
        data: Vec<u8>,
    ) -> Result<Vec<Event>, Violation> {
        let Some(transfer) = self.inbound.get_mut(&id) else {
            return Err(Violation::new("chunk for unknown transfer"));
        };
        if !transfer.accepted {
            // The peer may have raced our pending decision; drop.
            tracing::trace!(id = %hex::encode(id), "chunk before accept dropped");
            return Ok(Vec::new());
        }
        if data.len() > self.chunk_max {
            self.teardown_inbound(id);
            return Err(Violation::new("oversize chunk"));
        }
        if index != transfer.next_index {
            self.teardown_inbound(id);
            return Err(Violation::new("out-of-order chunk"));
        }
        if transfer.received + data.len() as u64 > transfer.offer.size {
            self.teardown_inbound(id);
            return Err(Violation::new("transfer exceeds offered size"));
        }

        transfer.next_index += 1;
        transfer.received += data.len() as u64;
        transfer.data.extend_from_slice(&data);
        Ok(vec![Event::FileProgress {
            id,
            transferred: transfer.received,
            total: transfer.offer.size,
        }])
    }

    /// Peer finished streaming a transfer.
    ///
    /// # Errors
    ///
    /// A [`Violation`] for unknown ids (including a second end), an end
    /// before accept, or a short transfer.
    pub fn handle_end(&mut self, id: TransferId) -> Result<Vec<Event>, Violation> {
        let Some(transfer) = self.inbound.get(&id) else {
            return Err(Violation::new("end for unknown transfer"));
        };
        if !transfer.accepted {
            self.teardown_inbound(id);
            return Err(Violation::new("end before accept"));
        }
        if transfer.received != transfer.offer.size {
            self.teardown_inbound(id);
            return Err(Violation::new("truncated transfer"));
        }

        let transfer = self
            .inbound
            .remove(&id)
            .ok_or_else(|| Violation::new("end for unknown transfer"))?;
        tracing::debug!(id = %hex::encode(id), bytes = transfer.received, "file received");
        Ok(vec![
            Event::FileProgress {
                id,
                transferred: transfer.received,
                total: transfer.offer.size,
            },
            Event::FileReceived {
                id,
                offer: transfer.offer,
                data: transfer.data,
            },
        ])
    }

    /// Advance accept timeouts
    pub fn tick(&mut self, now_ms: u64) -> Vec<Event> {
        // Stamp offers the clock is seeing for the first time.
        for transfer in self.outbound.values_mut() {
            if transfer.state == OutboundState::AwaitAccept && transfer.offered_at_ms.is_none() {
                transfer.offered_at_ms = Some(now_ms);
            }
        }

        let timed_out: Vec<TransferId> = self
            .outbound
            .iter()
            .filter(|(_, t)| {
                t.state == OutboundState::AwaitAccept
                    && t.offered_at_ms
                        .is_some_and(|at| now_ms.saturating_sub(at) > self.accept_timeout_ms)
            })
            .map(|(id, _)| *id)
            .collect();

        let mut events = Vec::new();
        for id in timed_out {
            if let Some(mut transfer) = self.outbound.remove(&id) {
                tracing::debug!(id = %hex::encode(id), "accept window expired");
                transfer.resolve(Err(TransferError::AcceptTimeout));
                events.push(Event::FileRejected {
                    id,
                    reason: "accept timed out".into(),
                });
            }
        }
        events
    }

    /// Produce the next chunk (and end) frames the backpressure budget
    /// allows. Streaming transfers share the budget round-robin.
    pub fn pump(&mut self, backpressure: &Backpressure) -> (Vec<Frame>, Vec<Event>) {
        let mut frames = Vec::new();
        let mut events = Vec::new();

        while let Some(id) = self.queue.pop_front() {
            let Some(transfer) = self.outbound.get_mut(&id) else {
                continue;
            };
            if transfer.state != OutboundState::Streaming {
                continue;
            }

            let chunks_total = transfer.offer.size.div_ceil(self.chunk_max as u64);
            if transfer.next_chunk < chunks_total {
                let start = (transfer.next_chunk * self.chunk_max as u64) as usize;
                let end = (start + self.chunk_max).min(transfer.data.len());
                let estimate = (end - start) as u64 + CHUNK_WIRE_OVERHEAD;
                if !backpressure.can_enqueue(estimate) {
                    self.queue.push_front(id);
                    break;
                }

                let index = transfer.next_chunk;
                let chunk = transfer.data[start..end].to_vec();
                transfer.next_chunk += 1;
                backpressure.record_enqueued(estimate);
                frames.push(Payload::Chunk { id, index, data: chunk }.into_frame());
            }

            if transfer.next_chunk >= chunks_total {
                frames.push(Payload::End { id }.into_frame());
                if let Some(mut finished) = self.outbound.remove(&id) {
                    tracing::debug!(id = %hex::encode(id), "file sent");
                    finished.resolve(Ok(()));
                }
                events.push(Event::FileSent { id });
            } else {
                self.queue.push_back(id);
            }
        }

        (frames, events)
    }

    /// Snapshot of a live transfer's progress, either direction
    #[must_use]
    pub fn progress(&self, id: TransferId) -> Option<TransferProgress> {
        if let Some(t) = self.inbound.get(&id) {
            return Some(TransferProgress {
                transferred: t.received,
                total: t.offer.size,
                chunks_done: t.next_index,
                chunks_total: t.offer.size.div_ceil(self.chunk_max as u64),
            });
        }
        self.outbound.get(&id).map(|t| TransferProgress {
            transferred: (t.next_chunk * self.chunk_max as u64).min(t.offer.size),
            total: t.offer.size,
            chunks_done: t.next_chunk,
            chunks_total: t.offer.size.div_ceil(self.chunk_max as u64),
        })
    }

    /// Number of live transfers across both directions
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.outbound.len() + self.inbound.len()
    }

    /// Tear down everything; resolves sender handles and reports
    /// partial receives
    pub fn abort_all(&mut self, reason: &str) -> Vec<Event> {
        let mut events = Vec::new();
        for (_, mut transfer) in self.outbound.drain() {
            transfer.resolve(Err(TransferError::Aborted {
                reason: reason.into(),
            }));
        }
        for (id, transfer) in self.inbound.drain() {
            if transfer.accepted {
                events.push(Event::FileAborted {
                    id,
                    reason: reason.into(),
                });
            }
        }
        self.queue.clear();
        events
    }

    fn teardown_inbound(&mut self, id: TransferId) {
        self.inbound.remove(&id);
    }
}

/// Clip a reject reason to the wire cap on a char boundary
fn truncate_reason(reason: &str) -> String {
    if reason.len() <= crate::REASON_MAX {
        return reason.to_owned();
    }
    let mut end = crate::REASON_MAX;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_owned()
}
