//! Session state machine: the single entry point of the core.
//!
//! A `Session` sits on an already-open ordered byte duplex the host
//! owns. The host feeds received bytes to [`Session::handle_incoming`],
//! drains [`Session::poll_outgoing`] into its send path, advances time
//! with [`Session::tick`], and reports transport buffer levels through
//! the shared [`Backpressure`] handle. Every operation is synchronous;
//! the only futures are the drain wait and the transfer-outcome handle.
//!
//! Sessions are independent values: each owns its key, counters, read
//! buffer, and heartbeat clock. Nothing is shared across sessions.

use crate::backpressure::Backpressure;
use crate::chat::ChatEngine;
use crate::config::SessionConfig;
use crate::envelope;
use crate::error::{EnvelopeError, SessionError};
use crate::event::{DisconnectReason, Event};
use crate::frame::{Frame, FrameReader, FrameType};
use crate::heartbeat::{HeartbeatAction, HeartbeatKeeper};
use crate::payload::{FileOffer, Payload, TransferId};
use crate::transfer::{FileTransferEngine, TransferHandle, TransferProgress, Violation};
use holi_crypto::{CryptoError, SessionKey, SessionRole, SessionSeal};
use std::collections::VecDeque;

/// Counters a host can sample at any time
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    /// Frames enqueued for the transport
    pub frames_sent: u64,
    /// Frames decoded from the transport
    pub frames_received: u64,
    /// Bytes enqueued for the transport
    pub bytes_sent: u64,
    /// Bytes fed into `handle_incoming`
    pub bytes_received: u64,
    /// Chat messages sent
    pub messages_sent: u64,
    /// Chat messages received
    pub messages_received: u64,
}

/// One keyed (or pre-key) channel to a single peer
pub struct Session {
    config: SessionConfig,
    reader: FrameReader,
    seal: Option<SessionSeal>,
    chat: ChatEngine,
    transfers: FileTransferEngine,
    heartbeat: HeartbeatKeeper,
    backpressure: Backpressure,
    outbound: VecDeque<Vec<u8>>,
    /// Events produced outside `handle_incoming` (pump completions,
    /// manual accepts); drained into the next returned batch
    pending_events: Vec<Event>,
    closed: bool,
    mismatch_reported: bool,
    /// Last `tick` time; `None` until the host first ticks
    now_ms: Option<u64>,
    stats: SessionStats,
}

impl Session {
    /// Create a session over a not-yet-keyed duplex
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        let mut reader = FrameReader::new(config.frame_max);
        reader.set_strict(config.strict_types);
        let backpressure = Backpressure::new(config.high_water, config.low_water);
        let chat = ChatEngine::new(config.chat_max);
        let transfers = FileTransferEngine::new(&config);
        let heartbeat =
            HeartbeatKeeper::new(config.heartbeat_interval_ms, config.heartbeat_timeout_ms);
        Self {
            config,
            reader,
            seal: None,
            chat,
            transfers,
            heartbeat,
            backpressure,
            outbound: VecDeque::new(),
            pending_events: Vec::new(),
            closed: false,
            mismatch_reported: false,
            now_ms: None,
            stats: SessionStats::default(),
        }
    }

    /// Install the session key. From here on every outbound frame is
    /// wrapped and plaintext inbound frames are rejected.
    ///
    /// Keys must be fresh per session; reusing one restarts counters
    /// and would repeat nonces.
    pub fn install_key(&mut self, key: &SessionKey, role: SessionRole) {
        self.seal = Some(SessionSeal::new(key, role));
        self.reader.set_bare_heartbeat(false);
        tracing::debug!(?role, "session keyed");
    }

    /// Whether a key is installed
    #[must_use]
    pub fn is_keyed(&self) -> bool {
        self.seal.is_some()
    }

    /// Whether the session has closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The shared backpressure handle; hosts clone it into their
    /// transport callbacks to report `buffered_amount` and the
    /// low-water signal
    #[must_use]
    pub fn backpressure(&self) -> Backpressure {
        self.backpressure.clone()
    }

    /// Counters snapshot
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Progress of a live transfer in either direction
    #[must_use]
    pub fn transfer_progress(&self, id: TransferId) -> Option<TransferProgress> {
        self.transfers.progress(id)
    }

    /// Feed bytes received from the transport; returns events in
    /// receipt order. Safe to call with arbitrary partial chunks.
    pub fn handle_incoming(&mut self, bytes: &[u8]) -> Vec<Event> {
        if self.closed {
            return Vec::new();
        }
        self.stats.bytes_received += bytes.len() as u64;
        self.reader.push(bytes);

        let mut events = std::mem::take(&mut self.pending_events);
        loop {
            match self.reader.next_frame() {
                Ok(Some(frame)) => {
                    self.stats.frames_received += 1;
                    self.dispatch(frame, &mut events);
                    if self.closed {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    self.fatal(&mut events, format!("codec error: {err}"), true);
                    break;
                }
            }
        }
        events
    }

    /// Dequeue the next ready buffer for the transport, pumping file
    /// chunks as the backpressure budget allows
    pub fn poll_outgoing(&mut self) -> Option<Vec<u8>> {
        if self.outbound.is_empty() && !self.closed {
            let (frames, events) = self.transfers.pump(&self.backpressure);
            self.pending_events.extend(events);
            for frame in frames {
                if let Err(err) = self.enqueue(&frame) {
                    let detail = format!("seal failure: {err}");
                    let mut events = Vec::new();
                    self.fatal(&mut events, detail, false);
                    self.pending_events.extend(events);
                    break;
                }
            }
        }
        self.outbound.pop_front()
    }

    /// Send chat text. The local echo event is returned synchronously.
    ///
    /// # Errors
    ///
    /// `Closed` after close, `FieldLengthExceedsCap` for oversized
    /// text, or a seal failure.
    pub fn send_text(&mut self, text: &str) -> Result<Event, SessionError> {
        self.ensure_open()?;
        let (event, frame) = self.chat.send(text)?;
        self.enqueue(&frame)?;
        self.stats.messages_sent += 1;
        Ok(event)
    }

    /// Offer a file to the peer. The returned handle resolves when the
    /// stream completes or the offer is rejected, aborted, or times
    /// out.
    ///
    /// # Errors
    ///
    /// `Closed`, size/cap validation failures, `DuplicateId`, or a seal
    /// failure.
    pub fn offer_file(
        &mut self,
        offer: FileOffer,
        data: Vec<u8>,
    ) -> Result<TransferHandle, SessionError> {
        self.ensure_open()?;
        let (handle, frame) = self.transfers.offer(offer, data, self.now_ms)?;
        self.enqueue(&frame)?;
        Ok(handle)
    }

    /// Accept a pending inbound offer (manual policy).
    ///
    /// # Errors
    ///
    /// `Closed`, `UnknownTransfer`, `AlreadyDecided`, or a seal failure.
    pub fn accept_file(&mut self, id: TransferId) -> Result<(), SessionError> {
        self.ensure_open()?;
        let (frame, events) = self.transfers.accept(id)?;
        self.enqueue(&frame)?;
        self.pending_events.extend(events);
        Ok(())
    }

    /// Reject a pending inbound offer (manual policy).
    ///
    /// # Errors
    ///
    /// `Closed`, `UnknownTransfer`, or a seal failure.
    pub fn reject_file(&mut self, id: TransferId, reason: &str) -> Result<(), SessionError> {
        self.ensure_open()?;
        let frame = self.transfers.reject(id, reason)?;
        self.enqueue(&frame)?;
        Ok(())
    }

    /// Cancel a transfer in either direction. Idempotent; unknown ids
    /// are no-ops.
    pub fn cancel_file(&mut self, id: TransferId) -> Vec<Event> {
        if self.closed {
            return Vec::new();
        }
        let (frames, mut events) = self.transfers.cancel(id);
        for frame in frames {
            if let Err(err) = self.enqueue(&frame) {
                self.fatal(&mut events, format!("seal failure: {err}"), false);
                break;
            }
        }
        events
    }

    /// Advance the heartbeat clock and transfer timeouts. Call at
    /// least once per heartbeat interval.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Event> {
        let mut events = std::mem::take(&mut self.pending_events);
        if self.closed {
            return events;
        }
        self.now_ms = Some(now_ms);

        events.extend(self.transfers.tick(now_ms));

        match self.heartbeat.tick(now_ms) {
            Some(HeartbeatAction::SendPing { ts }) => {
                if let Err(err) = self.enqueue_heartbeat(FrameType::Ping, Some(ts)) {
                    self.fatal(&mut events, format!("seal failure: {err}"), false);
                }
            }
            Some(HeartbeatAction::TimedOut) => {
                tracing::debug!("peer silent past heartbeat timeout");
                events.extend(self.transfers.abort_all("session closed"));
                events.push(Event::Disconnected {
                    reason: DisconnectReason::Silent,
                });
                self.shutdown(true);
            }
            None => {}
        }
        events
    }

    /// Close the session: drop the key, abort in-flight transfers,
    /// discard queued frames. Nothing is flushed. Subsequent inputs
    /// are ignored.
    pub fn close(&mut self) -> Vec<Event> {
        if self.closed {
            return Vec::new();
        }
        let mut events = std::mem::take(&mut self.pending_events);
        events.extend(self.transfers.abort_all("session closed"));
        self.shutdown(true);
        events
    }

    /// The host's transport closed underneath us
    pub fn on_transport_close(&mut self) -> Vec<Event> {
        if self.closed {
            return Vec::new();
        }
        let mut events = std::mem::take(&mut self.pending_events);
        events.extend(self.transfers.abort_all("session closed"));
        events.push(Event::Disconnected {
            reason: DisconnectReason::TransportClosed,
        });
        self.shutdown(true);
        events
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    /// Encode (and wrap, when keyed) a frame onto the outbound queue
    fn enqueue(&mut self, frame: &Frame) -> Result<(), SessionError> {
        let bytes = match &mut self.seal {
            Some(seal) => envelope::wrap(seal, frame)?,
            None => frame.encode(),
        };
        self.stats.frames_sent += 1;
        self.stats.bytes_sent += bytes.len() as u64;
        self.outbound.push_back(bytes);
        Ok(())
    }

    /// Heartbeats ride the bare 9-byte shape pre-key and the envelope
    /// once keyed
    fn enqueue_heartbeat(
        &mut self,
        frame_type: FrameType,
        ts: Option<u64>,
    ) -> Result<(), SessionError> {
        if self.seal.is_some() {
            let payload = match frame_type {
                FrameType::Pong => Payload::Pong { ts },
                _ => Payload::Ping { ts },
            };
            return self.enqueue(&payload.into_frame());
        }

        let mut bytes = Vec::with_capacity(crate::BARE_HEARTBEAT_LEN);
        bytes.push(frame_type as u8);
        bytes.extend_from_slice(&ts.unwrap_or(0).to_be_bytes());
        self.stats.frames_sent += 1;
        self.stats.bytes_sent += bytes.len() as u64;
        self.outbound.push_back(bytes);
        Ok(())
    }

    fn dispatch(&mut self, frame: Frame, events: &mut Vec<Event>) {
        let keyed = self.seal.is_some();
        if keyed {
            if frame.known_type() == Some(FrameType::Envelope) {
                let inner = {
                    let seal = match self.seal.as_mut() {
                        Some(seal) => seal,
                        None => return,
                    };
                    envelope::unwrap(seal, &frame)
                };
                match inner {
                    Ok(inner) => self.route(inner, events),
                    Err(EnvelopeError::Crypto(CryptoError::NonceReplayed)) => {
                        tracing::trace!("duplicate envelope dropped");
                    }
                    Err(EnvelopeError::Crypto(err)) => {
                        // Authentication failure, not a framing fault:
                        // surface it as an encryption error and end the
                        // session without a protocol complaint.
                        let detail = format!("envelope rejected: {err}");
                        tracing::warn!(%detail, "closing keyed session");
                        events.push(Event::EncryptionError {
                            detail: detail.clone(),
                        });
                        events.extend(self.transfers.abort_all("session closed"));
                        events.push(Event::Disconnected {
                            reason: DisconnectReason::Explicit(detail),
                        });
                        self.shutdown(false);
                    }
                    Err(EnvelopeError::Codec(err)) => {
                        self.fatal(events, format!("malformed inner frame: {err}"), true);
                    }
                }
            } else {
                // Plaintext on a keyed session; report once, drop.
                if !self.mismatch_reported {
                    self.mismatch_reported = true;
                    events.push(Event::EncryptionMismatch);
                }
                tracing::warn!(frame_type = frame.frame_type, "plaintext frame on keyed session");
            }
            return;
        }

        if frame.known_type() == Some(FrameType::Envelope) {
            // Peer is keyed, we are not; nothing can be read yet.
            tracing::warn!("envelope before key install dropped");
            return;
        }
        self.route(frame, events);
    }

    fn route(&mut self, frame: Frame, events: &mut Vec<Event>) {
        let Some(frame_type) = frame.known_type() else {
            if self.config.strict_types {
                self.fatal(events, format!("unknown frame type 0x{:02X}", frame.frame_type), true);
            } else {
                tracing::trace!(frame_type = frame.frame_type, "unknown inner frame dropped");
            }
            return;
        };

        let payload = match Payload::parse(frame_type, &frame.payload) {
            Ok(payload) => payload,
            Err(err) => {
                self.fatal(events, format!("malformed payload: {err}"), true);
                return;
            }
        };

        match payload {
            Payload::Ping { ts } => {
                let now = self.now_ms.unwrap_or(0);
                let echo = self.heartbeat.on_ping(ts, now);
                if let Err(err) = self.enqueue_heartbeat(FrameType::Pong, echo) {
                    self.fatal(events, format!("seal failure: {err}"), false);
                }
            }
            Payload::Pong { ts } => {
                let now = self.now_ms.unwrap_or(0);
                self.heartbeat.on_pong(ts, now);
            }
            Payload::Chat { text } => {
                self.stats.messages_received += 1;
                events.push(self.chat.receive(text));
            }
            Payload::Offer(offer) => match self.transfers.handle_offer(offer) {
                Ok((frames, evs)) => self.flush(frames, evs, events),
                Err(violation) => self.violation(events, &violation),
            },
            Payload::Accept { id } => {
                let (frames, evs) = self.transfers.handle_accept(id);
                self.flush(frames, evs, events);
            }
            Payload::Reject { id, reason } => {
                events.extend(self.transfers.handle_reject(id, reason));
            }
            Payload::Chunk { id, index, data } => {
                match self.transfers.handle_chunk(id, index, data) {
                    Ok(evs) => events.extend(evs),
                    Err(violation) => self.violation(events, &violation),
                }
            }
            Payload::End { id } => match self.transfers.handle_end(id) {
                Ok(evs) => events.extend(evs),
                Err(violation) => self.violation(events, &violation),
            },
            Payload::Error { reason } => {
                tracing::warn!(%reason, "peer reported protocol error");
                events.extend(self.transfers.abort_all("session closed"));
                events.push(Event::Disconnected {
                    reason: DisconnectReason::Explicit(format!("peer error: {reason}")),
                });
                self.shutdown(false);
            }
        }
    }

    fn flush(&mut self, frames: Vec<Frame>, evs: Vec<Event>, events: &mut Vec<Event>) {
        events.extend(evs);
        for frame in frames {
            if let Err(err) = self.enqueue(&frame) {
                self.fatal(events, format!("seal failure: {err}"), false);
                return;
            }
        }
    }

    fn violation(&mut self, events: &mut Vec<Event>, violation: &Violation) {
        self.fatal(events, violation.detail.clone(), true);
    }

    /// Terminate the session over a peer fault: optionally tell the
    /// peer why, surface the teardown, drop the key.
    fn fatal(&mut self, events: &mut Vec<Event>, detail: String, send_error_frame: bool) {
        if self.closed {
            return;
        }
        tracing::warn!(%detail, "session fatal");
        if send_error_frame {
            let frame = Payload::Error {
                reason: detail.clone(),
            }
            .into_frame();
            // Best effort; the session is ending either way.
            let _ = self.enqueue(&frame);
        }
        events.push(Event::ProtocolViolation {
            detail: detail.clone(),
        });
        events.extend(self.transfers.abort_all("session closed"));
        events.push(Event::Disconnected {
            reason: DisconnectReason::Explicit(detail),
        });
        self.shutdown(false);
    }

    /// Drop the key and stop accepting work. `discard_queue` drops any
    /// not-yet-polled frames (user close); fatal paths keep the queue
    /// so a final protocol complaint can still reach the peer.
    fn shutdown(&mut self, discard_queue: bool) {
        self.closed = true;
        self.seal = None;
        if discard_queue {
            self.outbound.clear();
        }
        self.backpressure.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("keyed", &self.seal.is_some())
            .field("closed", &self.closed)
            .field("queued", &self.outbound.len())
            .field("live_transfers", &self.transfers.live_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Sender;

    fn keyed_pair() -> (Session, Session) {
        let key = SessionKey::new([0x42u8; 32]);
        let mut alice = Session::new(SessionConfig::default());
        let mut bob = Session::new(SessionConfig::default());
        alice.install_key(&key, SessionRole::Initiator);
        bob.install_key(&key, SessionRole::Responder);
        (alice, bob)
    }

    /// Move every pending buffer from `from` into `to`, returning the
    /// events `to` produced.
    fn shuttle(from: &mut Session, to: &mut Session) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(bytes) = from.poll_outgoing() {
            events.extend(to.handle_incoming(&bytes));
        }
        events
    }

    #[test]
    fn test_plaintext_chat_wire_shape() {
        let mut alice = Session::new(SessionConfig::default());
        let echo = alice.send_text("hello").unwrap();
        assert!(matches!(echo, Event::Message { sender: Sender::Local, .. }));

        let bytes = alice.poll_outgoing().unwrap();
        assert_eq!(
            bytes,
            [0x48, 0x4F, 0x01, 0x10, 0x00, 0x05, b'h', b'e', b'l', b'l', b'o']
        );

        let mut bob = Session::new(SessionConfig::default());
        let events = bob.handle_incoming(&bytes);
        assert_eq!(
            events,
            vec![Event::Message {
                sender: Sender::Peer,
                id: 0,
                text: "hello".into()
            }]
        );
    }

    #[test]
    fn test_encrypted_chat_roundtrip() {
        let (mut alice, mut bob) = keyed_pair();
        alice.send_text("hi").unwrap();

        let bytes = alice.poll_outgoing().unwrap();
        assert_eq!(bytes[3], 0x50);

        let events = bob.handle_incoming(&bytes);
        assert_eq!(
            events,
            vec![Event::Message {
                sender: Sender::Peer,
                id: 0,
                text: "hi".into()
            }]
        );
    }

    #[test]
    fn test_ciphertext_tamper_is_fatal() {
        let (mut alice, mut bob) = keyed_pair();
        alice.send_text("hi").unwrap();

        let mut bytes = alice.poll_outgoing().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        let events = bob.handle_incoming(&bytes);
        assert!(matches!(events[0], Event::EncryptionError { .. }));
        assert!(events.iter().any(|e| matches!(
            e,
            Event::Disconnected {
                reason: DisconnectReason::Explicit(_)
            }
        )));
        assert!(bob.is_closed());
    }

    #[test]
    fn test_plaintext_on_keyed_session_reported_once() {
        let (_, mut bob) = keyed_pair();
        let plaintext = Frame::new(FrameType::ChatText, b"spoof".to_vec()).encode();

        let events = bob.handle_incoming(&plaintext);
        assert_eq!(events, vec![Event::EncryptionMismatch]);

        let events = bob.handle_incoming(&plaintext);
        assert!(events.is_empty());
        assert!(!bob.is_closed());
    }

    #[test]
    fn test_incoming_is_chunking_agnostic() {
        let (mut alice, mut bob) = keyed_pair();
        alice.send_text("first").unwrap();
        alice.send_text("second").unwrap();

        let mut stream = Vec::new();
        while let Some(bytes) = alice.poll_outgoing() {
            stream.extend_from_slice(&bytes);
        }

        let mut events = Vec::new();
        for byte in stream {
            events.extend(bob.handle_incoming(&[byte]));
        }
        let texts: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::Message { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_file_transfer_end_to_end() {
        let (mut alice, mut bob) = keyed_pair();
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let offer = FileOffer {
            id: [1u8; 16],
            name: "a.bin".into(),
            mime: "application/octet-stream".into(),
            size: data.len() as u64,
        };

        let _handle = alice.offer_file(offer, data.clone()).unwrap();
        // Offer over, auto-accept back
        let events = shuttle(&mut alice, &mut bob);
        assert!(events.iter().any(|e| matches!(e, Event::FileProgress { .. })));
        let events = shuttle(&mut bob, &mut alice);
        assert_eq!(events, vec![Event::FileAccepted { id: [1u8; 16] }]);

        // Stream chunks until done
        let mut received = Vec::new();
        loop {
            let events = shuttle(&mut alice, &mut bob);
            let done = events.iter().any(|e| {
                if let Event::FileReceived { data, .. } = e {
                    received = data.clone();
                    true
                } else {
                    false
                }
            });
            if done {
                break;
            }
            alice.backpressure().update_buffered(0);
        }
        assert_eq!(received, data);
    }

    #[test]
    fn test_oversize_offer_auto_rejected() {
        // Receiver with a small auto-accept cap rejects with the
        // canonical reason.
        let key = SessionKey::new([0x42u8; 32]);
        let mut alice = Session::new(SessionConfig::default());
        alice.install_key(&key, SessionRole::Initiator);
        let config = SessionConfig {
            accept_policy: crate::AcceptPolicy::Auto { max_size: 1024 },
            ..SessionConfig::default()
        };
        let mut bob = Session::new(config);
        bob.install_key(&key, SessionRole::Responder);

        let offer = FileOffer {
            id: [2u8; 16],
            name: "big.bin".into(),
            mime: "application/octet-stream".into(),
            size: 2048,
        };
        let mut handle = alice.offer_file(offer, vec![0u8; 2048]).unwrap();

        shuttle(&mut alice, &mut bob);
        let events = shuttle(&mut bob, &mut alice);
        assert_eq!(
            events,
            vec![Event::FileRejected {
                id: [2u8; 16],
                reason: "File too large".into()
            }]
        );
        assert_eq!(
            handle.try_done().unwrap().unwrap_err(),
            crate::TransferError::Rejected {
                reason: "File too large".into()
            }
        );
    }

    #[test]
    fn test_zero_size_transfer() {
        let (mut alice, mut bob) = keyed_pair();
        let offer = FileOffer {
            id: [3u8; 16],
            name: "empty".into(),
            mime: "application/octet-stream".into(),
            size: 0,
        };
        alice.offer_file(offer, Vec::new()).unwrap();

        shuttle(&mut alice, &mut bob);
        shuttle(&mut bob, &mut alice);
        let events = shuttle(&mut alice, &mut bob);
        assert!(events.iter().any(|e| matches!(
            e,
            Event::FileReceived { data, .. } if data.is_empty()
        )));
    }

    #[test]
    fn test_heartbeat_ping_pong() {
        let (mut alice, mut bob) = keyed_pair();
        alice.tick(1_000);
        bob.tick(1_000);
        // Alice's ping reaches Bob; Bob replies with a pong.
        shuttle(&mut alice, &mut bob);
        shuttle(&mut bob, &mut alice);
        assert_eq!(alice.heartbeat.last_rtt_ms(), Some(0));
    }

    #[test]
    fn test_silent_peer_times_out() {
        let (mut alice, _) = keyed_pair();
        alice.tick(0);
        let events = alice.tick(20_001);
        assert!(events.contains(&Event::Disconnected {
            reason: DisconnectReason::Silent
        }));
        assert!(alice.is_closed());
    }

    #[test]
    fn test_pre_key_heartbeat_is_bare() {
        let mut alice = Session::new(SessionConfig::default());
        alice.tick(7);
        let bytes = alice.poll_outgoing().unwrap();
        assert_eq!(bytes.len(), crate::BARE_HEARTBEAT_LEN);
        assert_eq!(bytes[0], 0x01);

        let mut bob = Session::new(SessionConfig::default());
        let events = bob.handle_incoming(&bytes);
        assert!(events.is_empty());
        // Bob echoes a bare pong
        let pong = bob.poll_outgoing().unwrap();
        assert_eq!(pong[0], 0x02);
        assert_eq!(&pong[1..], &7u64.to_be_bytes());
    }

    #[test]
    fn test_send_after_close_fails() {
        let mut alice = Session::new(SessionConfig::default());
        alice.close();
        assert!(matches!(
            alice.send_text("late").unwrap_err(),
            SessionError::Closed
        ));
        assert!(alice.handle_incoming(b"anything").is_empty());
        assert!(alice.poll_outgoing().is_none());
    }

    #[test]
    fn test_close_aborts_partial_receives() {
        let (mut alice, mut bob) = keyed_pair();
        let offer = FileOffer {
            id: [4u8; 16],
            name: "partial".into(),
            mime: "application/octet-stream".into(),
            size: 200_000,
        };
        alice.offer_file(offer, vec![9u8; 200_000]).unwrap();
        shuttle(&mut alice, &mut bob);
        shuttle(&mut bob, &mut alice);
        // First chunk lands, then Bob closes mid-transfer.
        if let Some(bytes) = alice.poll_outgoing() {
            bob.handle_incoming(&bytes);
        }
        let events = bob.close();
        assert!(events.iter().any(|e| matches!(
            e,
            Event::FileAborted { id, .. } if *id == [4u8; 16]
        )));
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let mut bob = Session::new(SessionConfig::default());
        let events = bob.handle_incoming(&[0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(events.iter().any(|e| matches!(e, Event::ProtocolViolation { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            Event::Disconnected {
                reason: DisconnectReason::Explicit(_)
            }
        )));
        assert!(bob.is_closed());
        // The complaint frame is still pollable after a fatal error.
        assert!(bob.poll_outgoing().is_some());
    }

    #[test]
    fn test_peer_error_frame_closes_session() {
        let mut bob = Session::new(SessionConfig::default());
        let frame = Payload::Error {
            reason: "out-of-order chunk".into(),
        }
        .into_frame();
        let events = bob.handle_incoming(&frame.encode());
        assert!(events.iter().any(|e| matches!(
            e,
            Event::Disconnected {
                reason: DisconnectReason::Explicit(detail)
            } if detail.contains("out-of-order chunk")
        )));
        assert!(bob.is_closed());
    }

    #[test]
    fn test_transport_close_surfaces_reason() {
        let mut alice = Session::new(SessionConfig::default());
        let events = alice.on_transport_close();
        assert_eq!(
            events,
            vec![Event::Disconnected {
                reason: DisconnectReason::TransportClosed
            }]
        );
        assert!(alice.backpressure().is_closed());
    }

    #[test]
    fn test_out_of_order_chunk_tears_down() {
        let (mut alice, mut bob) = keyed_pair();
        let offer = FileOffer {
            id: [5u8; 16],
            name: "x".into(),
            mime: "m".into(),
            size: 4,
        };
        // Drive the receiver directly with a forged out-of-order chunk.
        bob.transfers.handle_offer(offer).unwrap();
        let mut seal = SessionSeal::new(&SessionKey::new([0x42u8; 32]), SessionRole::Initiator);
        let chunk = Payload::Chunk {
            id: [5u8; 16],
            index: 3,
            data: b"zz".to_vec(),
        }
        .into_frame();
        let wire = envelope::wrap(&mut seal, &chunk).unwrap();

        let events = bob.handle_incoming(&wire);
        assert!(events.iter().any(|e| matches!(e, Event::ProtocolViolation { detail } if detail == "out-of-order chunk")));
        assert!(bob.is_closed());
        let _ = alice;
    }

    #[test]
    fn test_stats_count_both_directions() {
        let (mut alice, mut bob) = keyed_pair();
        alice.send_text("one").unwrap();
        alice.send_text("two").unwrap();
        shuttle(&mut alice, &mut bob);

        assert_eq!(alice.stats().messages_sent, 2);
        assert_eq!(alice.stats().frames_sent, 2);
        assert_eq!(bob.stats().messages_received, 2);
        assert_eq!(bob.stats().frames_received, 2);
    }
}
