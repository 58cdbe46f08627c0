//! Frame encoding and decoding for the Holi wire protocol.
//!
//! Every frame is `[0x48, 0x4F, version, type, flags, varint(len),
//! payload]`. The magic and version gate non-peer traffic out of the
//! decoder; the declared length is checked against a hard cap before
//! any allocation so a hostile peer cannot balloon the receiver.

use crate::error::CodecError;
use crate::varint::{read_varint, varint_len, write_varint};
use crate::{BARE_HEARTBEAT_LEN, FRAME_MAX, MAGIC, VERSION};

/// Frame types (v1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Keepalive probe, empty or 8-byte big-endian ms timestamp
    Ping = 0x01,
    /// Keepalive response, echoes the probe timestamp
    Pong = 0x02,
    /// UTF-8 chat text
    ChatText = 0x10,
    /// File transfer offer
    FileOffer = 0x20,
    /// Receiver accepts an offer
    FileAccept = 0x21,
    /// Receiver rejects an offer (or either side cancels)
    FileReject = 0x22,
    /// One chunk of file data
    FileChunk = 0x23,
    /// Sender finished streaming a transfer
    FileEnd = 0x24,
    /// Fatal protocol complaint
    ProtocolError = 0x30,
    /// Encrypted envelope carrying an inner frame
    Envelope = 0x50,
}

impl FrameType {
    /// Map a wire byte to a known frame type
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Ping),
            0x02 => Some(Self::Pong),
            0x10 => Some(Self::ChatText),
            0x20 => Some(Self::FileOffer),
            0x21 => Some(Self::FileAccept),
            0x22 => Some(Self::FileReject),
            0x23 => Some(Self::FileChunk),
            0x24 => Some(Self::FileEnd),
            0x30 => Some(Self::ProtocolError),
            0x50 => Some(Self::Envelope),
            _ => None,
        }
    }
}

/// A decoded frame: raw type byte, flags, and owned payload.
///
/// The type stays a raw `u8` so unknown inbound types survive decoding
/// and can be dropped (or rejected, in strict mode) by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Wire type byte
    pub frame_type: u8,
    /// Flags byte; all bits reserved in v1, must be zero
    pub flags: u8,
    /// Payload bytes
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a frame of a known type with zero flags
    #[must_use]
    pub fn new(frame_type: FrameType, payload: Vec<u8>) -> Self {
        Self {
            frame_type: frame_type as u8,
            flags: 0,
            payload,
        }
    }

    /// Known frame type, if any
    #[must_use]
    pub fn known_type(&self) -> Option<FrameType> {
        FrameType::from_u8(self.frame_type)
    }

    /// Encode the full wire form including magic and version
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = encode_header(self.frame_type, self.flags, self.payload.len());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Encode the inner form used as envelope plaintext: the frame
    /// starting at the type byte (magic and version stripped)
    #[must_use]
    pub fn encode_inner(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + varint_len(self.payload.len() as u64) + self.payload.len());
        buf.push(self.frame_type);
        buf.push(self.flags);
        write_varint(&mut buf, self.payload.len() as u64);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode one complete frame from `bytes`, rejecting trailing data.
    ///
    /// # Errors
    ///
    /// All `CodecError` header variants, plus `TruncatedPayload` when
    /// `bytes` is shorter or longer than exactly one frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = FrameReader::new(FRAME_MAX);
        reader.push(bytes);
        match reader.next_frame()? {
            Some(frame) if reader.buffered() == 0 => Ok(frame),
            _ => Err(CodecError::TruncatedPayload),
        }
    }

    /// Decode an envelope plaintext (frame starting at the type byte).
    ///
    /// # Errors
    ///
    /// `TruncatedPayload` for short or overlong input, varint errors,
    /// `FlagBitsReserved`, and `LenExceedsCap` against [`FRAME_MAX`].
    pub fn decode_inner(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < 2 {
            return Err(CodecError::TruncatedPayload);
        }
        let frame_type = bytes[0];
        let flags = bytes[1];
        if flags != 0 {
            return Err(CodecError::FlagBitsReserved(flags));
        }
        let Some((len, consumed)) = read_varint(&bytes[2..])? else {
            return Err(CodecError::TruncatedPayload);
        };
        if len > FRAME_MAX as u64 {
            return Err(CodecError::LenExceedsCap {
                len,
                cap: FRAME_MAX as u64,
            });
        }
        let start = 2 + consumed;
        let end = start + len as usize;
        if bytes.len() != end {
            return Err(CodecError::TruncatedPayload);
        }
        Ok(Self {
            frame_type,
            flags,
            payload: bytes[start..end].to_vec(),
        })
    }
}

/// Encode a frame header: magic, version, type, flags, varint length.
#[must_use]
pub fn encode_header(frame_type: u8, flags: u8, payload_len: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5 + varint_len(payload_len as u64) + payload_len);
    buf.extend_from_slice(&MAGIC);
    buf.push(VERSION);
    buf.push(frame_type);
    buf.push(flags);
    write_varint(&mut buf, payload_len as u64);
    buf
}

/// Streaming frame decoder.
///
/// Accumulates bytes across arbitrarily split reads and yields complete
/// frames in order. Any header error is sticky: the stream is
/// considered poisoned and every later call returns the same error.
#[derive(Debug)]
pub struct FrameReader {
    buf: Vec<u8>,
    frame_max: usize,
    strict: bool,
    /// Accept the bare 9-byte pre-key heartbeat shape
    bare_heartbeat: bool,
    poisoned: Option<CodecError>,
}

impl FrameReader {
    /// Create a reader with the given payload cap
    #[must_use]
    pub fn new(frame_max: usize) -> Self {
        Self {
            buf: Vec::new(),
            frame_max,
            strict: false,
            bare_heartbeat: true,
            poisoned: None,
        }
    }

    /// Reject unknown frame types instead of skipping them
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Toggle acceptance of the bare pre-key heartbeat shape
    pub fn set_bare_heartbeat(&mut self, accept: bool) {
        self.bare_heartbeat = accept;
    }

    /// Bytes currently buffered and not yet consumed
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Feed received bytes into the reader
    pub fn push(&mut self, bytes: &[u8]) {
        if self.poisoned.is_none() {
            self.buf.extend_from_slice(bytes);
        }
    }

    /// Yield the next complete frame, or `None` when more bytes are
    /// needed.
    ///
    /// Unknown frame types with well-formed lengths are skipped
    /// silently unless strict mode is on.
    ///
    /// # Errors
    ///
    /// `BadMagic`, `BadVersion`, `FlagBitsReserved`, varint errors,
    /// `LenExceedsCap`, and `UnknownType` in strict mode. All errors
    /// poison the reader.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        loop {
            match self.parse_one() {
                Ok(Some(frame)) => {
                    if frame.known_type().is_none() {
                        if self.strict {
                            return self.poison(CodecError::UnknownType(frame.frame_type));
                        }
                        tracing::trace!(frame_type = frame.frame_type, "skipping unknown frame type");
                        continue;
                    }
                    return Ok(Some(frame));
                }
                Ok(None) => return Ok(None),
                Err(err) => return self.poison(err),
            }
        }
    }

    fn poison(&mut self, err: CodecError) -> Result<Option<Frame>, CodecError> {
        self.buf.clear();
        self.poisoned = Some(err.clone());
        Err(err)
    }

    fn parse_one(&mut self) -> Result<Option<Frame>, CodecError> {
        if let Some(err) = &self.poisoned {
            return Err(err.clone());
        }
        if self.buf.is_empty() {
            return Ok(None);
        }

        // Pre-key heartbeats arrive as exactly [type, ts_be(8)] with no
        // framing. The first byte disambiguates: 0x01/0x02 can never
        // open a real frame, whose first byte is the magic 0x48.
        if self.bare_heartbeat && (self.buf[0] == 0x01 || self.buf[0] == 0x02) {
            if self.buf.len() < BARE_HEARTBEAT_LEN {
                return Ok(None);
            }
            let frame_type = self.buf[0];
            let payload = self.buf[1..BARE_HEARTBEAT_LEN].to_vec();
            self.buf.drain(..BARE_HEARTBEAT_LEN);
            return Ok(Some(Frame {
                frame_type,
                flags: 0,
                payload,
            }));
        }

        if self.buf[0] != MAGIC[0] {
            return Err(CodecError::BadMagic);
        }
        if self.buf.len() < 2 {
            return Ok(None);
        }
        if self.buf[1] != MAGIC[1] {
            return Err(CodecError::BadMagic);
        }
        if self.buf.len() < 3 {
            return Ok(None);
        }
        if self.buf[2] != VERSION {
            return Err(CodecError::BadVersion(self.buf[2]));
        }
        if self.buf.len() < 5 {
            return Ok(None);
        }
        let frame_type = self.buf[3];
        let flags = self.buf[4];
        if flags != 0 {
            return Err(CodecError::FlagBitsReserved(flags));
        }

        let Some((len, consumed)) = read_varint(&self.buf[5..])? else {
            return Ok(None);
        };
        if len > self.frame_max as u64 {
            return Err(CodecError::LenExceedsCap {
                len,
                cap: self.frame_max as u64,
            });
        }
        let header_len = 5 + consumed;
        let total = header_len + len as usize;
        if self.buf.len() < total {
            return Ok(None);
        }

        let payload = self.buf[header_len..total].to_vec();
        self.buf.drain(..total);
        Ok(Some(Frame {
            frame_type,
            flags,
            payload,
        }))
    }
}
