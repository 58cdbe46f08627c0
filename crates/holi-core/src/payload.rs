//! Typed frame payloads.
//!
//! Each frame type's payload layout is hand-encoded: the byte layout is
//! a cross-implementation contract and never serde-derived. Every
//! length-prefixed field is capped before allocation.

use crate::error::CodecError;
use crate::frame::{Frame, FrameType};
use crate::varint::{read_varint, write_varint};
use crate::{CHAT_MAX, CHUNK_MAX, ERROR_REASON_MAX, MIME_MAX, NAME_MAX, REASON_MAX};

/// Transfer identifier, chosen by the sender, unique within a session
pub type TransferId = [u8; 16];

/// Metadata of an offered file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOffer {
    /// Transfer id
    pub id: TransferId,
    /// Filename hint (never interpreted as a path by this layer)
    pub name: String,
    /// MIME type hint
    pub mime: String,
    /// Exact byte size of the file
    pub size: u64,
}

impl FileOffer {
    /// Validate the field caps of this offer.
    ///
    /// # Errors
    ///
    /// `FieldLengthExceedsCap` for an oversized name or MIME type.
    pub fn validate(&self) -> Result<(), CodecError> {
        check_cap("filename", self.name.len(), NAME_MAX)?;
        check_cap("mime", self.mime.len(), MIME_MAX)?;
        Ok(())
    }
}

/// A parsed, known frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Keepalive probe
    Ping {
        /// Sender wall-clock in ms, if carried
        ts: Option<u64>,
    },
    /// Keepalive response
    Pong {
        /// Echoed probe timestamp, if carried
        ts: Option<u64>,
    },
    /// Chat text
    Chat {
        /// Message body
        text: String,
    },
    /// File transfer offer
    Offer(FileOffer),
    /// Offer accepted
    Accept {
        /// Transfer id
        id: TransferId,
    },
    /// Offer rejected or transfer cancelled
    Reject {
        /// Transfer id
        id: TransferId,
        /// Short reason
        reason: String,
    },
    /// One chunk of file data
    Chunk {
        /// Transfer id
        id: TransferId,
        /// Zero-based chunk index, strictly monotone
        index: u64,
        /// Chunk bytes
        data: Vec<u8>,
    },
    /// Transfer complete
    End {
        /// Transfer id
        id: TransferId,
    },
    /// Fatal protocol complaint
    Error {
        /// Reason, never containing secret material
        reason: String,
    },
}

impl Payload {
    /// The frame type this payload travels under
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::Ping { .. } => FrameType::Ping,
            Self::Pong { .. } => FrameType::Pong,
            Self::Chat { .. } => FrameType::ChatText,
            Self::Offer(_) => FrameType::FileOffer,
            Self::Accept { .. } => FrameType::FileAccept,
            Self::Reject { .. } => FrameType::FileReject,
            Self::Chunk { .. } => FrameType::FileChunk,
            Self::End { .. } => FrameType::FileEnd,
            Self::Error { .. } => FrameType::ProtocolError,
        }
    }

    /// Encode the payload bytes
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Ping { ts } | Self::Pong { ts } => match ts {
                Some(ts) => ts.to_be_bytes().to_vec(),
                None => Vec::new(),
            },
            Self::Chat { text } => text.as_bytes().to_vec(),
            Self::Offer(offer) => {
                let mut buf = Vec::with_capacity(16 + offer.name.len() + offer.mime.len() + 12);
                buf.extend_from_slice(&offer.id);
                write_varint(&mut buf, offer.name.len() as u64);
                buf.extend_from_slice(offer.name.as_bytes());
                write_varint(&mut buf, offer.mime.len() as u64);
                buf.extend_from_slice(offer.mime.as_bytes());
                write_varint(&mut buf, offer.size);
                buf
            }
            Self::Accept { id } | Self::End { id } => id.to_vec(),
            Self::Reject { id, reason } => {
                let mut buf = Vec::with_capacity(16 + reason.len() + 2);
                buf.extend_from_slice(id);
                write_varint(&mut buf, reason.len() as u64);
                buf.extend_from_slice(reason.as_bytes());
                buf
            }
            Self::Chunk { id, index, data } => {
                let mut buf = Vec::with_capacity(16 + 10 + data.len());
                buf.extend_from_slice(id);
                write_varint(&mut buf, *index);
                buf.extend_from_slice(data);
                buf
            }
            Self::Error { reason } => reason.as_bytes().to_vec(),
        }
    }

    /// Build the frame carrying this payload
    #[must_use]
    pub fn into_frame(self) -> Frame {
        Frame::new(self.frame_type(), self.encode())
    }

    /// Parse a payload of a known frame type.
    ///
    /// # Errors
    ///
    /// `TruncatedPayload` for malformed structure,
    /// `FieldLengthExceedsCap` for oversized fields, `NonUtf8Text` for
    /// invalid text, plus varint errors.
    pub fn parse(frame_type: FrameType, payload: &[u8]) -> Result<Self, CodecError> {
        match frame_type {
            FrameType::Ping => Ok(Self::Ping {
                ts: parse_heartbeat_ts(payload)?,
            }),
            FrameType::Pong => Ok(Self::Pong {
                ts: parse_heartbeat_ts(payload)?,
            }),
            FrameType::ChatText => {
                check_cap("chat text", payload.len(), CHAT_MAX)?;
                Ok(Self::Chat {
                    text: parse_utf8(payload)?,
                })
            }
            FrameType::FileOffer => {
                let mut cursor = Cursor::new(payload);
                let id = cursor.take_id()?;
                let name = cursor.take_string("filename", NAME_MAX)?;
                let mime = cursor.take_string("mime", MIME_MAX)?;
                let size = cursor.take_varint()?;
                cursor.finish()?;
                Ok(Self::Offer(FileOffer { id, name, mime, size }))
            }
            FrameType::FileAccept => {
                let mut cursor = Cursor::new(payload);
                let id = cursor.take_id()?;
                cursor.finish()?;
                Ok(Self::Accept { id })
            }
            FrameType::FileReject => {
                let mut cursor = Cursor::new(payload);
                let id = cursor.take_id()?;
                let reason = cursor.take_string("reject reason", REASON_MAX)?;
                cursor.finish()?;
                Ok(Self::Reject { id, reason })
            }
            FrameType::FileChunk => {
                let mut cursor = Cursor::new(payload);
                let id = cursor.take_id()?;
                let index = cursor.take_varint()?;
                let data = cursor.take_rest();
                check_cap("chunk", data.len(), CHUNK_MAX)?;
                Ok(Self::Chunk { id, index, data })
            }
            FrameType::FileEnd => {
                let mut cursor = Cursor::new(payload);
                let id = cursor.take_id()?;
                cursor.finish()?;
                Ok(Self::End { id })
            }
            FrameType::ProtocolError => {
                check_cap("error reason", payload.len(), ERROR_REASON_MAX)?;
                Ok(Self::Error {
                    reason: parse_utf8(payload)?,
                })
            }
            FrameType::Envelope => Err(CodecError::TruncatedPayload),
        }
    }
}

fn parse_heartbeat_ts(payload: &[u8]) -> Result<Option<u64>, CodecError> {
    match payload.len() {
        0 => Ok(None),
        8 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(payload);
            Ok(Some(u64::from_be_bytes(bytes)))
        }
        _ => Err(CodecError::TruncatedPayload),
    }
}

fn parse_utf8(bytes: &[u8]) -> Result<String, CodecError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::NonUtf8Text)
}

fn check_cap(field: &'static str, len: usize, cap: usize) -> Result<(), CodecError> {
    if len > cap {
        return Err(CodecError::FieldLengthExceedsCap {
            field,
            len: len as u64,
            cap: cap as u64,
        });
    }
    Ok(())
}

/// Byte cursor over a payload slice
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take_id(&mut self) -> Result<TransferId, CodecError> {
        if self.bytes.len() < self.pos + 16 {
            return Err(CodecError::TruncatedPayload);
        }
        let mut id = [0u8; 16];
        id.copy_from_slice(&self.bytes[self.pos..self.pos + 16]);
        self.pos += 16;
        Ok(id)
    }

    fn take_varint(&mut self) -> Result<u64, CodecError> {
        let Some((value, consumed)) = read_varint(&self.bytes[self.pos..])? else {
            return Err(CodecError::TruncatedPayload);
        };
        self.pos += consumed;
        Ok(value)
    }

    fn take_string(&mut self, field: &'static str, cap: usize) -> Result<String, CodecError> {
        let len = self.take_varint()?;
        if len > cap as u64 {
            return Err(CodecError::FieldLengthExceedsCap {
                field,
                len,
                cap: cap as u64,
            });
        }
        let len = len as usize;
        if self.bytes.len() < self.pos + len {
            return Err(CodecError::TruncatedPayload);
        }
        let text = parse_utf8(&self.bytes[self.pos..self.pos + len])?;
        self.pos += len;
        Ok(text)
    }

    fn take_rest(&mut self) -> Vec<u8> {
        let rest = self.bytes[self.pos..].to_vec();
        self.pos = self.bytes.len();
        rest
    }

    fn finish(self) -> Result<(), CodecError> {
        if self.pos != self.bytes.len() {
            return Err(CodecError::TruncatedPayload);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(payload: Payload) {
        let frame_type = payload.frame_type();
        let bytes = payload.encode();
        assert_eq!(Payload::parse(frame_type, &bytes).unwrap(), payload);
    }

    #[test]
    fn test_heartbeat_roundtrip() {
        roundtrip(Payload::Ping { ts: None });
        roundtrip(Payload::Ping { ts: Some(1_712_345_678_901) });
        roundtrip(Payload::Pong { ts: Some(42) });
    }

    #[test]
    fn test_heartbeat_bad_length() {
        assert_eq!(
            Payload::parse(FrameType::Ping, &[1, 2, 3]).unwrap_err(),
            CodecError::TruncatedPayload
        );
    }

    #[test]
    fn test_chat_roundtrip() {
        roundtrip(Payload::Chat { text: "hellø vault".into() });
    }

    #[test]
    fn test_chat_cap() {
        let payload = vec![b'a'; CHAT_MAX + 1];
        assert!(matches!(
            Payload::parse(FrameType::ChatText, &payload).unwrap_err(),
            CodecError::FieldLengthExceedsCap { field: "chat text", .. }
        ));
    }

    #[test]
    fn test_chat_at_cap_succeeds() {
        let payload = vec![b'a'; CHAT_MAX];
        assert!(Payload::parse(FrameType::ChatText, &payload).is_ok());
    }

    #[test]
    fn test_chat_non_utf8() {
        assert_eq!(
            Payload::parse(FrameType::ChatText, &[0xFF, 0xFE]).unwrap_err(),
            CodecError::NonUtf8Text
        );
    }

    #[test]
    fn test_offer_roundtrip() {
        roundtrip(Payload::Offer(FileOffer {
            id: [9u8; 16],
            name: "a.bin".into(),
            mime: "application/octet-stream".into(),
            size: 100_000,
        }));
    }

    #[test]
    fn test_offer_name_cap() {
        let mut bytes = vec![0u8; 16];
        write_varint(&mut bytes, (NAME_MAX + 1) as u64);
        bytes.extend_from_slice(&vec![b'x'; NAME_MAX + 1]);
        assert!(matches!(
            Payload::parse(FrameType::FileOffer, &bytes).unwrap_err(),
            CodecError::FieldLengthExceedsCap { field: "filename", .. }
        ));
    }

    #[test]
    fn test_offer_truncated() {
        assert_eq!(
            Payload::parse(FrameType::FileOffer, &[0u8; 10]).unwrap_err(),
            CodecError::TruncatedPayload
        );
    }

    #[test]
    fn test_offer_trailing_garbage() {
        let mut bytes = Payload::Offer(FileOffer {
            id: [1u8; 16],
            name: "f".into(),
            mime: "m".into(),
            size: 1,
        })
        .encode();
        bytes.push(0x00);
        assert_eq!(
            Payload::parse(FrameType::FileOffer, &bytes).unwrap_err(),
            CodecError::TruncatedPayload
        );
    }

    #[test]
    fn test_accept_reject_end_roundtrip() {
        roundtrip(Payload::Accept { id: [2u8; 16] });
        roundtrip(Payload::End { id: [3u8; 16] });
        roundtrip(Payload::Reject {
            id: [4u8; 16],
            reason: "File too large".into(),
        });
    }

    #[test]
    fn test_chunk_roundtrip_and_caps() {
        roundtrip(Payload::Chunk {
            id: [5u8; 16],
            index: 7,
            data: vec![0xAB; CHUNK_MAX],
        });

        let over = Payload::Chunk {
            id: [5u8; 16],
            index: 8,
            data: vec![0xAB; CHUNK_MAX + 1],
        };
        let bytes = over.encode();
        assert!(matches!(
            Payload::parse(FrameType::FileChunk, &bytes).unwrap_err(),
            CodecError::FieldLengthExceedsCap { field: "chunk", .. }
        ));
    }

    #[test]
    fn test_error_roundtrip() {
        roundtrip(Payload::Error { reason: "out-of-order chunk".into() });
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_offer_roundtrip(
                id in any::<[u8; 16]>(),
                name in "[a-zA-Z0-9 ._-]{0,64}",
                mime in "[a-z/+-]{0,32}",
                size in any::<u64>()
            ) {
                let payload = Payload::Offer(FileOffer { id, name, mime, size });
                let bytes = payload.encode();
                prop_assert_eq!(Payload::parse(FrameType::FileOffer, &bytes).unwrap(), payload);
            }

            #[test]
            fn prop_chunk_roundtrip(
                id in any::<[u8; 16]>(),
                index in any::<u64>(),
                data in prop::collection::vec(any::<u8>(), 0..512)
            ) {
                let payload = Payload::Chunk { id, index, data };
                let bytes = payload.encode();
                prop_assert_eq!(Payload::parse(FrameType::FileChunk, &bytes).unwrap(), payload);
            }

            #[test]
            fn prop_parse_never_panics(
                frame_type in prop::sample::select(vec![
                    FrameType::Ping, FrameType::Pong, FrameType::ChatText,
                    FrameType::FileOffer, FrameType::FileAccept, FrameType::FileReject,
                    FrameType::FileChunk, FrameType::FileEnd, FrameType::ProtocolError,
                ]),
                bytes in prop::collection::vec(any::<u8>(), 0..256)
            ) {
                let _ = Payload::parse(frame_type, &bytes);
            }
        }
    }
}
