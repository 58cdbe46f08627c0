//! Chat text send/receive.
//!
//! Messages are single-frame and non-fragmented. Every outbound send
//! emits a synchronous local echo so UIs render optimistically; inbound
//! text becomes a peer message with a fresh session-local id.

use crate::error::CodecError;
use crate::event::{Event, MessageId, Sender};
use crate::frame::Frame;
use crate::payload::Payload;

/// Chat engine owned by a session
#[derive(Debug)]
pub struct ChatEngine {
    chat_max: usize,
    next_id: MessageId,
}

impl ChatEngine {
    /// Create with the given text cap
    #[must_use]
    pub fn new(chat_max: usize) -> Self {
        Self { chat_max, next_id: 0 }
    }

    /// Build the outbound frame and the synchronous local echo event.
    ///
    /// # Errors
    ///
    /// `FieldLengthExceedsCap` when the text exceeds the cap.
    pub fn send(&mut self, text: &str) -> Result<(Event, Frame), CodecError> {
        if text.len() > self.chat_max {
            return Err(CodecError::FieldLengthExceedsCap {
                field: "chat text",
                len: text.len() as u64,
                cap: self.chat_max as u64,
            });
        }
        let event = Event::Message {
            sender: Sender::Local,
            id: self.fresh_id(),
            text: text.to_owned(),
        };
        let frame = Payload::Chat { text: text.to_owned() }.into_frame();
        Ok((event, frame))
    }

    /// Turn inbound text into a peer message event
    pub fn receive(&mut self, text: String) -> Event {
        Event::Message {
            sender: Sender::Peer,
            id: self.fresh_id(),
            text,
        }
    }

    fn fresh_id(&mut self) -> MessageId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
