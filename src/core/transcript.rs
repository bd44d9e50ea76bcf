use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::core::message::Message;

/// Whether an assistant reply is currently receiving streamed content.
///
/// Carried explicitly alongside the message log instead of being inferred
/// from the last entry's author, so a persisted history that already ends
/// on an assistant message cannot be mistaken for an open reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeState {
    #[default]
    NoOpenReply,
    OpenReply,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranscriptError {
    /// `replace_last` was called while the store was empty or the last
    /// entry was user-authored.
    #[error("no open assistant message to replace")]
    NoOpenMessage,
}

/// Ordered message log for one instructor conversation.
///
/// Entries are never reordered or deleted. The only permitted mutation of
/// existing content is rewriting the last entry while a reply is open.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    state: ExchangeState,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn exchange_state(&self) -> ExchangeState {
        self.state
    }

    /// Install the initial contents in a single assignment. Either the
    /// whole seed lands or none of it does; there is no partially-seeded
    /// intermediate state. Always resets to `NoOpenReply`, even when the
    /// seeded history ends on an assistant message.
    pub fn seed(&mut self, messages: Vec<Message>) {
        debug!(count = messages.len(), "seeding transcript");
        self.messages = messages;
        self.state = ExchangeState::NoOpenReply;
    }

    /// Append a message to the end of the log. An open reply is closed
    /// first, so the open message (when present) is always the last entry.
    pub fn append(&mut self, message: Message) {
        self.state = ExchangeState::NoOpenReply;
        self.messages.push(message);
    }

    /// Rewrite the content of the last entry. Fails when there is nothing
    /// to rewrite: an empty store or a user-authored last entry.
    pub fn replace_last(&mut self, content: &str) -> Result<(), TranscriptError> {
        match self.messages.last_mut() {
            Some(last) if !last.is_user() => {
                last.content.clear();
                last.content.push_str(content);
                Ok(())
            }
            _ => Err(TranscriptError::NoOpenMessage),
        }
    }

    /// Fold the cumulative receive buffer into the log.
    ///
    /// The buffer is cumulative-to-date, so an open reply is *replaced*
    /// with it, never concatenated. The first non-empty ingest of an
    /// exchange opens the reply; an empty buffer is a no-op.
    pub fn ingest_buffer(
        &mut self,
        buffer: &str,
        at: DateTime<Utc>,
    ) -> Result<(), TranscriptError> {
        if buffer.is_empty() {
            return Ok(());
        }

        match self.state {
            ExchangeState::OpenReply => self.replace_last(buffer),
            ExchangeState::NoOpenReply => {
                self.messages.push(Message::assistant(buffer, at));
                self.state = ExchangeState::OpenReply;
                Ok(())
            }
        }
    }

    /// Close the open reply, if any. Called when an exchange completes,
    /// fails, or is cancelled.
    pub fn complete_exchange(&mut self) {
        self.state = ExchangeState::NoOpenReply;
    }
}
