//! Inbound chat messages and transport events

use chrono::{DateTime, Utc};

/// A chat message as delivered by the transport.
///
/// Messages are values: anything that needs a different view of a message
/// (the alias rewriter, for one) builds a copy instead of mutating the one
/// other consumers are reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message id, unique within its chat
    pub id: i64,

    /// Chat the message lives in
    pub chat_id: i64,

    /// Author, when the transport knows it
    pub sender_id: Option<i64>,

    /// Textual payload
    pub text: String,

    /// Authored by the account the host runs as
    pub outgoing: bool,

    /// When the message was sent
    pub date: DateTime<Utc>,
}

impl Message {
    /// Create a message authored by someone else
    pub fn new(id: i64, chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            chat_id,
            sender_id: None,
            text: text.into(),
            outgoing: false,
            date: Utc::now(),
        }
    }

    /// Create a message authored by the host's own account
    pub fn outgoing(id: i64, chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            outgoing: true,
            ..Self::new(id, chat_id, text)
        }
    }

    /// Set the sender id
    pub fn sender(mut self, sender_id: i64) -> Self {
        self.sender_id = Some(sender_id);
        self
    }

    /// A copy of this message carrying different text. Every other field is
    /// preserved.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..self.clone()
        }
    }
}

/// Kind of transport event a handler subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFilter {
    NewMessage,
    EditedMessage,
}

/// A transport event
#[derive(Debug, Clone)]
pub enum Event {
    NewMessage(Message),
    MessageEdited(Message),
}

impl Event {
    pub fn message(&self) -> &Message {
        match self {
            Event::NewMessage(m) | Event::MessageEdited(m) => m,
        }
    }

    pub fn is_edit(&self) -> bool {
        matches!(self, Event::MessageEdited(_))
    }

    pub fn filter(&self) -> EventFilter {
        match self {
            Event::NewMessage(_) => EventFilter::NewMessage,
            Event::MessageEdited(_) => EventFilter::EditedMessage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_text_leaves_original_untouched() {
        let original = Message::outgoing(7, 42, ".g cats").sender(1);
        let rewritten = original.with_text(".google search cats");

        assert_eq!(original.text, ".g cats");
        assert_eq!(rewritten.text, ".google search cats");
        assert_eq!(rewritten.id, 7);
        assert_eq!(rewritten.chat_id, 42);
        assert_eq!(rewritten.sender_id, Some(1));
        assert!(rewritten.outgoing);
        assert_eq!(rewritten.date, original.date);
    }

    #[test]
    fn test_event_accessors() {
        let event = Event::MessageEdited(Message::new(1, 2, "hi"));
        assert!(event.is_edit());
        assert_eq!(event.filter(), EventFilter::EditedMessage);
        assert_eq!(event.message().text, "hi");
    }
}
