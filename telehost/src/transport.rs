//! Transport client seam
//!
//! The host never talks to a messaging backend directly. Everything it needs
//! (subscribing handlers, editing and sending messages) goes through
//! [`TransportClient`]. [`LoopbackTransport`] is an in-process implementation
//! used by the console binary and the tests.

use crate::message::{Event, EventFilter, Message};
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Errors reported by a transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Message {message_id} not found in chat {chat_id}")]
    MessageNotFound { chat_id: i64, message_id: i64 },

    #[error("Transport disconnected")]
    Disconnected,

    #[error("Transport request failed: {0}")]
    Request(String),
}

/// Subscriber for transport events
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event);
}

/// Identifies a subscription made with [`TransportClient::add_event_handler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

/// Client side of the long-lived connection to the messaging backend
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Subscribe a handler to one kind of event
    async fn add_event_handler(&self, handler: Arc<dyn EventHandler>, filter: EventFilter)
        -> HandlerId;

    /// Drop a subscription. Returns false if it was not registered.
    async fn remove_event_handler(&self, id: HandlerId) -> bool;

    /// Current subscriptions
    async fn list_event_handlers(&self) -> Vec<(HandlerId, EventFilter)>;

    /// Replace the text of an existing message
    async fn edit_message(&self, message: &Message, text: &str) -> Result<(), TransportError>;

    /// Post a new message
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<Message, TransportError>;
}

/// Something the host asked the transport to put on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Edit {
        chat_id: i64,
        message_id: i64,
        text: String,
    },
    Send {
        chat_id: i64,
        message_id: i64,
        text: String,
    },
}

impl Outgoing {
    pub fn text(&self) -> &str {
        match self {
            Outgoing::Edit { text, .. } | Outgoing::Send { text, .. } => text,
        }
    }
}

struct Subscription {
    id: HandlerId,
    filter: EventFilter,
    handler: Arc<dyn EventHandler>,
}

/// In-process transport
///
/// [`emit`](Self::emit) delivers an event to every matching subscriber, each
/// on its own tokio task, so a slow subscriber never holds up the others.
/// Edits and sends are recorded and forwarded to an optional watcher channel.
pub struct LoopbackTransport {
    subscriptions: RwLock<Vec<Subscription>>,
    next_handler: AtomicU64,
    next_message: AtomicI64,
    outbox: Mutex<Vec<Outgoing>>,
    watcher: Mutex<Option<mpsc::UnboundedSender<Outgoing>>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_handler: AtomicU64::new(1),
            next_message: AtomicI64::new(1_000_000),
            outbox: Mutex::new(Vec::new()),
            watcher: Mutex::new(None),
        }
    }

    /// Stream of everything written to the transport from now on
    pub async fn watch_outgoing(&self) -> mpsc::UnboundedReceiver<Outgoing> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.watcher.lock().await = Some(tx);
        rx
    }

    /// Deliver an event to every matching subscriber
    pub async fn emit(&self, event: Event) -> Vec<JoinHandle<()>> {
        let filter = event.filter();
        let handlers: Vec<Arc<dyn EventHandler>> = {
            let subs = self.subscriptions.read().await;
            subs.iter()
                .filter(|s| s.filter == filter)
                .map(|s| s.handler.clone())
                .collect()
        };

        handlers
            .into_iter()
            .map(|handler| {
                let event = event.clone();
                tokio::spawn(async move { handler.handle(event).await })
            })
            .collect()
    }

    /// Deliver an event and wait for every subscriber to finish with it
    pub async fn emit_and_wait(&self, event: Event) {
        for task in self.emit(event).await {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Event handler task aborted");
            }
        }
    }

    /// Everything written so far
    pub async fn outbox(&self) -> Vec<Outgoing> {
        self.outbox.lock().await.clone()
    }

    /// Clear the recorded output
    pub async fn clear_outbox(&self) {
        self.outbox.lock().await.clear();
    }

    async fn record(&self, out: Outgoing) {
        if let Some(tx) = self.watcher.lock().await.as_ref() {
            let _ = tx.send(out.clone());
        }
        self.outbox.lock().await.push(out);
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportClient for LoopbackTransport {
    async fn add_event_handler(
        &self,
        handler: Arc<dyn EventHandler>,
        filter: EventFilter,
    ) -> HandlerId {
        let id = HandlerId(self.next_handler.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().await.push(Subscription {
            id,
            filter,
            handler,
        });
        id
    }

    async fn remove_event_handler(&self, id: HandlerId) -> bool {
        let mut subs = self.subscriptions.write().await;
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    async fn list_event_handlers(&self) -> Vec<(HandlerId, EventFilter)> {
        let subs = self.subscriptions.read().await;
        subs.iter().map(|s| (s.id, s.filter)).collect()
    }

    async fn edit_message(&self, message: &Message, text: &str) -> Result<(), TransportError> {
        self.record(Outgoing::Edit {
            chat_id: message.chat_id,
            message_id: message.id,
            text: text.to_string(),
        })
        .await;
        Ok(())
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<Message, TransportError> {
        let id = self.next_message.fetch_add(1, Ordering::Relaxed);
        self.record(Outgoing::Send {
            chat_id,
            message_id: id,
            text: text.to_string(),
        })
        .await;
        Ok(Message::outgoing(id, chat_id, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counter(AtomicUsize);

    #[async_trait]
    impl EventHandler for Counter {
        async fn handle(&self, _event: Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_emit_respects_filter() {
        let transport = LoopbackTransport::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        transport
            .add_event_handler(counter.clone(), EventFilter::EditedMessage)
            .await;

        transport
            .emit_and_wait(Event::NewMessage(Message::new(1, 1, "x")))
            .await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);

        transport
            .emit_and_wait(Event::MessageEdited(Message::new(1, 1, "y")))
            .await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_event_handler() {
        let transport = LoopbackTransport::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let id = transport
            .add_event_handler(counter.clone(), EventFilter::NewMessage)
            .await;

        assert_eq!(transport.list_event_handlers().await.len(), 1);
        assert!(transport.remove_event_handler(id).await);
        assert!(!transport.remove_event_handler(id).await);
        assert!(transport.list_event_handlers().await.is_empty());
    }

    #[tokio::test]
    async fn test_outgoing_is_recorded() {
        let transport = LoopbackTransport::new();
        let mut rx = transport.watch_outgoing().await;
        let msg = Message::outgoing(5, 9, ".ping");

        transport.edit_message(&msg, "pong").await.unwrap();
        let sent = transport.send_message(9, "hello").await.unwrap();

        assert_eq!(sent.chat_id, 9);
        assert_eq!(rx.recv().await.unwrap().text(), "pong");
        assert_eq!(transport.outbox().await.len(), 2);
    }
}
