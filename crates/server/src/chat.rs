use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, warn};

/// Fans every chat line out to all connected sockets, sender included.
#[derive(Clone)]
pub(crate) struct ChatRelay {
    sender: broadcast::Sender<String>,
    connections: Arc<AtomicUsize>,
}

pub(crate) struct ChatSubscription {
    pub(crate) receiver: broadcast::Receiver<String>,
    pub(crate) guard: ConnectionGuard,
}

/// Counts a connection as live until dropped.
pub(crate) struct ConnectionGuard {
    connections: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.connections.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ChatRelay {
    pub(crate) fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self {
            sender,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn subscribe(&self) -> ChatSubscription {
        self.connections.fetch_add(1, Ordering::SeqCst);
        ChatSubscription {
            receiver: self.sender.subscribe(),
            guard: ConnectionGuard {
                connections: Arc::clone(&self.connections),
            },
        }
    }

    /// Returns how many connections the message was queued for.
    pub(crate) fn broadcast(&self, message: String) -> usize {
        self.sender.send(message).unwrap_or(0)
    }

    pub(crate) fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Relays text frames from `socket` to every subscriber and room traffic back to `socket`.
pub(crate) async fn serve_socket(relay: ChatRelay, subscription: ChatSubscription, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let ChatSubscription {
        receiver: room,
        guard,
    } = subscription;
    let mut room = BroadcastStream::new(room);

    let send_task = tokio::spawn(async move {
        while let Some(item) = room.next().await {
            let text = match item {
                Ok(text) => text,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "chat connection lagged");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => {
                let delivered = relay.broadcast(text);
                debug!(delivered, "chat message relayed");
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    drop(guard);
    debug!(connections = relay.connection_count(), "chat connection closed");
}

#[cfg(test)]
#[path = "tests/chat_tests.rs"]
mod tests;
