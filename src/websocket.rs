//! WebSocket handlers for the chat relay
//!
//! Each upgraded connection first receives the stored history, one text frame
//! per message, and then gets every frame it sends persisted and echoed back.
//! Frames are never forwarded to other connections.

use crate::chat::MessageStore;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::borrow::Cow;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client sent a close frame or the stream ended
    ClientClosed,
    /// Reading the next frame failed
    ReadError(String),
    /// Writing an echo back failed
    WriteError(String),
}

/// WebSocket upgrade handler
///
/// Any origin is accepted and no subprotocol is negotiated. A request that
/// cannot be upgraded gets `400 Bad Request`.
pub async fn websocket_handler(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    let ws = ws.map_err(|rejection| {
        warn!(error = %rejection, "WebSocket handshake failed");
        AppError::HandshakeFailed(rejection.to_string())
    })?;

    let store = state.store.clone();
    Ok(ws
        .on_failed_upgrade(|e| warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| handle_socket(socket, store)))
}

// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, store: Arc<dyn MessageStore>) {
    let session_id = Uuid::new_v4();
    let span = info_span!("ws_session", session_id = %session_id);

    async move {
        info!("WebSocket client connected");
        let (sender, receiver) = socket.split();
        let end = run_session(sender, receiver, store.as_ref()).await;
        info!(reason = ?end, "WebSocket connection closed");
    }
    .instrument(span)
    .await
}

/// Drive one session until the client leaves or I/O fails
///
/// Replays history, then for every text or binary frame: persist it (a failed
/// write is logged and the frame is still echoed), then send the same frame
/// back on `sender`.
///
/// # Arguments
/// * `sender` - Outbound half of the connection
/// * `receiver` - Inbound half of the connection
/// * `store` - Store used for replay and persistence
///
/// # Returns
/// * `SessionEnd` - Reason the loop stopped
pub async fn run_session<Tx, Rx, E>(
    mut sender: Tx,
    mut receiver: Rx,
    store: &dyn MessageStore,
) -> SessionEnd
where
    Tx: Sink<Message> + Unpin,
    Tx::Error: Display,
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    replay_history(&mut sender, store).await;

    loop {
        let frame = match receiver.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                warn!(error = %e, "Read error");
                return SessionEnd::ReadError(e.to_string());
            }
            None => return SessionEnd::ClientClosed,
        };

        {
            let payload = match frame_payload(&frame) {
                Some(payload) => payload,
                None if matches!(frame, Message::Close(_)) => {
                    debug!("Client sent close frame");
                    return SessionEnd::ClientClosed;
                }
                None => continue,
            };

            if let Err(e) = store.append(&payload).await {
                error!(error = %e, "Failed to save message");
            }
        }

        if let Err(e) = sender.send(frame).await {
            warn!(error = %e, "Write error");
            return SessionEnd::WriteError(e.to_string());
        }
    }
}

/// Send every stored message as its own text frame, oldest first
///
/// Returns the number of frames sent. Failures are logged and end the replay
/// early; the session continues either way.
async fn replay_history<Tx>(sender: &mut Tx, store: &dyn MessageStore) -> usize
where
    Tx: Sink<Message> + Unpin,
    Tx::Error: Display,
{
    let history = match store.fetch_history().await {
        Ok(history) => history,
        Err(e) => {
            error!(error = %e, "Failed to retrieve history");
            return 0;
        }
    };

    let total = history.len();
    let mut sent = 0;
    for message in history {
        if let Err(e) = sender.send(Message::Text(message.text)).await {
            error!(error = %e, sent, total, "Failed to replay history");
            return sent;
        }
        sent += 1;
    }

    debug!(sent, "History replayed");
    sent
}

// Text to persist for a data frame; control frames carry none
fn frame_payload(frame: &Message) -> Option<Cow<'_, str>> {
    match frame {
        Message::Text(text) => Some(Cow::Borrowed(text.as_str())),
        Message::Binary(bytes) => Some(String::from_utf8_lossy(bytes)),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatMessage, StoreError};
    use async_trait::async_trait;
    use chrono::Utc;
    use futures_util::stream;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::task::{Context, Poll};

    #[derive(Default)]
    struct MemoryStore {
        messages: Mutex<Vec<ChatMessage>>,
    }

    impl MemoryStore {
        fn with_history(texts: &[&str]) -> Self {
            let store = Self::default();
            for (i, text) in texts.iter().enumerate() {
                store.messages.lock().unwrap().push(ChatMessage {
                    id: i as i64 + 1,
                    text: text.to_string(),
                    timestamp: Utc::now(),
                });
            }
            store
        }

        fn texts(&self) -> Vec<String> {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .map(|m| m.text.clone())
                .collect()
        }
    }

    #[async_trait]
    impl MessageStore for MemoryStore {
        async fn fetch_history(&self) -> Result<Vec<ChatMessage>, StoreError> {
            Ok(self.messages.lock().unwrap().clone())
        }

        async fn append(&self, text: &str) -> Result<ChatMessage, StoreError> {
            let mut messages = self.messages.lock().unwrap();
            let message = ChatMessage {
                id: messages.len() as i64 + 1,
                text: text.to_string(),
                timestamp: Utc::now(),
            };
            messages.push(message.clone());
            Ok(message)
        }
    }

    struct UnreachableStore;

    #[async_trait]
    impl MessageStore for UnreachableStore {
        async fn fetch_history(&self) -> Result<Vec<ChatMessage>, StoreError> {
            Err(StoreError::Timeout {
                operation: "fetch_history",
                secs: 5,
            })
        }

        async fn append(&self, _text: &str) -> Result<ChatMessage, StoreError> {
            Err(StoreError::Timeout {
                operation: "append",
                secs: 5,
            })
        }
    }

    /// Sink that records every frame written to it
    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<Message>,
    }

    impl Sink<Message> for RecordingSink {
        type Error = std::convert::Infallible;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(mut self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
            self.sent.push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Sink whose peer has gone away
    struct ClosedSink;

    impl Sink<Message> for ClosedSink {
        type Error = std::io::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "connection closed",
            )))
        }

        fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    fn inbound(frames: Vec<Message>) -> impl Stream<Item = Result<Message, axum::Error>> + Unpin {
        stream::iter(frames.into_iter().map(Ok))
    }

    fn text(s: &str) -> Message {
        Message::Text(s.to_string())
    }

    #[tokio::test]
    async fn test_history_replayed_before_echoes() {
        let store = MemoryStore::with_history(&["old 1", "old 2"]);
        let mut sink = RecordingSink::default();

        let end = run_session(&mut sink, inbound(vec![text("a"), text("b")]), &store).await;

        assert_eq!(end, SessionEnd::ClientClosed);
        assert_eq!(sink.sent, vec![text("old 1"), text("old 2"), text("a"), text("b")]);
        assert_eq!(store.texts(), vec!["old 1", "old 2", "a", "b"]);
    }

    #[tokio::test]
    async fn test_echo_still_sent_when_store_fails() {
        let mut sink = RecordingSink::default();

        let end = run_session(&mut sink, inbound(vec![text("hello")]), &UnreachableStore).await;

        assert_eq!(end, SessionEnd::ClientClosed);
        assert_eq!(sink.sent, vec![text("hello")]);
    }

    #[tokio::test]
    async fn test_read_error_ends_session() {
        let store = MemoryStore::default();
        let mut sink = RecordingSink::default();
        let frames = stream::iter(vec![
            Ok(text("first")),
            Err(axum::Error::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset by peer",
            ))),
            Ok(text("never read")),
        ]);

        let end = run_session(&mut sink, frames, &store).await;

        assert!(matches!(end, SessionEnd::ReadError(_)));
        assert_eq!(sink.sent, vec![text("first")]);
        assert_eq!(store.texts(), vec!["first"]);
    }

    #[tokio::test]
    async fn test_write_error_ends_session_after_persisting() {
        let store = MemoryStore::default();

        let end = run_session(ClosedSink, inbound(vec![text("lost echo"), text("unread")]), &store).await;

        assert!(matches!(end, SessionEnd::WriteError(_)));
        assert_eq!(store.texts(), vec!["lost echo"]);
    }

    #[tokio::test]
    async fn test_replay_failure_does_not_stop_session() {
        let store = MemoryStore::with_history(&["old"]);

        let end = run_session(ClosedSink, inbound(vec![]), &store).await;

        assert_eq!(end, SessionEnd::ClientClosed);
    }

    #[tokio::test]
    async fn test_binary_frame_persisted_as_text_and_echoed_as_binary() {
        let store = MemoryStore::default();
        let mut sink = RecordingSink::default();
        let frame = Message::Binary(b"bytes".to_vec());

        run_session(&mut sink, inbound(vec![frame.clone()]), &store).await;

        assert_eq!(sink.sent, vec![frame]);
        assert_eq!(store.texts(), vec!["bytes"]);
    }

    #[tokio::test]
    async fn test_close_frame_stops_processing() {
        let store = MemoryStore::default();
        let mut sink = RecordingSink::default();

        let end = run_session(
            &mut sink,
            inbound(vec![text("a"), Message::Close(None), text("b")]),
            &store,
        )
        .await;

        assert_eq!(end, SessionEnd::ClientClosed);
        assert_eq!(sink.sent, vec![text("a")]);
        assert_eq!(store.texts(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_control_frames_are_not_echoed_or_stored() {
        let store = MemoryStore::default();
        let mut sink = RecordingSink::default();

        run_session(
            &mut sink,
            inbound(vec![Message::Ping(vec![1]), Message::Pong(vec![2]), text("a")]),
            &store,
        )
        .await;

        assert_eq!(sink.sent, vec![text("a")]);
        assert_eq!(store.texts(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_empty_text_is_echoed_verbatim() {
        let store = MemoryStore::default();
        let mut sink = RecordingSink::default();

        run_session(&mut sink, inbound(vec![text("")]), &store).await;

        assert_eq!(sink.sent, vec![text("")]);
        assert_eq!(store.texts(), vec![""]);
    }
}
