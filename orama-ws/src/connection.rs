//! Per-connection write side (§3 "WS client record", §5 concurrency model):
//! the manager only ever holds a channel handle, never the socket itself, so
//! no manager lock ever covers a network write.

use crate::error::WsError;
use futures::SinkExt;
use orama_core::task::TaskSupervisor;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Cheap, cloneable handle to one client's outbound channel. The actual
/// socket write happens on the writer task spawned by [`spawn_writer`].
#[derive(Clone)]
pub struct ConnectionHandle {
    client_id: String,
    tx: mpsc::UnboundedSender<Message>,
}

impl ConnectionHandle {
    pub fn new(client_id: String, tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { client_id, tx }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn send(&self, msg: Message) -> Result<(), WsError> {
        self.tx.send(msg).map_err(|_| WsError::ConnectionClosed {
            client_id: self.client_id.clone(),
        })
    }

    /// Closes exactly once: the first call enqueues a close frame and drops
    /// the sender; subsequent calls see a closed channel and no-op.
    pub fn close(&self) {
        let _ = self.tx.send(Message::Close(None));
    }
}

/// Spawn the task that owns `sink` and drains `rx`, writing each message as
/// it arrives. Ends when the channel closes or a write fails.
pub fn spawn_writer<S>(client_id: String, mut sink: S, mut rx: mpsc::UnboundedReceiver<Message>, supervisor: &TaskSupervisor)
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin + Send + 'static,
{
    supervisor.spawn(async move {
        while let Some(msg) = rx.recv().await {
            let is_close = matches!(msg, Message::Close(_));
            if let Err(e) = sink.send(msg).await {
                tracing::debug!(%client_id, error = %e, "websocket write failed");
                break;
            }
            if is_close {
                break;
            }
        }
        let _ = sink.close().await;
    });
}
