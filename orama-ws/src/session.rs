//! Wires one accepted `tokio_tungstenite` stream into a [`WsSessionManager`]:
//! splits it into its write half (owned by a writer task, §5 "WS message
//! loop per client") and a reader loop that forwards inbound frames to the
//! caller and unregisters on stream end.

use crate::connection::{spawn_writer, ConnectionHandle};
use crate::manager::WsSessionManager;
use futures::StreamExt;
use orama_core::task::TaskSupervisor;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

/// Registers `client_id` with `manager` and spawns its writer and reader
/// tasks on `supervisor`. Inbound text/binary frames are forwarded to
/// `inbound`; the session unregisters itself when the stream ends.
pub fn accept<S>(
    client_id: String,
    stream: WebSocketStream<S>,
    manager: Arc<WsSessionManager>,
    inbound: mpsc::UnboundedSender<(String, Message)>,
    supervisor: &TaskSupervisor,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, mut stream) = stream.split();
    let (tx, rx) = mpsc::unbounded_channel();
    spawn_writer(client_id.clone(), sink, rx, supervisor);

    let conn = ConnectionHandle::new(client_id.clone(), tx);
    let reader_id = client_id;
    let reader_manager = manager;
    supervisor.spawn(async move {
        reader_manager.register(conn).await;
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Close(_)) => break,
                Ok(msg) => {
                    if inbound.send((reader_id.clone(), msg)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(client_id = %reader_id, error = %e, "websocket read failed");
                    break;
                }
            }
        }
        reader_manager.unregister(&reader_id).await;
    });
}
