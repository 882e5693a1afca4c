//! WS session errors (§4.4) and their mapping onto the node-wide taxonomy.

use orama_core::OramaError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum WsError {
    #[error("websocket client {client_id} not found")]
    ClientNotFound { client_id: String },
    #[error("websocket client {client_id} connection is closed")]
    ConnectionClosed { client_id: String },
}

impl WsError {
    pub fn into_orama_error(self, function: &str) -> OramaError {
        match self {
            WsError::ClientNotFound { client_id } => {
                OramaError::not_found(function, format!("no such websocket client: {client_id}"))
            }
            WsError::ConnectionClosed { client_id } => {
                OramaError::service_unavailable(function, format!("websocket client {client_id} already closed"))
            }
        }
    }
}
