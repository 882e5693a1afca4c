//! WebSocket session manager (§4.4): indexes live clients by id and by
//! topic so the WASM host ABI and the HTTP gateway can route sends and
//! broadcasts without touching the network layer directly.

pub mod connection;
pub mod error;
pub mod manager;
pub mod session;

pub use connection::ConnectionHandle;
pub use error::WsError;
pub use manager::WsSessionManager;
