//! Shared domain types referenced by more than one subsystem crate (§3).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque request identifier threaded through an invocation end to end.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// This node's role in the SQL cluster, as decided by §4.2's decision
/// function and carried in every membership record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Forms a new cluster (empty join address).
    Primary,
    /// A configured bootstrap that is not the primary.
    Secondary,
    /// Joins via a derived `host:raft_port`.
    Regular,
}

/// What triggered a WASM invocation (§3 "Invocation context").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Http,
    Websocket,
    Cron,
    Db,
    Pubsub,
    Timer,
    Job,
}

/// Unix-seconds timestamp, the wire format used by every pubsub payload's
/// `ts` field (§6).
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
