//! Cluster-membership wire types (§3 "Cluster-member metadata").

use orama_core::NodeKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterMemberRecord {
    pub peer_id: String,
    pub node_kind: NodeKind,
    pub raft_addr: String,
    pub http_addr: String,
    /// 0 before local SQL is up; the current committed index thereafter.
    pub log_index: u64,
    pub emitted_at: i64,
}

/// A peer endpoint the SQL supervisor should be told to reconcile against
/// (§4.2 "TriggerSync").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPeer {
    pub peer_id: String,
    pub raft_addr: String,
}
