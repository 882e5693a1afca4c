//! Membership publisher and consumer (§4.2 "Discovery protocol").

use crate::config::{MEMBER_EXPIRY, MEMBERSHIP_TICK};
use crate::sql_supervisor::SqlSupervisor;
use crate::types::{ClusterMemberRecord, SyncPeer};
use dashmap::DashMap;
use libp2p::PeerId;
use orama_core::{unix_now, NodeKind};
use orama_p2p::{P2pHost, PubsubMessage};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use orama_p2p::config::TOPIC_CLUSTER_MEMBERS;

/// In-memory table of observed member records, keyed by `peer_id`, with
/// per-entry expiry after `MISSED_INTERVALS_BEFORE_EXPIRY` ticks.
pub struct MembershipTable {
    entries: DashMap<PeerId, (ClusterMemberRecord, Instant)>,
}

impl MembershipTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
        })
    }

    /// Keep the most recent record per peer id (§5 "monotone in log_index,
    /// tolerates out-of-order delivery").
    fn observe(&self, record: ClusterMemberRecord) {
        let peer_id: PeerId = match record.peer_id.parse() {
            Ok(p) => p,
            Err(_) => return,
        };
        self.entries.insert(peer_id, (record, Instant::now()));
    }

    fn sweep_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, (_, seen)| now.duration_since(*seen) < MEMBER_EXPIRY);
    }

    pub fn live_members(&self) -> Vec<ClusterMemberRecord> {
        self.sweep_expired();
        self.entries.iter().map(|e| e.value().0.clone()).collect()
    }
}

/// Publish this node's own membership record every `MEMBERSHIP_TICK`, plus
/// once immediately with `log_index=0` so recovering peers can discover
/// this node before local SQL is ready (§4.2 "Metadata publication"). The
/// first tick where the engine reports ready also invokes `TriggerSync`
/// against whatever peers are already known in `table`.
pub async fn publish(
    host: P2pHost,
    table: Arc<MembershipTable>,
    sql: Arc<dyn SqlSupervisor>,
    node_kind: NodeKind,
    raft_addr: String,
    http_addr: String,
    cancel: CancellationToken,
) {
    let peer_id = host.local_peer_id().to_string();
    let mut announced_ready = false;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let ready = sql.is_ready().await;
        let log_index = if ready { sql.log_index().await } else { 0 };

        let record = ClusterMemberRecord {
            peer_id: peer_id.clone(),
            node_kind,
            raft_addr: raft_addr.clone(),
            http_addr: http_addr.clone(),
            log_index,
            emitted_at: unix_now(),
        };

        match serde_json::to_vec(&record) {
            Ok(payload) => {
                if let Err(e) = host.publish(TOPIC_CLUSTER_MEMBERS, payload).await {
                    warn!(error = %e, "failed to publish membership record, will retry next tick");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode membership record"),
        }

        if ready && !announced_ready {
            announced_ready = true;
            debug!(%log_index, "SQL engine reports ready, triggering peer sync");
            sync_peers(&table, &sql, &raft_addr).await;
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(MEMBERSHIP_TICK) => {}
        }
    }
}

/// Consume membership records published by peers, updating `table`.
pub async fn consume(host: P2pHost, table: Arc<MembershipTable>, cancel: CancellationToken) {
    let mut events = host.subscribe_events();

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => return,
            msg = events.recv() => msg,
        };
        let msg: PubsubMessage = match msg {
            Ok(msg) => msg,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "membership consumer lagged behind event stream");
                continue;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        };
        if msg.topic != TOPIC_CLUSTER_MEMBERS {
            continue;
        }
        match serde_json::from_slice::<ClusterMemberRecord>(&msg.data) {
            Ok(record) => table.observe(record),
            Err(e) => trace!(error = %e, "discarding malformed membership record"),
        }
    }
}

async fn sync_peers(table: &MembershipTable, sql: &Arc<dyn SqlSupervisor>, local_raft_addr: &str) {
    let peers: Vec<SyncPeer> = table
        .live_members()
        .into_iter()
        .filter(|m| m.log_index > 0 && m.raft_addr != local_raft_addr)
        .map(|m| SyncPeer {
            peer_id: m.peer_id,
            raft_addr: m.raft_addr,
        })
        .collect();
    if let Err(e) = sql.trigger_sync(peers).await {
        warn!(error = %e, "trigger_sync failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(peer_id: PeerId, log_index: u64) -> ClusterMemberRecord {
        ClusterMemberRecord {
            peer_id: peer_id.to_string(),
            node_kind: NodeKind::Regular,
            raft_addr: "10.0.0.1:4201".to_string(),
            http_addr: "10.0.0.1:8090".to_string(),
            log_index,
            emitted_at: unix_now(),
        }
    }

    #[test]
    fn observes_and_sweeps_expired_entries() {
        let table = MembershipTable::new();
        let peer = PeerId::random();
        table.observe(record(peer, 5));
        assert_eq!(table.live_members().len(), 1);

        // Force an expiry by reaching in and back-dating the entry.
        table
            .entries
            .alter(&peer, |_, (rec, _)| (rec, Instant::now() - MEMBER_EXPIRY - std::time::Duration::from_secs(1)));
        assert!(table.live_members().is_empty());
    }

    #[tokio::test]
    async fn sync_peers_excludes_self_and_unready_members() {
        let table = MembershipTable::new();
        let self_peer = PeerId::random();
        let other = PeerId::random();
        table.observe(record(self_peer, 5));
        let mut other_rec = record(other, 7);
        other_rec.raft_addr = "10.0.0.2:4201".to_string();
        table.observe(other_rec);
        let mut unready = record(PeerId::random(), 0);
        unready.raft_addr = "10.0.0.3:4201".to_string();
        table.observe(unready);

        let sql = crate::sql_supervisor::MockSqlSupervisor::new();
        sync_peers(&table, &(sql.clone() as Arc<dyn SqlSupervisor>), "10.0.0.1:4201").await;

        let calls = sql.sync_calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec![SyncPeer {
            peer_id: other.to_string(),
            raft_addr: "10.0.0.2:4201".to_string(),
        }]);
    }
}
