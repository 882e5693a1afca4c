//! Replicated-SQL cluster membership and recovery (§4.2).
//!
//! `ClusterService::start` runs the join-address decision function once,
//! starts the SQL supervisor, and spawns the membership publisher and
//! consumer tasks.

pub mod config;
pub mod decision;
pub mod membership;
pub mod sql_supervisor;
pub mod types;

pub use config::ClusterConfig;
pub use decision::{decide_join_address, JoinDecision};
pub use membership::MembershipTable;
pub use sql_supervisor::SqlSupervisor;
pub use types::{ClusterMemberRecord, SyncPeer};

use anyhow::Result;
use orama_core::{NodeKind, TaskSupervisor};
use orama_p2p::P2pHost;
use std::sync::Arc;

pub struct ClusterService {
    pub sql: Arc<dyn SqlSupervisor>,
    pub table: Arc<MembershipTable>,
    pub join_decision: JoinDecision,
}

impl ClusterService {
    /// Evaluate the decision function, start `sql`, and spawn the
    /// membership publisher/consumer on `supervisor`.
    pub async fn start(
        host: P2pHost,
        bootstrap_addrs: &[libp2p::Multiaddr],
        cluster_config: ClusterConfig,
        sql: Arc<dyn SqlSupervisor>,
        raft_addr: String,
        http_addr: String,
        supervisor: &TaskSupervisor,
    ) -> Result<ClusterService> {
        let join_decision = decide_join_address(
            bootstrap_addrs,
            host.local_peer_id(),
            cluster_config.is_bootstrap,
            cluster_config.advertise_mode,
            cluster_config.raft_port,
            cluster_config.explicit_join_addr.as_deref(),
        )?;

        let node_kind = if cluster_config.is_bootstrap {
            match &join_decision {
                JoinDecision::Primary => NodeKind::Primary,
                JoinDecision::Join(_) => NodeKind::Secondary,
            }
        } else {
            NodeKind::Regular
        };

        let join_addr = match &join_decision {
            JoinDecision::Primary => None,
            JoinDecision::Join(addr) => Some(addr.clone()),
        };
        sql.start(join_addr).await?;

        let table = MembershipTable::new();

        let cancel = supervisor.cancellation_token();
        supervisor.spawn(membership::publish(
            host.clone(),
            table.clone(),
            sql.clone(),
            node_kind,
            raft_addr,
            http_addr,
            cancel,
        ));

        let cancel = supervisor.cancellation_token();
        supervisor.spawn(membership::consume(host, table.clone(), cancel));

        Ok(ClusterService {
            sql,
            table,
            join_decision,
        })
    }
}
