//! The node orchestrator (§2 "SYSTEM OVERVIEW"): owns one identity, one
//! `TaskSupervisor`, and a handle to each subsystem, and drives the
//! leaves-first startup and reverse-order shutdown sequence.

use anyhow::{Context, Result};
use orama_cluster::sql_supervisor::ProcessSqlSupervisor;
use orama_cluster::{ClusterConfig, ClusterService};
use orama_core::task::TaskSupervisor;
use orama_core::{Identity, NodeConfig};
use orama_p2p::{P2pConfig, P2pNetwork};
use orama_wasm::services::{HttpSqlClient, InMemoryCacheStore, InMemoryObjectStore, InMemorySecretsStore};
use orama_wasm::{NoopRateLimiter, WasmConfig, WasmEngine};
use orama_ws::WsSessionManager;
use std::sync::Arc;
use tracing::info;

/// One running node: every subsystem plus the supervisor that owns their
/// background tasks.
pub struct OramaNode {
    supervisor: TaskSupervisor,
    pub p2p: P2pNetwork,
    pub cluster: ClusterService,
    pub wasm: WasmEngine,
    pub ws: Arc<WsSessionManager>,
}

impl OramaNode {
    /// Brings up every layer in the order §2 prescribes: identity, p2p
    /// host and pubsub (L0-L2), the peer-connectivity controller and
    /// cluster-membership service (L3), the SQL supervisor (L4), and
    /// finally the WASM engine and WS manager (L4/L5).
    pub async fn start(node_config: &NodeConfig, sql_engine_binary: &str) -> Result<Self> {
        let supervisor = TaskSupervisor::new();

        let identity = Identity::load_or_generate(&node_config.data_dir)
            .await
            .context("loading or generating node identity")?;
        info!(peer_id = %identity.peer_id(), "identity ready");

        let p2p = P2pNetwork::start(
            identity.keypair().clone(),
            P2pConfig::default(),
            node_config.listen_addresses.clone(),
            node_config.bootstrap_peers.clone(),
            &supervisor,
        )
        .await
        .context("starting p2p network")?;
        info!(peer_id = %p2p.local_peer_id(), "p2p host listening");

        write_peer_info(node_config, &p2p).await?;

        let bootstrap_addrs = orama_p2p::multiaddr_util::parse_bootstrap_list(&node_config.bootstrap_peers)
            .context("parsing bootstrap peers")?;

        let sql: Arc<dyn orama_cluster::SqlSupervisor> = ProcessSqlSupervisor::new(
            sql_engine_binary.to_string(),
            node_config.sql_http_port,
            node_config.raft_port,
            node_config.data_dir.join("sql").display().to_string(),
        );

        let cluster_config = ClusterConfig {
            explicit_join_addr: node_config.sql_join_addr.clone(),
            is_bootstrap: node_config.is_bootstrap,
            advertise_mode: node_config.advertise_mode,
            raft_port: node_config.raft_port,
            sql_http_port: node_config.sql_http_port,
        };

        let raft_addr = format!("{}:{}", local_host(node_config), node_config.raft_port);
        let http_addr = format!("{}:{}", local_host(node_config), node_config.sql_http_port);

        let cluster = ClusterService::start(
            p2p.host.clone(),
            &bootstrap_addrs,
            cluster_config,
            sql,
            raft_addr,
            http_addr,
            &supervisor,
        )
        .await
        .context("starting cluster-membership service")?;
        info!(decision = ?cluster.join_decision, "cluster join decision made");

        let wasm = WasmEngine::start(
            InMemoryObjectStore::new(),
            Some(HttpSqlClient::new(node_config.sql_http_port)),
            Some(InMemoryCacheStore::new()),
            Some(InMemorySecretsStore::new()),
            Some(p2p.host.clone()),
            Arc::new(NoopRateLimiter),
            WasmConfig::default(),
            &supervisor,
        )
        .context("starting wasm engine")?;

        let ws = Arc::new(WsSessionManager::new());

        Ok(Self {
            supervisor,
            p2p,
            cluster,
            wasm,
            ws,
        })
    }

    /// Cancels the shared token and waits for every background task to
    /// exit before returning (§5 "the node reports stopped only after
    /// every background task acknowledges").
    pub async fn stop(self) -> Result<()> {
        self.ws.close().await;
        if let Err(e) = self.cluster.sql.shutdown().await {
            tracing::warn!(error = %e, "SQL engine shutdown reported an error");
        }
        self.supervisor.shutdown().await;
        Ok(())
    }
}

fn local_host(node_config: &NodeConfig) -> String {
    if node_config.dev_local {
        return "127.0.0.1".to_string();
    }
    match &node_config.external_ip {
        Some(ip) => ip.clone(),
        None => "127.0.0.1".to_string(),
    }
}

/// Writes `<data_dir>/peer.info`: this node's own listen multiaddrs with
/// its peer id appended, one per line, so an operator can hand it to
/// another node as a bootstrap peer (§6 "On-disk layout").
async fn write_peer_info(node_config: &NodeConfig, p2p: &P2pNetwork) -> Result<()> {
    let peer_id = p2p.local_peer_id();
    let contents = node_config
        .listen_addresses
        .iter()
        .map(|addr| format!("{addr}/p2p/{peer_id}"))
        .collect::<Vec<_>>()
        .join("\n");
    tokio::fs::write(node_config.peer_info_path(), contents)
        .await
        .context("writing peer.info")
}

#[cfg(test)]
mod tests {
    use super::*;
    use orama_core::config::AdvertiseMode;
    use std::path::PathBuf;

    fn config_for(data_dir: PathBuf, is_bootstrap: bool, bootstrap_peers: Vec<String>) -> NodeConfig {
        NodeConfig {
            data_dir,
            listen_addresses: vec!["/ip4/127.0.0.1/tcp/0".to_string()],
            bootstrap_peers,
            is_bootstrap,
            advertise_mode: AdvertiseMode::Localhost,
            dev_local: true,
            ..NodeConfig::default()
        }
    }

    // Scenario S1: a bootstrap node starts with no bootstrap peers configured
    // and writes its own peer.info so other nodes can join against it.
    // Requires a real `orama-sql-engine` binary on PATH, so this only runs
    // when explicitly requested.
    #[ignore = "requires a real SQL engine binary and live networking"]
    #[tokio::test]
    async fn bootstrap_node_starts_and_writes_peer_info() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path().to_path_buf(), true, vec![]);

        let node = OramaNode::start(&config, "orama-sql-engine").await.unwrap();
        assert!(config.peer_info_path().exists());
        node.stop().await.unwrap();
    }

    // Scenario S2: a regular node started with the bootstrap node's
    // peer.info entry as its only bootstrap peer joins the cluster rather
    // than electing itself. Requires two live nodes and a real SQL engine
    // binary, so this only runs when explicitly requested.
    #[ignore = "requires a real SQL engine binary and live networking"]
    #[tokio::test]
    async fn regular_node_joins_via_bootstrap_peer() {
        let bootstrap_dir = tempfile::tempdir().unwrap();
        let bootstrap_config = config_for(bootstrap_dir.path().to_path_buf(), true, vec![]);
        let bootstrap = OramaNode::start(&bootstrap_config, "orama-sql-engine").await.unwrap();

        let bootstrap_addr = tokio::fs::read_to_string(bootstrap_config.peer_info_path())
            .await
            .unwrap()
            .lines()
            .next()
            .unwrap()
            .to_string();

        let regular_dir = tempfile::tempdir().unwrap();
        let regular_config = config_for(regular_dir.path().to_path_buf(), false, vec![bootstrap_addr]);
        let regular = OramaNode::start(&regular_config, "orama-sql-engine").await.unwrap();

        assert!(matches!(
            regular.cluster.join_decision,
            orama_cluster::JoinDecision::Join(_)
        ));

        regular.stop().await.unwrap();
        bootstrap.stop().await.unwrap();
    }
}
