//! The external replicated-SQL engine, modelled as a pluggable supervisor
//! (§4.2, `[AMBIENT]`).
//!
//! The spec treats SQL as an external service the node starts, queries for
//! readiness/log index, and instructs to reconcile peers. `SqlSupervisor`
//! is the seam: `ProcessSqlSupervisor` drives a real child process over its
//! HTTP control port, `MockSqlSupervisor` is an in-memory stand-in used by
//! tests and by the decision-function example flows.

use crate::types::SyncPeer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Body of the engine's `/status` response (§4.2 "readiness/log index").
#[derive(Debug, Deserialize)]
struct StatusResponse {
    ready: bool,
    log_index: u64,
}

#[async_trait]
pub trait SqlSupervisor: Send + Sync {
    /// Start (or join) the SQL engine. `join_addr` is `None` for a primary.
    async fn start(&self, join_addr: Option<String>) -> Result<()>;

    /// Whether the engine has reported ready (has a usable committed index).
    async fn is_ready(&self) -> bool;

    /// Current committed log index, 0 before ready.
    async fn log_index(&self) -> u64;

    /// Reconcile local engine configuration against the given peer set
    /// (§4.2 "TriggerSync").
    async fn trigger_sync(&self, peers: Vec<SyncPeer>) -> Result<()>;

    async fn shutdown(&self) -> Result<()>;
}

/// Drives a real SQL engine binary as a child process, controlling it over
/// its HTTP control port.
pub struct ProcessSqlSupervisor {
    binary_path: String,
    http_port: u16,
    raft_port: u16,
    data_dir: String,
    child: Mutex<Option<Child>>,
    ready: AtomicBool,
    log_index: AtomicU64,
    http: reqwest::Client,
}

impl ProcessSqlSupervisor {
    pub fn new(binary_path: String, http_port: u16, raft_port: u16, data_dir: String) -> Arc<Self> {
        Arc::new(Self {
            binary_path,
            http_port,
            raft_port,
            data_dir,
            child: Mutex::new(None),
            ready: AtomicBool::new(false),
            log_index: AtomicU64::new(0),
            http: reqwest::Client::new(),
        })
    }

    fn control_url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.http_port, path)
    }
}

#[async_trait]
impl SqlSupervisor for ProcessSqlSupervisor {
    async fn start(&self, join_addr: Option<String>) -> Result<()> {
        let mut cmd = Command::new(&self.binary_path);
        cmd.arg("--data-dir")
            .arg(&self.data_dir)
            .arg("--http-port")
            .arg(self.http_port.to_string())
            .arg("--raft-port")
            .arg(self.raft_port.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        if let Some(addr) = &join_addr {
            cmd.arg("--join").arg(addr);
        }
        let child = cmd.spawn().context("failed to spawn SQL engine process")?;
        info!(join_addr = ?join_addr, "started SQL engine process");
        *self.child.lock() = Some(child);
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        let resp = match self.http.get(self.control_url("/status")).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                warn!(status = %resp.status(), "SQL engine status check failed");
                return self.ready.load(Ordering::SeqCst);
            }
            Err(e) => {
                warn!(error = %e, "failed to reach SQL engine status endpoint");
                return self.ready.load(Ordering::SeqCst);
            }
        };
        match resp.json::<StatusResponse>().await {
            Ok(status) => {
                self.log_index.store(status.log_index, Ordering::SeqCst);
                self.ready.store(status.ready, Ordering::SeqCst);
                status.ready
            }
            Err(e) => {
                warn!(error = %e, "failed to parse SQL engine status response");
                self.ready.load(Ordering::SeqCst)
            }
        }
    }

    async fn log_index(&self) -> u64 {
        self.log_index.load(Ordering::SeqCst)
    }

    async fn trigger_sync(&self, peers: Vec<SyncPeer>) -> Result<()> {
        debug!(peer_count = peers.len(), "reconciling SQL peers");
        let body = serde_json::json!({ "peers": peers.iter().map(|p| serde_json::json!({
            "peer_id": p.peer_id,
            "raft_addr": p.raft_addr,
        })).collect::<Vec<_>>() });
        self.http
            .post(self.control_url("/cluster/sync"))
            .json(&body)
            .send()
            .await
            .context("failed to call SQL engine sync endpoint")?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(mut child) = self.child.lock().take() {
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "failed to signal SQL engine process shutdown");
            }
        }
        Ok(())
    }
}

/// In-memory stand-in used by tests: tracks calls without spawning anything.
#[derive(Default)]
pub struct MockSqlSupervisor {
    pub started_with: Mutex<Option<Option<String>>>,
    pub log_index: AtomicU64,
    pub ready: AtomicBool,
    pub sync_calls: Mutex<Vec<Vec<SyncPeer>>>,
}

impl MockSqlSupervisor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_ready(&self, log_index: u64) {
        self.log_index.store(log_index, Ordering::SeqCst);
        self.ready.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SqlSupervisor for MockSqlSupervisor {
    async fn start(&self, join_addr: Option<String>) -> Result<()> {
        *self.started_with.lock() = Some(join_addr);
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn log_index(&self) -> u64 {
        self.log_index.load(Ordering::SeqCst)
    }

    async fn trigger_sync(&self, peers: Vec<SyncPeer>) -> Result<()> {
        self.sync_calls.lock().push(peers);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_response_parses_ready_and_log_index() {
        let body = serde_json::json!({ "ready": true, "log_index": 42 });
        let status: StatusResponse = serde_json::from_value(body).unwrap();
        assert!(status.ready);
        assert_eq!(status.log_index, 42);
    }
}
