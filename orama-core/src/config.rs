//! Node-wide configuration primitives (§6 "Configuration").
//!
//! Only the settings every subsystem needs a copy of live here —
//! `NodeConfig` and `AdvertiseMode`. Each subsystem crate (`orama-p2p`,
//! `orama-cluster`, `orama-wasm`, `orama-ws`) owns its own narrower config
//! struct; `orama-cli` is the only crate that depends on all of them and is
//! where they are assembled and loaded from file/env/flags.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How this node should advertise itself when a loopback address needs
/// translating into something a remote peer can dial (§4.2 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AdvertiseMode {
    /// Auto-detect: translate loopback addresses to a non-loopback local
    /// interface address.
    #[default]
    Auto,
    /// Force loopback addresses verbatim (single-host development).
    Localhost,
    /// Force a specific advertised IP (see `NodeConfig::external_ip`).
    Ip,
}

/// Settings shared by every subsystem: identity location, listen/bootstrap
/// addressing, and the SQL engine's advertised endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Root for identity, caches, and working files.
    pub data_dir: PathBuf,

    /// Multiaddrs for the p2p host (TCP and QUIC accepted).
    pub listen_addresses: Vec<String>,

    /// Ordered list of `/ip4|ip6|dns*/.../tcp/PORT/p2p/PEERID` bootstrap
    /// peers. Ordering only determines which primary to prefer when
    /// deriving the SQL join address (§3 "Bootstrap target").
    pub bootstrap_peers: Vec<String>,

    /// HTTP port advertised for the external SQL engine.
    pub sql_http_port: u16,

    /// Raft port advertised for the external SQL engine.
    pub raft_port: u16,

    /// Explicit join-address override; skips the decision function
    /// entirely (§4.2 step 1).
    pub sql_join_addr: Option<String>,

    /// `auto` | `localhost` | `ip`.
    pub advertise_mode: AdvertiseMode,

    /// Explicit external IP, used only when `advertise_mode == Ip`.
    pub external_ip: Option<String>,

    /// Plain HTTP listen address for the API gateway (external collaborator
    /// — not implemented by this core, just configured for it).
    pub gateway_listen_addr: Option<String>,

    /// Forces loopback defaults for single-host development.
    pub dev_local: bool,

    /// Declares this node a bootstrap node for the decision function
    /// (§4.2 step 2/3).
    pub is_bootstrap: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            listen_addresses: vec!["/ip4/0.0.0.0/tcp/4001".to_string()],
            bootstrap_peers: Vec::new(),
            sql_http_port: 8090,
            raft_port: 8091,
            sql_join_addr: None,
            advertise_mode: AdvertiseMode::Auto,
            external_ip: None,
            gateway_listen_addr: Some("0.0.0.0:8080".to_string()),
            dev_local: false,
            is_bootstrap: false,
        }
    }
}

impl NodeConfig {
    /// `<data_dir>/identity.key`
    pub fn identity_path(&self) -> PathBuf {
        self.data_dir.join("identity.key")
    }

    /// `<data_dir>/peer.info`
    pub fn peer_info_path(&self) -> PathBuf {
        self.data_dir.join("peer.info")
    }
}
