//! Command-line flags (§6 "Configuration (flags and environment)").
//!
//! Every field is optional here: an absent flag falls through to the
//! environment, then the config file, then the built-in default. The merge
//! itself happens in [`crate::config`]; this module only describes what
//! `clap` recognises and how it parses.

use clap::{Parser, ValueEnum};

/// `oramad` — runs one node of the cluster.
#[derive(Parser, Debug)]
#[command(name = "oramad")]
#[command(about = "Orama distributed node: p2p host, SQL cluster membership, and WASM engine")]
#[command(version)]
pub struct Cli {
    /// Path to a TOML or YAML config file. Values here are shadowed by
    /// environment variables, which are in turn shadowed by flags below.
    #[arg(short, long)]
    pub config: Option<String>,

    /// Root for identity, caches, and working files.
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Multiaddr for the p2p host to listen on. Repeatable.
    #[arg(long = "listen")]
    pub listen_addresses: Vec<String>,

    /// Bootstrap peer multiaddr, `/ip4|ip6|dns*/.../tcp/PORT/p2p/PEERID`.
    /// Repeatable; order determines join-address preference.
    #[arg(long = "bootstrap")]
    pub bootstrap_peers: Vec<String>,

    /// HTTP port advertised for the external SQL engine.
    #[arg(long)]
    pub sql_http_port: Option<u16>,

    /// Raft port advertised for the external SQL engine.
    #[arg(long)]
    pub raft_port: Option<u16>,

    /// Explicit join address override; skips the decision function.
    #[arg(long)]
    pub sql_join_addr: Option<String>,

    /// `auto` | `localhost` | `ip`.
    #[arg(long, value_enum)]
    pub advertise_mode: Option<CliAdvertiseMode>,

    /// Explicit external IP, used only when `advertise-mode=ip`.
    #[arg(long)]
    pub external_ip: Option<String>,

    /// Plain HTTP listen address for the API gateway.
    #[arg(long)]
    pub gateway_listen_addr: Option<String>,

    /// Forces loopback defaults for single-host development.
    #[arg(long)]
    pub dev_local: bool,

    /// Declares this node a bootstrap node for the join-address decision.
    #[arg(long)]
    pub is_bootstrap: bool,

    /// Path to the external replicated-SQL engine binary.
    #[arg(long)]
    pub sql_engine_binary: Option<String>,

    /// Log output format: `pretty` for interactive terminals, `json` for
    /// log aggregation pipelines.
    #[arg(long, value_enum)]
    pub log_format: Option<CliLogFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum CliAdvertiseMode {
    Auto,
    Localhost,
    Ip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum CliLogFormat {
    Pretty,
    Json,
}
