//! Config file, environment, and flag merging into `NodeConfig` (§6).
//!
//! Precedence is CLI flags, then environment variables, then the config
//! file, then built-in defaults. (The spec text names both orderings in
//! the same sentence; flags-over-env is the one every other `config`
//! consumer in this position assumes, so that is what wins here — see
//! DESIGN.md.) The config file is read with the `config` crate; list-
//! valued environment variables (`ORAMA_LISTEN_ADDRESSES`,
//! `ORAMA_BOOTSTRAP_PEERS`) are comma-separated, which the `config` crate's
//! generic `Environment` source does not parse the same way across
//! versions, so those two are read directly via `std::env`.

use anyhow::{Context, Result};
use orama_core::{AdvertiseMode, NodeConfig};
use serde::Deserialize;
use std::path::PathBuf;

use crate::cli::{Cli, CliAdvertiseMode, CliLogFormat};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
struct FileConfig {
    data_dir: Option<String>,
    listen_addresses: Option<Vec<String>>,
    bootstrap_peers: Option<Vec<String>>,
    sql_http_port: Option<u16>,
    raft_port: Option<u16>,
    sql_join_addr: Option<String>,
    advertise_mode: Option<String>,
    external_ip: Option<String>,
    gateway_listen_addr: Option<String>,
    dev_local: Option<bool>,
    is_bootstrap: Option<bool>,
    sql_engine_binary: Option<String>,
    log_format: Option<String>,
}

/// Output of the merge: the shared `NodeConfig` (which already carries
/// `is_bootstrap`) plus the handful of settings specific to this binary
/// (the SQL engine's location and the log format).
pub struct ResolvedConfig {
    pub node: NodeConfig,
    pub sql_engine_binary: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

pub fn resolve(cli: Cli) -> Result<ResolvedConfig> {
    let file = load_file(cli.config.as_deref())?;
    let env = EnvConfig::read();
    let default = NodeConfig::default();

    let data_dir = cli
        .data_dir
        .or(env.data_dir)
        .or(file.data_dir)
        .map(PathBuf::from)
        .unwrap_or(default.data_dir);

    let listen_addresses = first_non_empty(vec![
        cli.listen_addresses,
        env.listen_addresses.unwrap_or_default(),
        file.listen_addresses.unwrap_or_default(),
    ])
    .unwrap_or(default.listen_addresses);

    let bootstrap_peers = first_non_empty(vec![
        cli.bootstrap_peers,
        env.bootstrap_peers.unwrap_or_default(),
        file.bootstrap_peers.unwrap_or_default(),
    ])
    .unwrap_or(default.bootstrap_peers);

    let sql_http_port = cli
        .sql_http_port
        .or(env.sql_http_port)
        .or(file.sql_http_port)
        .unwrap_or(default.sql_http_port);

    let raft_port = cli
        .raft_port
        .or(env.raft_port)
        .or(file.raft_port)
        .unwrap_or(default.raft_port);

    let sql_join_addr = cli.sql_join_addr.or(env.sql_join_addr).or(file.sql_join_addr);

    let advertise_mode = cli
        .advertise_mode
        .map(from_cli_advertise_mode)
        .or(env.advertise_mode.as_deref().and_then(parse_advertise_mode))
        .or(file.advertise_mode.as_deref().and_then(parse_advertise_mode))
        .unwrap_or(default.advertise_mode);

    let external_ip = cli.external_ip.or(env.external_ip).or(file.external_ip);

    let gateway_listen_addr = cli
        .gateway_listen_addr
        .or(env.gateway_listen_addr)
        .or(file.gateway_listen_addr)
        .or(default.gateway_listen_addr);

    let dev_local = cli.dev_local || env.dev_local.unwrap_or(false) || file.dev_local.unwrap_or(false);

    let is_bootstrap =
        cli.is_bootstrap || env.is_bootstrap.unwrap_or(false) || file.is_bootstrap.unwrap_or(false);

    let sql_engine_binary = cli
        .sql_engine_binary
        .or(env.sql_engine_binary)
        .or(file.sql_engine_binary)
        .unwrap_or_else(|| "orama-sql-engine".to_string());

    let log_format = cli
        .log_format
        .map(from_cli_log_format)
        .or(env.log_format.as_deref().and_then(parse_log_format))
        .or(file.log_format.as_deref().and_then(parse_log_format))
        .unwrap_or(LogFormat::Pretty);

    let node = NodeConfig {
        data_dir,
        listen_addresses,
        bootstrap_peers,
        sql_http_port,
        raft_port,
        sql_join_addr,
        advertise_mode,
        external_ip,
        gateway_listen_addr,
        dev_local,
        is_bootstrap,
    };

    if node.advertise_mode == AdvertiseMode::Ip && node.external_ip.is_none() {
        anyhow::bail!("advertise-mode=ip requires an external IP (--external-ip or ORAMA_EXTERNAL_IP)");
    }

    Ok(ResolvedConfig {
        node,
        sql_engine_binary,
        log_format,
    })
}

fn load_file(path: Option<&str>) -> Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path).required(true))
        .build()
        .with_context(|| format!("loading config file {path}"))?;
    settings
        .try_deserialize()
        .with_context(|| format!("parsing config file {path}"))
}

#[derive(Default)]
struct EnvConfig {
    data_dir: Option<String>,
    listen_addresses: Option<Vec<String>>,
    bootstrap_peers: Option<Vec<String>>,
    sql_http_port: Option<u16>,
    raft_port: Option<u16>,
    sql_join_addr: Option<String>,
    advertise_mode: Option<String>,
    external_ip: Option<String>,
    gateway_listen_addr: Option<String>,
    dev_local: Option<bool>,
    is_bootstrap: Option<bool>,
    sql_engine_binary: Option<String>,
    log_format: Option<String>,
}

impl EnvConfig {
    fn read() -> Self {
        Self {
            data_dir: env_string("ORAMA_DATA_DIR"),
            listen_addresses: env_list("ORAMA_LISTEN_ADDRESSES"),
            bootstrap_peers: env_list("ORAMA_BOOTSTRAP_PEERS"),
            sql_http_port: env_parsed("ORAMA_SQL_HTTP_PORT"),
            raft_port: env_parsed("ORAMA_RAFT_PORT"),
            sql_join_addr: env_string("ORAMA_SQL_JOIN_ADDR"),
            advertise_mode: env_string("ORAMA_ADVERTISE_MODE"),
            external_ip: env_string("ORAMA_EXTERNAL_IP"),
            gateway_listen_addr: env_string("ORAMA_GATEWAY_LISTEN_ADDR"),
            dev_local: env_parsed("ORAMA_DEV_LOCAL"),
            is_bootstrap: env_parsed("ORAMA_IS_BOOTSTRAP"),
            sql_engine_binary: env_string("ORAMA_SQL_ENGINE_BINARY"),
            log_format: env_string("ORAMA_LOG_FORMAT"),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env_string(key).map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
}

fn first_non_empty(candidates: Vec<Vec<String>>) -> Option<Vec<String>> {
    candidates.into_iter().find(|v| !v.is_empty())
}

fn parse_advertise_mode(raw: &str) -> Option<AdvertiseMode> {
    match raw.to_ascii_lowercase().as_str() {
        "auto" => Some(AdvertiseMode::Auto),
        "localhost" => Some(AdvertiseMode::Localhost),
        "ip" => Some(AdvertiseMode::Ip),
        _ => None,
    }
}

fn from_cli_advertise_mode(mode: CliAdvertiseMode) -> AdvertiseMode {
    match mode {
        CliAdvertiseMode::Auto => AdvertiseMode::Auto,
        CliAdvertiseMode::Localhost => AdvertiseMode::Localhost,
        CliAdvertiseMode::Ip => AdvertiseMode::Ip,
    }
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.to_ascii_lowercase().as_str() {
        "pretty" => Some(LogFormat::Pretty),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

fn from_cli_log_format(format: CliLogFormat) -> LogFormat {
    match format {
        CliLogFormat::Pretty => LogFormat::Pretty,
        CliLogFormat::Json => LogFormat::Json,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            config: None,
            data_dir: None,
            listen_addresses: Vec::new(),
            bootstrap_peers: Vec::new(),
            sql_http_port: None,
            raft_port: None,
            sql_join_addr: None,
            advertise_mode: None,
            external_ip: None,
            gateway_listen_addr: None,
            dev_local: false,
            is_bootstrap: false,
            sql_engine_binary: None,
            log_format: None,
        }
    }

    #[test]
    fn defaults_apply_when_nothing_set() {
        let resolved = resolve(base_cli()).unwrap();
        assert_eq!(resolved.node.sql_http_port, NodeConfig::default().sql_http_port);
        assert_eq!(resolved.sql_engine_binary, "orama-sql-engine");
        assert_eq!(resolved.log_format, LogFormat::Pretty);
    }

    #[test]
    fn cli_flag_wins_over_everything() {
        std::env::set_var("ORAMA_SQL_HTTP_PORT", "9999");
        let mut cli = base_cli();
        cli.sql_http_port = Some(1234);
        let resolved = resolve(cli).unwrap();
        assert_eq!(resolved.node.sql_http_port, 1234);
        std::env::remove_var("ORAMA_SQL_HTTP_PORT");
    }

    #[test]
    fn env_wins_over_default() {
        std::env::set_var("ORAMA_RAFT_PORT", "4300");
        let resolved = resolve(base_cli()).unwrap();
        assert_eq!(resolved.node.raft_port, 4300);
        std::env::remove_var("ORAMA_RAFT_PORT");
    }

    #[test]
    fn ip_advertise_mode_without_external_ip_is_rejected() {
        let mut cli = base_cli();
        cli.advertise_mode = Some(CliAdvertiseMode::Ip);
        assert!(resolve(cli).is_err());
    }
}
