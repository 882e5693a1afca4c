//! Orama Core — identity, configuration, error taxonomy, and shared types.
//!
//! This crate deliberately has no dependency on any other Orama subsystem
//! crate: it is the common foundation `orama-p2p`, `orama-cluster`,
//! `orama-wasm`, and `orama-ws` all build on, so it must not depend back on
//! any of them (a cycle `orama-core -> orama-p2p -> orama-core` is not
//! something Cargo permits, and it is also the exact "cyclic references"
//! problem §9 calls out). The actual node orchestrator that owns one
//! instance of every subsystem lives in `orama-cli`, the only crate that
//! depends on all of them.

pub mod config;
pub mod error;
pub mod identity;
pub mod task;
pub mod types;

pub use config::{AdvertiseMode, NodeConfig};
pub use error::OramaError;
pub use identity::Identity;
pub use task::TaskSupervisor;
pub use types::{unix_now, NodeKind, RequestId, TriggerKind};
