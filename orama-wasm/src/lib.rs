//! WASM serverless engine (§4.3): compiled-module cache, sandboxed
//! execution with a host ABI, and an invoker that adds authorization, retry,
//! and DLQ semantics on top. Function and invocation-record storage is
//! external (SQL); this crate only runs the functions it is handed.

pub mod abi;
pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod invoker;
pub mod logger;
pub mod rate_limit;
pub mod services;
pub mod types;

pub use config::WasmConfig;
pub use error::ExecutorError;
pub use executor::WasmExecutor;
pub use invoker::WasmInvoker;
pub use logger::{InMemoryInvocationLogger, InvocationLogger};
pub use rate_limit::{NoopRateLimiter, RateLimiter, TokenBucketRateLimiter};
pub use types::{DlqMessage, FunctionDefinition, FunctionStatus, InvocationContext, InvocationRecord, InvocationStatus};

use crate::services::{CacheStore, ObjectStore, SecretsStore, SqlClient};
use orama_core::task::TaskSupervisor;
use orama_p2p::P2pHost;
use std::sync::Arc;

/// Everything needed to run one node's WASM workload, wired from its
/// external-service seams to a ready `invoke()` call.
pub struct WasmEngine {
    invoker: WasmInvoker,
}

impl WasmEngine {
    pub fn start(
        object_store: Arc<dyn ObjectStore>,
        sql: Option<Arc<dyn SqlClient>>,
        cache_store: Option<Arc<dyn CacheStore>>,
        secrets: Option<Arc<dyn SecretsStore>>,
        pubsub: Option<P2pHost>,
        rate_limiter: Arc<dyn RateLimiter>,
        config: WasmConfig,
        supervisor: &TaskSupervisor,
    ) -> anyhow::Result<Self> {
        let executor = WasmExecutor::new(
            object_store,
            rate_limiter,
            sql,
            cache_store,
            secrets,
            pubsub.clone(),
            config,
            supervisor,
        )?;
        let logger = InMemoryInvocationLogger::new(1_000);
        let invoker = WasmInvoker::new(Arc::new(executor), logger, pubsub);
        Ok(Self { invoker })
    }

    pub fn invoker(&self) -> &WasmInvoker {
        &self.invoker
    }
}
