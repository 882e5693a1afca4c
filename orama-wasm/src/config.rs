//! WASM engine configuration and timing constants (§4.3).

use std::time::Duration;

/// Default bound on the compiled-module cache (§3 "Compiled-module cache entry").
pub const DEFAULT_MODULE_CACHE_SIZE: usize = 100;

/// Epoch-interruption tick period; the executor's deadline is expressed in
/// whole ticks of this duration.
pub const EPOCH_TICK: Duration = Duration::from_millis(50);

/// Retry delay cap (§4.3.4).
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(5 * 60);

/// How long `pubsub_publish` waits for at least one mesh peer before
/// flood-publishing anyway (§5 suspension point (c)).
pub const PUBLISH_MESH_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct WasmConfig {
    pub module_cache_size: usize,
    /// Hard ceiling on any function's requested timeout.
    pub max_timeout_s: u64,
}

impl Default for WasmConfig {
    fn default() -> Self {
        Self {
            module_cache_size: DEFAULT_MODULE_CACHE_SIZE,
            max_timeout_s: 60,
        }
    }
}
