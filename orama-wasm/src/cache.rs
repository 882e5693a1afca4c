//! Compiled-module cache (§4.3.1): `wasm_cid -> compiled_module`, bounded
//! LRU, single-flight compilation per cid.

use crate::error::ExecutorError;
use crate::services::ObjectStore;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, trace};
use wasmtime::{Engine, Module};

type CompileResult = Result<Arc<Module>, String>;

pub struct ModuleCache {
    engine: Engine,
    object_store: Arc<dyn ObjectStore>,
    cache: Mutex<LruCache<String, Arc<Module>>>,
    in_flight: dashmap::DashMap<String, Arc<OnceCell<CompileResult>>>,
}

impl ModuleCache {
    pub fn new(engine: Engine, object_store: Arc<dyn ObjectStore>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            engine,
            object_store,
            cache: Mutex::new(LruCache::new(capacity)),
            in_flight: dashmap::DashMap::new(),
        }
    }

    /// Fetch-and-compile on miss; concurrent misses for the same cid share
    /// one compilation (§3 "contended miss" / property 5).
    pub async fn get_or_compile(&self, function_name: &str, cid: &str) -> Result<Arc<Module>, ExecutorError> {
        if let Some(module) = self.cache.lock().get(cid).cloned() {
            trace!(%cid, "module cache hit");
            return Ok(module);
        }

        let cell = self
            .in_flight
            .entry(cid.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result: CompileResult = cell
            .get_or_try_init(|| self.compile(cid))
            .await
            .expect("compile() is infallible at the OnceCell layer")
            .clone();

        // Whichever caller's compile populated the cell, all callers race
        // to clean up the in-flight entry; the first removal wins, later
        // ones are no-ops.
        self.in_flight.remove(cid);

        match result {
            Ok(module) => Ok(module),
            Err(cause) => Err(ExecutorError::DeployError {
                function: function_name.to_string(),
                cause,
            }),
        }
    }

    async fn compile(&self, cid: &str) -> Result<CompileResult, std::convert::Infallible> {
        let bytes = match self.object_store.fetch(cid).await {
            Ok(b) => b,
            Err(e) => return Ok(Err(format!("fetch failed: {e}"))),
        };
        if bytes.is_empty() {
            return Ok(Err("empty module bytes".to_string()));
        }
        let engine = self.engine.clone();
        let compiled = tokio::task::spawn_blocking(move || Module::new(&engine, &bytes))
            .await
            .map_err(|e| format!("compile task panicked: {e}"));
        let module = match compiled {
            Ok(Ok(m)) => Arc::new(m),
            Ok(Err(e)) => return Ok(Err(format!("compile failed: {e}"))),
            Err(e) => return Ok(Err(e)),
        };
        debug!(%cid, "compiled module");
        self.cache.lock().put(cid.to_string(), module.clone());
        Ok(Ok(module))
    }

    /// Remove and release `cid` unconditionally (§4.3.1 "Invalidate").
    pub fn invalidate(&self, cid: &str) {
        self.cache.lock().pop(cid);
        self.in_flight.remove(cid);
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryObjectStore;

    fn wat_module() -> Vec<u8> {
        wat::parse_str(r#"(module (func (export "_start")))"#).unwrap()
    }

    #[tokio::test]
    async fn compiles_once_and_caches() {
        let engine = Engine::default();
        let store = InMemoryObjectStore::new();
        store.put("cid1", wat_module());
        let cache = ModuleCache::new(engine, store, 10);

        let a = cache.get_or_compile("f", "cid1").await.unwrap();
        let b = cache.get_or_compile("f", "cid1").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_recompile() {
        let engine = Engine::default();
        let store = InMemoryObjectStore::new();
        store.put("cid1", wat_module());
        let cache = ModuleCache::new(engine, store, 10);

        let a = cache.get_or_compile("f", "cid1").await.unwrap();
        cache.invalidate("cid1");
        assert_eq!(cache.len(), 0);
        let b = cache.get_or_compile("f", "cid1").await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn empty_bytes_are_rejected() {
        let engine = Engine::default();
        let store = InMemoryObjectStore::new();
        store.put("cid-empty", Vec::new());
        let cache = ModuleCache::new(engine, store, 10);
        let result = cache.get_or_compile("f", "cid-empty").await;
        assert!(matches!(result, Err(ExecutorError::DeployError { .. })));
    }
}
