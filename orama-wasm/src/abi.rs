//! Host ABI (§4.3.3): every function is registered under both `env` and
//! `host` so guests from either import convention resolve. Arguments and
//! rich return values are read from / written into the guest's linear
//! memory; byte-carrying returns use the packed `(ptr << 32) | len`
//! convention via the guest's `orama_alloc`/`malloc` export.
//!
//! Per-invocation state (the invocation context, the log buffer, and the
//! service handles) lives in the `wasmtime::Store`'s data (`StoreState`),
//! which already gives the "host-ABI sees only the currently set
//! invocation context, cleared on return" invariant: each invocation gets
//! its own `Store`, constructed right before instantiation and dropped
//! right after, so there is nothing shared across invocations to lock.

use crate::services::{CacheStore, HttpEgress, SecretsStore, SqlClient};
use crate::types::{InvocationContext, LogEntry};
use orama_p2p::P2pHost;
use std::collections::HashMap;
use std::sync::Arc;
use wasmtime::{Caller, Linker, Memory};

/// Per-invocation store data. One instance per `Execute` call.
pub struct StoreState {
    pub wasi: wasmtime_wasi::WasiCtx,
    pub invocation_ctx: InvocationContext,
    pub logs: Vec<LogEntry>,
    pub sql: Option<Arc<dyn SqlClient>>,
    pub cache: Option<Arc<dyn CacheStore>>,
    pub secrets: Option<Arc<dyn SecretsStore>>,
    pub http: Arc<HttpEgress>,
    pub pubsub: Option<P2pHost>,
}

fn memory(caller: &mut Caller<'_, StoreState>) -> Option<Memory> {
    caller.get_export("memory")?.into_memory()
}

fn read_string(caller: &mut Caller<'_, StoreState>, ptr: u32, len: u32) -> Option<String> {
    if len == 0 {
        return Some(String::new());
    }
    let memory = memory(caller)?;
    let mut buf = vec![0u8; len as usize];
    memory.read(caller, ptr as usize, &mut buf).ok()?;
    String::from_utf8(buf).ok()
}

/// Write `data` into guest memory via its exported allocator and return the
/// packed `(ptr << 32) | len` value, or 0 if the guest exposes no usable
/// allocator/memory or `data` is empty.
async fn write_packed(caller: &mut Caller<'_, StoreState>, data: &[u8]) -> u64 {
    if data.is_empty() {
        return 0;
    }
    let Some(memory) = memory(caller) else {
        return 0;
    };
    let alloc_export = caller
        .get_export("orama_alloc")
        .or_else(|| caller.get_export("malloc"));
    let Some(alloc_func) = alloc_export.and_then(|e| e.into_func()) else {
        return 0;
    };
    let Ok(typed) = alloc_func.typed::<u32, u32>(&caller) else {
        return 0;
    };
    let Ok(ptr) = typed.call_async(&mut *caller, data.len() as u32).await else {
        return 0;
    };
    if memory.write(&mut *caller, ptr as usize, data).is_err() {
        return 0;
    }
    ((ptr as u64) << 32) | data.len() as u64
}

/// Register every host-ABI function under both `env` and `host` (§4.3.3).
pub fn link(linker: &mut Linker<StoreState>) -> anyhow::Result<()> {
    for module in ["env", "host"] {
        linker.func_wrap0_async(module, "get_caller_wallet", |mut caller: Caller<'_, StoreState>| {
            Box::new(async move {
                let wallet = caller.data().invocation_ctx.caller_identity.clone().unwrap_or_default();
                write_packed(&mut caller, wallet.as_bytes()).await
            })
        })?;

        linker.func_wrap0_async(module, "get_request_id", |mut caller: Caller<'_, StoreState>| {
            Box::new(async move {
                let id = caller.data().invocation_ctx.request_id.to_string();
                write_packed(&mut caller, id.as_bytes()).await
            })
        })?;

        linker.func_wrap2_async(
            module,
            "get_env",
            |mut caller: Caller<'_, StoreState>, key_ptr: u32, key_len: u32| {
                Box::new(async move {
                    let Some(key) = read_string(&mut caller, key_ptr, key_len) else {
                        return 0;
                    };
                    let value = caller.data().invocation_ctx.env_vars.get(&key).cloned();
                    match value {
                        Some(v) => write_packed(&mut caller, v.as_bytes()).await,
                        None => 0,
                    }
                })
            },
        )?;

        linker.func_wrap2_async(
            module,
            "get_secret",
            |mut caller: Caller<'_, StoreState>, name_ptr: u32, name_len: u32| {
                Box::new(async move {
                    let Some(name) = read_string(&mut caller, name_ptr, name_len) else {
                        return 0;
                    };
                    let namespace = caller.data().invocation_ctx.namespace.clone();
                    let Some(secrets) = caller.data().secrets.clone() else {
                        return 0;
                    };
                    match secrets.get_secret(&namespace, &name).await {
                        Ok(Some(v)) => write_packed(&mut caller, v.as_bytes()).await,
                        _ => 0,
                    }
                })
            },
        )?;

        linker.func_wrap4_async(
            module,
            "db_query",
            |mut caller: Caller<'_, StoreState>, sql_ptr: u32, sql_len: u32, args_ptr: u32, args_len: u32| {
                Box::new(async move {
                    let (Some(sql), Some(args)) = (
                        read_string(&mut caller, sql_ptr, sql_len),
                        read_string(&mut caller, args_ptr, args_len),
                    ) else {
                        return 0;
                    };
                    let Some(client) = caller.data().sql.clone() else {
                        return 0;
                    };
                    match client.query(&sql, &args).await {
                        Ok(rows) => write_packed(&mut caller, rows.as_bytes()).await,
                        Err(_) => 0,
                    }
                })
            },
        )?;

        linker.func_wrap4_async(
            module,
            "db_execute",
            |mut caller: Caller<'_, StoreState>, sql_ptr: u32, sql_len: u32, args_ptr: u32, args_len: u32| {
                Box::new(async move {
                    let (Some(sql), Some(args)) = (
                        read_string(&mut caller, sql_ptr, sql_len),
                        read_string(&mut caller, args_ptr, args_len),
                    ) else {
                        return 0u32;
                    };
                    let Some(client) = caller.data().sql.clone() else {
                        return 0u32;
                    };
                    client.execute(&sql, &args).await.unwrap_or(0)
                })
            },
        )?;

        linker.func_wrap2_async(
            module,
            "cache_get",
            |mut caller: Caller<'_, StoreState>, key_ptr: u32, key_len: u32| {
                Box::new(async move {
                    let Some(key) = read_string(&mut caller, key_ptr, key_len) else {
                        return 0;
                    };
                    let Some(cache) = caller.data().cache.clone() else {
                        return 0;
                    };
                    match cache.get(&key).await {
                        Ok(Some(value)) => write_packed(&mut caller, &value).await,
                        _ => 0,
                    }
                })
            },
        )?;

        // Non-zero `ttl_s` is rejected outright (the documented "no value"
        // path, returning 0) until a cache driver with a real expire call is
        // wired in (§9(a)).
        linker.func_wrap5_async(
            module,
            "cache_set",
            |mut caller: Caller<'_, StoreState>,
             key_ptr: u32,
             key_len: u32,
             value_ptr: u32,
             value_len: u32,
             ttl_s: u32| {
                Box::new(async move {
                    if ttl_s != 0 {
                        return 0u32;
                    }
                    let Some(key) = read_string(&mut caller, key_ptr, key_len) else {
                        return 0u32;
                    };
                    let Some(value) = memory(&mut caller).and_then(|m| {
                        let mut buf = vec![0u8; value_len as usize];
                        m.read(&caller, value_ptr as usize, &mut buf).ok()?;
                        Some(buf)
                    }) else {
                        return 0u32;
                    };
                    let Some(cache) = caller.data().cache.clone() else {
                        return 0u32;
                    };
                    match cache.set(&key, value, 0).await {
                        Ok(()) => 1,
                        Err(_) => 0,
                    }
                })
            },
        )?;

        linker.func_wrap3_async(
            module,
            "cache_incr_by",
            |mut caller: Caller<'_, StoreState>, key_ptr: u32, key_len: u32, delta: i64| {
                Box::new(async move {
                    let Some(key) = read_string(&mut caller, key_ptr, key_len) else {
                        return 0i64;
                    };
                    let Some(cache) = caller.data().cache.clone() else {
                        return 0i64;
                    };
                    cache.incr_by(&key, delta).await.unwrap_or(0)
                })
            },
        )?;

        linker.func_wrap2_async(
            module,
            "cache_incr",
            |mut caller: Caller<'_, StoreState>, key_ptr: u32, key_len: u32| {
                Box::new(async move {
                    let Some(key) = read_string(&mut caller, key_ptr, key_len) else {
                        return 0i64;
                    };
                    let Some(cache) = caller.data().cache.clone() else {
                        return 0i64;
                    };
                    cache.incr_by(&key, 1).await.unwrap_or(0)
                })
            },
        )?;

        linker.func_wrap8_async(
            module,
            "http_fetch",
            |mut caller: Caller<'_, StoreState>,
             method_ptr: u32,
             method_len: u32,
             url_ptr: u32,
             url_len: u32,
             headers_ptr: u32,
             headers_len: u32,
             body_ptr: u32,
             body_len: u32| {
                Box::new(async move {
                    let (Some(method), Some(url)) = (
                        read_string(&mut caller, method_ptr, method_len),
                        read_string(&mut caller, url_ptr, url_len),
                    ) else {
                        return 0;
                    };
                    let headers: HashMap<String, String> = read_string(&mut caller, headers_ptr, headers_len)
                        .and_then(|s| serde_json::from_str(&s).ok())
                        .unwrap_or_default();
                    let body = memory(&mut caller)
                        .and_then(|m| {
                            let mut buf = vec![0u8; body_len as usize];
                            m.read(&caller, body_ptr as usize, &mut buf).ok()?;
                            Some(buf)
                        })
                        .unwrap_or_default();
                    let http = caller.data().http.clone();
                    let envelope = http.fetch(&method, &url, headers, body).await;
                    write_packed(&mut caller, envelope.to_string().as_bytes()).await
                })
            },
        )?;

        linker.func_wrap4_async(
            module,
            "pubsub_publish",
            |mut caller: Caller<'_, StoreState>, topic_ptr: u32, topic_len: u32, data_ptr: u32, data_len: u32| {
                Box::new(async move {
                    let Some(topic) = read_string(&mut caller, topic_ptr, topic_len) else {
                        return 0u32;
                    };
                    let Some(data) = memory(&mut caller).and_then(|m| {
                        let mut buf = vec![0u8; data_len as usize];
                        m.read(&caller, data_ptr as usize, &mut buf).ok()?;
                        Some(buf)
                    }) else {
                        return 0u32;
                    };
                    let Some(host) = caller.data().pubsub.clone() else {
                        return 0u32;
                    };
                    match host.publish(&topic, data).await {
                        Ok(()) => 1,
                        Err(_) => 0,
                    }
                })
            },
        )?;

        linker.func_wrap2_async(
            module,
            "log_info",
            |mut caller: Caller<'_, StoreState>, ptr: u32, len: u32| {
                Box::new(async move {
                    if let Some(msg) = read_string(&mut caller, ptr, len) {
                        caller.data_mut().logs.push(LogEntry {
                            level: "info".to_string(),
                            message: msg,
                        });
                    }
                })
            },
        )?;

        linker.func_wrap2_async(
            module,
            "log_error",
            |mut caller: Caller<'_, StoreState>, ptr: u32, len: u32| {
                Box::new(async move {
                    if let Some(msg) = read_string(&mut caller, ptr, len) {
                        caller.data_mut().logs.push(LogEntry {
                            level: "error".to_string(),
                            message: msg,
                        });
                    }
                })
            },
        )?;
    }

    Ok(())
}
