//! External services the host ABI fans out to (§4.3.3): SQL, object
//! storage, cache, secrets, and HTTP egress. Unavailable services return
//! empty/0 and record an error on the host side — they never abort the
//! guest (§4.3.3 "Host-ABI calls never abort the guest").

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

#[async_trait]
pub trait SqlClient: Send + Sync {
    async fn query(&self, sql: &str, args_json: &str) -> anyhow::Result<String>;
    async fn execute(&self, sql: &str, args_json: &str) -> anyhow::Result<u32>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn fetch(&self, cid: &str) -> anyhow::Result<Vec<u8>>;
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl_s: u64) -> anyhow::Result<()>;
    async fn incr_by(&self, key: &str, delta: i64) -> anyhow::Result<i64>;
}

#[async_trait]
pub trait SecretsStore: Send + Sync {
    async fn get_secret(&self, namespace: &str, name: &str) -> anyhow::Result<Option<String>>;
}

/// Talks to the same SQL engine control port `ProcessSqlSupervisor` drives
/// (§4.3.3 `db_query`/`db_execute`), one HTTP request per call.
pub struct HttpSqlClient {
    http: reqwest::Client,
    http_port: u16,
}

impl HttpSqlClient {
    pub fn new(http_port: u16) -> Arc<Self> {
        Arc::new(Self {
            http: reqwest::Client::new(),
            http_port,
        })
    }

    fn control_url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.http_port, path)
    }

    fn args_value(args_json: &str) -> serde_json::Value {
        serde_json::from_str(args_json).unwrap_or(serde_json::Value::Null)
    }
}

#[async_trait]
impl SqlClient for HttpSqlClient {
    async fn query(&self, sql: &str, args_json: &str) -> anyhow::Result<String> {
        let body = serde_json::json!({ "sql": sql, "args": Self::args_value(args_json) });
        let resp = self
            .http
            .post(self.control_url("/query"))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.text().await?)
    }

    async fn execute(&self, sql: &str, args_json: &str) -> anyhow::Result<u32> {
        let body = serde_json::json!({ "sql": sql, "args": Self::args_value(args_json) });
        let resp = self
            .http
            .post(self.control_url("/execute"))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let value: serde_json::Value = resp.json().await?;
        Ok(value.get("rows_affected").and_then(|v| v.as_u64()).unwrap_or(0) as u32)
    }
}

/// In-memory implementations used by tests and by nodes with no configured
/// external backend. Each call still goes through the trait so the ABI
/// layer is indifferent to which implementation backs it.
#[derive(Default)]
pub struct InMemoryCacheStore {
    values: DashMap<String, Vec<u8>>,
    counters: DashMap<String, AtomicI64>,
}

impl InMemoryCacheStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.values.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_s: u64) -> anyhow::Result<()> {
        // No expire call plumbed in yet (§9(a)) — callers must reject a
        // non-zero ttl before reaching here; this is a second check.
        if ttl_s != 0 {
            return Err(anyhow::anyhow!("in-memory cache store does not support a TTL"));
        }
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> anyhow::Result<i64> {
        let counter = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| AtomicI64::new(0));
        Ok(counter.fetch_add(delta, Ordering::SeqCst) + delta)
    }
}

#[derive(Default)]
pub struct InMemorySecretsStore {
    secrets: HashMap<(String, String), String>,
}

impl InMemorySecretsStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_secret(mut self, namespace: &str, name: &str, value: &str) -> Self {
        self.secrets
            .insert((namespace.to_string(), name.to_string()), value.to_string());
        self
    }
}

#[async_trait]
impl SecretsStore for InMemorySecretsStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryObjectStore {
    modules: DashMap<String, Vec<u8>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, cid: &str, bytes: Vec<u8>) {
        self.modules.insert(cid.to_string(), bytes);
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn fetch(&self, cid: &str) -> anyhow::Result<Vec<u8>> {
        self.modules
            .get(cid)
            .map(|v| v.clone())
            .ok_or_else(|| anyhow::anyhow!("no object for cid {cid}"))
    }
}

/// `reqwest`-backed HTTP egress used by the `http_fetch` ABI call.
pub struct HttpEgress {
    client: reqwest::Client,
}

impl HttpEgress {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub async fn fetch(
        &self,
        method: &str,
        url: &str,
        headers: HashMap<String, String>,
        body: Vec<u8>,
    ) -> serde_json::Value {
        let method = match reqwest::Method::from_bytes(method.as_bytes()) {
            Ok(m) => m,
            Err(_) => {
                return serde_json::json!({ "error": "invalid method", "status": 0 });
            }
        };
        let mut req = self.client.request(method, url);
        for (k, v) in headers {
            req = req.header(k, v);
        }
        if !body.is_empty() {
            req = req.body(body);
        }
        match req.send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let headers: HashMap<String, String> = resp
                    .headers()
                    .iter()
                    .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
                    .collect();
                let body = resp.text().await.unwrap_or_default();
                serde_json::json!({ "status": status, "headers": headers, "body": body })
            }
            Err(e) => serde_json::json!({ "error": e.to_string(), "status": 0 }),
        }
    }
}

impl Default for HttpEgress {
    fn default() -> Self {
        Self::new()
    }
}
