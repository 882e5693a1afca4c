//! WASM engine data model (§3).

use chrono::{DateTime, Utc};
use orama_core::{RequestId, TriggerKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionStatus {
    Active,
    Inactive,
    Error,
}

/// `(id, namespace, name, version, ...)`, unique key `(namespace, name, version)`
/// (§3 "Function definition").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub id: String,
    pub namespace: String,
    pub name: String,
    pub version: u32,
    pub wasm_cid: String,
    pub memory_limit_mb: u32,
    pub timeout_s: u64,
    pub is_public: bool,
    pub retry_count: u32,
    pub retry_delay_s: u64,
    pub dlq_topic: Option<String>,
    pub env_vars: HashMap<String, String>,
    pub status: FunctionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
}

/// Immutable for the lifetime of one invocation (§3 "Invocation context").
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub request_id: RequestId,
    pub function_id: String,
    pub namespace: String,
    pub caller_identity: Option<String>,
    pub trigger_kind: TriggerKind,
    pub ws_client_id: Option<String>,
    pub env_vars: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Success,
    Error,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
}

/// One record per attempt that reached the executor (§4.3.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub id: String,
    pub function_id: String,
    pub request_id: String,
    pub trigger_kind: TriggerKind,
    pub caller_identity: Option<String>,
    pub input_size: usize,
    pub output_size: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub status: InvocationStatus,
    pub error_message: Option<String>,
    pub logs: Vec<LogEntry>,
}

/// The DLQ payload published after retry exhaustion (§4.3.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqMessage {
    pub function_id: String,
    pub namespace: String,
    pub request_id: String,
    pub input: Vec<u8>,
    pub error: String,
    pub failed_at: DateTime<Utc>,
    pub trigger_kind: TriggerKind,
    pub caller_identity: Option<String>,
}
