//! Invocation orchestration (§4.3.4): authorization, retry with exponential
//! backoff, and DLQ publication once the retry budget is exhausted.

use crate::config::MAX_RETRY_DELAY;
use crate::error::ExecutorError;
use crate::executor::WasmExecutor;
use crate::logger::InvocationLogger;
use crate::types::{DlqMessage, FunctionDefinition, InvocationContext, InvocationRecord, InvocationStatus};
use chrono::Utc;
use orama_core::OramaError;
use orama_p2p::P2pHost;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub struct WasmInvoker {
    executor: Arc<WasmExecutor>,
    logger: Arc<dyn InvocationLogger>,
    pubsub: Option<P2pHost>,
}

impl WasmInvoker {
    pub fn new(executor: Arc<WasmExecutor>, logger: Arc<dyn InvocationLogger>, pubsub: Option<P2pHost>) -> Self {
        Self {
            executor,
            logger,
            pubsub,
        }
    }

    /// Authorize the caller, then run `function` up to `retry_count + 1`
    /// times, retrying on everything but NotFound/ResourceExhausted/
    /// Unauthorized/Validation (§4.3.4). Publishes to the function's DLQ
    /// topic on final exhaustion if one is configured. A cancelled `cancel`
    /// stops retrying immediately without a further attempt.
    pub async fn invoke(
        &self,
        function: &FunctionDefinition,
        input: Vec<u8>,
        ctx: InvocationContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, OramaError> {
        self.authorize(function, &ctx)?;

        let max_attempts = function.retry_count + 1;
        let mut last_error: Option<OramaError> = None;

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                break;
            }

            let started_at = Utc::now();
            let result = self.executor.execute(function, input.clone(), ctx.clone()).await;
            let completed_at = Utc::now();

            match result {
                Ok(outcome) => {
                    self.logger.record(InvocationRecord {
                        id: uuid::Uuid::new_v4().to_string(),
                        function_id: function.id.clone(),
                        request_id: ctx.request_id.to_string(),
                        trigger_kind: ctx.trigger_kind,
                        caller_identity: ctx.caller_identity.clone(),
                        input_size: input.len(),
                        output_size: outcome.output.len(),
                        started_at,
                        completed_at,
                        duration_ms: (completed_at - started_at).num_milliseconds(),
                        status: InvocationStatus::Success,
                        error_message: None,
                        logs: outcome.logs,
                    });
                    return Ok(outcome.output);
                }
                Err(executor_err) => {
                    let status = if matches!(executor_err, ExecutorError::Timeout { .. }) {
                        InvocationStatus::Timeout
                    } else {
                        InvocationStatus::Error
                    };
                    let orama_err = executor_err.into_orama_error();
                    self.logger.record(InvocationRecord {
                        id: uuid::Uuid::new_v4().to_string(),
                        function_id: function.id.clone(),
                        request_id: ctx.request_id.to_string(),
                        trigger_kind: ctx.trigger_kind,
                        caller_identity: ctx.caller_identity.clone(),
                        input_size: input.len(),
                        output_size: 0,
                        started_at,
                        completed_at,
                        duration_ms: (completed_at - started_at).num_milliseconds(),
                        status,
                        error_message: Some(orama_err.to_string()),
                        logs: Vec::new(),
                    });

                    let can_retry = orama_err.is_retryable() && attempt < max_attempts;
                    last_error = Some(orama_err);
                    if !can_retry {
                        break;
                    }

                    let delay = Self::retry_delay(function.retry_delay_s, attempt);
                    warn!(function = %function.name, attempt, delay_s = delay.as_secs(), "retrying invocation");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        let final_error = last_error
            .unwrap_or_else(|| OramaError::service_unavailable(&function.name, "invocation cancelled before it ran"));

        if let Some(topic) = &function.dlq_topic {
            self.publish_dlq(function, &input, &ctx, &final_error, topic).await;
        }
        Err(final_error)
    }

    fn authorize(&self, function: &FunctionDefinition, ctx: &InvocationContext) -> Result<(), OramaError> {
        if function.is_public {
            return Ok(());
        }
        match &ctx.caller_identity {
            Some(identity) if identity == &function.namespace || identity == &function.created_by => Ok(()),
            _ => Err(OramaError::unauthorized(
                &function.name,
                "caller is not authorized to invoke this function",
            )),
        }
    }

    /// `retry_delay_s * 2^(attempt - 1)`, capped at `MAX_RETRY_DELAY` (§4.3.4).
    fn retry_delay(base_s: u64, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let multiplier = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
        let scaled = base_s.saturating_mul(multiplier);
        Duration::from_secs(scaled).min(MAX_RETRY_DELAY)
    }

    async fn publish_dlq(
        &self,
        function: &FunctionDefinition,
        input: &[u8],
        ctx: &InvocationContext,
        error: &OramaError,
        topic: &str,
    ) {
        let Some(host) = &self.pubsub else {
            warn!(function = %function.name, "dlq topic configured but no pubsub handle available");
            return;
        };
        let message = DlqMessage {
            function_id: function.id.clone(),
            namespace: function.namespace.clone(),
            request_id: ctx.request_id.to_string(),
            input: input.to_vec(),
            error: error.to_string(),
            failed_at: Utc::now(),
            trigger_kind: ctx.trigger_kind,
            caller_identity: ctx.caller_identity.clone(),
        };
        match serde_json::to_vec(&message) {
            Ok(bytes) => {
                if let Err(e) = host.publish(topic, bytes).await {
                    warn!(function = %function.name, error = %e, "failed to publish to dlq");
                }
            }
            Err(e) => warn!(function = %function.name, error = %e, "failed to serialize dlq message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::InMemoryInvocationLogger;
    use crate::rate_limit::NoopRateLimiter;
    use crate::services::InMemoryObjectStore;
    use orama_core::task::TaskSupervisor;
    use orama_core::{RequestId, TriggerKind};
    use std::collections::HashMap;

    fn function(name: &str, is_public: bool, created_by: &str) -> FunctionDefinition {
        let now = chrono::Utc::now();
        FunctionDefinition {
            id: format!("{name}-id"),
            namespace: "ns".to_string(),
            name: name.to_string(),
            version: 1,
            wasm_cid: format!("{name}-cid"),
            memory_limit_mb: 32,
            timeout_s: 5,
            is_public,
            retry_count: 1,
            retry_delay_s: 0,
            dlq_topic: None,
            env_vars: HashMap::new(),
            status: crate::types::FunctionStatus::Active,
            created_at: now,
            updated_at: now,
            created_by: created_by.to_string(),
        }
    }

    fn ctx(caller: Option<&str>) -> InvocationContext {
        InvocationContext {
            request_id: RequestId::new(),
            function_id: "fn-id".to_string(),
            namespace: "ns".to_string(),
            caller_identity: caller.map(str::to_string),
            trigger_kind: TriggerKind::Http,
            ws_client_id: None,
            env_vars: HashMap::new(),
        }
    }

    async fn invoker() -> WasmInvoker {
        let supervisor = TaskSupervisor::new();
        let executor = WasmExecutor::new(
            InMemoryObjectStore::new(),
            Arc::new(NoopRateLimiter),
            None,
            None,
            None,
            None,
            crate::config::WasmConfig::default(),
            &supervisor,
        )
        .unwrap();
        WasmInvoker::new(Arc::new(executor), InMemoryInvocationLogger::new(100), None)
    }

    #[tokio::test]
    async fn private_function_rejects_unrelated_caller() {
        let invoker = invoker().await;
        let function = function("f", false, "owner");
        let result = invoker
            .invoke(&function, Vec::new(), ctx(Some("stranger")), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(OramaError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn private_function_allows_creator() {
        let invoker = invoker().await;
        let function = function("f", false, "owner");
        // The module fetch will fail (no object in the store), which proves
        // authorization passed and execution was attempted.
        let result = invoker
            .invoke(&function, Vec::new(), ctx(Some("owner")), &CancellationToken::new())
            .await;
        assert!(!matches!(result, Err(OramaError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn retry_delay_doubles_and_caps() {
        assert_eq!(WasmInvoker::retry_delay(2, 1), Duration::from_secs(2));
        assert_eq!(WasmInvoker::retry_delay(2, 2), Duration::from_secs(4));
        assert_eq!(WasmInvoker::retry_delay(2, 3), Duration::from_secs(8));
        assert_eq!(WasmInvoker::retry_delay(10_000, 20), MAX_RETRY_DELAY);
    }

    // Property 7: a function whose module can never be fetched exhausts
    // every retry (retry_count + 1 attempts total) before giving up. The
    // missing-module failure maps to ServiceUnavailable, which is
    // retryable, so every attempt is logged and none short-circuits early.
    #[tokio::test]
    async fn exhausts_every_retry_attempt_on_a_persistent_failure() {
        let supervisor = TaskSupervisor::new();
        let executor = WasmExecutor::new(
            InMemoryObjectStore::new(),
            Arc::new(NoopRateLimiter),
            None,
            None,
            None,
            None,
            crate::config::WasmConfig::default(),
            &supervisor,
        )
        .unwrap();
        let logger = InMemoryInvocationLogger::new(100);
        let invoker = WasmInvoker::new(Arc::new(executor), logger.clone(), None);

        let mut function = function("f", true, "owner");
        function.retry_count = 2;
        function.retry_delay_s = 0;

        let result = invoker
            .invoke(&function, Vec::new(), ctx(None), &CancellationToken::new())
            .await;

        assert!(result.is_err());
        assert_eq!(logger.len(), 3, "expected one logged record per attempt");
        for record in logger.recent(10) {
            assert_eq!(record.status, InvocationStatus::Error);
        }
    }

    // Property 8: the DLQ payload carries every documented field, with
    // `input` equal to the invocation input verbatim.
    #[test]
    fn dlq_message_round_trips_every_field_through_json() {
        let input = vec![1u8, 2, 3, 4];
        let message = DlqMessage {
            function_id: "fn-id".to_string(),
            namespace: "ns".to_string(),
            request_id: "req-1".to_string(),
            input: input.clone(),
            error: "execution of f failed".to_string(),
            failed_at: chrono::Utc::now(),
            trigger_kind: TriggerKind::Http,
            caller_identity: Some("owner".to_string()),
        };

        let value = serde_json::to_value(&message).unwrap();
        let obj = value.as_object().unwrap();
        for field in [
            "function_id",
            "namespace",
            "request_id",
            "input",
            "error",
            "failed_at",
            "trigger_kind",
            "caller_identity",
        ] {
            assert!(obj.contains_key(field), "missing field {field}");
        }

        let decoded: DlqMessage = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.input, input);
        assert_eq!(decoded.function_id, message.function_id);
        assert_eq!(decoded.caller_identity, message.caller_identity);
    }
}
