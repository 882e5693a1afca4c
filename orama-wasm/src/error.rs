//! Executor failure classification (§4.3.2) and its mapping onto the
//! node-wide error taxonomy (§7) that the invoker's retry rule reads.

use orama_core::OramaError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    /// Deadline exceeded before the guest returned.
    #[error("execution of {function} timed out after {timeout_s}s (request {request_id})")]
    Timeout {
        function: String,
        timeout_s: u64,
        request_id: String,
    },
    /// Host panic or guest trap.
    #[error("execution of {function} failed (request {request_id}): {cause}")]
    ExecutionError {
        function: String,
        request_id: String,
        cause: String,
    },
    /// Module fetch or compilation failed.
    #[error("failed to deploy {function}: {cause}")]
    DeployError { function: String, cause: String },
    /// The guest imports a host-ABI name the engine doesn't export. Permanent,
    /// never retried (§6 "Host ABI").
    #[error("{function} imports unknown host function {name}")]
    UnknownImport { function: String, name: String },
    /// The rate limiter denied this invocation before compilation.
    #[error("{function} exceeded its rate limit")]
    RateLimited { function: String },
}

impl ExecutorError {
    /// Map onto the §7 taxonomy so the invoker's retry rule (§4.3.4) can
    /// apply `OramaError::is_retryable` uniformly.
    pub fn into_orama_error(self) -> OramaError {
        match self {
            ExecutorError::Timeout { function, .. } => {
                OramaError::resource_exhausted("Execute", format!("{function} timed out"))
            }
            ExecutorError::ExecutionError {
                function,
                cause,
                request_id,
            } => OramaError::execution("Execute", request_id, format!("{function}: {cause}")),
            ExecutorError::DeployError { function, cause } => {
                OramaError::service_unavailable("Execute", format!("failed to deploy {function}: {cause}"))
            }
            ExecutorError::UnknownImport { function, name } => OramaError::validation(
                "Execute",
                format!("{function} imports unknown host function {name}"),
            ),
            ExecutorError::RateLimited { function } => {
                OramaError::resource_exhausted("Execute", format!("{function} rate limited"))
            }
        }
    }
}
