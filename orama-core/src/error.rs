//! Error taxonomy shared across every Orama subsystem.
//!
//! The kinds mirror §7 of the design: each is a class of failure with its
//! own retry and surfacing policy, not a concrete cause. Subsystems convert
//! their internal errors (`anyhow::Error`, `wasmtime::Error`, libp2p
//! transport errors, ...) into one of these variants at the point where the
//! error crosses a component boundary and a caller needs to decide whether
//! to retry.

use thiserror::Error;

/// A single-line, request-id-carrying error for anything that crosses a
/// subsystem boundary. Internal plumbing still uses `anyhow::Result`; this
/// type is for the edges callers observe (invocation results, ABI errors,
/// decision-function failures).
#[derive(Debug, Error, Clone)]
pub enum OramaError {
    /// Bad input shape. Never retried.
    #[error("validation error in {function}: {detail}")]
    Validation { function: String, detail: String },

    /// Function, version, secret, or client not found. Never retried.
    #[error("not found in {function}: {detail}")]
    NotFound { function: String, detail: String },

    /// Caller cannot invoke or read. Never retried.
    #[error("unauthorized in {function}: {detail}")]
    Unauthorized { function: String, detail: String },

    /// Rate limit, memory limit, payload too large, or timeout. Never
    /// retried by the invoker (the caller may retry).
    #[error("resource exhausted in {function}: {detail}")]
    ResourceExhausted { function: String, detail: String },

    /// SQL, cache, or object store unavailable. Retried by the invoker.
    #[error("service unavailable in {function}: {detail}")]
    ServiceUnavailable { function: String, detail: String },

    /// Guest trap or host ABI error. Retried by the invoker, surfaced
    /// after retry exhaustion.
    #[error("execution error in {function} (request {request_id}): {detail}")]
    Execution {
        function: String,
        request_id: String,
        detail: String,
    },

    /// Fatal at start only.
    #[error("configuration error: {detail}")]
    Configuration { detail: String },
}

impl OramaError {
    pub fn validation(function: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Validation {
            function: function.into(),
            detail: detail.into(),
        }
    }

    pub fn not_found(function: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::NotFound {
            function: function.into(),
            detail: detail.into(),
        }
    }

    pub fn unauthorized(function: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Unauthorized {
            function: function.into(),
            detail: detail.into(),
        }
    }

    pub fn resource_exhausted(function: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            function: function.into(),
            detail: detail.into(),
        }
    }

    pub fn service_unavailable(function: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            function: function.into(),
            detail: detail.into(),
        }
    }

    pub fn execution(
        function: impl Into<String>,
        request_id: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::Execution {
            function: function.into(),
            request_id: request_id.into(),
            detail: detail.into(),
        }
    }

    pub fn configuration(detail: impl Into<String>) -> Self {
        Self::Configuration {
            detail: detail.into(),
        }
    }

    /// Whether the invoker's retry rule (§4.3.4) permits another attempt
    /// after this error. NotFound, ResourceExhausted, and Unauthorized are
    /// never retried; everything else is.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            OramaError::NotFound { .. }
                | OramaError::ResourceExhausted { .. }
                | OramaError::Unauthorized { .. }
                | OramaError::Validation { .. }
        )
    }
}
