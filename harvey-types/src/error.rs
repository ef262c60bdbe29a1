//! Error taxonomy shared across the core: input validation,
//! grounding, transport, solver/semantic, tool internal, cancellation,
//! and fatal (process-level) errors.

use thiserror::Error;

/// Errors surfaced directly to an HTTP caller (4xx territory). Never
/// retried by the agent loop.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request body failed basic validation (missing/contradictory fields).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request body parsed but didn't match the expected schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}

/// Errors from the grounding layer (C6). These are recoverable from the
/// LLM's point of view — they are appended as structured tool
/// observations, not hard loop failures.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GroundingError {
    /// A requested feature name has no match in the authoritative YAML.
    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    /// A requested usage-limit name has no match in the authoritative YAML.
    #[error("unknown usage limit: {0}")]
    UnknownUsageLimit(String),

    /// The filter's unit doesn't match the canonical unit, and no
    /// conversion is attempted.
    #[error("unit mismatch for {name}: expected {expected}, got {provided}")]
    UnitMismatch {
        /// The canonical name the filter targeted.
        name: String,
        /// The unit declared by the authoritative YAML.
        expected: String,
        /// The unit the caller's filter used.
        provided: String,
    },

    /// `minPrice`/`maxPrice` or a usage-limit bound was negative or
    /// otherwise out of range.
    #[error("invalid range: {0}")]
    InvalidRange(String),
}

/// Transport errors talking to a downstream HTTP service or the MCP
/// child process.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TransportError {
    /// Timeout waiting for a response.
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// The connection was dropped or never established.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The remote returned a non-2xx HTTP status.
    #[error("http status {0}")]
    HttpStatus(u16),

    /// The response body could not be decoded into the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl TransportError {
    /// Whether this failure is worth retrying per the adapter retry
    /// policy: transport failures and HTTP 502/503/504 responses.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout(_)
                | TransportError::ConnectionLost(_)
                | TransportError::HttpStatus(502)
                | TransportError::HttpStatus(503)
                | TransportError::HttpStatus(504)
        )
    }
}

/// Top-level error for a single agent-loop step or tool dispatch. Tool,
/// grounding and solver errors are local to the step — they become
/// observations, not loop failures.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StepError {
    /// Grounding rejected the call's filters before it reached a tool.
    #[error(transparent)]
    Grounding(#[from] GroundingError),

    /// The analysis/extraction service reported a semantic failure
    /// (e.g. the solver found the model infeasible).
    #[error("solver error: {0}")]
    Solver(String),

    /// A tool failed for a reason internal to the tool (not the model
    /// or the grounding layer).
    #[error("tool internal error: {0}")]
    ToolInternal(String),

    /// The named tool isn't registered.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// The tool's arguments failed schema validation.
    #[error("invalid argument at {path}: {reason}")]
    ArgumentInvalid {
        /// JSON-pointer-ish path to the offending field.
        path: String,
        /// Human-readable reason.
        reason: String,
    },

    /// A downstream call failed at the transport layer.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Session/loop-level errors: global to the session rather than local
/// to a step.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SessionError {
    /// The caller (or an internal watchdog) cancelled the session.
    #[error("cancelled")]
    Cancelled,

    /// Transport to the LLM itself failed after retries.
    #[error("llm unavailable: {0}")]
    LlmUnavailable(String),

    /// A downstream service was unreachable after the adapter retry policy.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

/// Fatal, process-level errors. These abort the process with the exit
/// codes rather than being handled per-request.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum FatalError {
    /// Required configuration was missing or invalid (exit code 2).
    #[error("config error: {0}")]
    Config(String),

    /// The HTTP listener could not bind (exit code 3).
    #[error("bind error: {0}")]
    Bind(String),

    /// A required upstream was unreachable at startup (exit code 4).
    #[error("upstream unreachable at startup: {0}")]
    UpstreamUnreachable(String),

    /// A cache entry was found in an impossible state transition.
    #[error("corrupt cache entry: {0}")]
    CorruptCacheEntry(String),
}

impl FatalError {
    /// The process exit code this error maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            FatalError::Config(_) => 2,
            FatalError::Bind(_) => 3,
            FatalError::UpstreamUnreachable(_) => 4,
            FatalError::CorruptCacheEntry(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_retryable_matrix() {
        assert!(TransportError::Timeout(1000).is_retryable());
        assert!(TransportError::ConnectionLost("eof".into()).is_retryable());
        assert!(TransportError::HttpStatus(503).is_retryable());
        assert!(!TransportError::HttpStatus(404).is_retryable());
        assert!(!TransportError::Decode("bad json".into()).is_retryable());
    }

    #[test]
    fn fatal_error_exit_codes() {
        assert_eq!(FatalError::Config("x".into()).exit_code(), 2);
        assert_eq!(FatalError::Bind("x".into()).exit_code(), 3);
        assert_eq!(FatalError::UpstreamUnreachable("x".into()).exit_code(), 4);
    }

    #[test]
    fn step_error_wraps_grounding() {
        let e: StepError = GroundingError::UnknownFeature("SsoPlus".into()).into();
        assert_eq!(e.to_string(), "unknown feature: SsoPlus");
    }
}
