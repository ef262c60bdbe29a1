//! MCP-specific error taxonomy, bridging into [`harvey_types::TransportError`]
//! at the point where an MCP failure becomes a step-level failure.

use harvey_types::TransportError;
use thiserror::Error;

/// Errors from MCP client/server operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to spawn the child process or complete the transport handshake.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The MCP `initialize` handshake failed or timed out.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// A `tools/call` request failed at the protocol level.
    #[error("tool call failed: {0}")]
    ToolCall(String),

    /// A `resources/read` request failed at the protocol level.
    #[error("resource read failed: {0}")]
    ResourceRead(String),

    /// A call exceeded its configured deadline.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Transport-level failure not otherwise categorized.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<McpError> for TransportError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::Timeout(d) => TransportError::Timeout(d.as_millis() as u64),
            McpError::Connection(msg) | McpError::Transport(msg) => {
                TransportError::ConnectionLost(msg)
            }
            McpError::Initialization(msg) | McpError::ToolCall(msg) | McpError::ResourceRead(msg) => {
                TransportError::Decode(msg)
            }
        }
    }
}
