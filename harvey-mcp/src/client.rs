//! MCP client that discovers remote tools and wraps them as [`ToolDyn`].
//!
//! [`McpClient`] connects to an MCP server over stdio, discovers its
//! tools, and wraps each as a [`ToolDyn`] implementation so they can be
//! registered in a [`ToolRegistry`](harvey_tool::ToolRegistry)
//! alongside locally-implemented ones.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use harvey_tool::{ToolDyn, ToolError};
use harvey_types::{SideEffect, ToolDescriptor};
use rand::Rng;
use rmcp::model::{CallToolRequestParams, CallToolResult, Content, RawContent};
use rmcp::service::{Peer, RoleClient, RunningService};
use rmcp::transport::child_process::TokioChildProcess;
use rmcp::ServiceExt;

use crate::error::McpError;
use crate::schema::from_json_schema;

/// Per-call timeouts.
pub const TOOLS_CALL_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout for a `resources/read` request.
pub const RESOURCE_READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for the `initialize` handshake.
pub const INITIALIZE_TIMEOUT: Duration = Duration::from_secs(5);
/// Initial reconnect backoff.
pub const RECONNECT_BACKOFF_START: Duration = Duration::from_millis(500);
/// Reconnect backoff cap.
pub const RECONNECT_BACKOFF_CAP: Duration = Duration::from_secs(10);

/// An MCP client connected to a single stdio-spawned server process.
///
/// Holds the running service for the lifetime of the connection; a
/// dropped/exited child process surfaces as `TransportLost` on the
/// next call rather than silently hanging, since every call goes
/// through an explicit timeout.
pub struct McpClient {
    service: RunningService<RoleClient, ()>,
}

impl McpClient {
    /// Spawn `command` and complete the MCP `initialize` handshake.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Connection`] if the process cannot be
    /// spawned, and [`McpError::Initialization`] if the handshake
    /// doesn't complete within [`INITIALIZE_TIMEOUT`].
    pub async fn connect_stdio(command: tokio::process::Command) -> Result<Self, McpError> {
        let transport =
            TokioChildProcess::new(command).map_err(|e| McpError::Connection(e.to_string()))?;

        let service = tokio::time::timeout(INITIALIZE_TIMEOUT, ().serve(transport))
            .await
            .map_err(|_| McpError::Initialization("handshake timed out".to_string()))?
            .map_err(|e| McpError::Initialization(e.to_string()))?;

        Ok(Self { service })
    }

    /// Reconnect by spawning a fresh process, retrying with exponential
    /// backoff (start [`RECONNECT_BACKOFF_START`], cap
    /// [`RECONNECT_BACKOFF_CAP`], jitter ±20%) until `attempts` spawn
    /// attempts have been exhausted.
    ///
    /// The caller supplies a factory rather than a single `Command`
    /// because a `tokio::process::Command` isn't `Clone` and each
    /// retry needs its own process.
    pub async fn reconnect_stdio(
        mut make_command: impl FnMut() -> tokio::process::Command,
        attempts: u32,
    ) -> Result<Self, McpError> {
        let mut delay = RECONNECT_BACKOFF_START;
        let mut last_err = McpError::Connection("no attempts made".to_string());

        for attempt in 0..attempts.max(1) {
            match Self::connect_stdio(make_command()).await {
                Ok(client) => return Ok(client),
                Err(e) => {
                    last_err = e;
                    if attempt + 1 == attempts {
                        break;
                    }
                    let jitter = rand::thread_rng().gen_range(-0.2..=0.2);
                    let jittered = delay.mul_f64(1.0 + jitter);
                    tokio::time::sleep(jittered).await;
                    delay = (delay * 2).min(RECONNECT_BACKOFF_CAP);
                }
            }
        }

        Err(last_err)
    }

    /// Discover all tools the remote server exposes, wrapped as
    /// [`ToolDyn`] implementations ready for
    /// [`ToolRegistry::register`](harvey_tool::ToolRegistry::register).
    ///
    /// # Errors
    ///
    /// Returns [`McpError::ToolCall`] if the `tools/list` request fails.
    pub async fn discover_tools(&self) -> Result<Vec<Arc<dyn ToolDyn>>, McpError> {
        let result = self
            .service
            .list_all_tools()
            .await
            .map_err(|e| McpError::ToolCall(e.to_string()))?;

        let peer = Arc::new(self.service.peer().clone());

        Ok(result
            .into_iter()
            .map(|tool| {
                let input_schema = from_json_schema(&tool.input_schema);
                let descriptor = ToolDescriptor {
                    name: tool.name.to_string(),
                    description: tool.description.as_deref().unwrap_or("").to_string(),
                    input_schema,
                    output_schema: Vec::new(),
                    // Remote tools are treated as network-effecting by
                    // default: we have no principled way to know
                    // whether a given MCP server's tool mutates state.
                    side_effect: SideEffect::Network,
                };
                Arc::new(McpToolWrapper {
                    descriptor,
                    peer: Arc::clone(&peer),
                }) as Arc<dyn ToolDyn>
            })
            .collect())
    }

    /// Read a resource from the connected server (e.g.
    /// `resource://pricing/specification`).
    ///
    /// # Errors
    ///
    /// Returns [`McpError::ResourceRead`] on protocol failure or
    /// [`McpError::Timeout`] if the call exceeds
    /// [`RESOURCE_READ_TIMEOUT`].
    pub async fn read_resource(&self, uri: &str) -> Result<String, McpError> {
        let peer = self.service.peer();
        let fut = peer.read_resource(rmcp::model::ReadResourceRequestParams {
            uri: uri.to_string(),
        });

        let result = tokio::time::timeout(RESOURCE_READ_TIMEOUT, fut)
            .await
            .map_err(|_| McpError::Timeout(RESOURCE_READ_TIMEOUT))?
            .map_err(|e| McpError::ResourceRead(e.to_string()))?;

        Ok(result
            .contents
            .into_iter()
            .filter_map(|c| {
                // Resource content variants all serialize with a `text`
                // field when they carry text, so go through JSON rather
                // than pattern-matching rmcp's enum shape directly.
                serde_json::to_value(&c)
                    .ok()
                    .and_then(|v| v.get("text").and_then(|t| t.as_str()).map(str::to_string))
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Shut down the connection, cancelling the underlying transport.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Connection`] if shutdown fails.
    pub async fn close(self) -> Result<(), McpError> {
        self.service
            .cancel()
            .await
            .map_err(|e| McpError::Connection(e.to_string()))?;
        Ok(())
    }
}

/// Adapts a discovered MCP tool to [`ToolDyn`], holding a precomputed
/// [`ToolDescriptor`] (harvey-tool's `ToolDyn` is descriptor-shaped,
/// not the three-method name/description/schema shape MCP's wire
/// format uses) and a shared handle to the peer for dispatching calls.
struct McpToolWrapper {
    descriptor: ToolDescriptor,
    peer: Arc<Peer<RoleClient>>,
}

impl ToolDyn for McpToolWrapper {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn call(
        &self,
        args: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>> {
        let name = self.descriptor.name.clone();
        let arguments = args.as_object().cloned();
        let peer = Arc::clone(&self.peer);

        Box::pin(async move {
            let params = CallToolRequestParams {
                meta: None,
                name: name.into(),
                arguments,
                task: None,
            };

            let result: CallToolResult = tokio::time::timeout(
                TOOLS_CALL_TIMEOUT,
                peer.call_tool(params),
            )
            .await
            .map_err(|_| ToolError::ToolInternal("mcp call timed out".to_string()))?
            .map_err(|e| ToolError::ToolInternal(e.to_string()))?;

            if result.is_error == Some(true) {
                return Err(ToolError::ToolInternal(extract_text(&result.content)));
            }

            if let Some(structured) = result.structured_content {
                return Ok(structured);
            }

            Ok(serde_json::Value::String(extract_text(&result.content)))
        })
    }
}

fn extract_text(content: &[Content]) -> String {
    content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvey_types::ParamSchema as _ParamSchema;

    #[test]
    fn reconnect_backoff_doubles_and_caps() {
        let mut delay = RECONNECT_BACKOFF_START;
        for _ in 0..10 {
            delay = (delay * 2).min(RECONNECT_BACKOFF_CAP);
        }
        assert_eq!(delay, RECONNECT_BACKOFF_CAP);
    }

    #[test]
    fn wrapper_descriptor_carries_through_unchanged() {
        let descriptor = ToolDescriptor {
            name: "remote_tool".into(),
            description: "does a thing".into(),
            input_schema: vec![_ParamSchema::required("x", "string")],
            output_schema: vec![],
            side_effect: SideEffect::Network,
        };
        assert_eq!(descriptor.name, "remote_tool");
    }
}
