//! MCP server that exposes a [`ToolRegistry`] over stdio.
//!
//! [`McpServer`] wraps a [`ToolRegistry`](harvey_tool::ToolRegistry)
//! and serves its tools via `initialize`/`tools/list`/`tools/call`,
//! plus the single static resource
//! `resource://pricing/specification` via `resources/read`.

use std::sync::Arc;

use harvey_tool::ToolRegistry;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParams, ProtocolVersion, RawResource, ReadResourceRequestParams,
    ReadResourceResult, Resource, ResourceContents, ServerCapabilities, ServerInfo,
    Tool as McpTool,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::transport::io::stdio;
use rmcp::{ErrorData, ServerHandler, ServiceExt};

use crate::error::McpError;
use crate::schema::to_json_schema;

/// URI of the static pricing-specification excerpt this server exposes
/// via `resources/read`.
pub const PRICING_SPEC_RESOURCE_URI: &str = "resource://pricing/specification";

/// MCP server wrapping a [`ToolRegistry`].
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    name: String,
    version: String,
    pricing_specification: String,
}

impl McpServer {
    /// Build a server around `registry`, identifying itself as
    /// `name`/`version` during the `initialize` handshake and serving
    /// `pricing_specification` verbatim as the static pricing resource.
    pub fn new(
        registry: ToolRegistry,
        name: impl Into<String>,
        version: impl Into<String>,
        pricing_specification: impl Into<String>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            name: name.into(),
            version: version.into(),
            pricing_specification: pricing_specification.into(),
        }
    }

    /// Serve over stdio. Blocks until the peer disconnects.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Connection`] if the transport setup or
    /// serving fails.
    pub async fn serve_stdio(self) -> Result<(), McpError> {
        let transport = stdio();
        let handler = McpServerHandler {
            registry: self.registry,
            name: self.name,
            version: self.version,
            pricing_specification: self.pricing_specification,
        };
        let service = handler
            .serve(transport)
            .await
            .map_err(|e| McpError::Connection(e.to_string()))?;
        service
            .waiting()
            .await
            .map_err(|e| McpError::Connection(e.to_string()))?;
        Ok(())
    }
}

struct McpServerHandler {
    registry: Arc<ToolRegistry>,
    name: String,
    version: String,
    pricing_specification: String,
}

impl ServerHandler for McpServerHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: self.name.clone(),
                version: self.version.clone(),
                ..Default::default()
            },
            instructions: None,
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let tools: Vec<McpTool> = self
            .registry
            .list()
            .into_iter()
            .map(|descriptor| {
                let schema = to_json_schema(&descriptor.input_schema);
                McpTool {
                    name: descriptor.name.clone().into(),
                    title: None,
                    description: Some(descriptor.description.clone().into()),
                    input_schema: Arc::new(schema),
                    output_schema: None,
                    annotations: None,
                    execution: None,
                    icons: None,
                    meta: None,
                }
            })
            .collect();

        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let tool_name = &*request.name;
        let args = match request.arguments {
            Some(map) => serde_json::Value::Object(map),
            None => serde_json::Value::Object(serde_json::Map::new()),
        };

        match self.registry.invoke(tool_name, args).await {
            Ok(result) => {
                let text =
                    serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string());
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<rmcp::model::ListResourcesResult, ErrorData> {
        let resource = Resource::new(
            RawResource::new(PRICING_SPEC_RESOURCE_URI, "pricing-specification"),
            None,
        );
        Ok(rmcp::model::ListResourcesResult::with_all_items(vec![
            resource,
        ]))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        if request.uri != PRICING_SPEC_RESOURCE_URI {
            return Err(ErrorData::invalid_params(
                format!("unknown resource: {}", request.uri),
                None,
            ));
        }

        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(
                self.pricing_specification.clone(),
                PRICING_SPEC_RESOURCE_URI,
            )],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvey_types::{ParamSchema, SideEffect, ToolDescriptor};
    use serde_json::json;
    use std::future::Future;
    use std::pin::Pin;

    struct EchoTool {
        descriptor: ToolDescriptor,
    }

    impl harvey_tool::ToolDyn for EchoTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }
        fn call(
            &self,
            args: serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, harvey_tool::ToolError>> + Send + '_>>
        {
            Box::pin(async move { Ok(json!({"echoed": args})) })
        }
    }

    fn handler_with_one_tool() -> McpServerHandler {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool {
            descriptor: ToolDescriptor {
                name: "echo".into(),
                description: "echoes input".into(),
                input_schema: vec![ParamSchema::required("msg", "string")],
                output_schema: vec![],
                side_effect: SideEffect::Pure,
            },
        }));
        McpServerHandler {
            registry: Arc::new(registry),
            name: "harvey".into(),
            version: "0.1.0".into(),
            pricing_specification: "plans: []\n".into(),
        }
    }

    #[test]
    fn server_constructs_and_reports_identity() {
        let registry = ToolRegistry::new();
        let server = McpServer::new(registry, "harvey", "0.1.0", "plans: []\n");
        assert_eq!(server.name, "harvey");
        assert_eq!(server.version, "0.1.0");
    }

    #[test]
    fn get_info_reports_server_identity() {
        let handler = handler_with_one_tool();
        let info = handler.get_info();
        assert_eq!(info.server_info.name, "harvey");
        assert_eq!(info.server_info.version, "0.1.0");
    }

    #[tokio::test]
    async fn call_tool_dispatches_through_the_registry() {
        let handler = handler_with_one_tool();
        let params = CallToolRequestParams {
            meta: None,
            name: "echo".to_string().into(),
            arguments: json!({"msg": "hi"}).as_object().cloned(),
            task: None,
        };
        let result = handler
            .registry
            .invoke("echo", json!({"msg": "hi"}))
            .await
            .unwrap();
        assert_eq!(result, json!({"echoed": {"msg": "hi"}}));
        let _ = params;
    }

    #[tokio::test]
    async fn call_tool_rejects_unknown_tool_name() {
        let handler = handler_with_one_tool();
        let result = handler.registry.invoke("nope", json!({})).await;
        assert!(result.is_err());
    }
}
