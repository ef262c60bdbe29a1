//! Object-safe tool abstraction and the process-lifetime registry (C1).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use harvey_types::ToolDescriptor;
use serde_json::Value;
use thiserror::Error;

use crate::schema::validate;

/// Errors from registry lookup and dispatch. Mirrors the shared error taxonomy
/// entries that are local to a single tool call.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool is registered under this name.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// Arguments failed schema validation before the tool ran.
    #[error("invalid argument at {path}: {reason}")]
    ArgumentInvalid {
        /// Path to the offending field.
        path: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The tool ran but failed for a reason internal to it.
    #[error("tool internal error: {0}")]
    ToolInternal(String),

    /// A semantically classified failure from a layer above the
    /// registry (grounding rejection, solver failure, upstream
    /// unavailability) that already carries the taxonomy code it
    /// should surface to the LLM as. The registry itself never
    /// constructs this variant; builtin tool bodies do, so the code
    /// survives the trip through `ToolDyn::call`'s `Result<Value, ToolError>`.
    #[error("{message}")]
    Semantic {
        /// Stable code matching a shared taxonomy name (e.g. `UnknownFeature`).
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// Catch-all for errors this taxonomy doesn't name explicitly.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Object-safe trait a tool implementation satisfies. Local functions,
/// MCP-backed remote tools, and adapter-backed tools all implement
/// this the same way.
pub trait ToolDyn: Send + Sync {
    /// Static descriptor: name, description, schemas, side-effect class.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Execute the tool body. Called only after argument validation has
    /// already passed, so implementations can assume well-shaped input.
    fn call(
        &self,
        args: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>>;
}

/// Catalogue of registered tools. Immutable after startup: `list()`
/// always returns descriptors in registration order so the LLM sees a
/// stable schema across turns.
pub struct ToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, Arc<dyn ToolDyn>>,
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Registering the same name twice replaces the
    /// implementation but keeps its original position in `list()`.
    pub fn register(&mut self, tool: Arc<dyn ToolDyn>) {
        let name = tool.descriptor().name.clone();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    /// Registered tool descriptors, in registration order.
    pub fn list(&self) -> Vec<&ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.descriptor())
            .collect()
    }

    /// Look up a tool by name without validating or calling it.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolDyn>> {
        self.tools.get(name)
    }

    /// Validate `args` against the named tool's input schema, then
    /// invoke it. This is the only path the agent loop should use to
    /// dispatch a tool call.
    pub async fn invoke(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        validate(&tool.descriptor().input_schema, &args).map_err(|e| {
            ToolError::ArgumentInvalid {
                path: e.path,
                reason: e.reason,
            }
        })?;

        tool.call(args).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvey_types::{ParamSchema, SideEffect};
    use serde_json::json;

    struct EchoTool {
        descriptor: ToolDescriptor,
    }

    impl EchoTool {
        fn new() -> Self {
            Self {
                descriptor: ToolDescriptor {
                    name: "echo".into(),
                    description: "echoes input".into(),
                    input_schema: vec![ParamSchema::required("msg", "string")],
                    output_schema: vec![],
                    side_effect: SideEffect::Pure,
                },
            }
        }
    }

    impl ToolDyn for EchoTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        fn call(
            &self,
            args: Value,
        ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
            Box::pin(async move { Ok(json!({"echoed": args})) })
        }
    }

    #[tokio::test]
    async fn invoke_rejects_unknown_tool() {
        let reg = ToolRegistry::new();
        let err = reg.invoke("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(n) if n == "nope"));
    }

    #[tokio::test]
    async fn invoke_rejects_bad_args_before_calling() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool::new()));
        let err = reg.invoke("echo", json!({"wrong": 1})).await.unwrap_err();
        assert!(matches!(err, ToolError::ArgumentInvalid { .. }));
    }

    #[tokio::test]
    async fn invoke_dispatches_valid_call() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool::new()));
        let result = reg.invoke("echo", json!({"msg": "hi"})).await.unwrap();
        assert_eq!(result, json!({"echoed": {"msg": "hi"}}));
    }

    #[test]
    fn list_is_registration_order_and_stable_across_reregister() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool::new()));
        reg.register(Arc::new(EchoTool::new()));
        let names: Vec<&str> = reg.list().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["echo"]);
    }
}
