#![deny(missing_docs)]
//! # harvey-mcp — MCP tool host (C2)
//!
//! Bridges [`harvey_tool::ToolRegistry`] to the Model Context Protocol:
//!
//! - [`McpClient`] spawns a remote MCP server over stdio, discovers its
//!   tools, and wraps each as a [`harvey_tool::ToolDyn`] so it slots
//!   into a registry alongside local tools.
//! - [`McpServer`] does the reverse: it serves an existing
//!   [`harvey_tool::ToolRegistry`] over stdio so another process can
//!   discover and call these tools via MCP, including the static
//!   pricing-specification resource.

pub mod client;
pub mod error;
pub mod schema;
pub mod server;

pub use client::McpClient;
pub use error::McpError;
pub use server::McpServer;
