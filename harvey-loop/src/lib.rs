#![deny(missing_docs)]
//! # harvey-loop — ReAct agent loop (C7)
//!
//! Drives a bounded plan-act-observe iteration over an LLM provider:
//! each step offers the six built-in pricing tools (wired to the
//! grounding layer and the downstream adapters), fans out any
//! requested tool calls concurrently, and appends their observations
//! to the transcript in call-declaration order regardless of
//! completion order.
//!
//! This is the crate at the top of the dependency order that can see
//! `harvey-tool`, `harvey-llm`, `harvey-adapters`, `harvey-grounding`
//! and `harvey-cache` all at once, so the built-in tool bodies
//! ([`tools::build_registry`]) and the loop itself ([`AgentLoop`]) both
//! live here.

pub mod config;
pub mod convert;
pub mod engine;
pub mod schema;
pub mod tools;

pub use config::{LoopConfig, DEFAULT_SOLVER, DEFAULT_STEP_BUDGET, HARD_CAP_STEP_BUDGET};
pub use engine::{AgentLoop, ContextDocument, RunOutcome, ToolContext};
pub use schema::descriptor_to_tool_schema;
pub use tools::build_registry;
