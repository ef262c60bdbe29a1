//! # harvey-tool — tool registry and schema (C1)
//!
//! Declarative catalogue of tool names and schemas plus an object-safe
//! dispatch trait ([`ToolDyn`]). Validation is strict: unknown fields
//! are rejected, enumerations and numeric bounds are enforced, so the
//! agent loop never forwards malformed arguments to a downstream
//! service.
//!
//! This crate only knows about tool *shape*. The built-in tools'
//! actual bodies (which call out to the grounding layer and the
//! downstream adapters) are wired up by `harvey-loop`, which depends
//! on this crate rather than the other way around.

#![deny(missing_docs)]

pub mod builtins;
pub mod registry;
pub mod schema;

pub use registry::{ToolDyn, ToolError, ToolRegistry};
pub use schema::{validate, ValidationError};
