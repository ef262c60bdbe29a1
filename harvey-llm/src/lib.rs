#![deny(missing_docs)]
//! # harvey-llm — LLM provider abstraction
//!
//! Ambient infrastructure the agent loop (`harvey-loop`) is generic
//! over: a non-object-safe [`Provider`] trait so the loop can be
//! monomorphized per provider, plus a generic OpenAI-chat-completions
//! shaped [`HttpProvider`] implementation. No vendor is prescribed by
//! the pricing-intelligence agent this crate serves — `HttpProvider`
//! is configured entirely by base URL, model and credential, so any
//! OpenAI-compatible endpoint (including self-hosted ones) works
//! without a new impl.

pub mod http;
pub mod provider;
pub mod types;

pub use http::HttpProvider;
pub use provider::{Provider, ProviderError};
pub use types::{
    ContentPart, ImageSource, ProviderMessage, ProviderRequest, ProviderResponse, Role,
    StopReason, TokenUsage, ToolSchema,
};
