//! # harvey-types — shared protocol types for Harvey Agent Core
//!
//! Cross-cutting types shared by every crate in the workspace: typed
//! IDs, the conversation/message shapes, the pricing-context data
//! model, agent-loop records, the remote analysis job handle, and the
//! error taxonomy each crate's own error enum composes into.
//!
//! Nothing in this crate talks to the network or the filesystem; it's
//! pure data plus the invariants that can be checked without I/O.

#![deny(missing_docs)]

pub mod agent;
pub mod analysis;
pub mod content;
pub mod duration;
pub mod error;
pub mod id;
pub mod pricing;

pub use agent::{
    AgentStep, ExitReason, Observation, ParamSchema, SideEffect, ToolCallRecord, ToolDescriptor,
};
pub use analysis::{AnalysisJob, JobState};
pub use content::{Message, Role};
pub use duration::DurationMs;
pub use error::{FatalError, GroundingError, RequestError, SessionError, StepError, TransportError};
pub use id::{new_opaque_id, BlobId, ItemId, JobId, SessionId};
pub use pricing::{
    CacheEntry, CacheErrorCause, ItemKind, ItemOrigin, PricingContextItem, TransformState,
    TransformationRequest,
};
