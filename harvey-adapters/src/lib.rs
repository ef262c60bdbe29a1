//! # harvey-adapters — downstream service adapters (C3)
//!
//! Typed clients for the two services the agent core treats as
//! external collaborators: the Analysis API (`summary` and the async
//! `analysis_job` lifecycle) and the Extraction API (`transform`). Both
//! are HTTP; both share the same retry policy on transport failures.

#![deny(missing_docs)]

pub mod analysis;
pub mod extractor;
pub mod retry;
pub mod test_support;

use harvey_types::TransportError;
use thiserror::Error;

pub use analysis::{AnalysisAdapter, HttpAnalysisAdapter};
pub use extractor::{ExtractorAdapter, HttpExtractorAdapter};

/// Errors an adapter call can fail with.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum AdapterError {
    /// A transport-level failure (possibly already retried).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The remote service reported a semantic failure (e.g. the solver
    /// found the model infeasible).
    #[error("solver error: {0}")]
    Solver(String),
}
