//! Remote analysis job handle, returned verbatim by the analysis adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::JobId;

/// Lifecycle state of a remote analysis job, as reported by the
/// Analysis API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Accepted but not yet started.
    Pending,
    /// Actively being solved.
    Running,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
}

/// A handle to a job submitted to the Analysis API's async
/// `analysis_job` operation. Polled by the agent loop with backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    /// Remote job identifier.
    pub job_id: JobId,
    /// Current lifecycle state.
    pub status: JobState,
    /// When the job was submitted.
    pub submitted_at: DateTime<Utc>,
    /// When the solver began working on it, if known.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state, if it has.
    pub completed_at: Option<DateTime<Utc>>,
    /// Result payload, present only when `status == Completed`.
    pub result: Option<Value>,
    /// Error message, present only when `status == Failed`.
    pub error: Option<String>,
}

impl AnalysisJob {
    /// Whether this job has reached a terminal state and polling
    /// should stop.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobState::Completed | JobState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        let mut job = AnalysisJob {
            job_id: JobId::new("j1"),
            status: JobState::Running,
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        };
        assert!(!job.is_terminal());
        job.status = JobState::Completed;
        assert!(job.is_terminal());
    }
}
