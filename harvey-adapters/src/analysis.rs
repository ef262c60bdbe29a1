//! Analysis API adapter: synchronous `summary` plus the async
//! submit/poll `analysis_job` lifecycle.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use harvey_types::{AnalysisJob, JobId, JobState, TransportError};
use serde::Deserialize;
use serde_json::Value;

use crate::retry::with_retry;
use crate::AdapterError;

/// Total wall-clock budget for polling a single job (120s default).
pub const POLL_WALL_CLOCK_CAP: Duration = Duration::from_secs(120);
/// Poll backoff cap (`200ms * 2^k` capped at 5s).
const POLL_BACKOFF_CAP: Duration = Duration::from_secs(5);

fn poll_backoff(attempt: u32) -> Duration {
    let ms = 200u64.saturating_mul(1u64 << attempt.min(10));
    Duration::from_millis(ms).min(POLL_BACKOFF_CAP)
}

/// Client for the Analysis API's `summary` and `analysis_job` operations.
#[async_trait]
pub trait AnalysisAdapter: Send + Sync {
    /// `POST /pricing/summary`: synchronous counts/statistics over `yaml`.
    async fn summary(&self, yaml: &str) -> Result<Value, AdapterError>;

    /// `POST /pricing/analysis`: submit an async job, returning its id.
    async fn submit_job(
        &self,
        yaml: &str,
        operation: &str,
        solver: &str,
        filters: Option<Value>,
        objective: Option<&str>,
    ) -> Result<JobId, AdapterError>;

    /// `GET /pricing/analysis/{jobId}`: current lifecycle state.
    async fn job_status(&self, job_id: &JobId) -> Result<AnalysisJob, AdapterError>;

    /// Poll `job_id` to a terminal state with the configured backoff policy.
    ///
    /// On `completed`, returns the job's result. On `failed`, returns
    /// [`AdapterError::Solver`] with the job's message. On exceeding the
    /// wall-clock cap, the handle is abandoned (not cancelled
    /// server-side) and [`TransportError::Timeout`] is returned.
    async fn poll_job(&self, job_id: &JobId) -> Result<Value, AdapterError> {
        let started = Instant::now();
        let mut attempt = 0;
        loop {
            let job = self.job_status(job_id).await?;
            match job.status {
                JobState::Completed => {
                    return Ok(job.result.unwrap_or(Value::Null));
                }
                JobState::Failed => {
                    return Err(AdapterError::Solver(
                        job.error.unwrap_or_else(|| "analysis job failed".to_string()),
                    ));
                }
                JobState::Pending | JobState::Running => {
                    if started.elapsed() >= POLL_WALL_CLOCK_CAP {
                        return Err(AdapterError::Transport(TransportError::Timeout(
                            POLL_WALL_CLOCK_CAP.as_millis() as u64,
                        )));
                    }
                    tokio::time::sleep(poll_backoff(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// `reqwest`-backed [`AnalysisAdapter`] talking to a live Analysis API.
pub struct HttpAnalysisAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAnalysisAdapter {
    /// Build an adapter targeting `base_url` (the `ANALYSIS_BASE_URL`
    /// configuration value).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

fn map_reqwest_err(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(0)
    } else if let Some(status) = err.status() {
        TransportError::HttpStatus(status.as_u16())
    } else {
        TransportError::ConnectionLost(err.to_string())
    }
}

#[derive(Deserialize)]
struct SubmitJobResponse {
    #[serde(rename = "jobId")]
    job_id: String,
}

#[async_trait]
impl AnalysisAdapter for HttpAnalysisAdapter {
    async fn summary(&self, yaml: &str) -> Result<Value, AdapterError> {
        let yaml = yaml.to_string();
        let result = with_retry(|| {
            let client = self.client.clone();
            let url = format!("{}/pricing/summary", self.base_url);
            let part = reqwest::multipart::Part::text(yaml.clone())
                .file_name("pricing.yaml")
                .mime_str("application/yaml")
                .expect("static mime string is valid");
            let form = reqwest::multipart::Form::new().part("file", part);
            async move {
                let resp = client
                    .post(&url)
                    .multipart(form)
                    .send()
                    .await
                    .map_err(map_reqwest_err)?;
                if !resp.status().is_success() {
                    return Err(TransportError::HttpStatus(resp.status().as_u16()));
                }
                resp.json::<Value>()
                    .await
                    .map_err(|e| TransportError::Decode(e.to_string()))
            }
        })
        .await?;
        Ok(result)
    }

    async fn submit_job(
        &self,
        yaml: &str,
        operation: &str,
        solver: &str,
        filters: Option<Value>,
        objective: Option<&str>,
    ) -> Result<JobId, AdapterError> {
        let yaml = yaml.to_string();
        let operation = operation.to_string();
        let solver = solver.to_string();
        let objective = objective.map(str::to_string);
        let filters_text = filters.map(|f| f.to_string());

        let response = with_retry(|| {
            let client = self.client.clone();
            let url = format!("{}/pricing/analysis", self.base_url);
            let part = reqwest::multipart::Part::text(yaml.clone())
                .file_name("pricing.yaml")
                .mime_str("application/yaml")
                .expect("static mime string is valid");
            let mut form = reqwest::multipart::Form::new()
                .part("file", part)
                .text("operation", operation.clone())
                .text("solver", solver.clone());
            if let Some(f) = &filters_text {
                form = form.text("filters", f.clone());
            }
            if let Some(o) = &objective {
                form = form.text("objective", o.clone());
            }
            async move {
                let resp = client
                    .post(&url)
                    .multipart(form)
                    .send()
                    .await
                    .map_err(map_reqwest_err)?;
                if !resp.status().is_success() {
                    return Err(TransportError::HttpStatus(resp.status().as_u16()));
                }
                resp.json::<SubmitJobResponse>()
                    .await
                    .map_err(|e| TransportError::Decode(e.to_string()))
            }
        })
        .await?;

        Ok(JobId::new(response.job_id))
    }

    async fn job_status(&self, job_id: &JobId) -> Result<AnalysisJob, AdapterError> {
        let job_id = job_id.clone();
        let job = with_retry(|| {
            let client = self.client.clone();
            let url = format!("{}/pricing/analysis/{}", self.base_url, job_id.as_str());
            async move {
                let resp = client.get(&url).send().await.map_err(map_reqwest_err)?;
                if !resp.status().is_success() {
                    return Err(TransportError::HttpStatus(resp.status().as_u16()));
                }
                resp.json::<AnalysisJob>()
                    .await
                    .map_err(|e| TransportError::Decode(e.to_string()))
            }
        })
        .await?;
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockAnalysisAdapter;
    use chrono::Utc;

    #[tokio::test]
    async fn poll_job_returns_result_on_completion() {
        let adapter = MockAnalysisAdapter::new();
        let job_id = JobId::new("j1");
        adapter.push_status(AnalysisJob {
            job_id: job_id.clone(),
            status: JobState::Running,
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        });
        adapter.push_status(AnalysisJob {
            job_id: job_id.clone(),
            status: JobState::Completed,
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: Some(serde_json::json!({"ok": true})),
            error: None,
        });

        let result = adapter.poll_job(&job_id).await.unwrap();
        assert_eq!(result, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn poll_job_surfaces_solver_error_on_failure() {
        let adapter = MockAnalysisAdapter::new();
        let job_id = JobId::new("j2");
        adapter.push_status(AnalysisJob {
            job_id: job_id.clone(),
            status: JobState::Failed,
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: Some("model infeasible".to_string()),
        });

        let err = adapter.poll_job(&job_id).await.unwrap_err();
        assert!(matches!(err, AdapterError::Solver(m) if m == "model infeasible"));
    }
}
