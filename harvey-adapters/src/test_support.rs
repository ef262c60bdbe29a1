//! Spy/mock adapters used to exercise single-flight, TTL, and
//! solver-failure behavior without a live extractor or analysis
//! service.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use harvey_types::{AnalysisJob, JobId, JobState};
use serde_json::Value;

use crate::analysis::AnalysisAdapter;
use crate::extractor::ExtractorAdapter;
use crate::AdapterError;

/// Extractor spy: records every URL it was asked to transform and
/// returns a canned YAML string (or error) per URL.
pub struct MockExtractorAdapter {
    responses: Mutex<HashMap<String, Result<String, String>>>,
    default_yaml: String,
    calls: AtomicU32,
    calls_by_url: Mutex<HashMap<String, u32>>,
}

impl MockExtractorAdapter {
    /// A spy that returns `default_yaml` for any URL not otherwise configured.
    pub fn new(default_yaml: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            default_yaml: default_yaml.into(),
            calls: AtomicU32::new(0),
            calls_by_url: Mutex::new(HashMap::new()),
        }
    }

    /// Configure a canned success response for a specific URL.
    pub fn set_response(&self, url: impl Into<String>, yaml: impl Into<String>) {
        self.responses.lock().unwrap().insert(url.into(), Ok(yaml.into()));
    }

    /// Configure a canned failure for a specific URL.
    pub fn set_failure(&self, url: impl Into<String>, message: impl Into<String>) {
        self.responses.lock().unwrap().insert(url.into(), Err(message.into()));
    }

    /// Total number of `transform` calls observed, across all URLs.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of `transform` calls observed for a specific URL. Used to
    /// assert the single-flight invariant: exactly one extractor call
    /// per canonical URL regardless of concurrent waiters.
    pub fn call_count_for(&self, url: &str) -> u32 {
        self.calls_by_url.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ExtractorAdapter for MockExtractorAdapter {
    async fn transform(
        &self,
        url: &str,
        _model: &str,
        _max_tries: u32,
        _temperature: f64,
    ) -> Result<String, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.calls_by_url.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;

        match self.responses.lock().unwrap().get(url) {
            Some(Ok(yaml)) => Ok(yaml.clone()),
            Some(Err(message)) => Err(AdapterError::Solver(message.clone())),
            None => Ok(self.default_yaml.clone()),
        }
    }
}

/// Analysis adapter spy: `job_status` replays a configured queue of
/// states, holding on the last one once exhausted so repeated polls
/// during a single `poll_job` call see a stable terminal state.
pub struct MockAnalysisAdapter {
    queue: Mutex<VecDeque<AnalysisJob>>,
    last: Mutex<Option<AnalysisJob>>,
    summary_response: Mutex<Value>,
    submit_calls: AtomicU32,
}

impl MockAnalysisAdapter {
    /// A spy with an empty state queue and a trivial summary response.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            summary_response: Mutex::new(serde_json::json!({})),
            submit_calls: AtomicU32::new(0),
        }
    }

    /// Queue the next state `job_status`/`poll_job` should observe.
    pub fn push_status(&self, job: AnalysisJob) {
        self.queue.lock().unwrap().push_back(job);
    }

    /// Configure the value `summary` returns.
    pub fn set_summary_response(&self, value: Value) {
        *self.summary_response.lock().unwrap() = value;
    }

    /// Number of `submit_job` calls observed. Used to assert that a
    /// rejected filter (grounding failure) never reaches the adapter.
    pub fn call_count(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockAnalysisAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisAdapter for MockAnalysisAdapter {
    async fn summary(&self, _yaml: &str) -> Result<Value, AdapterError> {
        Ok(self.summary_response.lock().unwrap().clone())
    }

    async fn submit_job(
        &self,
        _yaml: &str,
        _operation: &str,
        _solver: &str,
        _filters: Option<Value>,
        _objective: Option<&str>,
    ) -> Result<JobId, AdapterError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        Ok(JobId::new("mock-job"))
    }

    async fn job_status(&self, job_id: &JobId) -> Result<AnalysisJob, AdapterError> {
        let mut queue = self.queue.lock().unwrap();
        let job = match queue.pop_front() {
            Some(job) => {
                *self.last.lock().unwrap() = Some(job.clone());
                job
            }
            None => self.last.lock().unwrap().clone().unwrap_or(AnalysisJob {
                job_id: job_id.clone(),
                status: JobState::Pending,
                submitted_at: chrono::Utc::now(),
                started_at: None,
                completed_at: None,
                result: None,
                error: None,
            }),
        };
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extractor_spy_counts_calls_per_url() {
        let spy = MockExtractorAdapter::new("default: yaml\n");
        spy.transform("https://a", "m", 1, 0.0).await.unwrap();
        spy.transform("https://a", "m", 1, 0.0).await.unwrap();
        spy.transform("https://b", "m", 1, 0.0).await.unwrap();

        assert_eq!(spy.call_count(), 3);
        assert_eq!(spy.call_count_for("https://a"), 2);
        assert_eq!(spy.call_count_for("https://b"), 1);
    }

    #[tokio::test]
    async fn extractor_spy_honors_configured_failure() {
        let spy = MockExtractorAdapter::new("ok");
        spy.set_failure("https://bad", "boom");
        let err = spy.transform("https://bad", "m", 1, 0.0).await.unwrap_err();
        assert!(matches!(err, AdapterError::Solver(m) if m == "boom"));
    }
}
