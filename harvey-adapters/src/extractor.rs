//! Extractor adapter: `POST /api/v1/transform`.
//!
//! Invoked only from `harvey-cache`'s single-flight path — never
//! directly from the agent loop — since a single transformation may
//! take minutes.

use async_trait::async_trait;
use harvey_types::TransportError;
use serde::{Deserialize, Serialize};

use crate::retry::with_retry;
use crate::AdapterError;

/// Client for the HTML->YAML extraction service (`amint`).
#[async_trait]
pub trait ExtractorAdapter: Send + Sync {
    /// Transform `url` into its canonical YAML specification.
    async fn transform(
        &self,
        url: &str,
        model: &str,
        max_tries: u32,
        temperature: f64,
    ) -> Result<String, AdapterError>;
}

#[derive(Serialize)]
struct TransformRequest<'a> {
    url: &'a str,
    model: &'a str,
    max_tries: u32,
    temperature: f64,
}

#[derive(Deserialize)]
struct TransformResponse {
    yaml: String,
}

/// `reqwest`-backed [`ExtractorAdapter`] talking to a live extractor.
pub struct HttpExtractorAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl HttpExtractorAdapter {
    /// Build an adapter targeting `base_url` (the `AMINT_BASE_URL`
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

#[async_trait]
impl ExtractorAdapter for HttpExtractorAdapter {
    async fn transform(
        &self,
        url: &str,
        model: &str,
        max_tries: u32,
        temperature: f64,
    ) -> Result<String, AdapterError> {
        let body = with_retry(|| {
            let client = self.client.clone();
            let endpoint = format!("{}/api/v1/transform", self.base_url);
            let req = TransformRequest {
                url,
                model,
                max_tries,
                temperature,
            };
            async move {
                let resp = client
                    .post(&endpoint)
                    .json(&req)
                    .send()
                    .await
                    .map_err(map_reqwest_err)?;
                if !resp.status().is_success() {
                    return Err(TransportError::HttpStatus(resp.status().as_u16()));
                }
                resp.json::<TransformResponse>()
                    .await
                    .map_err(|e| TransportError::Decode(e.to_string()))
            }
        })
        .await?;
        Ok(body.yaml)
    }
}
