//! The [`Provider`] trait LLM backends implement.

use std::future::Future;

use thiserror::Error;

use crate::types::{ProviderRequest, ProviderResponse};

/// Errors from LLM providers.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The HTTP request failed before a response was received.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The provider rate-limited the request.
    #[error("rate limited")]
    RateLimited,

    /// Authentication or authorization failed.
    #[error("auth failed: {0}")]
    AuthFailed(String),

    /// The provider's response couldn't be parsed into the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether retrying this request might succeed: the loop
    /// retries LLM transport failures up to twice with backoff before
    /// failing the session.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited | ProviderError::RequestFailed(_)
        )
    }
}

/// LLM provider interface.
///
/// Uses RPITIT and is intentionally not object-safe: `harvey-loop` is
/// generic over `P: Provider` rather than boxing it, since a session
/// runs against exactly one provider for its lifetime and the
/// monomorphized path avoids a vtable indirection on the hottest
/// suspension point in the loop.
pub trait Provider: Send + Sync {
    /// Complete one ReAct step's request.
    fn complete(
        &self,
        request: ProviderRequest,
    ) -> impl Future<Output = Result<ProviderResponse, ProviderError>> + Send;
}

impl<T: Provider + ?Sized> Provider for std::sync::Arc<T> {
    fn complete(
        &self,
        request: ProviderRequest,
    ) -> impl Future<Output = Result<ProviderResponse, ProviderError>> + Send {
        (**self).complete(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_retryable_matrix() {
        assert!(ProviderError::RateLimited.is_retryable());
        assert!(ProviderError::RequestFailed("timeout".into()).is_retryable());
        assert!(!ProviderError::AuthFailed("bad key".into()).is_retryable());
        assert!(!ProviderError::InvalidResponse("bad json".into()).is_retryable());
    }
}
