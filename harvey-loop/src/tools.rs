//! Implementations of the six contractual built-in tools,
//! wired to the grounding layer (C6) and the downstream adapters (C3).
//!
//! `harvey-tool`'s descriptors are purely declarative; the bodies live
//! here because this is the first crate in the dependency graph that
//! can see the cache, the adapters, and the grounding layer all at once.
//! Each wrapper is cheap to construct and holds only `Arc` clones of
//! the process-lifetime singletons plus the [`SessionId`] of the
//! session it was built for, so a fresh registry is built per session
//! (see [`build_registry`]) rather than sharing one across sessions.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use harvey_adapters::{AdapterError, AnalysisAdapter, ExtractorAdapter};
use harvey_cache::PricingContextCache;
use harvey_grounding::{FilterInput, GroundingFailure};
use harvey_tool::{builtins, ToolDyn, ToolError, ToolRegistry};
use harvey_types::{SessionId, ToolDescriptor};
use serde_json::Value;

use crate::config::DEFAULT_SOLVER;

fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::ArgumentInvalid {
            path: key.to_string(),
            reason: "expected a string".to_string(),
        })
}

fn map_grounding_err(err: GroundingFailure) -> ToolError {
    let (code, message) = match err {
        GroundingFailure::Grounding(ge) => {
            let code = match &ge {
                harvey_types::GroundingError::UnknownFeature(_) => "UnknownFeature",
                harvey_types::GroundingError::UnknownUsageLimit(_) => "UnknownUsageLimit",
                harvey_types::GroundingError::UnitMismatch { .. } => "UnitMismatch",
                harvey_types::GroundingError::InvalidRange(_) => "InvalidRange",
                _ => "GroundingError",
            };
            (code.to_string(), ge.to_string())
        }
        GroundingFailure::InvalidYaml(msg) => ("SchemaMismatch".to_string(), msg),
    };
    ToolError::Semantic { code, message }
}

fn map_adapter_err(err: AdapterError) -> ToolError {
    match err {
        AdapterError::Solver(msg) => ToolError::Semantic {
            code: "SolverError".to_string(),
            message: msg,
        },
        AdapterError::Transport(t) => ToolError::Semantic {
            code: "UpstreamUnavailable".to_string(),
            message: t.to_string(),
        },
    }
}

/// Parse a tool's `filters` argument (if present) into a [`FilterInput`].
fn parse_filters(args: &Value) -> Result<FilterInput, ToolError> {
    match args.get("filters") {
        None | Some(Value::Null) => Ok(FilterInput::default()),
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| ToolError::ArgumentInvalid {
            path: "filters".to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Parse + ground a tool's `filters` argument against the supplied YAML.
fn ground_filters(yaml: &str, args: &Value) -> Result<harvey_grounding::GroundedFilter, ToolError> {
    let filter = parse_filters(args)?;
    let spec = harvey_grounding::parse_spec(yaml).map_err(map_grounding_err)?;
    harvey_grounding::ground(&spec, &filter).map_err(map_grounding_err)
}

type CallFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>>;

/// `iPricing`: resolve a raw URL to canonical YAML via the pricing cache.
pub struct IPricingTool<E: ExtractorAdapter> {
    cache: Arc<PricingContextCache<E>>,
    session: SessionId,
    descriptor: ToolDescriptor,
}

impl<E: ExtractorAdapter> IPricingTool<E> {
    fn new(cache: Arc<PricingContextCache<E>>, session: SessionId) -> Self {
        Self {
            cache,
            session,
            descriptor: builtins::i_pricing_descriptor(),
        }
    }
}

impl<E: ExtractorAdapter + 'static> ToolDyn for IPricingTool<E> {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn call(&self, args: Value) -> CallFuture<'_> {
        Box::pin(async move {
            let url = require_str(&args, "url")?;
            let canonical = harvey_types::TransformationRequest::canonicalize(url);
            let yaml = self
                .cache
                .resolve(url, &self.session)
                .await
                .map_err(|cause| ToolError::Semantic {
                    code: "UpstreamUnavailable".to_string(),
                    message: cause.to_string(),
                })?;
            Ok(serde_json::json!({"yaml": yaml, "canonicalUrl": canonical.as_str()}))
        })
    }
}

/// `summary`: synchronous statistics over a pricing YAML.
pub struct SummaryTool<A: AnalysisAdapter> {
    analysis: Arc<A>,
    descriptor: ToolDescriptor,
}

impl<A: AnalysisAdapter> SummaryTool<A> {
    fn new(analysis: Arc<A>) -> Self {
        Self {
            analysis,
            descriptor: builtins::summary_descriptor(),
        }
    }
}

impl<A: AnalysisAdapter + 'static> ToolDyn for SummaryTool<A> {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn call(&self, args: Value) -> CallFuture<'_> {
        Box::pin(async move {
            let yaml = require_str(&args, "yaml")?;
            self.analysis.summary(yaml).await.map_err(map_adapter_err)
        })
    }
}

/// `subscriptions`: enumerate valid configurations, optionally filtered.
pub struct SubscriptionsTool<A: AnalysisAdapter> {
    analysis: Arc<A>,
    descriptor: ToolDescriptor,
}

impl<A: AnalysisAdapter> SubscriptionsTool<A> {
    fn new(analysis: Arc<A>) -> Self {
        Self {
            analysis,
            descriptor: builtins::subscriptions_descriptor(),
        }
    }
}

impl<A: AnalysisAdapter + 'static> ToolDyn for SubscriptionsTool<A> {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn call(&self, args: Value) -> CallFuture<'_> {
        Box::pin(async move {
            let yaml = require_str(&args, "yaml")?;
            let filters = if args.get("filters").is_some() {
                let grounded = ground_filters(yaml, &args)?;
                Some(serde_json::to_value(grounded).expect("GroundedFilter always serializes"))
            } else {
                None
            };
            let job_id = self
                .analysis
                .submit_job(yaml, "subscriptions", DEFAULT_SOLVER, filters, None)
                .await
                .map_err(map_adapter_err)?;
            self.analysis.poll_job(&job_id).await.map_err(map_adapter_err)
        })
    }
}

/// `optimal`: find the best configuration under filters and an objective.
pub struct OptimalTool<A: AnalysisAdapter> {
    analysis: Arc<A>,
    descriptor: ToolDescriptor,
}

impl<A: AnalysisAdapter> OptimalTool<A> {
    fn new(analysis: Arc<A>) -> Self {
        Self {
            analysis,
            descriptor: builtins::optimal_descriptor(),
        }
    }
}

impl<A: AnalysisAdapter + 'static> ToolDyn for OptimalTool<A> {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn call(&self, args: Value) -> CallFuture<'_> {
        Box::pin(async move {
            let yaml = require_str(&args, "yaml")?;
            let objective = require_str(&args, "objective")?;
            let grounded = ground_filters(yaml, &args)?;
            let filters = serde_json::to_value(grounded).expect("GroundedFilter always serializes");
            let job_id = self
                .analysis
                .submit_job(yaml, "optimal", DEFAULT_SOLVER, Some(filters), Some(objective))
                .await
                .map_err(map_adapter_err)?;
            self.analysis.poll_job(&job_id).await.map_err(map_adapter_err)
        })
    }
}

/// `validate`: check a pricing YAML document against the solver.
pub struct ValidateTool<A: AnalysisAdapter> {
    analysis: Arc<A>,
    descriptor: ToolDescriptor,
}

impl<A: AnalysisAdapter> ValidateTool<A> {
    fn new(analysis: Arc<A>) -> Self {
        Self {
            analysis,
            descriptor: builtins::validate_descriptor(),
        }
    }
}

impl<A: AnalysisAdapter + 'static> ToolDyn for ValidateTool<A> {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn call(&self, args: Value) -> CallFuture<'_> {
        Box::pin(async move {
            let yaml = require_str(&args, "yaml")?;
            let solver = args
                .get("solver")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_SOLVER);
            let job_id = self
                .analysis
                .submit_job(yaml, "validate", solver, None, None)
                .await
                .map_err(map_adapter_err)?;
            self.analysis.poll_job(&job_id).await.map_err(map_adapter_err)
        })
    }
}

/// `filter`: restrict a pricing YAML's configuration space.
pub struct FilterTool<A: AnalysisAdapter> {
    analysis: Arc<A>,
    descriptor: ToolDescriptor,
}

impl<A: AnalysisAdapter> FilterTool<A> {
    fn new(analysis: Arc<A>) -> Self {
        Self {
            analysis,
            descriptor: builtins::filter_descriptor(),
        }
    }
}

impl<A: AnalysisAdapter + 'static> ToolDyn for FilterTool<A> {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn call(&self, args: Value) -> CallFuture<'_> {
        Box::pin(async move {
            let yaml = require_str(&args, "yaml")?;
            let grounded = ground_filters(yaml, &args)?;
            let filters = serde_json::to_value(grounded).expect("GroundedFilter always serializes");
            let job_id = self
                .analysis
                .submit_job(yaml, "filter", DEFAULT_SOLVER, Some(filters), None)
                .await
                .map_err(map_adapter_err)?;
            self.analysis.poll_job(&job_id).await.map_err(map_adapter_err)
        })
    }
}

/// Build a fresh [`ToolRegistry`] for `session`, closing over the
/// process-lifetime cache and analysis adapter. Cheap: only the thin
/// tool wrappers are allocated per call.
pub fn build_registry<E, A>(
    cache: Arc<PricingContextCache<E>>,
    analysis: Arc<A>,
    session: SessionId,
) -> ToolRegistry
where
    E: ExtractorAdapter + 'static,
    A: AnalysisAdapter + 'static,
{
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(IPricingTool::new(cache, session)));
    registry.register(Arc::new(SummaryTool::new(analysis.clone())));
    registry.register(Arc::new(SubscriptionsTool::new(analysis.clone())));
    registry.register(Arc::new(OptimalTool::new(analysis.clone())));
    registry.register(Arc::new(ValidateTool::new(analysis.clone())));
    registry.register(Arc::new(FilterTool::new(analysis)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvey_adapters::test_support::{MockAnalysisAdapter, MockExtractorAdapter};
    use harvey_notify::NotifyBus;

    fn yaml_with_sso() -> &'static str {
        "features:\n  SSO: {}\nusageLimits:\n  Users:\n    unit: users\n"
    }

    #[tokio::test]
    async fn unknown_feature_never_reaches_adapter() {
        let extractor = MockExtractorAdapter::new(yaml_with_sso());
        let cache = Arc::new(PricingContextCache::new(
            extractor,
            Arc::new(NotifyBus::new()),
            harvey_cache::CacheConfig::default(),
        ));
        let analysis = Arc::new(MockAnalysisAdapter::new());
        let registry = build_registry(cache, analysis.clone(), SessionId::new("s1"));

        let err = registry
            .invoke(
                "optimal",
                serde_json::json!({
                    "yaml": yaml_with_sso(),
                    "filters": {"features": ["NoSuchFeature"]},
                    "objective": "minimize",
                }),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::Semantic { code, .. } if code == "UnknownFeature"));
        assert_eq!(analysis.call_count(), 0);
    }

    #[tokio::test]
    async fn registry_lists_all_six_builtins_in_order() {
        let extractor = MockExtractorAdapter::new(yaml_with_sso());
        let cache = Arc::new(PricingContextCache::new(
            extractor,
            Arc::new(NotifyBus::new()),
            harvey_cache::CacheConfig::default(),
        ));
        let analysis = Arc::new(MockAnalysisAdapter::new());
        let registry = build_registry(cache, analysis, SessionId::new("s1"));
        let names: Vec<&str> = registry.list().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["iPricing", "summary", "subscriptions", "optimal", "validate", "filter"]
        );
    }
}
