//! Tunable policy for the agent loop.

use std::time::Duration;

/// Default step budget per run.
pub const DEFAULT_STEP_BUDGET: u32 = 8;
/// Hard upper bound on the step budget, regardless of configuration.
pub const HARD_CAP_STEP_BUDGET: u32 = 16;
/// Default per-step wall-clock timeout.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(90);
/// Default per-tool timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);
/// LLM transport retries attempted before failing the session.
pub const MAX_LLM_RETRIES: u32 = 2;
/// Solver identifier used when a tool call doesn't name one explicitly.
pub const DEFAULT_SOLVER: &str = "minizinc";

/// Policy knobs for a single [`crate::AgentLoop`] run.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Soft step budget; exceeding it forces a final answer.
    pub step_budget: u32,
    /// Wall-clock budget for a single step (LLM call + its tool fan-out).
    pub step_timeout: Duration,
    /// Wall-clock budget for a single tool invocation.
    pub tool_timeout: Duration,
    /// Cap on completion tokens requested from the provider, if any.
    pub max_tokens: Option<u32>,
    /// Sampling temperature passed through to the provider, if any.
    pub temperature: Option<f64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            step_budget: DEFAULT_STEP_BUDGET,
            step_timeout: DEFAULT_STEP_TIMEOUT,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            max_tokens: None,
            temperature: None,
        }
    }
}

impl LoopConfig {
    /// Set the step budget, silently clamping to [`HARD_CAP_STEP_BUDGET`].
    pub fn with_step_budget(mut self, n: u32) -> Self {
        if n > HARD_CAP_STEP_BUDGET {
            tracing::warn!(requested = n, cap = HARD_CAP_STEP_BUDGET, "clamping step budget to hard cap");
            self.step_budget = HARD_CAP_STEP_BUDGET;
        } else {
            self.step_budget = n;
        }
        self
    }

    /// Override the per-step wall-clock timeout.
    pub fn with_step_timeout(mut self, d: Duration) -> Self {
        self.step_timeout = d;
        self
    }

    /// Override the per-tool timeout.
    pub fn with_tool_timeout(mut self, d: Duration) -> Self {
        self.tool_timeout = d;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_budget_clamps_to_hard_cap() {
        let cfg = LoopConfig::default().with_step_budget(100);
        assert_eq!(cfg.step_budget, HARD_CAP_STEP_BUDGET);
    }

    #[test]
    fn step_budget_under_cap_is_unchanged() {
        let cfg = LoopConfig::default().with_step_budget(4);
        assert_eq!(cfg.step_budget, 4);
    }
}
