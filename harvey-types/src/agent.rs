//! Agent-loop record types: steps, tool descriptors, and terminal
//! states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::duration::DurationMs;

/// A recorded tool call within an [`AgentStep`]: name plus
/// canonicalized JSON arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Registered tool name.
    pub name: String,
    /// Canonicalized (stable key order) JSON arguments.
    pub args: Value,
}

/// Outcome of dispatching a single [`ToolCallRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Observation {
    /// The tool call succeeded.
    Result {
        /// JSON result value.
        value: Value,
    },
    /// The tool call failed; the loop continues with this recorded as
    /// context for the next LLM turn.
    Error {
        /// Stable error code (matches the shared error taxonomy's names).
        code: String,
        /// Human-readable message.
        message: String,
    },
}

/// One immutable iteration of the ReAct loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStep {
    /// Zero-based, strictly increasing, contiguous within a session.
    pub index: u32,
    /// Opaque reasoning text from the LLM, not necessarily shown to the user.
    pub thought: String,
    /// Tool calls requested in this step, in call-declaration order.
    pub tool_calls: Vec<ToolCallRecord>,
    /// Observations for each call, aligned 1:1 by index with `tool_calls`.
    pub observations: Vec<Observation>,
    /// Wall-clock time spent in this step.
    pub duration: DurationMs,
    /// Prompt tokens consumed, if reported by the provider.
    pub tokens_in: Option<u32>,
    /// Completion tokens produced, if reported by the provider.
    pub tokens_out: Option<u32>,
    /// When the step was appended.
    pub created_at: DateTime<Utc>,
}

/// Side-effect classification of a tool, used for UI affordances and
/// for deciding whether a call is safe to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SideEffect {
    /// No observable effect beyond returning a value.
    Pure,
    /// Reads or writes over the network but does not mutate user state.
    Network,
    /// Mutates stored state (e.g. deletes a blob).
    Destructive,
}

/// A single parameter in a [`ToolDescriptor`]'s schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSchema {
    /// Parameter name.
    pub name: String,
    /// JSON Schema type name (`string`, `number`, `boolean`, `array`, `object`).
    pub json_type: String,
    /// Whether the parameter may be omitted.
    pub optional: bool,
    /// Allowed values, if this parameter is an enumeration.
    pub enum_values: Option<Vec<String>>,
    /// Nested schema for `object`/`array` parameters.
    pub nested: Option<Vec<ParamSchema>>,
    /// Inclusive lower bound for `number`/`integer` parameters.
    pub minimum: Option<f64>,
    /// Inclusive upper bound for `number`/`integer` parameters.
    pub maximum: Option<f64>,
}

impl ParamSchema {
    /// A required parameter with no enum/nested/bound constraints.
    pub fn required(name: impl Into<String>, json_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            json_type: json_type.into(),
            optional: false,
            enum_values: None,
            nested: None,
            minimum: None,
            maximum: None,
        }
    }

    /// Mark this parameter optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Constrain this parameter to an enumeration of string values.
    pub fn with_enum(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Attach a nested object/array schema.
    pub fn with_nested(mut self, nested: Vec<ParamSchema>) -> Self {
        self.nested = Some(nested);
        self
    }

    /// Constrain a numeric parameter to `[min, max]`.
    pub fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.minimum = min;
        self.maximum = max;
        self
    }
}

/// Immutable, process-lifetime description of a registered tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Contractual tool name (e.g. `iPricing`, `optimal`).
    pub name: String,
    /// Human-readable description shown to the LLM.
    pub description: String,
    /// Input parameter schema.
    pub input_schema: Vec<ParamSchema>,
    /// Output JSON Schema, expressed the same way as input.
    pub output_schema: Vec<ParamSchema>,
    /// Side-effect classification.
    pub side_effect: SideEffect,
}

/// Why a session's agent loop stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The LLM produced a final answer.
    Answered,
    /// An unrecoverable error ended the session.
    Failed,
    /// The caller (or a watchdog) cancelled the session.
    Cancelled,
    /// The step budget was exhausted and a forced final answer was taken.
    BudgetExhausted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_tags_distinguish_result_and_error() {
        let ok = Observation::Result { value: serde_json::json!({"a": 1}) };
        let err = Observation::Error { code: "ToolInternal".into(), message: "boom".into() };
        let ok_json = serde_json::to_value(&ok).unwrap();
        let err_json = serde_json::to_value(&err).unwrap();
        assert_eq!(ok_json["outcome"], "result");
        assert_eq!(err_json["outcome"], "error");
    }
}
