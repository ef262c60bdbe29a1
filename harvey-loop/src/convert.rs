//! Conversions between the session-facing plain-text [`Message`] shape
//! and the provider-facing [`ProviderMessage`]/[`ContentPart`] shape.

use harvey_llm::{ContentPart, ProviderMessage, Role as ProviderRole};
use harvey_types::agent::Observation;
use harvey_types::{Message, Role};
use serde_json::Value;

/// Map a persisted conversation [`Role`] onto the provider's role set.
/// `Tool` turns have no provider-role equivalent; they are represented
/// as plain user text by the caller before reaching this function, so
/// this only needs to handle the three provider-visible roles.
fn provider_role(role: &Role) -> ProviderRole {
    match role {
        Role::System => ProviderRole::System,
        Role::User | Role::Tool => ProviderRole::User,
        Role::Assistant => ProviderRole::Assistant,
    }
}

/// Render prior plain-text conversation turns as provider messages.
pub fn history_to_provider_messages(history: &[Message]) -> Vec<ProviderMessage> {
    history
        .iter()
        .map(|m| ProviderMessage {
            role: provider_role(&m.role),
            content: vec![ContentPart::Text {
                text: m.content.clone(),
            }],
        })
        .collect()
}

/// Concatenate the text parts of a response, ignoring tool-use parts.
/// The model may interleave a short rationale with tool calls; this is
/// what is recorded as the step's `thought` and, on the final step,
/// the answer shown to the user.
pub fn extract_text(parts: &[ContentPart]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pull out every tool-use request in a response, in declaration order.
pub fn extract_tool_uses(parts: &[ContentPart]) -> Vec<(String, String, Value)> {
    parts
        .iter()
        .filter_map(|p| match p {
            ContentPart::ToolUse { id, name, input } => {
                Some((id.clone(), name.clone(), input.clone()))
            }
            _ => None,
        })
        .collect()
}

/// Render an [`Observation`] as the text payload of a `ToolResult` part.
pub fn observation_to_text(observation: &Observation) -> String {
    match observation {
        Observation::Result { value } => value.to_string(),
        Observation::Error { code, message } => {
            serde_json::json!({"error": code, "message": message}).to_string()
        }
    }
}

/// True if an observation represents a failure, for `ToolResult.is_error`.
pub fn observation_is_error(observation: &Observation) -> bool {
    matches!(observation, Observation::Error { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn history_preserves_role_and_text() {
        let history = vec![Message::new(Role::User, "hi".into(), Utc::now())];
        let rendered = history_to_provider_messages(&history);
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].role, ProviderRole::User);
        assert_eq!(extract_text(&rendered[0].content), "hi");
    }

    #[test]
    fn extract_text_ignores_tool_use_parts() {
        let parts = vec![
            ContentPart::Text { text: "thinking".into() },
            ContentPart::ToolUse {
                id: "1".into(),
                name: "iPricing".into(),
                input: serde_json::json!({}),
            },
        ];
        assert_eq!(extract_text(&parts), "thinking");
    }

    #[test]
    fn extract_tool_uses_preserves_order() {
        let parts = vec![
            ContentPart::ToolUse { id: "a".into(), name: "one".into(), input: serde_json::json!(1) },
            ContentPart::ToolUse { id: "b".into(), name: "two".into(), input: serde_json::json!(2) },
        ];
        let uses = extract_tool_uses(&parts);
        assert_eq!(uses.iter().map(|(id, _, _)| id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn observation_to_text_distinguishes_error() {
        let err = Observation::Error { code: "Timeout".into(), message: "too slow".into() };
        assert!(observation_is_error(&err));
        assert!(observation_to_text(&err).contains("Timeout"));
    }
}
