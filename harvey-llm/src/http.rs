//! Generic OpenAI-chat-completions-shaped [`Provider`] implementation.
//!
//! Works against any endpoint that speaks the `/chat/completions`
//! wire format — the public OpenAI API, Azure OpenAI, or a self-hosted
//! gateway — since nothing here is vendor-specific beyond that shape.
//! Configuration (base URL, model, credential) comes entirely from
//! [`HttpProvider::new`]/builder methods, sourced by the caller from
//! `OPENAI_API_KEY`/`OPENAI_MODEL` or equivalent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::{Provider, ProviderError};
use crate::types::{ContentPart, ProviderMessage, ProviderRequest, ProviderResponse, Role, StopReason, TokenUsage};

/// An OpenAI-chat-completions-shaped HTTP provider.
pub struct HttpProvider {
    api_key: String,
    client: reqwest::Client,
    api_url: String,
    default_model: String,
}

impl HttpProvider {
    /// Build a provider targeting the public OpenAI API with `model`
    /// as the default and `api_key` as the bearer credential.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            default_model: model.into(),
        }
    }

    /// Override the endpoint URL (Azure OpenAI, a self-hosted gateway,
    /// or a test double).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    fn build_request(&self, request: &ProviderRequest) -> WireRequest {
        let model = request.model.clone().unwrap_or_else(|| self.default_model.clone());

        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(WireMessage {
                role: "system".to_string(),
                content: Some(system.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for m in &request.messages {
            messages.extend(to_wire_messages(m));
        }

        let tools: Vec<WireTool> = request
            .tools
            .iter()
            .map(|t| WireTool {
                tool_type: "function".to_string(),
                function: WireFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect();

        WireRequest {
            model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools,
        }
    }

    fn parse_response(&self, response: WireResponse) -> Result<ProviderResponse, ProviderError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("no choices in response".to_string()))?;

        let mut content = Vec::new();
        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                content.push(ContentPart::Text { text });
            }
        }
        for call in choice.message.tool_calls.unwrap_or_default() {
            let input: Value = serde_json::from_str(&call.function.arguments)
                .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
            content.push(ContentPart::ToolUse {
                id: call.id,
                name: call.function.name,
                input,
            });
        }

        let stop_reason = match choice.finish_reason.as_deref() {
            Some("tool_calls") => StopReason::ToolUse,
            Some("length") => StopReason::MaxTokens,
            Some("content_filter") => StopReason::ContentFilter,
            _ => StopReason::EndTurn,
        };

        Ok(ProviderResponse {
            content,
            stop_reason,
            usage: TokenUsage {
                input_tokens: response.usage.prompt_tokens,
                output_tokens: response.usage.completion_tokens,
            },
            model: response.model,
        })
    }
}

impl Provider for HttpProvider {
    fn complete(
        &self,
        request: ProviderRequest,
    ) -> impl std::future::Future<Output = Result<ProviderResponse, ProviderError>> + Send {
        let wire_request = self.build_request(&request);
        let http_request = self
            .client
            .post(&self.api_url)
            .header("authorization", format!("Bearer {}", self.api_key))
            .json(&wire_request);

        async move {
            let http_response = http_request
                .send()
                .await
                .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

            let status = http_response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(ProviderError::RateLimited);
            }
            if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
                let body = http_response.text().await.unwrap_or_default();
                return Err(ProviderError::AuthFailed(body));
            }
            if !status.is_success() {
                let body = http_response.text().await.unwrap_or_default();
                return Err(ProviderError::RequestFailed(format!("http {status}: {body}")));
            }

            let wire_response: WireResponse = http_response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

            self.parse_response(wire_response)
        }
    }
}

fn to_wire_messages(m: &ProviderMessage) -> Vec<WireMessage> {
    match m.role {
        Role::System => vec![WireMessage {
            role: "system".to_string(),
            content: Some(extract_text(&m.content)),
            tool_calls: None,
            tool_call_id: None,
        }],
        Role::User => {
            let mut out = Vec::new();
            let mut text_parts = Vec::new();
            for part in &m.content {
                match part {
                    ContentPart::ToolResult { tool_use_id, content, .. } => {
                        out.push(WireMessage {
                            role: "tool".to_string(),
                            content: Some(content.clone()),
                            tool_calls: None,
                            tool_call_id: Some(tool_use_id.clone()),
                        });
                    }
                    other => text_parts.push(other.clone()),
                }
            }
            if !text_parts.is_empty() || out.is_empty() {
                out.push(WireMessage {
                    role: "user".to_string(),
                    content: Some(extract_text(&text_parts)),
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
            out
        }
        Role::Assistant => {
            let mut tool_calls = Vec::new();
            let mut text_parts = Vec::new();
            for part in &m.content {
                match part {
                    ContentPart::ToolUse { id, name, input } => tool_calls.push(WireToolCall {
                        id: id.clone(),
                        call_type: "function".to_string(),
                        function: WireFunctionCall {
                            name: name.clone(),
                            arguments: serde_json::to_string(input).unwrap_or_default(),
                        },
                    }),
                    other => text_parts.push(other.clone()),
                }
            }
            vec![WireMessage {
                role: "assistant".to_string(),
                content: if text_parts.is_empty() { None } else { Some(extract_text(&text_parts)) },
                tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                tool_call_id: None,
            }]
        }
    }
}

fn extract_text(parts: &[ContentPart]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    model: String,
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolSchema;

    fn provider() -> HttpProvider {
        HttpProvider::new("sk-test", "gpt-4o-mini")
    }

    #[test]
    fn build_request_includes_system_prompt_as_first_message() {
        let request = ProviderRequest {
            model: None,
            messages: vec![],
            tools: vec![],
            max_tokens: None,
            temperature: None,
            system: Some("you are Harvey".to_string()),
        };
        let wire = provider().build_request(&request);
        assert_eq!(wire.messages[0].role, "system");
        assert_eq!(wire.messages[0].content.as_deref(), Some("you are Harvey"));
    }

    #[test]
    fn build_request_maps_tool_result_to_tool_role_message() {
        let request = ProviderRequest {
            model: None,
            messages: vec![ProviderMessage {
                role: Role::User,
                content: vec![ContentPart::ToolResult {
                    tool_use_id: "call_1".to_string(),
                    content: "{\"plans\": []}".to_string(),
                    is_error: false,
                }],
            }],
            tools: vec![ToolSchema {
                name: "iPricing".to_string(),
                description: "resolves a pricing URL".to_string(),
                input_schema: serde_json::json!({"type": "object"}),
            }],
            max_tokens: None,
            temperature: None,
            system: None,
        };
        let wire = provider().build_request(&request);
        let tool_msg = wire.messages.iter().find(|m| m.role == "tool").unwrap();
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(wire.tools.len(), 1);
    }

    #[test]
    fn parse_response_maps_tool_calls_finish_reason_to_tool_use() {
        let response = WireResponse {
            model: "gpt-4o-mini".to_string(),
            choices: vec![WireChoice {
                message: WireResponseMessage {
                    content: None,
                    tool_calls: Some(vec![WireToolCall {
                        id: "call_1".to_string(),
                        call_type: "function".to_string(),
                        function: WireFunctionCall {
                            name: "iPricing".to_string(),
                            arguments: "{\"url\":\"https://example.com\"}".to_string(),
                        },
                    }]),
                },
                finish_reason: Some("tool_calls".to_string()),
            }],
            usage: WireUsage { prompt_tokens: 10, completion_tokens: 5 },
        };
        let parsed = provider().parse_response(response).unwrap();
        assert_eq!(parsed.stop_reason, StopReason::ToolUse);
        assert!(matches!(&parsed.content[0], ContentPart::ToolUse { name, .. } if name == "iPricing"));
    }
}
