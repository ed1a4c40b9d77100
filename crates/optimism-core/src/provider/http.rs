//! HTTP provider speaking one of three wire formats.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::catalog::{ProviderKind, ProviderSpec, WireFormat, BUILTIN_PROVIDER_NAME};
use super::{ChatMessage, Provider, ProviderCallResult, Role};
use crate::error::ProviderError;

/// Sampling and transport settings shared by every provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            max_tokens: 2000,
            timeout: Duration::from_secs(15),
        }
    }
}

// OpenAI-compatible chat completions
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    model: Option<String>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: Option<u32>,
}

// Anthropic messages
#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<&'a ChatMessage>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

// Gemini generateContent
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystem<'a>>,
    generation_config: GeminiConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: [GeminiPart<'a>; 1],
}

#[derive(Serialize)]
struct GeminiSystem<'a> {
    parts: [GeminiPart<'a>; 1],
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    total_token_count: Option<u32>,
}

/// A configured remote provider.
pub struct HttpProvider {
    name: String,
    model: String,
    endpoint: String,
    api_key: Option<String>,
    kind: Option<ProviderKind>,
    wire: WireFormat,
    params: GenerationParams,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

impl HttpProvider {
    pub fn from_spec(spec: &ProviderSpec, params: GenerationParams) -> Self {
        Self {
            name: spec.kind.display_name().to_string(),
            model: spec.model.clone(),
            endpoint: spec.endpoint(),
            api_key: Some(spec.api_key.trim().to_string()),
            kind: Some(spec.kind),
            wire: spec.kind.wire_format(),
            params,
            client: build_client(params.timeout),
        }
    }

    /// The always-tried last resort: any OpenAI-compatible endpoint, key optional.
    pub fn builtin(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        params: GenerationParams,
    ) -> Self {
        Self {
            name: BUILTIN_PROVIDER_NAME.to_string(),
            model: model.into(),
            endpoint: endpoint.into(),
            api_key: api_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()),
            kind: None,
            wire: WireFormat::OpenAiChat,
            params,
            client: build_client(params.timeout),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn not_configured(&self, reason: &str) -> ProviderError {
        ProviderError::NotConfigured {
            provider: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    fn request_body(&self, messages: &[ChatMessage]) -> Result<serde_json::Value, serde_json::Error> {
        match self.wire {
            WireFormat::OpenAiChat => serde_json::to_value(ChatRequest {
                model: &self.model,
                messages,
                temperature: self.params.temperature,
                max_tokens: self.params.max_tokens,
            }),
            WireFormat::AnthropicMessages => serde_json::to_value(AnthropicRequest {
                model: &self.model,
                max_tokens: self.params.max_tokens,
                temperature: self.params.temperature,
                system: messages
                    .iter()
                    .find(|m| m.role == Role::System)
                    .map(|m| m.content.as_str())
                    .unwrap_or(""),
                messages: messages.iter().filter(|m| m.role != Role::System).collect(),
            }),
            WireFormat::GeminiGenerate => serde_json::to_value(GeminiRequest {
                contents: messages
                    .iter()
                    .filter(|m| m.role != Role::System)
                    .map(|m| GeminiContent {
                        role: if m.role == Role::Assistant { "model" } else { "user" },
                        parts: [GeminiPart { text: &m.content }],
                    })
                    .collect(),
                system_instruction: messages
                    .iter()
                    .find(|m| m.role == Role::System)
                    .map(|m| GeminiSystem {
                        parts: [GeminiPart { text: &m.content }],
                    }),
                generation_config: GeminiConfig {
                    temperature: self.params.temperature,
                    max_output_tokens: self.params.max_tokens,
                },
            }),
        }
    }

    /// Pull `(content, model, token_usage)` out of a decoded body.
    fn extract(&self, body: serde_json::Value) -> Result<(String, Option<String>, Option<u32>), serde_json::Error> {
        Ok(match self.wire {
            WireFormat::OpenAiChat => {
                let r: ChatResponse = serde_json::from_value(body)?;
                let content = r
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .unwrap_or_default();
                (content, r.model, r.usage.and_then(|u| u.total_tokens))
            }
            WireFormat::AnthropicMessages => {
                let r: AnthropicResponse = serde_json::from_value(body)?;
                let content = r.content.into_iter().find_map(|b| b.text).unwrap_or_default();
                let usage = r.usage.and_then(|u| match (u.input_tokens, u.output_tokens) {
                    (None, None) => None,
                    (i, o) => Some(i.unwrap_or(0) + o.unwrap_or(0)),
                });
                (content, None, usage)
            }
            WireFormat::GeminiGenerate => {
                let r: GeminiResponse = serde_json::from_value(body)?;
                let content = r
                    .candidates
                    .into_iter()
                    .next()
                    .and_then(|c| c.content)
                    .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
                    .unwrap_or_default();
                (content, None, r.usage_metadata.and_then(|u| u.total_token_count))
            }
        })
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<ProviderCallResult, ProviderError> {
        if self.endpoint.trim().is_empty() {
            return Err(self.not_configured("empty endpoint"));
        }
        if self.kind.is_some() && self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(self.not_configured("missing API key"));
        }

        let body = self.request_body(messages).map_err(|e| ProviderError::Decode {
            provider: self.name.clone(),
            message: format!("request encode failed: {}", e),
        })?;

        let mut req = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json");
        match (self.wire, self.api_key.as_deref()) {
            (WireFormat::AnthropicMessages, Some(key)) => {
                req = req.header("x-api-key", key).header("anthropic-version", "2023-06-01");
            }
            (WireFormat::GeminiGenerate, Some(key)) => {
                req = req.header("x-goog-api-key", key);
            }
            (WireFormat::OpenAiChat, Some(key)) => {
                req = req.header("Authorization", format!("Bearer {}", key));
            }
            (_, None) => {}
        }
        if self.kind == Some(ProviderKind::OpenRouter) {
            req = req
                .header("HTTP-Referer", "https://optimism-engine.local")
                .header("X-Title", "Optimism Engine");
        }

        let res = req.json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    provider: self.name.clone(),
                    secs: self.params.timeout.as_secs(),
                }
            } else {
                ProviderError::Transport {
                    provider: self.name.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        if !res.status().is_success() {
            let code = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: self.name.clone(),
                code,
                body,
            });
        }

        let json: serde_json::Value = res.json().await.map_err(|e| ProviderError::Decode {
            provider: self.name.clone(),
            message: e.to_string(),
        })?;
        let (content, model, token_usage) = self.extract(json).map_err(|e| ProviderError::Decode {
            provider: self.name.clone(),
            message: e.to_string(),
        })?;

        Ok(ProviderCallResult {
            content,
            provider_name: self.name.clone(),
            model_name: model.unwrap_or_else(|| self.model.clone()),
            token_usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn convo() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::user("again"),
        ]
    }

    fn provider(kind: ProviderKind) -> HttpProvider {
        HttpProvider::from_spec(&ProviderSpec::new(kind, " key "), GenerationParams::default())
    }

    #[test]
    fn openai_body_keeps_system_inline() {
        let body = provider(ProviderKind::Mistral).request_body(&convo()).unwrap();
        assert_eq!(body["model"], "mistral-small-latest");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"].as_array().unwrap().len(), 4);
        assert_eq!(body["max_tokens"], 2000);
    }

    #[test]
    fn anthropic_body_splits_system() {
        let body = provider(ProviderKind::Anthropic).request_body(&convo()).unwrap();
        assert_eq!(body["system"], "be brief");
        let msgs = body["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0]["role"], "user");
    }

    #[test]
    fn gemini_body_maps_roles() {
        let body = provider(ProviderKind::Gemini).request_body(&convo()).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2000);
    }

    #[test]
    fn extracts_each_wire_shape() {
        let (c, m, u) = provider(ProviderKind::OpenAi)
            .extract(json!({
                "model": "gpt-4o-2024-08-06",
                "choices": [{"message": {"content": "{\"a\":1}"}}],
                "usage": {"total_tokens": 42}
            }))
            .unwrap();
        assert_eq!((c.as_str(), m.as_deref(), u), ("{\"a\":1}", Some("gpt-4o-2024-08-06"), Some(42)));

        let (c, _, u) = provider(ProviderKind::Anthropic)
            .extract(json!({
                "content": [{"type": "text", "text": "hey"}],
                "usage": {"input_tokens": 10, "output_tokens": 5}
            }))
            .unwrap();
        assert_eq!((c.as_str(), u), ("hey", Some(15)));

        let (c, _, u) = provider(ProviderKind::Gemini)
            .extract(json!({
                "candidates": [{"content": {"parts": [{"text": "yo"}]}}],
                "usageMetadata": {"totalTokenCount": 7}
            }))
            .unwrap();
        assert_eq!((c.as_str(), u), ("yo", Some(7)));
    }

    #[test]
    fn missing_choices_extract_as_empty() {
        let (c, _, _) = provider(ProviderKind::Groq).extract(json!({"choices": []})).unwrap();
        assert!(c.is_empty());
    }

    #[test]
    fn builtin_drops_blank_key() {
        let p = HttpProvider::builtin(
            "http://127.0.0.1:11434/v1/chat/completions",
            "llama3.2",
            Some("  ".into()),
            GenerationParams::default(),
        );
        assert!(p.api_key.is_none());
        assert_eq!(p.name(), BUILTIN_PROVIDER_NAME);
    }

    #[tokio::test]
    async fn catalogue_provider_without_key_is_not_configured() {
        let p = HttpProvider::from_spec(&ProviderSpec::new(ProviderKind::Groq, "   "), GenerationParams::default());
        let err = p.complete(&convo()).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured { .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let p = HttpProvider::builtin(
            "http://127.0.0.1:9/v1/chat/completions",
            "m",
            None,
            GenerationParams {
                timeout: Duration::from_secs(2),
                ..Default::default()
            },
        );
        let err = p.complete(&convo()).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Transport { .. } | ProviderError::Timeout { .. }
        ));
    }
}
