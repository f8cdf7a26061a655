//! LLM HTTP client
//!
//! One client per (provider, model) pair speaking one of the three
//! wire formats. One request per call, 180-second timeout, no
//! streaming. Error bodies are mapped into the taxonomy; API keys
//! never appear in errors or logs.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::providers::{ProviderDef, ProviderKind};
use crate::errors::{map_provider_error, AuditError};

/// Per-call timeout.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(180);

/// A completed (non-streamed) model response.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// The provider signalled that output hit the token ceiling.
    pub truncated: bool,
}

/// Client bound to one provider and model.
pub struct LlmClient {
    provider: &'static ProviderDef,
    model: String,
    api_key: String,
    http: reqwest::Client,
}

impl LlmClient {
    const ANTHROPIC_VERSION: &'static str = "2023-06-01";

    pub fn new(provider: &'static ProviderDef, model: impl Into<String>) -> Result<Self, AuditError> {
        let api_key = std::env::var(provider.env_var)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(AuditError::no_provider)?;

        let http = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .expect("HTTP client construction cannot fail with static options");

        Ok(Self {
            provider,
            model: model.into(),
            api_key,
            http,
        })
    }

    pub fn provider(&self) -> &'static ProviderDef {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Issue one completion request.
    pub async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<LlmResponse, AuditError> {
        debug!(provider = self.provider.key, model = %self.model, "dispatching LLM call");
        match self.provider.kind {
            ProviderKind::Anthropic => self.complete_anthropic(system, user, max_tokens).await,
            ProviderKind::Gemini => self.complete_gemini(system, user, max_tokens).await,
            ProviderKind::OpenAiCompatible => {
                self.complete_openai(system, user, max_tokens).await
            }
        }
    }

    async fn complete_anthropic(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<LlmResponse, AuditError> {
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens,
            system,
            messages: vec![WireMessage {
                role: "user",
                content: user,
            }],
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.provider.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", Self::ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        if !(200..300).contains(&status) {
            return Err(map_provider_error(self.provider.name, &self.model, status, &body));
        }

        let parsed: AnthropicResponse =
            serde_json::from_str(&body).map_err(|e| self.body_error(&body, e))?;
        let text = parsed
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        Ok(LlmResponse {
            text,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
            truncated: parsed.stop_reason.as_deref() == Some("max_tokens"),
        })
    }

    async fn complete_gemini(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<LlmResponse, AuditError> {
        let request = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: system }],
            },
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart { text: user }],
            }],
            generation_config: GeminiGenerationConfig {
                max_output_tokens: max_tokens,
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.provider.base_url, self.model
        );
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        if !(200..300).contains(&status) {
            return Err(map_provider_error(self.provider.name, &self.model, status, &body));
        }

        let parsed: GeminiResponse =
            serde_json::from_str(&body).map_err(|e| self.body_error(&body, e))?;
        let candidate = parsed.candidates.into_iter().next().unwrap_or_default();
        let text = candidate
            .content
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        Ok(LlmResponse {
            text,
            input_tokens: parsed.usage_metadata.prompt_token_count,
            output_tokens: parsed.usage_metadata.candidates_token_count,
            truncated: candidate.finish_reason.as_deref() == Some("MAX_TOKENS"),
        })
    }

    async fn complete_openai(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<LlmResponse, AuditError> {
        let request = OpenAiRequest {
            model: &self.model,
            max_tokens,
            messages: vec![
                WireMessage {
                    role: "system",
                    content: system,
                },
                WireMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.provider.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        if !(200..300).contains(&status) {
            return Err(map_provider_error(self.provider.name, &self.model, status, &body));
        }

        let parsed: OpenAiResponse =
            serde_json::from_str(&body).map_err(|e| self.body_error(&body, e))?;
        let choice = parsed.choices.into_iter().next().unwrap_or_default();

        Ok(LlmResponse {
            text: choice.message.content.unwrap_or_default(),
            input_tokens: parsed.usage.prompt_tokens,
            output_tokens: parsed.usage.completion_tokens,
            truncated: choice.finish_reason.as_deref() == Some("length"),
        })
    }

    fn transport_error(&self, error: reqwest::Error) -> AuditError {
        let message = if error.is_timeout() {
            format!("request timed out after {}s", CALL_TIMEOUT.as_secs())
        } else {
            // reqwest errors never include request headers, so no key
            // can leak here.
            format!("request failed: {error}")
        };
        AuditError::ProviderServer {
            provider: self.provider.name.to_string(),
            message,
            hint: "Check connectivity to the provider, then retry.".to_string(),
        }
    }

    fn body_error(&self, body: &str, error: serde_json::Error) -> AuditError {
        let preview: String = body.chars().take(2000).collect();
        AuditError::ProviderParse {
            message: format!("{} returned an undecodable body: {error}", self.provider.name),
            body_preview: preview,
        }
    }
}

// Wire shapes. Only the fields the orchestrator reads are modelled.

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContent>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: TokenUsage,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Default, Deserialize)]
struct TokenUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    #[serde(rename = "systemInstruction")]
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default, rename = "usageMetadata")]
    usage_metadata: GeminiUsage,
}

#[derive(Default, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiCandidateContent,
    #[serde(default, rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Default, Deserialize)]
struct GeminiUsage {
    #[serde(default, rename = "promptTokenCount")]
    prompt_token_count: u64,
    #[serde(default, rename = "candidatesTokenCount")]
    candidates_token_count: u64,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: OpenAiUsage,
}

#[derive(Default, Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    message: OpenAiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Default, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_response_parses() {
        let body = r#"{
            "content": [{"type": "text", "text": "{\"findings\": []}"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 1200, "output_tokens": 300}
        }"#;
        let parsed: AnthropicResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.usage.input_tokens, 1200);
        assert_eq!(parsed.stop_reason.as_deref(), Some("end_turn"));
    }

    #[test]
    fn anthropic_truncation_flag() {
        let body = r#"{"content": [], "stop_reason": "max_tokens", "usage": {}}"#;
        let parsed: AnthropicResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.stop_reason.as_deref(), Some("max_tokens"));
    }

    #[test]
    fn gemini_response_parses() {
        let body = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "hello "}, {"text": "world"}]},
                "finishReason": "MAX_TOKENS"
            }],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5}
        }"#;
        let parsed: GeminiResponse = serde_json::from_str(body).unwrap();
        let candidate = &parsed.candidates[0];
        assert_eq!(candidate.finish_reason.as_deref(), Some("MAX_TOKENS"));
        assert_eq!(parsed.usage_metadata.prompt_token_count, 10);
    }

    #[test]
    fn openai_response_parses() {
        let body = r#"{
            "choices": [{"message": {"content": "ok"}, "finish_reason": "length"}],
            "usage": {"prompt_tokens": 7, "completion_tokens": 2}
        }"#;
        let parsed: OpenAiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].finish_reason.as_deref(), Some("length"));
        assert_eq!(parsed.usage.completion_tokens, 2);
    }

    #[test]
    fn missing_fields_default_cleanly() {
        let parsed: OpenAiResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.choices.is_empty());
        assert_eq!(parsed.usage.prompt_tokens, 0);
    }
}
