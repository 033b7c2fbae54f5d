use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::error::{Error, ErrorCode, Result};
use crate::limits::CircuitBreaker;
use crate::providers::{Provider, TextGenerator, TextPrompt};

pub const DEFAULT_TEMPERATURE: f32 = 0.8;
pub const DEFAULT_MAX_TOKENS: u32 = 300;

fn openai_error(message: impl Into<String>) -> Error {
    Error::new(message, 500, ErrorCode::Vendor("OPENAI".to_string()))
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
    circuit_breaker: CircuitBreaker,
}

impl OpenAIProvider {
    /// Fails with `OPENAI_KEY_MISSING` when no key is available, so the
    /// bootstrap can skip registration.
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        default_model: impl Into<String>,
        timeout: Duration,
        circuit_breaker: CircuitBreaker,
    ) -> Result<Self> {
        let api_key = api_key.ok_or_else(|| {
            Error::key_missing(
                "OPENAI",
                "OPENAI_API_KEY is not loaded. Set OPENAI_API_KEY in the environment.",
            )
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_model: default_model.into(),
            circuit_breaker,
        })
    }

    fn create_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| openai_error(format!("Invalid API key format: {}", e)))?;
        headers.insert(AUTHORIZATION, auth_value);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(headers)
    }

    fn build_request(&self, prompt: &TextPrompt) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = prompt.system.as_deref().filter(|s| !s.trim().is_empty()) {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.prompt.clone(),
        });

        ChatCompletionRequest {
            model: prompt
                .model
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| self.default_model.clone()),
            messages,
            temperature: prompt.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: prompt.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        }
    }

    async fn make_request(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let headers = self.create_headers()?;

        debug!(
            "Sending request to OpenAI: model={}, messages={}",
            request.model,
            request.messages.len()
        );
        let start_time = Instant::now();

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(format!("OpenAI request timed out: {}", e))
                } else {
                    openai_error(format!("OpenAI request failed: {}", e))
                }
            })?;

        debug!("OpenAI request completed in {:?}", start_time.elapsed());

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("OpenAI API error: {} - {}", status, body);
            return Err(api_error(status, &body, &self.api_key));
        }

        response
            .json()
            .await
            .map_err(|e| openai_error(format!("Failed to parse OpenAI response: {}", e)))
    }
}

fn api_error(status: StatusCode, body: &str, api_key: &str) -> Error {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let detail = parsed
        .as_ref()
        .and_then(|v| v["error"]["message"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());

    let message = if status == StatusCode::UNAUTHORIZED {
        format!(
            "OpenAI rejected the API key ({}). Check OPENAI_API_KEY. {}",
            mask_key(api_key),
            detail
        )
    } else {
        format!("OpenAI API error {}: {}", status.as_u16(), detail)
    };

    openai_error(message).with_details(json!({
        "externalStatusCode": status.as_u16(),
        "originalError": parsed.unwrap_or_else(|| Value::String(body.to_string())),
    }))
}

fn extract_content(response: ChatCompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| openai_error("No completion choices in OpenAI response"))
}

#[async_trait]
impl TextGenerator for OpenAIProvider {
    async fn generate_text(&self, payload: &Value) -> Result<String> {
        let prompt = TextPrompt::from_payload(payload)?;
        let request = self.build_request(&prompt);

        let response = self
            .circuit_breaker
            .call(|| async { self.make_request(&request).await })
            .await?;

        extract_content(response)
    }
}

impl Provider for OpenAIProvider {
    fn provider_name(&self) -> &str {
        "OPENAI"
    }

    fn as_text_generator(&self) -> Option<&dyn TextGenerator> {
        Some(self)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::limits::BreakerConfig;
    use std::sync::Arc;

    fn provider() -> OpenAIProvider {
        OpenAIProvider::new(
            Some("sk-test-1234567890".to_string()),
            "https://api.openai.com/",
            "gpt-4o-mini",
            Duration::from_secs(5),
            CircuitBreaker::new(
                "OPENAI",
                BreakerConfig::default(),
                Arc::new(ManualClock::new(0)),
            ),
        )
        .unwrap()
    }

    #[test]
    fn test_missing_key_fails_construction() {
        let result = OpenAIProvider::new(
            None,
            "https://api.openai.com",
            "gpt-4o-mini",
            Duration::from_secs(5),
            CircuitBreaker::new("OPENAI", BreakerConfig::default(), Arc::new(ManualClock::new(0))),
        );
        let err = result.err().unwrap();
        assert_eq!(err.code().as_string(), "OPENAI_KEY_MISSING");
    }

    #[test]
    fn test_build_request_defaults() {
        let p = provider();
        let prompt = TextPrompt::from_payload(&json!({ "prompt": "Hello" })).unwrap();
        let request = p.build_request(&prompt);

        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, "user");
        assert_eq!(request.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(request.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(p.base_url, "https://api.openai.com");
    }

    #[test]
    fn test_build_request_with_system_and_model() {
        let p = provider();
        let prompt = TextPrompt::from_payload(&json!({
            "prompt": "Hello",
            "system": "Be brief",
            "model": "gpt-4o",
            "max_tokens": 50
        }))
        .unwrap();
        let request = p.build_request(&prompt);

        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[1].content, "Hello");
        assert_eq!(request.max_tokens, 50);
    }

    #[test]
    fn test_extract_content_trims() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "role": "assistant", "content": "  Dear future me  " } }]
        }))
        .unwrap();
        assert_eq!(extract_content(response).unwrap(), "Dear future me");

        let empty: ChatCompletionResponse = serde_json::from_value(json!({ "choices": [] })).unwrap();
        let err = extract_content(empty).unwrap_err();
        assert_eq!(err.code(), &ErrorCode::Vendor("OPENAI".to_string()));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_unauthorized_error_masks_key() {
        let err = api_error(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"Incorrect API key provided"}}"#,
            "sk-test-1234567890",
        );
        assert!(err.message().contains("sk-t...7890"));
        assert!(!err.message().contains("1234567890"));
        assert_eq!(err.details().unwrap()["externalStatusCode"], 401);
        assert_eq!(err.code().as_string(), "OPENAI_ERROR");
    }

    #[test]
    fn test_only_text_capability() {
        let p = provider();
        assert!(p.as_text_generator().is_some());
        assert!(p.as_image_generator().is_none());
        assert!(p.as_audio_transcriber().is_none());
    }
}
