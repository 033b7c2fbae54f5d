use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::providers::{
    AudioTranscriber, ImageAnalyzer, ImageEditor, ImageGenerator, Provider, TextGenerator,
};

/// Placeholder client for a vendor whose integration is not built yet.
///
/// It declares every capability so the router resolves it like any other
/// provider, then answers each call with `PROVIDER_NOT_CONFIGURED` when the
/// vendor key is absent and `PROVIDER_NOT_IMPLEMENTED` otherwise.
pub struct StubProvider {
    name: &'static str,
    display_name: &'static str,
    key_env: &'static str,
    api_key: Option<String>,
}

impl StubProvider {
    pub fn gemini(api_key: Option<String>) -> Self {
        Self {
            name: "GEMINI",
            display_name: "Gemini",
            key_env: "GEMINI_API_KEY",
            api_key,
        }
    }

    pub fn anthropic(api_key: Option<String>) -> Self {
        Self {
            name: "ANTHROPIC",
            display_name: "Anthropic",
            key_env: "ANTHROPIC_API_KEY",
            api_key,
        }
    }

    fn unavailable(&self, operation: &str) -> Error {
        debug!("{} stub called for {}", self.name, operation);

        if self.api_key.is_none() {
            return Error::provider_not_configured(format!(
                "{} is not configured. Set {} to enable it.",
                self.display_name, self.key_env
            ))
            .with_details(json!({ "provider": self.name, "operation": operation }));
        }

        Error::provider_not_implemented(format!(
            "{} {} is not implemented yet",
            self.display_name, operation
        ))
        .with_details(json!({ "provider": self.name, "operation": operation }))
    }
}

#[async_trait]
impl TextGenerator for StubProvider {
    async fn generate_text(&self, _payload: &Value) -> Result<String> {
        Err(self.unavailable("text generation"))
    }
}

#[async_trait]
impl ImageGenerator for StubProvider {
    async fn generate_image(&self, _payload: &Value) -> Result<Value> {
        Err(self.unavailable("image generation"))
    }
}

#[async_trait]
impl ImageEditor for StubProvider {
    async fn edit_image(&self, _payload: &Value) -> Result<Value> {
        Err(self.unavailable("image editing"))
    }
}

#[async_trait]
impl ImageAnalyzer for StubProvider {
    async fn analyze_image(&self, _payload: &Value) -> Result<Value> {
        Err(self.unavailable("image analysis"))
    }
}

#[async_trait]
impl AudioTranscriber for StubProvider {
    async fn transcribe_audio(&self, _payload: &Value) -> Result<Value> {
        Err(self.unavailable("audio transcription"))
    }
}

impl Provider for StubProvider {
    fn provider_name(&self) -> &str {
        self.name
    }

    fn as_text_generator(&self) -> Option<&dyn TextGenerator> {
        Some(self)
    }

    fn as_image_generator(&self) -> Option<&dyn ImageGenerator> {
        Some(self)
    }

    fn as_image_editor(&self) -> Option<&dyn ImageEditor> {
        Some(self)
    }

    fn as_image_analyzer(&self) -> Option<&dyn ImageAnalyzer> {
        Some(self)
    }

    fn as_audio_transcriber(&self) -> Option<&dyn AudioTranscriber> {
        Some(self)
    }
}
