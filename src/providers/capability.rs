use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::error::{Error, Result};

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, payload: &Value) -> Result<String>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(&self, payload: &Value) -> Result<Value>;
}

#[async_trait]
pub trait ImageEditor: Send + Sync {
    async fn edit_image(&self, payload: &Value) -> Result<Value>;
}

#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze_image(&self, payload: &Value) -> Result<Value>;
}

#[async_trait]
pub trait AudioTranscriber: Send + Sync {
    async fn transcribe_audio(&self, payload: &Value) -> Result<Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    TextGenerate,
    ImageGenerate,
    ImageEdit,
    ImageAnalyze,
    AudioTranscribe,
}

/// A direct AI provider client.
///
/// Clients declare which capabilities they support by overriding the
/// matching `as_*` accessor. The registry and router only ever ask these
/// accessors; they never look at the concrete client type.
pub trait Provider: Send + Sync {
    fn provider_name(&self) -> &str;

    fn as_text_generator(&self) -> Option<&dyn TextGenerator> {
        None
    }

    fn as_image_generator(&self) -> Option<&dyn ImageGenerator> {
        None
    }

    fn as_image_editor(&self) -> Option<&dyn ImageEditor> {
        None
    }

    fn as_image_analyzer(&self) -> Option<&dyn ImageAnalyzer> {
        None
    }

    fn as_audio_transcriber(&self) -> Option<&dyn AudioTranscriber> {
        None
    }

    fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.as_text_generator().is_some() {
            caps.push(Capability::TextGenerate);
        }
        if self.as_image_generator().is_some() {
            caps.push(Capability::ImageGenerate);
        }
        if self.as_image_editor().is_some() {
            caps.push(Capability::ImageEdit);
        }
        if self.as_image_analyzer().is_some() {
            caps.push(Capability::ImageAnalyze);
        }
        if self.as_audio_transcriber().is_some() {
            caps.push(Capability::AudioTranscribe);
        }
        caps
    }
}

/// Text-generation payload shared by every text provider.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TextPrompt {
    #[validate(length(min = 1))]
    pub prompt: String,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1, max = 4096))]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl TextPrompt {
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let prompt: TextPrompt = serde_json::from_value(payload.clone())
            .map_err(|e| Error::invalid_input(format!("Invalid text generation payload: {}", e)))?;
        prompt.validate()?;
        Ok(prompt)
    }
}
