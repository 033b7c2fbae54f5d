//! Single-task tools that forward to a direct provider.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{Error, ErrorCode, Result};
use crate::routing::{ProviderCall, TaskType};
use crate::tools::payload::{optional_text, parse_payload, require_text};
use crate::tools::{Tool, ToolContext, ToolMetadata};

const DEFAULT_PROVIDER: &str = "OPENAI";
const MAX_PROMPT_CHARS: usize = 10_000;

async fn forward(ctx: &ToolContext<'_>, task: TaskType, payload: Value) -> Result<Value> {
    let provider = ctx.provider_or(DEFAULT_PROVIDER);
    debug!("Forwarding {} to {}", task, provider);
    ctx.runner
        .call_provider(ProviderCall::new(provider, task, payload))
        .await
}

fn metadata(
    id: &str,
    name: &str,
    description: &str,
    supported_tasks: Vec<TaskType>,
    sample: Value,
) -> ToolMetadata {
    ToolMetadata {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        supported_tasks,
        default_provider: DEFAULT_PROVIDER.to_string(),
        dev_sample_payload: sample,
    }
}

#[derive(Debug, Deserialize)]
struct FutureLetterPayload {
    prompt: String,
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

impl FutureLetterPayload {
    fn parse(payload: &Value) -> Result<Self> {
        let parsed: Self = parse_payload(payload)?;
        require_text("prompt", &parsed.prompt, 1, MAX_PROMPT_CHARS)?;
        optional_text("system", parsed.system.as_deref())?;
        optional_text("model", parsed.model.as_deref())?;
        Ok(parsed)
    }
}

pub struct FutureLetterTool;

#[async_trait]
impl Tool for FutureLetterTool {
    fn metadata(&self) -> ToolMetadata {
        metadata(
            "future_letter",
            "Future Letter",
            "Generate personalized letters to your future self using AI text generation",
            vec![TaskType::TextGeneration],
            json!({
                "prompt": "Write a letter to my future self about my goals and dreams.",
                "system": "You are a thoughtful assistant that helps people write meaningful letters to their future selves.",
                "model": "gpt-4o-mini"
            }),
        )
    }

    fn validate(&self, payload: &Value) -> Result<()> {
        FutureLetterPayload::parse(payload).map(|_| ())
    }

    async fn handle(&self, ctx: &ToolContext<'_>, payload: &Value) -> Result<Value> {
        let letter = FutureLetterPayload::parse(payload)?;
        forward(
            ctx,
            TaskType::TextGeneration,
            json!({
                "prompt": letter.prompt,
                "system": letter.system,
                "model": letter.model,
            }),
        )
        .await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageAgingPayload {
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    image_base64: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
}

impl ImageAgingPayload {
    fn parse(payload: &Value) -> Result<Self> {
        let parsed: Self = parse_payload(payload)?;
        let has_image = [&parsed.image_url, &parsed.image_base64]
            .iter()
            .any(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()));
        if !has_image {
            return Err(Error::invalid_input(
                "Either imageUrl or imageBase64 must be provided",
            ));
        }
        optional_text("prompt", parsed.prompt.as_deref())?;
        Ok(parsed)
    }
}

/// Ages a photo with image editing, falling back to image generation when
/// the provider cannot edit.
pub struct ImageAgingTool;

#[async_trait]
impl Tool for ImageAgingTool {
    fn metadata(&self) -> ToolMetadata {
        metadata(
            "image_aging",
            "Image Aging",
            "Age or transform images using AI image editing or generation",
            vec![TaskType::ImageEdit, TaskType::ImageGeneration],
            json!({
                "imageUrl": "https://example.com/photo.jpg",
                "prompt": "Age this person by 20 years"
            }),
        )
    }

    fn validate(&self, payload: &Value) -> Result<()> {
        ImageAgingPayload::parse(payload).map(|_| ())
    }

    async fn handle(&self, ctx: &ToolContext<'_>, payload: &Value) -> Result<Value> {
        let aging = ImageAgingPayload::parse(payload)?;

        let edit = forward(
            ctx,
            TaskType::ImageEdit,
            json!({
                "imageUrl": aging.image_url,
                "imageBase64": aging.image_base64,
                "prompt": aging.prompt,
            }),
        )
        .await;

        let err = match edit {
            Ok(data) => return Ok(data),
            Err(err) => err,
        };
        if !matches!(
            err.code(),
            ErrorCode::TaskNotSupported | ErrorCode::ToolDependencyNotReady
        ) {
            return Err(err);
        }

        warn!("Image edit unavailable ({}), falling back to image generation", err);
        let provider = ctx.provider_or(DEFAULT_PROVIDER);
        forward(
            ctx,
            TaskType::ImageGeneration,
            json!({
                "imageUrl": aging.image_url,
                "imageBase64": aging.image_base64,
                "prompt": aging.prompt.as_deref().unwrap_or("Age this image"),
            }),
        )
        .await
        .map_err(|fallback| {
            Error::new(
                "Image aging functionality is not yet implemented for the selected provider",
                501,
                ErrorCode::ToolDependencyNotReady,
            )
            .with_details(json!({
                "provider": provider,
                "attemptedTasks": [TaskType::ImageEdit, TaskType::ImageGeneration],
                "lastError": fallback.code(),
            }))
        })
    }
}

#[derive(Debug, Deserialize)]
struct ImageVariationPayload {
    prompt: String,
    #[serde(default)]
    size: Option<String>,
}

impl ImageVariationPayload {
    fn parse(payload: &Value) -> Result<Self> {
        let parsed: Self = parse_payload(payload)?;
        require_text("prompt", &parsed.prompt, 1, MAX_PROMPT_CHARS)?;
        optional_text("size", parsed.size.as_deref())?;
        Ok(parsed)
    }
}

pub struct ImageVariationTool;

#[async_trait]
impl Tool for ImageVariationTool {
    fn metadata(&self) -> ToolMetadata {
        metadata(
            "image_variation",
            "Image Variation",
            "Generate variations of images using AI image generation",
            vec![TaskType::ImageGeneration],
            json!({ "prompt": "A beautiful sunset over mountains", "size": "1024x1024" }),
        )
    }

    fn validate(&self, payload: &Value) -> Result<()> {
        ImageVariationPayload::parse(payload).map(|_| ())
    }

    async fn handle(&self, ctx: &ToolContext<'_>, payload: &Value) -> Result<Value> {
        let variation = ImageVariationPayload::parse(payload)?;
        forward(
            ctx,
            TaskType::ImageGeneration,
            json!({ "prompt": variation.prompt, "size": variation.size }),
        )
        .await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageAnalysisPayload {
    image_url: String,
    #[serde(default)]
    question: Option<String>,
}

impl ImageAnalysisPayload {
    fn parse(payload: &Value) -> Result<Self> {
        let parsed: Self = parse_payload(payload)?;
        require_text("imageUrl", &parsed.image_url, 1, usize::MAX)?;
        optional_text("question", parsed.question.as_deref())?;
        Ok(parsed)
    }
}

pub struct ImageAnalysisTool;

#[async_trait]
impl Tool for ImageAnalysisTool {
    fn metadata(&self) -> ToolMetadata {
        metadata(
            "image_analysis",
            "Image Analysis",
            "Analyze images and extract information using AI vision capabilities",
            vec![TaskType::ImageAnalysis],
            json!({
                "imageUrl": "https://example.com/image.jpg",
                "question": "What is in this image?"
            }),
        )
    }

    fn validate(&self, payload: &Value) -> Result<()> {
        ImageAnalysisPayload::parse(payload).map(|_| ())
    }

    async fn handle(&self, ctx: &ToolContext<'_>, payload: &Value) -> Result<Value> {
        let analysis = ImageAnalysisPayload::parse(payload)?;
        forward(
            ctx,
            TaskType::ImageAnalysis,
            json!({
                "imageUrl": analysis.image_url,
                "question": analysis.question.as_deref().unwrap_or("Describe this image."),
            }),
        )
        .await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AudioTranscriptionPayload {
    audio_url: String,
    #[serde(default)]
    language: Option<String>,
}

impl AudioTranscriptionPayload {
    fn parse(payload: &Value) -> Result<Self> {
        let parsed: Self = parse_payload(payload)?;
        require_text("audioUrl", &parsed.audio_url, 1, usize::MAX)?;
        optional_text("language", parsed.language.as_deref())?;
        Ok(parsed)
    }
}

pub struct AudioTranscriptionTool;

#[async_trait]
impl Tool for AudioTranscriptionTool {
    fn metadata(&self) -> ToolMetadata {
        metadata(
            "audio_transcription",
            "Audio Transcription",
            "Transcribe audio files to text using AI speech recognition",
            vec![TaskType::AudioTranscription],
            json!({ "audioUrl": "https://example.com/audio.mp3", "language": "en" }),
        )
    }

    fn validate(&self, payload: &Value) -> Result<()> {
        AudioTranscriptionPayload::parse(payload).map(|_| ())
    }

    async fn handle(&self, ctx: &ToolContext<'_>, payload: &Value) -> Result<Value> {
        let audio = AudioTranscriptionPayload::parse(payload)?;
        forward(
            ctx,
            TaskType::AudioTranscription,
            json!({ "audioUrl": audio.audio_url, "language": audio.language }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRunner;

    fn ctx<'a>(runner: &'a FakeRunner, provider: Option<&'a str>) -> ToolContext<'a> {
        ToolContext {
            runner,
            identity: "tester",
            provider_override: provider,
        }
    }

    #[tokio::test]
    async fn test_future_letter_forwards_to_default_provider() {
        let runner = FakeRunner::new().with_text("Dear future me");
        let data = FutureLetterTool
            .handle(&ctx(&runner, None), &json!({ "prompt": "Write to me" }))
            .await
            .unwrap();

        assert_eq!(data, json!("Dear future me"));
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].provider, "OPENAI");
        assert_eq!(calls[0].task, TaskType::TextGeneration);
    }

    #[test]
    fn test_future_letter_validation() {
        assert!(FutureLetterTool.validate(&json!({ "prompt": "  " })).is_err());
        assert!(FutureLetterTool
            .validate(&json!({ "prompt": "ok", "system": "" }))
            .is_err());
        assert!(FutureLetterTool.validate(&json!({ "prompt": "ok" })).is_ok());
    }

    #[tokio::test]
    async fn test_image_aging_falls_back_to_generation() {
        let runner = FakeRunner::new()
            .with_failure(
                TaskType::ImageEdit,
                Error::task_not_supported("no edit"),
            )
            .with_data(TaskType::ImageGeneration, json!({ "url": "https://img" }));

        let data = ImageAgingTool
            .handle(&ctx(&runner, Some("GEMINI")), &json!({ "imageUrl": "https://in" }))
            .await
            .unwrap();

        assert_eq!(data["url"], "https://img");
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].task, TaskType::ImageGeneration);
        assert_eq!(calls[1].provider, "GEMINI");
        assert_eq!(calls[1].payload["prompt"], "Age this image");
    }

    #[tokio::test]
    async fn test_image_aging_reports_dependency_not_ready() {
        let runner = FakeRunner::new()
            .with_failure(TaskType::ImageEdit, Error::task_not_supported("no edit"))
            .with_failure(TaskType::ImageGeneration, Error::task_not_supported("no gen"));

        let err = ImageAgingTool
            .handle(&ctx(&runner, None), &json!({ "imageBase64": "AAAA" }))
            .await
            .unwrap_err();

        assert_eq!(err.code(), &ErrorCode::ToolDependencyNotReady);
        assert_eq!(err.status_code(), 501);
    }

    #[tokio::test]
    async fn test_image_aging_passes_other_errors_through() {
        let runner = FakeRunner::new()
            .with_failure(TaskType::ImageEdit, Error::provider_not_configured("no key"));

        let err = ImageAgingTool
            .handle(&ctx(&runner, None), &json!({ "imageUrl": "https://in" }))
            .await
            .unwrap_err();

        assert_eq!(err.code(), &ErrorCode::ProviderNotConfigured);
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_image_analysis_default_question() {
        let runner = FakeRunner::new().with_data(TaskType::ImageAnalysis, json!("a cat"));
        ImageAnalysisTool
            .handle(&ctx(&runner, None), &json!({ "imageUrl": "https://cat" }))
            .await
            .unwrap();

        assert_eq!(runner.calls()[0].payload["question"], "Describe this image.");
    }

    #[test]
    fn test_required_fields() {
        assert!(ImageAgingTool.validate(&json!({ "prompt": "x" })).is_err());
        assert!(ImageVariationTool.validate(&json!({ "size": "1x1" })).is_err());
        assert!(ImageAnalysisTool.validate(&json!({ "imageUrl": "" })).is_err());
        assert!(AudioTranscriptionTool.validate(&json!({ "audioUrl": "https://a.mp3" })).is_ok());
        assert!(AudioTranscriptionTool
            .validate(&json!({ "audioUrl": "https://a.mp3", "language": " " }))
            .is_err());
    }
}
