use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::routing::{ProviderCall, TaskType};
use crate::tools::image_jobs::ImageJobs;
use crate::vendors::replicate;
use crate::tools::payload::{
    elapsed_seconds, parse_payload, request_id, require_match, require_text, IMAGE_DATA_URL,
};
use crate::tools::{Tool, ToolContext, ToolMetadata};

const DEFAULT_PROVIDER: &str = "OPENAI";
const SERVICE_NAME: &str = "TIME_CAPSULE";
const LETTER_MODEL: &str = "gpt-4o-mini";
const LETTER_MAX_TOKENS: u32 = 300;

const LETTER_SYSTEM_PROMPT: &str = "You are a wise, reflective version of the user writing from the year 2050. \
Write a personalized letter that reflects on their current dreams and provides guidance, motivation, and perspective. \
Be warm, encouraging, and thoughtful.

Requirements:
- 100-150 words
- Written from the perspective of the future self in 2050
- Must reference the user's specific dream
- Tone: warm, reflective, encouraging
- Format: letter with greeting and closing";

#[derive(Debug, Deserialize)]
struct TimeCapsulePayload {
    image: String,
    dream: String,
}

impl TimeCapsulePayload {
    fn parse(payload: &Value) -> Result<Self> {
        let parsed: Self = parse_payload(payload)?;
        require_text("image", &parsed.image, 1, usize::MAX)?;
        require_match(
            "image",
            &parsed.image,
            IMAGE_DATA_URL,
            "a base64 data URL (data:image/jpeg;base64,... or data:image/png;base64,...)",
        )?;
        require_text("dream", &parsed.dream, 10, 2000)?;
        Ok(parsed)
    }
}

/// Aged portrait plus a wisdom letter from the future self.
///
/// The two halves are independent: either may fail as long as the other
/// produces output. When both fail the letter's error is returned.
pub struct TimeCapsuleTool {
    images: ImageJobs,
}

impl TimeCapsuleTool {
    pub fn new(images: ImageJobs) -> Self {
        Self { images }
    }

    /// The letter goes to the text provider and the portrait to Replicate;
    /// an override may name either of them or the service itself.
    fn check_provider(ctx: &ToolContext<'_>) -> Result<()> {
        match ctx.provider_override.filter(|p| !p.trim().is_empty()) {
            None => Ok(()),
            Some(name)
                if [DEFAULT_PROVIDER, replicate::VENDOR, SERVICE_NAME]
                    .iter()
                    .any(|allowed| name.eq_ignore_ascii_case(allowed)) =>
            {
                Ok(())
            }
            Some(name) => Err(Error::invalid_input(format!(
                "Provider '{}' is not supported for {}. Use {} or {}.",
                name,
                TaskType::TimeCapsuleGeneration,
                DEFAULT_PROVIDER,
                replicate::VENDOR
            ))),
        }
    }

    async fn write_letter(&self, ctx: &ToolContext<'_>, dream: &str) -> Result<String> {
        let prompt = format!(
            "Write a personalized wisdom letter from my future self in 2050, reflecting on my current dream: {}\n\n\
             The letter should be 100-150 words, warm, reflective, and encouraging.",
            dream
        );

        let data = ctx
            .runner
            .call_provider(ProviderCall::new(
                DEFAULT_PROVIDER,
                TaskType::TextGeneration,
                json!({
                    "prompt": prompt,
                    "system": LETTER_SYSTEM_PROMPT,
                    "model": LETTER_MODEL,
                    "max_tokens": LETTER_MAX_TOKENS,
                }),
            ))
            .await?;

        match data {
            Value::String(letter) => Ok(letter),
            _ => Err(Error::internal("Text generation returned non-text output")),
        }
    }
}

#[async_trait]
impl Tool for TimeCapsuleTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            id: "time-capsule".to_string(),
            name: "The Time Capsule".to_string(),
            description: "AI-powered photo aging service that generates a realistic aged self-portrait \
                          and a personalized wisdom letter from your future self"
                .to_string(),
            supported_tasks: vec![TaskType::TimeCapsuleGeneration],
            default_provider: DEFAULT_PROVIDER.to_string(),
            dev_sample_payload: json!({
                "image": "data:image/jpeg;base64,/9j/4AAQSkZJRg...",
                "dream": "I want to start my own sustainable business and make a positive impact on the environment."
            }),
        }
    }

    fn validate(&self, payload: &Value) -> Result<()> {
        TimeCapsulePayload::parse(payload).map(|_| ())
    }

    async fn handle(&self, ctx: &ToolContext<'_>, payload: &Value) -> Result<Value> {
        let clock = self.images.clock();
        let started = clock.now_millis();
        let request_id = request_id(clock.as_ref());

        let capsule = TimeCapsulePayload::parse(payload)?;
        Self::check_provider(ctx)?;
        self.images.ensure_configured()?;
        let dream = capsule.dream.trim();

        let (wisdom_letter, letter_error) = match self.write_letter(ctx, dream).await {
            Ok(letter) => (Some(letter), None),
            Err(err) => {
                warn!("[{}] Wisdom letter generation failed: {}", request_id, err);
                (None, Some(err))
            }
        };

        let prompt = format!(
            "Age this person to show how they would look in 2050, maintaining their recognizable \
             features while incorporating natural aging. Consider their dream: {}",
            dream
        );
        let aged_image_url = match self.images.transform(&capsule.image, &prompt, None).await {
            Ok(job) => job.result_url,
            Err(err) => match letter_error {
                Some(letter_err) => {
                    warn!("[{}] Image aging failed as well: {}", request_id, err);
                    return Err(letter_err);
                }
                None => {
                    warn!("[{}] Image aging failed: {}", request_id, err);
                    None
                }
            },
        };

        let word_count = wisdom_letter
            .as_deref()
            .map(|letter| letter.split_whitespace().count())
            .unwrap_or(0);
        let processing_time = elapsed_seconds(clock.as_ref(), started);
        info!(
            "[{}] Time capsule finished in {:.2}s (image: {}, letter: {})",
            request_id,
            processing_time,
            aged_image_url.is_some(),
            wisdom_letter.is_some()
        );

        Ok(json!({
            "aged_image_url": aged_image_url,
            "wisdom_letter": wisdom_letter,
            "word_count": word_count,
            "processing_time": processing_time,
        }))
    }
}
