use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{Error, Result};
use crate::jobs::run_variations;
use crate::routing::TaskType;
use crate::tools::image_jobs::ImageJobs;
use crate::tools::payload::{
    elapsed_seconds, parse_payload, request_id, require_match, require_one_of, require_text,
    IMAGE_DATA_URL,
};
use crate::tools::{Tool, ToolContext, ToolMetadata};

const DEFAULT_PROVIDER: &str = "REPLICATE";
const SERVICE_NAME: &str = "CINEMATIC_SWITCH";
const ASPECT_RATIOS: [&str; 6] = ["original", "16:9", "1:1", "9:16", "4:3", "3:4"];
const MAX_OUTPUTS: u32 = 5;

#[derive(Debug, Deserialize)]
struct CinematicPayload {
    image: String,
    scene_description: String,
    #[serde(default)]
    output_count: Option<u32>,
    #[serde(default)]
    aspect_ratio: Option<String>,
}

impl CinematicPayload {
    fn parse(payload: &Value) -> Result<Self> {
        let mut parsed: Self = parse_payload(payload)?;
        require_text("image", &parsed.image, 1, usize::MAX)?;
        require_match(
            "image",
            &parsed.image,
            IMAGE_DATA_URL,
            "a base64 data URL (data:image/jpeg;base64,... or data:image/png;base64,...)",
        )?;
        require_text("scene_description", &parsed.scene_description, 10, 2000)?;

        if let Some(count) = parsed.output_count {
            if !(1..=MAX_OUTPUTS).contains(&count) {
                return Err(Error::invalid_input(format!(
                    "output_count must be between 1 and {}",
                    MAX_OUTPUTS
                )));
            }
        }
        if let Some(ratio) = parsed.aspect_ratio.take() {
            parsed.aspect_ratio = Some(require_one_of("aspect_ratio", &ratio, &ASPECT_RATIOS)?);
        }
        Ok(parsed)
    }
}

/// Transforms a photo into a described scene, one Replicate job per
/// requested variation.
pub struct CinematicSwitchTool {
    images: ImageJobs,
}

impl CinematicSwitchTool {
    pub fn new(images: ImageJobs) -> Self {
        Self { images }
    }
}

/// Composite media tools only run on their own vendor; the logical service
/// name is accepted as an alias.
pub(crate) fn check_vendor(override_name: Option<&str>, vendor: &str, service: &str, task: TaskType) -> Result<()> {
    match override_name {
        None => Ok(()),
        Some(name) if name.eq_ignore_ascii_case(vendor) || name.eq_ignore_ascii_case(service) => Ok(()),
        Some(name) => Err(Error::invalid_input(format!(
            "Provider '{}' is not supported for {}. Use {}.",
            name, task, vendor
        ))),
    }
}

#[async_trait]
impl Tool for CinematicSwitchTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            id: "cinematic-switch".to_string(),
            name: "The Cinematic Switch".to_string(),
            description: "AI-powered visual transformation that moves a person into a different scene, \
                          character or setting while keeping them recognizable"
                .to_string(),
            supported_tasks: vec![TaskType::CinematicSwitchGeneration],
            default_provider: DEFAULT_PROVIDER.to_string(),
            dev_sample_payload: json!({
                "image": "data:image/jpeg;base64,/9j/4AAQSkZJRg...",
                "scene_description": "a medieval knight in a castle setting, wearing armor and holding a sword"
            }),
        }
    }

    fn validate(&self, payload: &Value) -> Result<()> {
        CinematicPayload::parse(payload).map(|_| ())
    }

    async fn handle(&self, ctx: &ToolContext<'_>, payload: &Value) -> Result<Value> {
        let clock = self.images.clock();
        let started = clock.now_millis();
        let request_id = request_id(clock.as_ref());

        let scene = CinematicPayload::parse(payload)?;
        check_vendor(
            ctx.provider_override,
            DEFAULT_PROVIDER,
            SERVICE_NAME,
            TaskType::CinematicSwitchGeneration,
        )?;
        self.images.ensure_configured()?;

        let requested = scene.output_count.unwrap_or(1);
        let prompt = format!(
            "Transform this person into {}. Maintain their recognizable facial features while applying the transformation.",
            scene.scene_description.trim()
        );
        let aspect_ratio = scene.aspect_ratio.as_deref();
        info!(
            "[{}] Starting cinematic switch with {} ({} variation(s))",
            request_id,
            self.images.model(),
            requested
        );

        let images = &self.images;
        let image = scene.image.as_str();
        let prompt = prompt.as_str();
        let mut outcome =
            run_variations(requested, |_| images.transform(image, prompt, aspect_ratio)).await;

        if outcome.succeeded.is_empty() {
            return Err(outcome
                .failed
                .pop()
                .map(|(_, err)| err)
                .unwrap_or_else(|| Error::internal("No variations were attempted")));
        }

        let urls: Vec<String> = outcome
            .succeeded
            .iter()
            .flat_map(|(_, job)| job.outputs.iter().cloned())
            .collect();
        let processing_time = elapsed_seconds(clock.as_ref(), started);
        info!(
            "[{}] Cinematic switch produced {} output(s) in {:.2}s",
            request_id,
            urls.len(),
            processing_time
        );

        let mut result = json!({
            "transformed_media_urls": urls,
            "processing_time": processing_time,
            "model_used": self.images.model(),
            "variation_count": urls.len(),
        });
        if !outcome.failed.is_empty() {
            result["warnings"] = json!([format!(
                "Only {} of {} variation(s) generated",
                outcome.succeeded.len(),
                requested
            )]);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorCode;
    use crate::jobs::{JobPoller, JobSnapshot, PollPolicy};
    use crate::testing::{FakePredictions, FakeRunner};
    use std::sync::Arc;
    use std::time::Duration;

    const IMAGE: &str = "data:image/jpeg;base64,/9j/4AAQ";

    fn tool(predictions: Arc<FakePredictions>) -> CinematicSwitchTool {
        CinematicSwitchTool::new(ImageJobs::new(
            predictions,
            JobPoller::new(Arc::new(ManualClock::new(0))),
            PollPolicy::new(Duration::from_millis(2_000), 2),
        ))
    }

    fn ctx<'a>(runner: &'a FakeRunner, provider: Option<&'a str>) -> ToolContext<'a> {
        ToolContext {
            runner,
            identity: "tester",
            provider_override: provider,
        }
    }

    #[tokio::test]
    async fn test_partial_success_adds_warning() {
        let predictions = Arc::new(
            FakePredictions::new()
                .with_job(vec![JobSnapshot::succeeded(vec!["https://cdn/1.png".to_string()])])
                .with_job(vec![JobSnapshot::failed("nsfw")])
                .with_job(vec![JobSnapshot::succeeded(vec!["https://cdn/3.png".to_string()])]),
        );
        let tool = tool(predictions.clone());
        let runner = FakeRunner::new();

        let data = tool
            .handle(
                &ctx(&runner, None),
                &json!({
                    "image": IMAGE,
                    "scene_description": "an astronaut on the moon",
                    "output_count": 3,
                    "aspect_ratio": "16:9"
                }),
            )
            .await
            .unwrap();

        assert_eq!(data["transformed_media_urls"], json!(["https://cdn/1.png", "https://cdn/3.png"]));
        assert_eq!(data["variation_count"], 2);
        assert_eq!(data["model_used"], "black-forest-labs/flux-dev");
        assert_eq!(data["warnings"][0], "Only 2 of 3 variation(s) generated");
        assert_eq!(predictions.created(), 3);
        assert_eq!(predictions.last_request().unwrap().input.aspect_ratio.as_deref(), Some("16:9"));
    }

    #[tokio::test]
    async fn test_single_timeout_is_returned() {
        let tool = tool(Arc::new(FakePredictions::new().with_job(vec![])));
        let runner = FakeRunner::new();

        let err = tool
            .handle(
                &ctx(&runner, Some("replicate")),
                &json!({ "image": IMAGE, "scene_description": "a pirate on a ship" }),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), &ErrorCode::Timeout);
    }

    #[tokio::test]
    async fn test_rejects_foreign_provider() {
        let tool = tool(Arc::new(FakePredictions::new()));
        let runner = FakeRunner::new();

        let err = tool
            .handle(
                &ctx(&runner, Some("OPENAI")),
                &json!({ "image": IMAGE, "scene_description": "a pirate on a ship" }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), &ErrorCode::InvalidInput);
    }

    #[test]
    fn test_validation() {
        let tool = tool(Arc::new(FakePredictions::new()));
        let base = json!({ "image": IMAGE, "scene_description": "a pirate on a ship" });
        assert!(tool.validate(&base).is_ok());

        let mut too_many = base.clone();
        too_many["output_count"] = json!(6);
        assert!(tool.validate(&too_many).is_err());

        let mut bad_ratio = base.clone();
        bad_ratio["aspect_ratio"] = json!("2:1");
        assert!(tool.validate(&bad_ratio).is_err());
    }
}
