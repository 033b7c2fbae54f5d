use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::jobs::run_variations;
use crate::routing::TaskType;
use crate::tools::cinematic_switch::check_vendor;
use crate::tools::image_jobs::ImageJobs;
use crate::tools::payload::{
    elapsed_seconds, parse_payload, request_id, require_match, require_one_of, require_text,
    PHOTO_DATA_URL,
};
use crate::tools::{Tool, ToolContext, ToolMetadata};
use crate::vendors::replicate;

const DEFAULT_PROVIDER: &str = "REPLICATE";
const SERVICE_NAME: &str = "INSTANT_INFLUENCER";
const STYLES: [&str; 4] = ["corporate", "creative", "casual", "formal"];
const DEFAULT_VARIATIONS: u32 = 3;

fn style_descriptor(style: &str) -> &'static str {
    match style {
        "creative" => "creative, artistic, modern, contemporary",
        "casual" => "casual, relaxed, friendly, approachable",
        "formal" => "formal, elegant, sophisticated, traditional",
        _ => "corporate, business professional, formal attire, executive",
    }
}

#[derive(Debug, Deserialize)]
struct InfluencerPayload {
    image: String,
    style: String,
    #[serde(default)]
    variation_count: Option<u32>,
}

impl InfluencerPayload {
    fn parse(payload: &Value) -> Result<Self> {
        let mut parsed: Self = parse_payload(payload)?;
        require_text("image", &parsed.image, 1, usize::MAX)?;
        require_match(
            "image",
            &parsed.image,
            PHOTO_DATA_URL,
            "a JPEG or PNG data URL (data:image/jpeg;base64,... or data:image/png;base64,...)",
        )?;
        parsed.style = require_one_of("style", &parsed.style, &STYLES)?;

        if let Some(count) = parsed.variation_count {
            if !(3..=5).contains(&count) {
                return Err(Error::invalid_input("variation_count must be between 3 and 5"));
            }
        }
        Ok(parsed)
    }
}

/// Batch of professional headshots in one style.
pub struct InstantInfluencerTool {
    images: ImageJobs,
}

impl InstantInfluencerTool {
    pub fn new(images: ImageJobs) -> Self {
        Self { images }
    }
}

#[async_trait]
impl Tool for InstantInfluencerTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            id: "instant-influencer".to_string(),
            name: "Instant Influencer".to_string(),
            description: "Professional headshot generation from an uploaded photo in several style variations"
                .to_string(),
            supported_tasks: vec![TaskType::InstantInfluencerGeneration],
            default_provider: DEFAULT_PROVIDER.to_string(),
            dev_sample_payload: json!({
                "image": "data:image/jpeg;base64,/9j/4AAQSkZJRg...",
                "style": "corporate",
                "variation_count": 3
            }),
        }
    }

    fn validate(&self, payload: &Value) -> Result<()> {
        InfluencerPayload::parse(payload).map(|_| ())
    }

    async fn handle(&self, ctx: &ToolContext<'_>, payload: &Value) -> Result<Value> {
        let clock = self.images.clock();
        let started = clock.now_millis();
        let request_id = request_id(clock.as_ref());

        let headshot = InfluencerPayload::parse(payload)?;
        check_vendor(
            ctx.provider_override,
            DEFAULT_PROVIDER,
            SERVICE_NAME,
            TaskType::InstantInfluencerGeneration,
        )?;
        self.images.ensure_configured()?;

        let requested = headshot.variation_count.unwrap_or(DEFAULT_VARIATIONS);
        let prompt = format!(
            "Professional headshot, {} style, studio lighting, clean background, high quality, 4K resolution, \
             professional photography, business portrait, maintaining recognizable facial features",
            style_descriptor(&headshot.style)
        );
        info!(
            "[{}] Starting headshot generation: style={}, variations={}",
            request_id, headshot.style, requested
        );

        let images = &self.images;
        let image = headshot.image.as_str();
        let prompt = prompt.as_str();
        let outcome = run_variations(requested, |_| images.transform(image, prompt, None)).await;

        if outcome.succeeded.is_empty() {
            let errors: Vec<String> = outcome
                .failed
                .iter()
                .map(|(index, err)| format!("Variation {} failed: {}", index, err.message()))
                .collect();
            warn!("[{}] All headshot variations failed", request_id);

            return Err(Error::vendor(
                replicate::VENDOR,
                format!("Headshot generation failed: {}", errors.join("; ")),
            )
            .with_details(json!({
                "service": "instant-influencer",
                "errors": errors,
                "requestId": request_id,
            })));
        }

        let urls: Vec<String> = outcome
            .succeeded
            .iter()
            .filter_map(|(_, job)| job.result_url.clone())
            .collect();
        let processing_time = elapsed_seconds(clock.as_ref(), started);
        info!(
            "[{}] Generated {}/{} headshots",
            request_id,
            urls.len(),
            requested
        );

        let mut result = json!({
            "headshot_urls": urls,
            "style_applied": headshot.style,
            "processing_time": processing_time,
            "num_generated": urls.len(),
        });
        if (urls.len() as u32) < requested {
            result["warnings"] = json!([format!(
                "Only {} headshot(s) generated (requested {})",
                urls.len(),
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

    const IMAGE: &str = "data:image/png;base64,iVBORw0KGgo=";

    fn tool(predictions: FakePredictions) -> InstantInfluencerTool {
        InstantInfluencerTool::new(ImageJobs::new(
            Arc::new(predictions),
            JobPoller::new(Arc::new(ManualClock::new(0))),
            PollPolicy::new(Duration::from_millis(2_000), 2),
        ))
    }

    fn ctx(runner: &FakeRunner) -> ToolContext<'_> {
        ToolContext {
            runner,
            identity: "tester",
            provider_override: Some("INSTANT_INFLUENCER"),
        }
    }

    #[tokio::test]
    async fn test_default_three_variations() {
        let tool = tool(
            FakePredictions::new()
                .with_job(vec![JobSnapshot::succeeded(vec!["https://cdn/a.png".to_string()])])
                .with_job(vec![JobSnapshot::succeeded(vec!["https://cdn/b.png".to_string()])])
                .with_job(vec![JobSnapshot::succeeded(vec!["https://cdn/c.png".to_string()])]),
        );
        let runner = FakeRunner::new();

        let data = tool
            .handle(&ctx(&runner), &json!({ "image": IMAGE, "style": " Creative " }))
            .await
            .unwrap();

        assert_eq!(data["num_generated"], 3);
        assert_eq!(data["style_applied"], "creative");
        assert!(data.get("warnings").is_none());
    }

    #[tokio::test]
    async fn test_partial_success() {
        let tool = tool(
            FakePredictions::new()
                .with_job(vec![JobSnapshot::failed("blurry")])
                .with_job(vec![JobSnapshot::succeeded(vec!["https://cdn/b.png".to_string()])])
                .with_job(vec![]),
        );
        let runner = FakeRunner::new();

        let data = tool
            .handle(&ctx(&runner), &json!({ "image": IMAGE, "style": "formal" }))
            .await
            .unwrap();

        assert_eq!(data["headshot_urls"], json!(["https://cdn/b.png"]));
        assert_eq!(data["warnings"][0], "Only 1 headshot(s) generated (requested 3)");
    }

    #[tokio::test]
    async fn test_all_failed_aggregates_errors() {
        let tool = tool(
            FakePredictions::new()
                .with_job(vec![JobSnapshot::failed("blurry")])
                .with_failed_submit(Error::vendor("REPLICATE", "Replicate API error: bad input"))
                .with_job(vec![JobSnapshot::canceled()]),
        );
        let runner = FakeRunner::new();

        let err = tool
            .handle(&ctx(&runner), &json!({ "image": IMAGE, "style": "casual" }))
            .await
            .unwrap_err();

        assert_eq!(err.code(), &ErrorCode::Vendor("REPLICATE".to_string()));
        assert_eq!(err.status_code(), 400);
        let errors = err.details().unwrap()["errors"].as_array().unwrap().clone();
        assert_eq!(errors.len(), 3);
        assert!(errors[1].as_str().unwrap().starts_with("Variation 2 failed"));
    }

    #[test]
    fn test_validation() {
        let tool = tool(FakePredictions::new());
        assert!(tool
            .validate(&json!({ "image": "data:image/gif;base64,R0lG", "style": "corporate" }))
            .is_err());
        assert!(tool.validate(&json!({ "image": IMAGE, "style": "goth" })).is_err());
        assert!(tool
            .validate(&json!({ "image": IMAGE, "style": "corporate", "variation_count": 2 }))
            .is_err());
        assert!(tool
            .validate(&json!({ "image": IMAGE, "style": "corporate", "variation_count": 5 }))
            .is_ok());
    }
}
