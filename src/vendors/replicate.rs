use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::jobs::{collect_outputs, JobSnapshot};
use crate::limits::CircuitBreaker;

pub const VENDOR: &str = "REPLICATE";
pub const DEFAULT_IMAGE_MODEL: &str = "black-forest-labs/flux-dev";

/// Image-to-image prediction jobs.
#[async_trait]
pub trait PredictionService: Send + Sync {
    /// Fails with `REPLICATE_KEY_MISSING` when no token is loaded.
    fn ensure_configured(&self) -> Result<()>;

    /// Returns the prediction id, if the vendor supplied one.
    async fn create_prediction(&self, request: &PredictionRequest) -> Result<Option<String>>;

    async fn get_prediction(&self, prediction_id: &str) -> Result<JobSnapshot>;
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionRequest {
    pub version: String,
    pub input: PredictionInput,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionInput {
    pub image: String,
    pub prompt: String,
    pub guidance_scale: f32,
    pub num_inference_steps: u32,
    pub output_format: String,
    pub output_quality: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
}

impl PredictionRequest {
    pub fn image_to_image(model: &str, image: &str, prompt: impl Into<String>) -> Self {
        Self {
            version: model.to_string(),
            input: PredictionInput {
                image: image.to_string(),
                prompt: prompt.into(),
                guidance_scale: 7.5,
                num_inference_steps: 28,
                output_format: "png".to_string(),
                output_quality: 90,
                aspect_ratio: None,
            },
        }
    }

    /// `original` keeps the source ratio and is not sent.
    pub fn with_aspect_ratio(mut self, aspect_ratio: Option<&str>) -> Self {
        self.input.aspect_ratio = aspect_ratio
            .filter(|ratio| !ratio.eq_ignore_ascii_case("original"))
            .map(str::to_string);
        self
    }
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
}

fn snapshot_from(response: PredictionResponse) -> JobSnapshot {
    let vendor_status = response.status.unwrap_or_else(|| "unknown".to_string());
    let error_text = match &response.error {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    };

    match vendor_status.as_str() {
        "succeeded" => JobSnapshot::succeeded(collect_outputs(&response.output)),
        "failed" => JobSnapshot::failed(error_text.unwrap_or_else(|| "Prediction failed".to_string())),
        "canceled" => JobSnapshot::canceled(),
        _ => JobSnapshot::pending(vendor_status.clone()),
    }
    .with_vendor_status(vendor_status)
}

pub struct ReplicateClient {
    client: Client,
    api_token: Option<String>,
    base_url: String,
    circuit_breaker: CircuitBreaker,
}

impl ReplicateClient {
    pub fn new(
        api_token: Option<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        circuit_breaker: CircuitBreaker,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            circuit_breaker,
        })
    }

    fn token(&self) -> Result<&str> {
        self.ensure_configured()?;
        Ok(self.api_token.as_deref().unwrap_or_default())
    }

    async fn read_error(response: Response, context: &str) -> Error {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        error!("Replicate API error ({}): {} - {}", context, status, body);

        let parsed: Value = serde_json::from_str(&body).unwrap_or_else(|_| json!({ "error": body }));
        let detail = parsed["detail"]
            .as_str()
            .or_else(|| parsed["error"].as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("Request failed")
            .to_string();

        Error::vendor(VENDOR, format!("Replicate API error: {}", detail)).with_details(json!({
            "externalStatusCode": status,
            "context": context,
            "details": parsed,
        }))
    }

    fn transport_error(err: reqwest::Error) -> Error {
        Error::vendor(VENDOR, format!("Replicate request failed: {}", err))
    }
}

#[async_trait]
impl PredictionService for ReplicateClient {
    fn ensure_configured(&self) -> Result<()> {
        if self.api_token.is_none() {
            return Err(Error::key_missing(
                VENDOR,
                "REPLICATE_API_TOKEN is not loaded. Set REPLICATE_API_TOKEN in the environment.",
            ));
        }
        Ok(())
    }

    async fn create_prediction(&self, request: &PredictionRequest) -> Result<Option<String>> {
        let token = self.token()?;
        let url = format!("{}/predictions", self.base_url);
        debug!("Creating Replicate prediction with model {}", request.version);

        self.circuit_breaker
            .call(|| async {
                let response = self
                    .client
                    .post(&url)
                    .header("Authorization", format!("Token {}", token))
                    .json(request)
                    .send()
                    .await
                    .map_err(Self::transport_error)?;

                if !response.status().is_success() {
                    return Err(Self::read_error(response, "create prediction").await);
                }

                let prediction: PredictionResponse =
                    response.json().await.map_err(Self::transport_error)?;
                Ok(prediction.id)
            })
            .await
    }

    async fn get_prediction(&self, prediction_id: &str) -> Result<JobSnapshot> {
        let token = self.token()?;
        let url = format!("{}/predictions/{}", self.base_url, prediction_id);

        self.circuit_breaker
            .call(|| async {
                let response = self
                    .client
                    .get(&url)
                    .header("Authorization", format!("Token {}", token))
                    .send()
                    .await
                    .map_err(Self::transport_error)?;

                if !response.status().is_success() {
                    return Err(Self::read_error(response, "check prediction status").await);
                }

                let prediction: PredictionResponse =
                    response.json().await.map_err(Self::transport_error)?;
                Ok(snapshot_from(prediction))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorCode;
    use crate::jobs::JobStatus;
    use crate::limits::BreakerConfig;
    use std::sync::Arc;

    fn parse(value: Value) -> JobSnapshot {
        snapshot_from(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn test_request_serialization() {
        let request = PredictionRequest::image_to_image(
            DEFAULT_IMAGE_MODEL,
            "data:image/png;base64,AAAA",
            "Transform this person",
        )
        .with_aspect_ratio(Some("16:9"));
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["version"], DEFAULT_IMAGE_MODEL);
        assert_eq!(body["input"]["guidance_scale"], 7.5);
        assert_eq!(body["input"]["num_inference_steps"], 28);
        assert_eq!(body["input"]["output_format"], "png");
        assert_eq!(body["input"]["aspect_ratio"], "16:9");

        let original = PredictionRequest::image_to_image(DEFAULT_IMAGE_MODEL, "img", "p")
            .with_aspect_ratio(Some("original"));
        let body = serde_json::to_value(&original).unwrap();
        assert!(body["input"].get("aspect_ratio").is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(parse(json!({ "status": "starting" })).status, JobStatus::Pending);
        assert_eq!(parse(json!({ "status": "processing" })).vendor_status, "processing");

        let done = parse(json!({ "status": "succeeded", "output": ["https://a", "https://b"] }));
        assert_eq!(done.status, JobStatus::Succeeded);
        assert_eq!(done.outputs.len(), 2);

        let single = parse(json!({ "status": "succeeded", "output": "https://a" }));
        assert_eq!(single.outputs, vec!["https://a"]);

        let failed = parse(json!({ "status": "failed", "error": "bad image" }));
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("bad image"));

        assert_eq!(parse(json!({ "status": "canceled" })).status, JobStatus::Canceled);
    }

    #[tokio::test]
    async fn test_missing_token_fails_before_network() {
        let client = ReplicateClient::new(
            None,
            "http://127.0.0.1:9",
            Duration::from_secs(1),
            CircuitBreaker::new(VENDOR, BreakerConfig::default(), Arc::new(ManualClock::new(0))),
        )
        .unwrap();

        let err = client.ensure_configured().unwrap_err();
        assert_eq!(err.code(), &ErrorCode::KeyMissing("REPLICATE".to_string()));
        assert_eq!(err.status_code(), 500);

        let request = PredictionRequest::image_to_image(DEFAULT_IMAGE_MODEL, "img", "p");
        let err = client.create_prediction(&request).await.unwrap_err();
        assert_eq!(err.code().as_string(), "REPLICATE_KEY_MISSING");
    }
}
