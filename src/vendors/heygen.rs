use async_trait::async_trait;
use reqwest::{multipart, Client, Response};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::jobs::JobSnapshot;
use crate::limits::CircuitBreaker;

/// HeyGen failures surface under the generic `PROVIDER_*` codes.
pub const VENDOR: &str = "PROVIDER";

#[derive(Debug, Clone)]
pub struct MediaAsset {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadedAsset {
    pub asset_id: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLanguage {
    pub name: String,
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranslationRequest {
    pub video_url: String,
    pub output_languages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Upload, submit and poll video translation jobs.
#[async_trait]
pub trait VideoTranslationService: Send + Sync {
    /// Fails with `PROVIDER_KEY_MISSING` when no key is loaded.
    fn ensure_configured(&self) -> Result<()>;

    async fn upload_asset(&self, asset: MediaAsset) -> Result<UploadedAsset>;

    async fn list_target_languages(&self) -> Result<Vec<TargetLanguage>>;

    /// Returns the translation job id, if the vendor supplied one.
    async fn translate_video(&self, request: &TranslationRequest) -> Result<Option<String>>;

    async fn translation_status(&self, translation_id: &str) -> Result<JobSnapshot>;
}

/// HeyGen wraps most payloads in a `data` envelope, but not always.
fn unwrap_data(body: &Value) -> &Value {
    match body.get("data") {
        Some(data) if !data.is_null() => data,
        _ => body,
    }
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

fn parse_upload(body: &Value) -> UploadedAsset {
    let result = unwrap_data(body);
    UploadedAsset {
        asset_id: first_str(result, &["asset_id", "id", "assetId"]).map(str::to_string),
        url: first_str(result, &["url", "asset_url", "assetUrl"]).map(str::to_string),
    }
}

fn parse_languages(body: &Value) -> Vec<TargetLanguage> {
    let data = unwrap_data(body);
    let list = data
        .get("languages")
        .and_then(Value::as_array)
        .or_else(|| data.as_array())
        .or_else(|| body.get("languages").and_then(Value::as_array));

    list.map(|items| {
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(name) => Some(TargetLanguage {
                    name: name.clone(),
                    code: None,
                }),
                Value::Object(_) => first_str(item, &["name", "language", "label"]).map(|name| {
                    TargetLanguage {
                        name: name.to_string(),
                        code: first_str(item, &["code", "iso_code", "isoCode"]).map(str::to_string),
                    }
                }),
                _ => None,
            })
            .collect()
    })
    .unwrap_or_default()
}

fn parse_translation_id(body: &Value) -> Option<String> {
    let result = unwrap_data(body);
    if let Some(id) = first_str(result, &["video_translate_id", "id"]) {
        return Some(id.to_string());
    }

    result
        .get("video_translate_ids")
        .and_then(Value::as_array)
        .or_else(|| result.as_array())
        .and_then(|ids| ids.iter().find_map(Value::as_str))
        .map(str::to_string)
}

fn parse_status(body: &Value) -> JobSnapshot {
    let result = unwrap_data(body);
    let vendor_status = first_str(result, &["status", "state"])
        .unwrap_or("unknown")
        .to_lowercase();
    let url = first_str(
        result,
        &["url", "video_url", "videoUrl", "download_url", "downloadUrl"],
    );
    let error = first_str(result, &["error", "error_message", "errorMessage"])
        .map(str::to_string)
        .or_else(|| {
            result
                .get("error")
                .filter(|e| e.is_object())
                .map(|e| e.to_string())
        });

    let snapshot = match (vendor_status.as_str(), url) {
        ("completed" | "succeeded" | "success", Some(url)) => {
            JobSnapshot::succeeded(vec![url.to_string()])
        }
        // Completion can be reported before the download URL is published.
        ("completed" | "succeeded" | "success", None) => JobSnapshot::pending(vendor_status.clone()),
        ("failed" | "error", _) => JobSnapshot::failed(
            error.unwrap_or_else(|| "Video translation failed".to_string()),
        ),
        ("canceled" | "cancelled", _) => JobSnapshot::canceled(),
        _ => JobSnapshot::pending(vendor_status.clone()),
    };
    snapshot.with_vendor_status(vendor_status)
}

pub struct HeyGenClient {
    client: Client,
    api_key: Option<String>,
    api_base: String,
    upload_url: String,
    circuit_breaker: CircuitBreaker,
}

impl HeyGenClient {
    pub fn new(
        api_key: Option<String>,
        api_base: impl Into<String>,
        upload_url: impl Into<String>,
        timeout: Duration,
        circuit_breaker: CircuitBreaker,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            upload_url: upload_url.into(),
            circuit_breaker,
        })
    }

    fn key(&self) -> Result<&str> {
        self.ensure_configured()?;
        Ok(self.api_key.as_deref().unwrap_or_default())
    }

    async fn read_error(response: Response, context: &str) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!("HeyGen API error ({}): {} - {}", context, status, body);

        let parsed: Value =
            serde_json::from_str(&body).unwrap_or_else(|_| json!({ "message": body }));
        let detail = first_str(&parsed, &["error", "message"])
            .or_else(|| status.canonical_reason())
            .unwrap_or("Request failed")
            .to_string();

        Error::vendor(VENDOR, format!("HeyGen API error: {}", detail)).with_details(json!({
            "externalStatusCode": status.as_u16(),
            "context": context,
            "originalError": parsed,
        }))
    }

    fn transport_error(context: &str, err: reqwest::Error) -> Error {
        Error::vendor(VENDOR, format!("HeyGen {} failed: {}", context, err))
    }

    async fn get_json(&self, url: &str, context: &str) -> Result<Value> {
        let key = self.key()?;
        self.circuit_breaker
            .call(|| async {
                let response = self
                    .client
                    .get(url)
                    .header("x-api-key", key)
                    .send()
                    .await
                    .map_err(|e| Self::transport_error(context, e))?;

                if !response.status().is_success() {
                    return Err(Self::read_error(response, context).await);
                }
                response
                    .json::<Value>()
                    .await
                    .map_err(|e| Self::transport_error(context, e))
            })
            .await
    }
}

#[async_trait]
impl VideoTranslationService for HeyGenClient {
    fn ensure_configured(&self) -> Result<()> {
        if self.api_key.is_none() {
            return Err(Error::key_missing(
                VENDOR,
                "HEYGEN_API_KEY is not loaded. Set HEYGEN_API_KEY in the environment.",
            ));
        }
        Ok(())
    }

    async fn upload_asset(&self, asset: MediaAsset) -> Result<UploadedAsset> {
        let key = self.key()?;
        let size = asset.bytes.len();
        debug!("Uploading {} ({} bytes) to HeyGen", asset.filename, size);

        let uploaded = self
            .circuit_breaker
            .call(move || async move {
                let part = multipart::Part::bytes(asset.bytes)
                    .file_name(asset.filename)
                    .mime_str(&asset.mime_type)
                    .map_err(|e| Error::invalid_input(format!("Invalid media type: {}", e)))?;
                let form = multipart::Form::new().part("file", part);

                let response = self
                    .client
                    .post(&self.upload_url)
                    .header("x-api-key", key)
                    .multipart(form)
                    .send()
                    .await
                    .map_err(|e| Self::transport_error("asset upload", e))?;

                if !response.status().is_success() {
                    return Err(Self::read_error(response, "asset upload").await);
                }
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| Self::transport_error("asset upload", e))?;
                Ok(parse_upload(&body))
            })
            .await?;

        info!("Uploaded asset to HeyGen (asset_id={:?})", uploaded.asset_id);
        Ok(uploaded)
    }

    async fn list_target_languages(&self) -> Result<Vec<TargetLanguage>> {
        let url = format!("{}/video_translate/target_languages", self.api_base);
        let body = self.get_json(&url, "list languages").await?;
        Ok(parse_languages(&body))
    }

    async fn translate_video(&self, request: &TranslationRequest) -> Result<Option<String>> {
        let key = self.key()?;
        let url = format!("{}/video_translate", self.api_base);

        self.circuit_breaker
            .call(|| async {
                let response = self
                    .client
                    .post(&url)
                    .header("x-api-key", key)
                    .json(request)
                    .send()
                    .await
                    .map_err(|e| Self::transport_error("translate video", e))?;

                if !response.status().is_success() {
                    return Err(Self::read_error(response, "translate video").await);
                }
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| Self::transport_error("translate video", e))?;
                Ok(parse_translation_id(&body))
            })
            .await
    }

    async fn translation_status(&self, translation_id: &str) -> Result<JobSnapshot> {
        let url = format!("{}/video_translate/{}", self.api_base, translation_id);
        let body = self.get_json(&url, "status check").await?;
        Ok(parse_status(&body))
    }
}
