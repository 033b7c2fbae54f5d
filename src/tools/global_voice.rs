use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::jobs::{JobPoller, JobTarget, PollPolicy};
use crate::routing::TaskType;
use crate::tools::payload::{
    compile, elapsed_seconds, parse_payload, request_id, require_one_of, require_text,
    VIDEO_DATA_URL,
};
use crate::tools::{Tool, ToolContext, ToolMetadata};
use crate::vendors::heygen;
use crate::vendors::{MediaAsset, TargetLanguage, TranslationRequest, VideoTranslationService};

const DEFAULT_PROVIDER: &str = "HEYGEN";
const SERVICE_NAME: &str = "GLOBAL_VOICE";
const QUALITIES: [&str; 3] = ["720p", "1080p", "4k"];
const DEFAULT_QUALITY: &str = "1080p";

const LANGUAGES: [(&str, &str); 15] = [
    ("en", "English"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("ja", "Japanese"),
    ("zh", "Chinese"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("ko", "Korean"),
    ("ar", "Arabic"),
    ("hi", "Hindi"),
    ("ru", "Russian"),
    ("nl", "Dutch"),
    ("pl", "Polish"),
    ("tr", "Turkish"),
];

fn display_name(code: &str) -> Option<&'static str> {
    LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

fn mime_type(extension: &str) -> &'static str {
    match extension {
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        _ => "video/mp4",
    }
}

fn resolution(quality: &str) -> &'static str {
    match quality {
        "1080p" => "1920x1080",
        "720p" => "1280x720",
        _ => "3840x2160",
    }
}

/// Map a language code onto the vendor's own language name: code match
/// first, then exact name, then a name containing the English display name.
fn resolve_language(code: &str, supported: &[TargetLanguage]) -> Option<String> {
    let display = display_name(code).unwrap_or(code).to_lowercase();

    supported
        .iter()
        .find(|lang| {
            lang.code
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(code))
        })
        .or_else(|| {
            supported.iter().find(|lang| {
                let name = lang.name.to_lowercase();
                name == code || name == display
            })
        })
        .or_else(|| {
            supported
                .iter()
                .find(|lang| lang.name.to_lowercase().contains(&display))
        })
        .map(|lang| lang.name.clone())
}

#[derive(Debug, Deserialize)]
struct GlobalVoicePayload {
    video: String,
    target_language: String,
    #[serde(default)]
    custom_script: Option<String>,
    #[serde(default)]
    voice_preservation: Option<f64>,
    #[serde(default)]
    video_quality: Option<String>,
}

struct DecodedVideo {
    extension: String,
    data: String,
}

impl GlobalVoicePayload {
    fn parse(payload: &Value) -> Result<Self> {
        let mut parsed: Self = parse_payload(payload)?;
        require_text("video", &parsed.video, 1, usize::MAX)?;
        parsed.decoded()?;

        let codes: Vec<&str> = LANGUAGES.iter().map(|(code, _)| *code).collect();
        parsed.target_language = require_one_of("target_language", &parsed.target_language, &codes)?;

        if let Some(score) = parsed.voice_preservation {
            if !(0.0..=1.0).contains(&score) {
                return Err(Error::invalid_input(
                    "voice_preservation must be between 0.0 and 1.0 (inclusive)",
                ));
            }
        }
        if let Some(quality) = parsed.video_quality.take() {
            parsed.video_quality = Some(require_one_of("video_quality", &quality, &QUALITIES)?);
        }
        Ok(parsed)
    }

    fn decoded(&self) -> Result<DecodedVideo> {
        let captures = compile(VIDEO_DATA_URL)?
            .captures(self.video.trim())
            .ok_or_else(|| {
                Error::invalid_input(
                    "video must be a base64 data URL in MP4, MOV or AVI format (data:video/mp4;base64,...)",
                )
            })?;

        Ok(DecodedVideo {
            extension: captures[1].to_lowercase(),
            // Line-wrapped base64 is accepted.
            data: captures[2]
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect(),
        })
    }

    fn custom_script(&self) -> Option<&str> {
        self.custom_script
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Video translation with voice preservation through HeyGen.
pub struct GlobalVoiceTool {
    translator: Arc<dyn VideoTranslationService>,
    poller: JobPoller,
    policy: PollPolicy,
}

impl GlobalVoiceTool {
    pub fn new(translator: Arc<dyn VideoTranslationService>, poller: JobPoller, policy: PollPolicy) -> Self {
        Self {
            translator,
            poller,
            policy,
        }
    }

    fn check_provider(override_name: Option<&str>) -> Result<()> {
        match override_name {
            None => Ok(()),
            Some(name)
                if name.eq_ignore_ascii_case(DEFAULT_PROVIDER)
                    || name.eq_ignore_ascii_case(SERVICE_NAME) =>
            {
                Ok(())
            }
            Some(name) if name.eq_ignore_ascii_case("ELEVENLABS") => Err(Error::provider_not_implemented(
                "ElevenLabs provider integration not yet implemented. Use HEYGEN provider.",
            )
            .with_details(json!({ "service": "global-voice" }))),
            Some(name) => Err(Error::invalid_input(format!(
                "Provider '{}' not supported for {}. Use {}.",
                name,
                TaskType::VideoTranslation,
                DEFAULT_PROVIDER
            ))),
        }
    }

    async fn target_language(&self, code: &str, request_id: &str) -> Result<String> {
        let supported = self.translator.list_target_languages().await?;
        let fallback = display_name(code).unwrap_or(code).to_string();

        if supported.is_empty() {
            warn!(
                "[{}] HeyGen returned no target languages, using {}",
                request_id, fallback
            );
            return Ok(fallback);
        }

        resolve_language(code, &supported).ok_or_else(|| {
            let names: Vec<&str> = supported.iter().map(|lang| lang.name.as_str()).collect();
            let preview = names.iter().take(10).copied().collect::<Vec<_>>().join(", ");
            let more = if names.len() > 10 { "..." } else { "" };

            Error::invalid_input(format!(
                "Unsupported target language: {}. Supported languages: {}{}",
                code, preview, more
            ))
            .with_details(json!({
                "service": "global-voice",
                "requestId": request_id,
                "supportedLanguages": names,
            }))
        })
    }
}

#[async_trait]
impl Tool for GlobalVoiceTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            id: "global-voice".to_string(),
            name: "Global Voice".to_string(),
            description: "Multilingual video translation that keeps the speaker's voice characteristics \
                          and produces a lip-synced video"
                .to_string(),
            supported_tasks: vec![TaskType::VideoTranslation],
            default_provider: DEFAULT_PROVIDER.to_string(),
            dev_sample_payload: json!({
                "video": "data:video/mp4;base64,AAAAIGZ0eXBpc29tAAACAGlzb21pc28y...",
                "target_language": "es",
                "custom_script": null,
                "voice_preservation": 0.8,
                "video_quality": "1080p"
            }),
        }
    }

    fn validate(&self, payload: &Value) -> Result<()> {
        GlobalVoicePayload::parse(payload).map(|_| ())
    }

    async fn handle(&self, ctx: &ToolContext<'_>, payload: &Value) -> Result<Value> {
        let clock = self.poller.clock();
        let started = clock.now_millis();
        let request_id = request_id(clock.as_ref());

        let voice = GlobalVoicePayload::parse(payload)?;
        Self::check_provider(ctx.provider_override)?;
        self.translator.ensure_configured()?;

        let quality = voice.video_quality.as_deref().unwrap_or(DEFAULT_QUALITY);
        info!(
            "[{}] Starting video translation to {}",
            request_id, voice.target_language
        );

        let video = voice.decoded()?;
        let bytes = STANDARD.decode(video.data.as_bytes()).map_err(|e| {
            Error::invalid_input("Failed to decode base64 video data").with_details(json!({
                "service": "global-voice",
                "requestId": request_id,
                "details": e.to_string(),
            }))
        })?;

        debug!("[{}] Uploading {} bytes to HeyGen", request_id, bytes.len());
        let uploaded = self
            .translator
            .upload_asset(MediaAsset {
                bytes,
                filename: format!("video.{}", video.extension),
                mime_type: mime_type(&video.extension).to_string(),
            })
            .await?;
        let video_url = uploaded.url.ok_or_else(|| {
            Error::vendor(heygen::VENDOR, "HeyGen upload failed: No URL returned")
                .with_details(json!({ "service": "global-voice", "requestId": request_id }))
        })?;

        let language = self.target_language(&voice.target_language, &request_id).await?;
        info!("[{}] Resolved target language: {}", request_id, language);

        let title = match voice.custom_script() {
            Some(_) => "Taskgate Global Voice (Custom Script)",
            None => "Taskgate Global Voice",
        };
        let request = TranslationRequest {
            video_url,
            output_languages: vec![language],
            title: Some(title.to_string()),
        };

        let target = JobTarget {
            service: "HeyGen",
            vendor: heygen::VENDOR,
            policy: self.policy,
        };
        let translator = &self.translator;
        let job = self
            .poller
            .submit_and_await(
                &target,
                || translator.translate_video(&request),
                |translation_id| async move { translator.translation_status(&translation_id).await },
            )
            .await?;

        let processing_time = elapsed_seconds(clock.as_ref(), started);
        info!(
            "[{}] Translation {} completed in {:.2}s",
            request_id, job.job_id, processing_time
        );

        Ok(json!({
            "translated_video_url": job.result_url,
            "source_language": "auto",
            "target_language": voice.target_language,
            "processing_time": processing_time,
            "provider_job_id": job.job_id,
            "model_used": DEFAULT_PROVIDER,
            "video_metadata": {
                "duration": null,
                "resolution": resolution(quality),
                "format": video.extension,
            },
        }))
    }
}
