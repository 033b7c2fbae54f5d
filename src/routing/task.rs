use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::providers::Capability;

pub const DEFAULT_IDENTITY: &str = "local-dev";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    TextGeneration,
    ImageGeneration,
    ImageEdit,
    ImageAnalysis,
    AudioTranscription,
    TimeCapsuleGeneration,
    CinematicSwitchGeneration,
    VideoTranslation,
    InstantInfluencerGeneration,
}

impl TaskType {
    pub const ALL: [TaskType; 9] = [
        TaskType::TextGeneration,
        TaskType::ImageGeneration,
        TaskType::ImageEdit,
        TaskType::ImageAnalysis,
        TaskType::AudioTranscription,
        TaskType::TimeCapsuleGeneration,
        TaskType::CinematicSwitchGeneration,
        TaskType::VideoTranslation,
        TaskType::InstantInfluencerGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::TextGeneration => "TEXT_GENERATION",
            TaskType::ImageGeneration => "IMAGE_GENERATION",
            TaskType::ImageEdit => "IMAGE_EDIT",
            TaskType::ImageAnalysis => "IMAGE_ANALYSIS",
            TaskType::AudioTranscription => "AUDIO_TRANSCRIPTION",
            TaskType::TimeCapsuleGeneration => "TIME_CAPSULE_GENERATION",
            TaskType::CinematicSwitchGeneration => "CINEMATIC_SWITCH_GENERATION",
            TaskType::VideoTranslation => "VIDEO_TRANSLATION",
            TaskType::InstantInfluencerGeneration => "INSTANT_INFLUENCER_GENERATION",
        }
    }

    /// Capability a provider must expose to serve this task. `None` for
    /// tool-backed tasks.
    pub fn required_capability(&self) -> Option<Capability> {
        match self {
            TaskType::TextGeneration => Some(Capability::TextGenerate),
            TaskType::ImageGeneration => Some(Capability::ImageGenerate),
            TaskType::ImageEdit => Some(Capability::ImageEdit),
            TaskType::ImageAnalysis => Some(Capability::ImageAnalyze),
            TaskType::AudioTranscription => Some(Capability::AudioTranscribe),
            _ => None,
        }
    }

    /// Tool that serves a composite task.
    pub fn tool_id(&self) -> Option<&'static str> {
        match self {
            TaskType::TimeCapsuleGeneration => Some("time-capsule"),
            TaskType::CinematicSwitchGeneration => Some("cinematic-switch"),
            TaskType::VideoTranslation => Some("global-voice"),
            TaskType::InstantInfluencerGeneration => Some("instant-influencer"),
            _ => None,
        }
    }

    /// Logical provider reported in results of composite tasks.
    pub fn service_name(&self) -> Option<&'static str> {
        match self {
            TaskType::TimeCapsuleGeneration => Some("TIME_CAPSULE"),
            TaskType::CinematicSwitchGeneration => Some("CINEMATIC_SWITCH"),
            TaskType::VideoTranslation => Some("GLOBAL_VOICE"),
            TaskType::InstantInfluencerGeneration => Some("INSTANT_INFLUENCER"),
            _ => None,
        }
    }

    pub fn is_tool_backed(&self) -> bool {
        self.tool_id().is_some()
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TaskType::ALL
            .iter()
            .copied()
            .find(|task| task.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = TaskType::ALL.iter().map(TaskType::as_str).collect();
                Error::invalid_task(format!(
                    "Invalid task '{}'. Valid tasks: {}",
                    s,
                    valid.join(", ")
                ))
            })
    }
}

fn default_identity() -> String {
    DEFAULT_IDENTITY.to_string()
}

/// A task invocation. `task` stays a string until the router checks it
/// against the closed task set.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskRequest {
    pub provider: String,
    pub task: String,
    pub payload: Value,
    #[serde(default = "default_identity")]
    pub identity: String,
}

impl TaskRequest {
    pub fn new(
        provider: impl Into<String>,
        task: impl Into<String>,
        payload: Value,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            task: task.into(),
            payload,
            identity: identity.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub provider: String,
    pub task: TaskType,
    pub success: bool,
    pub data: Value,
}

/// A provider capability call made by a tool on behalf of its caller.
#[derive(Debug, Clone)]
pub struct ProviderCall {
    pub provider: String,
    pub task: TaskType,
    pub payload: Value,
}

impl ProviderCall {
    pub fn new(provider: impl Into<String>, task: TaskType, payload: Value) -> Self {
        Self {
            provider: provider.into(),
            task,
            payload,
        }
    }
}

/// Provider dispatch handed to tools.
///
/// Calls made here belong to the invocation that is already running the
/// tool: they are neither admitted by the rate limiter nor tracked as
/// separate usage sessions. Errors come back unwrapped.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn call_provider(&self, call: ProviderCall) -> Result<Value>;
}
