//! Scripted stand-ins for the router, providers and media vendors.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

use crate::error::{Error, Result};
use crate::jobs::JobSnapshot;
use crate::providers::{Provider, TextGenerator};
use crate::routing::{ProviderCall, TaskRunner, TaskType};
use crate::vendors::{
    MediaAsset, PredictionRequest, PredictionService, TargetLanguage, TranslationRequest,
    UploadedAsset, VideoTranslationService,
};

/// Pops scripted results per task; the last one repeats.
fn next_scripted<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[derive(Default)]
pub struct FakeRunner {
    scripts: Mutex<HashMap<TaskType, VecDeque<Result<Value>>>>,
    calls: Mutex<Vec<ProviderCall>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(self, text: &str) -> Self {
        self.with_data(TaskType::TextGeneration, Value::String(text.to_string()))
    }

    pub fn with_data(self, task: TaskType, data: Value) -> Self {
        self.scripts.lock().entry(task).or_default().push_back(Ok(data));
        self
    }

    pub fn with_failure(self, task: TaskType, error: Error) -> Self {
        self.scripts.lock().entry(task).or_default().push_back(Err(error));
        self
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TaskRunner for FakeRunner {
    async fn call_provider(&self, call: ProviderCall) -> Result<Value> {
        let task = call.task;
        self.calls.lock().push(call);

        self.scripts
            .lock()
            .get_mut(&task)
            .and_then(next_scripted)
            .ok_or_else(|| Error::internal(format!("No scripted result for {}", task)))?
    }
}

/// Text-only provider returning a fixed reply or error.
pub struct FakeTextProvider {
    name: String,
    reply: Result<String>,
    calls: Mutex<Vec<Value>>,
}

impl FakeTextProvider {
    pub fn replying(name: &str, reply: &str) -> Self {
        Self {
            name: name.to_string(),
            reply: Ok(reply.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &str, error: Error) -> Self {
        Self {
            name: name.to_string(),
            reply: Err(error),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl TextGenerator for FakeTextProvider {
    async fn generate_text(&self, payload: &Value) -> Result<String> {
        self.calls.lock().push(payload.clone());
        self.reply.clone()
    }
}

impl Provider for FakeTextProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn as_text_generator(&self) -> Option<&dyn TextGenerator> {
        Some(self)
    }
}

enum ScriptedJob {
    Statuses(Vec<JobSnapshot>),
    SubmitFailure(Error),
}

#[derive(Default)]
struct PredictionState {
    jobs: VecDeque<ScriptedJob>,
    statuses: HashMap<String, VecDeque<JobSnapshot>>,
    requests: Vec<PredictionRequest>,
}

/// Each created prediction takes the next scripted job. Unscripted or
/// exhausted jobs stay pending.
pub struct FakePredictions {
    configured: bool,
    state: Mutex<PredictionState>,
}

impl FakePredictions {
    pub fn new() -> Self {
        Self {
            configured: true,
            state: Mutex::new(PredictionState::default()),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub fn with_job(self, statuses: Vec<JobSnapshot>) -> Self {
        self.state.lock().jobs.push_back(ScriptedJob::Statuses(statuses));
        self
    }

    pub fn with_failed_submit(self, error: Error) -> Self {
        self.state.lock().jobs.push_back(ScriptedJob::SubmitFailure(error));
        self
    }

    pub fn created(&self) -> usize {
        self.state.lock().requests.len()
    }

    pub fn last_request(&self) -> Option<PredictionRequest> {
        self.state.lock().requests.last().cloned()
    }
}

#[async_trait]
impl PredictionService for FakePredictions {
    fn ensure_configured(&self) -> Result<()> {
        if self.configured {
            Ok(())
        } else {
            Err(Error::key_missing("REPLICATE", "REPLICATE_API_TOKEN is not loaded"))
        }
    }

    async fn create_prediction(&self, request: &PredictionRequest) -> Result<Option<String>> {
        let mut state = self.state.lock();
        state.requests.push(request.clone());
        let id = format!("pred-{}", state.requests.len());

        match state.jobs.pop_front() {
            Some(ScriptedJob::SubmitFailure(error)) => Err(error),
            Some(ScriptedJob::Statuses(statuses)) => {
                state.statuses.insert(id.clone(), statuses.into());
                Ok(Some(id))
            }
            None => Ok(Some(id)),
        }
    }

    async fn get_prediction(&self, prediction_id: &str) -> Result<JobSnapshot> {
        Ok(self
            .state
            .lock()
            .statuses
            .get_mut(prediction_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| JobSnapshot::pending("processing")))
    }
}

#[derive(Default)]
struct TranslatorState {
    languages: Vec<TargetLanguage>,
    statuses: VecDeque<JobSnapshot>,
    uploads: Vec<MediaAsset>,
    translations: Vec<TranslationRequest>,
    status_checks: u32,
}

pub struct FakeTranslator {
    configured: bool,
    state: Mutex<TranslatorState>,
}

impl FakeTranslator {
    pub fn new() -> Self {
        Self {
            configured: true,
            state: Mutex::new(TranslatorState::default()),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub fn with_languages(self, languages: Vec<TargetLanguage>) -> Self {
        self.state.lock().languages = languages;
        self
    }

    pub fn with_statuses(self, statuses: Vec<JobSnapshot>) -> Self {
        self.state.lock().statuses = statuses.into();
        self
    }

    pub fn last_upload(&self) -> Option<MediaAsset> {
        self.state.lock().uploads.last().cloned()
    }

    pub fn last_translation(&self) -> Option<TranslationRequest> {
        self.state.lock().translations.last().cloned()
    }

    pub fn status_checks(&self) -> u32 {
        self.state.lock().status_checks
    }
}

#[async_trait]
impl VideoTranslationService for FakeTranslator {
    fn ensure_configured(&self) -> Result<()> {
        if self.configured {
            Ok(())
        } else {
            Err(Error::key_missing("PROVIDER", "HEYGEN_API_KEY is not loaded"))
        }
    }

    async fn upload_asset(&self, asset: MediaAsset) -> Result<UploadedAsset> {
        let url = format!("https://heygen.test/assets/{}", asset.filename);
        self.state.lock().uploads.push(asset);
        Ok(UploadedAsset {
            asset_id: Some("asset-1".to_string()),
            url: Some(url),
        })
    }

    async fn list_target_languages(&self) -> Result<Vec<TargetLanguage>> {
        Ok(self.state.lock().languages.clone())
    }

    async fn translate_video(&self, request: &TranslationRequest) -> Result<Option<String>> {
        let mut state = self.state.lock();
        state.translations.push(request.clone());
        Ok(Some(format!("vt-{}", state.translations.len())))
    }

    async fn translation_status(&self, _translation_id: &str) -> Result<JobSnapshot> {
        let mut state = self.state.lock();
        state.status_checks += 1;
        Ok(state
            .statuses
            .pop_front()
            .unwrap_or_else(|| JobSnapshot::pending("processing")))
    }
}
