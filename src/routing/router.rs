use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{Error, ErrorCode, Result};
use crate::limits::RateLimiter;
use crate::providers::{Provider, ProviderRegistry};
use crate::routing::{
    ProviderCall, TaskRequest, TaskResult, TaskRunner, TaskType, DEFAULT_IDENTITY,
};
use crate::tools::{ToolRegistry, ToolRequest, ToolResult};
use crate::usage::{UsageMetrics, UsageSummary, UsageTracker};

/// Payload fields counted toward a session's input size.
const TEXT_FIELDS: [&str; 3] = ["prompt", "system", "text"];

fn input_chars(payload: &Value) -> u64 {
    TEXT_FIELDS
        .iter()
        .filter_map(|field| payload.get(*field).and_then(Value::as_str))
        .map(|text| text.chars().count() as u64)
        .sum()
}

fn output_chars(data: &Value) -> u64 {
    data.as_str().map(|s| s.chars().count() as u64).unwrap_or(0)
}

fn unsupported(provider: &str, task: TaskType) -> Error {
    Error::task_not_supported(format!(
        "Provider '{}' does not support {} task",
        provider, task
    ))
    .with_details(json!({ "provider": provider, "task": task }))
}

/// Central dispatcher for every task invocation.
///
/// Each call is admitted by the rate limiter, then tracked by exactly one
/// usage session that is finalized on both the success and failure paths.
/// Provider-backed tasks go to a registered provider's capability; composite
/// tasks go to the tool registry. Provider work a tool needs is dispatched
/// through [`TaskRunner::call_provider`] and stays inside the caller's session.
pub struct TaskRouter {
    providers: Arc<ProviderRegistry>,
    tools: Arc<ToolRegistry>,
    rate_limiter: Arc<RateLimiter>,
    usage: Arc<UsageTracker>,
    clock: Arc<dyn Clock>,
}

impl TaskRouter {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        tools: Arc<ToolRegistry>,
        rate_limiter: Arc<RateLimiter>,
        usage: Arc<UsageTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            providers,
            tools,
            rate_limiter,
            usage,
            clock,
        }
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    fn identity_or_default(identity: &str) -> &str {
        if identity.trim().is_empty() {
            DEFAULT_IDENTITY
        } else {
            identity
        }
    }

    pub async fn run_task(&self, request: TaskRequest) -> Result<TaskResult> {
        if request.provider.trim().is_empty() {
            return Err(Error::invalid_input("Provider must be a non-empty string"));
        }
        if request.task.trim().is_empty() {
            return Err(Error::invalid_input("Task must be a non-empty string"));
        }
        let task: TaskType = request.task.parse()?;
        if !request.payload.is_object() {
            return Err(Error::invalid_input("Payload must be an object"));
        }

        let identity = Self::identity_or_default(&request.identity);
        let provider = request.provider.as_str();

        self.rate_limiter.consume(identity)?;

        let session_id = self.usage.start_session(identity, provider, task.as_str())?;
        let started = self.clock.now_millis();
        let input_chars = input_chars(&request.payload);
        info!("Running {} via {} for {}", task, provider, identity);

        let outcome = self.dispatch(task, provider, &request.payload, identity).await;
        let duration_ms = self.clock.now_millis().saturating_sub(started);

        match outcome {
            Ok(data) => {
                self.usage.end_session(
                    &session_id,
                    UsageMetrics {
                        input_chars,
                        output_chars: output_chars(&data),
                        duration_ms: Some(duration_ms),
                        success: true,
                        ..Default::default()
                    },
                );
                debug!("{} via {} finished in {}ms", task, provider, duration_ms);

                Ok(TaskResult {
                    provider: task.service_name().unwrap_or(provider).to_string(),
                    task,
                    success: true,
                    data,
                })
            }
            Err(err) => {
                self.usage.end_session(
                    &session_id,
                    UsageMetrics {
                        input_chars,
                        duration_ms: Some(duration_ms),
                        success: false,
                        ..Default::default()
                    },
                );
                warn!("{} via {} failed: {} ({})", task, provider, err, err.code());
                Err(Self::normalize(err, provider, task))
            }
        }
    }

    async fn dispatch(&self, task: TaskType, provider: &str, payload: &Value, identity: &str) -> Result<Value> {
        if let (Some(tool_id), Some(service)) = (task.tool_id(), task.service_name()) {
            // Naming the logical service itself means "use the tool's default vendor".
            let provider_override = if provider.eq_ignore_ascii_case(service) {
                None
            } else {
                Some(provider)
            };
            debug!("Dispatching {} to tool {}", task, tool_id);
            return self
                .tools
                .invoke(self, tool_id, payload, provider_override, identity)
                .await;
        }

        let client = self.providers.resolve(provider)?;
        debug!("Dispatching {} to provider {}", task, client.provider_name());
        Self::call_capability(client.as_ref(), provider, task, payload).await
    }

    async fn call_capability(
        client: &dyn Provider,
        provider: &str,
        task: TaskType,
        payload: &Value,
    ) -> Result<Value> {
        match task {
            TaskType::TextGeneration => {
                let generator = client
                    .as_text_generator()
                    .ok_or_else(|| unsupported(provider, task))?;
                generator.generate_text(payload).await.map(Value::String)
            }
            TaskType::ImageGeneration => {
                client
                    .as_image_generator()
                    .ok_or_else(|| unsupported(provider, task))?
                    .generate_image(payload)
                    .await
            }
            TaskType::ImageEdit => {
                client
                    .as_image_editor()
                    .ok_or_else(|| unsupported(provider, task))?
                    .edit_image(payload)
                    .await
            }
            TaskType::ImageAnalysis => {
                client
                    .as_image_analyzer()
                    .ok_or_else(|| unsupported(provider, task))?
                    .analyze_image(payload)
                    .await
            }
            TaskType::AudioTranscription => {
                client
                    .as_audio_transcriber()
                    .ok_or_else(|| unsupported(provider, task))?
                    .transcribe_audio(payload)
                    .await
            }
            _ => Err(Error::internal(format!("Unhandled task type: {}", task))),
        }
    }

    fn normalize(err: Error, provider: &str, task: TaskType) -> Error {
        let code = err.code();
        if code.is_informative()
            || matches!(code, ErrorCode::ProviderNotFound | ErrorCode::AiTaskFailed)
        {
            return err;
        }

        let details = json!({
            "provider": provider,
            "task": task,
            "originalError": code,
            "originalDetails": err.details(),
        });
        Error::ai_task_failed(format!("AI task failed: {}", err.message()), err.status_code())
            .with_details(details)
    }

    /// Run a tool directly, outside of the task surface. Admission and
    /// usage tracking match `run_task`, with the tool id as the task label.
    pub async fn run_tool(&self, mut request: ToolRequest) -> Result<ToolResult> {
        request.identity = Self::identity_or_default(&request.identity).to_string();
        let tool = self.tools.resolve(&request.tool_id)?;

        self.rate_limiter.consume(&request.identity)?;

        let provider = request
            .provider
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| tool.metadata().default_provider);
        let session_id = self
            .usage
            .start_session(&request.identity, &provider, &request.tool_id)?;
        let started = self.clock.now_millis();
        let input_chars = input_chars(&request.payload);
        info!("Running tool {} for {}", request.tool_id, request.identity);

        let outcome = self.tools.run_tool(self, request).await;
        self.usage.end_session(
            &session_id,
            UsageMetrics {
                input_chars,
                output_chars: outcome.as_ref().map(|r| output_chars(&r.data)).unwrap_or(0),
                duration_ms: Some(self.clock.now_millis().saturating_sub(started)),
                success: outcome.is_ok(),
                ..Default::default()
            },
        );
        if let Err(err) = &outcome {
            warn!("Tool invocation failed: {} ({})", err, err.code());
        }
        outcome
    }

    pub fn usage_summary(&self, identity: &str) -> UsageSummary {
        self.usage.get_summary(identity)
    }
}

#[async_trait]
impl TaskRunner for TaskRouter {
    async fn call_provider(&self, call: ProviderCall) -> Result<Value> {
        let client = self.providers.resolve(&call.provider)?;
        debug!("Tool call {} to provider {}", call.task, client.provider_name());
        Self::call_capability(client.as_ref(), &call.provider, call.task, &call.payload).await
    }
}
