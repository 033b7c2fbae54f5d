use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::routing::{TaskRunner, TaskType};

/// Descriptive metadata shown by `tools` listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    pub supported_tasks: Vec<TaskType>,
    pub default_provider: String,
    pub dev_sample_payload: Value,
}

/// What a tool handler sees of its caller.
pub struct ToolContext<'a> {
    /// Provider dispatch for work the tool delegates.
    pub runner: &'a dyn TaskRunner,
    pub identity: &'a str,
    pub provider_override: Option<&'a str>,
}

impl<'a> ToolContext<'a> {
    pub fn provider_or(&self, default: &'a str) -> &'a str {
        self.provider_override
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(default)
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> ToolMetadata;

    /// Reject malformed payloads before any external call.
    fn validate(&self, payload: &Value) -> Result<()>;

    async fn handle(&self, ctx: &ToolContext<'_>, payload: &Value) -> Result<Value>;
}

/// A tool invocation as accepted on the tool surface.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub tool_id: String,
    pub payload: Value,
    pub provider: Option<String>,
    pub identity: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool_id: String,
    pub success: bool,
    pub data: Value,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let id = tool.metadata().id;
        if id.trim().is_empty() {
            return Err(Error::internal("Tool id must be a non-empty string"));
        }

        let mut tools = self.tools.write();
        if tools.contains_key(&id) {
            return Err(Error::internal(format!("Tool '{}' is already registered", id)));
        }

        info!("Registered tool {}", id);
        tools.insert(id, tool);
        Ok(())
    }

    pub fn resolve(&self, tool_id: &str) -> Result<Arc<dyn Tool>> {
        if tool_id.trim().is_empty() {
            return Err(Error::invalid_input("toolId must be a non-empty string"));
        }

        let tools = self.tools.read();
        if let Some(tool) = tools.get(tool_id) {
            return Ok(Arc::clone(tool));
        }

        let available: Vec<&String> = tools.keys().collect();
        Err(Error::tool_not_found(format!(
            "Tool '{}' not found. Available tools: {}",
            tool_id,
            if available.is_empty() {
                "none".to_string()
            } else {
                available.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            }
        ))
        .with_details(json!({ "toolId": tool_id, "available": available })))
    }

    pub fn list(&self) -> Vec<ToolMetadata> {
        self.tools.read().values().map(|tool| tool.metadata()).collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }

    /// Resolve, validate and run one tool. Shared by the router and the
    /// tool surface.
    pub async fn invoke(
        &self,
        runner: &dyn TaskRunner,
        tool_id: &str,
        payload: &Value,
        provider_override: Option<&str>,
        identity: &str,
    ) -> Result<Value> {
        let tool = self.resolve(tool_id)?;
        tool.validate(payload)?;

        debug!(
            "Running tool {} for {} (provider override: {:?})",
            tool_id, identity, provider_override
        );
        let ctx = ToolContext {
            runner,
            identity,
            provider_override,
        };
        tool.handle(&ctx, payload).await
    }

    pub async fn run_tool(&self, runner: &dyn TaskRunner, request: ToolRequest) -> Result<ToolResult> {
        if !request.payload.is_object() {
            return Err(Error::invalid_input("Payload must be an object"));
        }

        let data = self
            .invoke(
                runner,
                &request.tool_id,
                &request.payload,
                request.provider.as_deref(),
                &request.identity,
            )
            .await?;

        Ok(ToolResult {
            tool_id: request.tool_id,
            success: true,
            data,
        })
    }
}
