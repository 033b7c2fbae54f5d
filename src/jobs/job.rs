use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Succeeded,
    Failed,
    Canceled,
    /// Local condition raised by the poller, never reported by a vendor.
    Timeout,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
            JobStatus::Timeout => "timeout",
        }
    }
}

/// One status observation returned by a vendor.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub status: JobStatus,
    /// Vendor's own status string, kept for error details.
    pub vendor_status: String,
    pub outputs: Vec<String>,
    pub error: Option<String>,
}

impl JobSnapshot {
    pub fn pending(vendor_status: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Pending,
            vendor_status: vendor_status.into(),
            outputs: Vec::new(),
            error: None,
        }
    }

    pub fn succeeded(outputs: Vec<String>) -> Self {
        Self {
            status: JobStatus::Succeeded,
            vendor_status: "succeeded".to_string(),
            outputs,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            vendor_status: "failed".to_string(),
            outputs: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn canceled() -> Self {
        Self {
            status: JobStatus::Canceled,
            vendor_status: "canceled".to_string(),
            outputs: Vec::new(),
            error: None,
        }
    }

    pub fn with_vendor_status(mut self, vendor_status: impl Into<String>) -> Self {
        self.vendor_status = vendor_status.into();
        self
    }
}

/// A vendor-side job that reached successful completion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncJob {
    pub job_id: String,
    pub status: JobStatus,
    pub result_url: Option<String>,
    pub outputs: Vec<String>,
    pub error_detail: Option<String>,
    pub polls: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_polls: u32) -> Self {
        Self { interval, max_polls }
    }

    /// Saturates instead of overflowing for very large policies.
    pub fn max_wait(&self) -> Duration {
        self.interval
            .checked_mul(self.max_polls)
            .unwrap_or(Duration::MAX)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2_000),
            max_polls: 60,
        }
    }
}

/// Pull output references out of a vendor `output` field, which may be a
/// single string or an array of strings.
pub fn collect_outputs(output: &Value) -> Vec<String> {
    match output {
        Value::String(url) if !url.is_empty() => vec![url.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str())
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
