//! The single error shape that crosses every component boundary.
//!
//! Every failure carries a human message, an HTTP-style status, a symbolic
//! [`ErrorCode`] and optional structured details. Foreign errors (HTTP,
//! JSON, config, IO) are normalized through the `From` impls below, so a raw
//! vendor error never escapes past the component it occurred in.

use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidInput,
    InvalidTask,
    RateLimited,
    ProviderNotFound,
    ToolNotFound,
    ProviderNotConfigured,
    /// `<VENDOR>_KEY_MISSING`, e.g. `REPLICATE_KEY_MISSING`.
    KeyMissing(String),
    ProviderNotImplemented,
    TaskNotSupported,
    NotImplemented,
    /// `<VENDOR>_ERROR`, e.g. `REPLICATE_ERROR` or `PROVIDER_ERROR`.
    Vendor(String),
    Timeout,
    AiTaskFailed,
    InvalidProviderClient,
    InvalidProviderName,
    ToolDependencyNotReady,
    ProviderUnavailable,
    ConfigError,
    InternalError,
    UnknownError,
}

impl ErrorCode {
    pub fn as_string(&self) -> String {
        match self {
            ErrorCode::InvalidInput => "INVALID_INPUT".to_string(),
            ErrorCode::InvalidTask => "INVALID_TASK".to_string(),
            ErrorCode::RateLimited => "RATE_LIMITED".to_string(),
            ErrorCode::ProviderNotFound => "PROVIDER_NOT_FOUND".to_string(),
            ErrorCode::ToolNotFound => "TOOL_NOT_FOUND".to_string(),
            ErrorCode::ProviderNotConfigured => "PROVIDER_NOT_CONFIGURED".to_string(),
            ErrorCode::KeyMissing(vendor) => format!("{}_KEY_MISSING", vendor.to_uppercase()),
            ErrorCode::ProviderNotImplemented => "PROVIDER_NOT_IMPLEMENTED".to_string(),
            ErrorCode::TaskNotSupported => "TASK_NOT_SUPPORTED".to_string(),
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED".to_string(),
            ErrorCode::Vendor(vendor) => format!("{}_ERROR", vendor.to_uppercase()),
            ErrorCode::Timeout => "TIMEOUT".to_string(),
            ErrorCode::AiTaskFailed => "AI_TASK_FAILED".to_string(),
            ErrorCode::InvalidProviderClient => "INVALID_PROVIDER_CLIENT".to_string(),
            ErrorCode::InvalidProviderName => "INVALID_PROVIDER_NAME".to_string(),
            ErrorCode::ToolDependencyNotReady => "TOOL_DEPENDENCY_NOT_READY".to_string(),
            ErrorCode::ProviderUnavailable => "PROVIDER_UNAVAILABLE".to_string(),
            ErrorCode::ConfigError => "CONFIG_ERROR".to_string(),
            ErrorCode::InternalError => "INTERNAL_ERROR".to_string(),
            ErrorCode::UnknownError => "UNKNOWN_ERROR".to_string(),
        }
    }

    /// Codes the router passes through unchanged instead of wrapping them
    /// in `AI_TASK_FAILED`.
    pub fn is_informative(&self) -> bool {
        matches!(
            self,
            ErrorCode::ProviderNotImplemented
                | ErrorCode::ProviderNotConfigured
                | ErrorCode::RateLimited
                | ErrorCode::TaskNotSupported
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_string())
    }
}

#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct Error {
    message: String,
    status_code: u16,
    code: ErrorCode,
    details: Option<Value>,
}

/// Wire shape of a normalized error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub message: String,
    pub status_code: u16,
    pub code: ErrorCode,
    pub details: Option<Value>,
}

impl Error {
    pub fn new(message: impl Into<String>, status_code: u16, code: ErrorCode) -> Self {
        Self {
            message: message.into(),
            status_code,
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn code(&self) -> &ErrorCode {
        &self.code
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            message: self.message.clone(),
            status_code: self.status_code,
            code: self.code.clone(),
            details: self.details.clone(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::new(msg, 400, ErrorCode::InvalidInput)
    }

    pub fn invalid_task(msg: impl Into<String>) -> Self {
        Error::new(msg, 400, ErrorCode::InvalidTask)
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Error::new(msg, 429, ErrorCode::RateLimited)
    }

    pub fn provider_not_found(msg: impl Into<String>) -> Self {
        Error::new(msg, 404, ErrorCode::ProviderNotFound)
    }

    pub fn tool_not_found(msg: impl Into<String>) -> Self {
        Error::new(msg, 404, ErrorCode::ToolNotFound)
    }

    pub fn provider_not_configured(msg: impl Into<String>) -> Self {
        Error::new(msg, 400, ErrorCode::ProviderNotConfigured)
    }

    pub fn key_missing(vendor: &str, msg: impl Into<String>) -> Self {
        Error::new(msg, 500, ErrorCode::KeyMissing(vendor.to_string()))
    }

    pub fn provider_not_implemented(msg: impl Into<String>) -> Self {
        Error::new(msg, 501, ErrorCode::ProviderNotImplemented)
    }

    pub fn task_not_supported(msg: impl Into<String>) -> Self {
        Error::new(msg, 501, ErrorCode::TaskNotSupported)
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Error::new(msg, 501, ErrorCode::NotImplemented)
    }

    /// A vendor rejected the request or returned something unusable.
    pub fn vendor(vendor: &str, msg: impl Into<String>) -> Self {
        Error::new(msg, 400, ErrorCode::Vendor(vendor.to_string()))
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Error::new(msg, 504, ErrorCode::Timeout)
    }

    pub fn ai_task_failed(msg: impl Into<String>, status_code: u16) -> Self {
        Error::new(msg, status_code, ErrorCode::AiTaskFailed)
    }

    pub fn provider_unavailable(msg: impl Into<String>) -> Self {
        Error::new(msg, 503, ErrorCode::ProviderUnavailable)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::new(msg, 500, ErrorCode::ConfigError)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::new(msg, 500, ErrorCode::InternalError)
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Error::new(msg, 500, ErrorCode::UnknownError)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let status = if err.is_timeout() { 504 } else { 500 };
        let code = if err.is_timeout() {
            ErrorCode::Timeout
        } else {
            ErrorCode::UnknownError
        };
        Error::new(format!("HTTP request failed: {}", err), status, code)
            .with_details(json!({ "originalError": "reqwest::Error" }))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::unknown(format!("JSON serialization error: {}", err))
            .with_details(json!({ "originalError": "serde_json::Error" }))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::config(format!("Configuration error: {}", err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::internal(format!("IO error: {}", err))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields: Vec<String> = errors
            .field_errors()
            .keys()
            .map(|field| field.to_string())
            .collect();
        Error::invalid_input(format!("Payload validation failed: {}", errors))
            .with_details(json!({ "fields": fields }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_codes_render_with_prefix() {
        assert_eq!(ErrorCode::Vendor("replicate".into()).to_string(), "REPLICATE_ERROR");
        assert_eq!(ErrorCode::Vendor("PROVIDER".into()).to_string(), "PROVIDER_ERROR");
        assert_eq!(ErrorCode::KeyMissing("heygen".into()).to_string(), "HEYGEN_KEY_MISSING");
    }

    #[test]
    fn test_informative_codes() {
        assert!(ErrorCode::RateLimited.is_informative());
        assert!(ErrorCode::TaskNotSupported.is_informative());
        assert!(ErrorCode::ProviderNotConfigured.is_informative());
        assert!(ErrorCode::ProviderNotImplemented.is_informative());
        assert!(!ErrorCode::Timeout.is_informative());
        assert!(!ErrorCode::Vendor("OPENAI".into()).is_informative());
    }

    #[test]
    fn test_body_serialization() {
        let err = Error::rate_limited("slow down").with_details(json!({ "retryAfterMs": 10 }));
        let body = serde_json::to_value(err.to_body()).unwrap();

        assert_eq!(body["code"], "RATE_LIMITED");
        assert_eq!(body["statusCode"], 429);
        assert_eq!(body["message"], "slow down");
        assert_eq!(body["details"]["retryAfterMs"], 10);
    }

    #[test]
    fn test_display_is_message() {
        let err = Error::timeout("job did not finish");
        assert_eq!(err.to_string(), "job did not finish");
        assert_eq!(err.status_code(), 504);
    }
}
