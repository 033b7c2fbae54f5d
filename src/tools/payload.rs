use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::clock::Clock;
use crate::error::{Error, Result};

pub const IMAGE_DATA_URL: &str = r"^data:image/[A-Za-z0-9.+-]+;base64,";
pub const PHOTO_DATA_URL: &str = r"(?i)^data:image/(jpeg|jpg|png);base64,";
pub const VIDEO_DATA_URL: &str = r"(?is)^data:video/(mp4|mov|avi);base64,(.+)$";

pub fn parse_payload<T: DeserializeOwned>(payload: &Value) -> Result<T> {
    if !payload.is_object() {
        return Err(Error::invalid_input("Payload must be an object"));
    }
    serde_json::from_value(payload.clone())
        .map_err(|e| Error::invalid_input(format!("Invalid payload: {}", e)))
}

/// Trimmed text whose character length lies in `min..=max`.
pub fn require_text<'a>(field: &str, value: &'a str, min: usize, max: usize) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_input(format!(
            "{} cannot be empty or whitespace only",
            field
        )));
    }

    let len = trimmed.chars().count();
    if len < min {
        return Err(Error::invalid_input(format!(
            "{} must be at least {} characters",
            field, min
        )));
    }
    if len > max {
        return Err(Error::invalid_input(format!(
            "{} must not exceed {} characters",
            field, max
        )));
    }
    Ok(trimmed)
}

pub fn optional_text(field: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) if v.trim().is_empty() => Err(Error::invalid_input(format!(
            "{} must be a non-empty string when provided",
            field
        ))),
        _ => Ok(()),
    }
}

pub fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::internal(format!("Invalid pattern '{}': {}", pattern, e)))
}

pub fn require_match(field: &str, value: &str, pattern: &str, hint: &str) -> Result<()> {
    if compile(pattern)?.is_match(value) {
        Ok(())
    } else {
        Err(Error::invalid_input(format!("{} must be {}", field, hint)))
    }
}

pub fn require_one_of(field: &str, value: &str, allowed: &[&str]) -> Result<String> {
    let normalized = value.trim().to_lowercase();
    if allowed.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(Error::invalid_input(format!(
            "{} must be one of: {}",
            field,
            allowed.join(", ")
        )))
    }
}

/// Correlation id for log lines of one tool run.
pub fn request_id(clock: &dyn Clock) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("req_{}_{}", clock.now_millis(), suffix)
}

/// Seconds since `started_ms`, with millisecond precision.
pub fn elapsed_seconds(clock: &dyn Clock, started_ms: u64) -> f64 {
    clock.now_millis().saturating_sub(started_ms) as f64 / 1000.0
}
