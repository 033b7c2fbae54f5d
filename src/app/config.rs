use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::info;
use url::Url;

use crate::error::{Error, Result};
use crate::jobs::PollPolicy;
use crate::limits::{BreakerConfig, RateLimiterConfig};
use crate::routing::DEFAULT_IDENTITY;

const ENV_PREFIX: &str = "TASKGATE";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub default_identity: String,
    pub rate_limit: RateLimitSettings,
    pub polling: PollingSettings,
    pub endpoints: EndpointSettings,
    pub breaker: BreakerSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub window_ms: u64,
    pub max_requests: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PollSettings {
    pub interval_ms: u64,
    pub max_polls: u32,
}

impl PollSettings {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy::new(Duration::from_millis(self.interval_ms), self.max_polls)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub replicate: PollSettings,
    pub heygen: PollSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    pub openai_base_url: String,
    pub replicate_base_url: String,
    pub heygen_api_base_url: String,
    pub heygen_upload_url: String,
    pub default_text_model: String,
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Daily-rolling log files are written here when set.
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_identity: DEFAULT_IDENTITY.to_string(),
            rate_limit: RateLimitSettings::default(),
            polling: PollingSettings::default(),
            endpoints: EndpointSettings::default(),
            breaker: BreakerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max_requests: 20,
        }
    }
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            replicate: PollSettings {
                interval_ms: 2_000,
                max_polls: 60,
            },
            heygen: PollSettings {
                interval_ms: 3_000,
                max_polls: 60,
            },
        }
    }
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            openai_base_url: "https://api.openai.com".to_string(),
            replicate_base_url: "https://api.replicate.com/v1".to_string(),
            heygen_api_base_url: "https://api.heygen.com/v2".to_string(),
            heygen_upload_url: "https://upload.heygen.com/v1/asset".to_string(),
            default_text_model: "gpt-4o-mini".to_string(),
            http_timeout_secs: 60,
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "taskgate=info".to_string(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Layer defaults, then the TOML file (if given), then `TASKGATE__*`
    /// environment variables, e.g. `TASKGATE__RATE_LIMIT__MAX_REQUESTS=50`.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        if let Some(path) = file {
            info!("Loading configuration from: {:?}", path);
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        let config: AppConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize configuration: {}", e)))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, self.to_toml()?).await?;

        info!("Configuration saved to: {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_identity.trim().is_empty() {
            return Err(Error::config("default_identity must not be empty"));
        }
        if self.rate_limit.window_ms == 0 {
            return Err(Error::config("rate_limit.window_ms must be greater than 0"));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(Error::config("rate_limit.max_requests must be greater than 0"));
        }

        for (name, poll) in [("replicate", &self.polling.replicate), ("heygen", &self.polling.heygen)] {
            if poll.interval_ms == 0 {
                return Err(Error::config(format!(
                    "polling.{}.interval_ms must be greater than 0",
                    name
                )));
            }
            if poll.max_polls == 0 {
                return Err(Error::config(format!(
                    "polling.{}.max_polls must be greater than 0",
                    name
                )));
            }
        }

        let endpoints = &self.endpoints;
        for (name, value) in [
            ("openai_base_url", &endpoints.openai_base_url),
            ("replicate_base_url", &endpoints.replicate_base_url),
            ("heygen_api_base_url", &endpoints.heygen_api_base_url),
            ("heygen_upload_url", &endpoints.heygen_upload_url),
        ] {
            Url::parse(value).map_err(|e| {
                Error::config(format!("endpoints.{} is not a valid URL: {}", name, e))
            })?;
        }
        if endpoints.default_text_model.trim().is_empty() {
            return Err(Error::config("endpoints.default_text_model must not be empty"));
        }
        if endpoints.http_timeout_secs == 0 {
            return Err(Error::config("endpoints.http_timeout_secs must be greater than 0"));
        }

        if self.breaker.failure_threshold == 0 {
            return Err(Error::config("breaker.failure_threshold must be greater than 0"));
        }
        Ok(())
    }

    pub fn to_rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            window: Duration::from_millis(self.rate_limit.window_ms),
            max_requests: self.rate_limit.max_requests,
        }
    }

    pub fn to_breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker.failure_threshold,
            recovery_timeout: Duration::from_millis(self.breaker.recovery_timeout_ms),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.endpoints.http_timeout_secs)
    }
}
