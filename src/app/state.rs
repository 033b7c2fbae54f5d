use std::sync::Arc;
use tracing::{info, warn};

use crate::app::config::AppConfig;
use crate::app::credentials::Credentials;
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::jobs::JobPoller;
use crate::limits::{CircuitBreaker, RateLimitStatus, RateLimiter};
use crate::providers::{OpenAIProvider, ProviderRegistry, StubProvider};
use crate::routing::TaskRouter;
use crate::tools::{
    AudioTranscriptionTool, CinematicSwitchTool, FutureLetterTool, GlobalVoiceTool, ImageAgingTool,
    ImageAnalysisTool, ImageJobs, ImageVariationTool, InstantInfluencerTool, TimeCapsuleTool,
    ToolRegistry,
};
use crate::usage::UsageTracker;
use crate::vendors::{heygen, replicate, HeyGenClient, ReplicateClient};

/// Process-scoped context: every registry and cross-cutting tracker is
/// constructed here once and handed to the router.
pub struct AppState {
    config: AppConfig,
    router: TaskRouter,
    rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn bootstrap(config: AppConfig, credentials: Credentials) -> Result<Self> {
        Self::bootstrap_with_clock(config, credentials, Arc::new(SystemClock))
    }

    pub fn bootstrap_with_clock(
        config: AppConfig,
        credentials: Credentials,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        info!("Initializing application state");
        config.validate()?;

        let providers = Arc::new(Self::register_providers(&config, &credentials, &clock)?);
        let tools = Arc::new(Self::register_tools(&config, &credentials, &clock)?);
        let rate_limiter = Arc::new(RateLimiter::new(config.to_rate_limiter_config(), clock.clone()));
        let usage = Arc::new(UsageTracker::new(clock.clone()));

        let router = TaskRouter::new(providers, tools, rate_limiter.clone(), usage, clock);
        info!(
            "Ready with providers [{}] and {} tools",
            router.providers().list().join(", "),
            router.tools().ids().len()
        );

        Ok(Self {
            config,
            router,
            rate_limiter,
        })
    }

    fn breaker(config: &AppConfig, vendor: &str, clock: &Arc<dyn Clock>) -> CircuitBreaker {
        CircuitBreaker::new(vendor, config.to_breaker_config(), clock.clone())
    }

    fn register_providers(
        config: &AppConfig,
        credentials: &Credentials,
        clock: &Arc<dyn Clock>,
    ) -> Result<ProviderRegistry> {
        let registry = ProviderRegistry::new();

        match OpenAIProvider::new(
            credentials.openai_api_key.clone(),
            &config.endpoints.openai_base_url,
            &config.endpoints.default_text_model,
            config.http_timeout(),
            Self::breaker(config, "OPENAI", clock),
        ) {
            Ok(client) => registry.register("OPENAI", Arc::new(client))?,
            Err(err) => warn!("Skipping OPENAI provider: {}", err),
        }

        registry.register(
            "GEMINI",
            Arc::new(StubProvider::gemini(credentials.gemini_api_key.clone())),
        )?;
        registry.register(
            "ANTHROPIC",
            Arc::new(StubProvider::anthropic(credentials.anthropic_api_key.clone())),
        )?;

        Ok(registry)
    }

    fn register_tools(
        config: &AppConfig,
        credentials: &Credentials,
        clock: &Arc<dyn Clock>,
    ) -> Result<ToolRegistry> {
        let registry = ToolRegistry::new();
        let poller = JobPoller::new(clock.clone());

        let replicate = Arc::new(ReplicateClient::new(
            credentials.replicate_api_token.clone(),
            &config.endpoints.replicate_base_url,
            config.http_timeout(),
            Self::breaker(config, replicate::VENDOR, clock),
        )?);
        let heygen = Arc::new(HeyGenClient::new(
            credentials.heygen_api_key.clone(),
            &config.endpoints.heygen_api_base_url,
            &config.endpoints.heygen_upload_url,
            config.http_timeout(),
            Self::breaker(config, heygen::VENDOR, clock),
        )?);
        let images = ImageJobs::new(replicate, poller.clone(), config.polling.replicate.policy());

        registry.register(Arc::new(FutureLetterTool))?;
        registry.register(Arc::new(ImageAgingTool))?;
        registry.register(Arc::new(ImageVariationTool))?;
        registry.register(Arc::new(ImageAnalysisTool))?;
        registry.register(Arc::new(AudioTranscriptionTool))?;
        registry.register(Arc::new(TimeCapsuleTool::new(images.clone())))?;
        registry.register(Arc::new(CinematicSwitchTool::new(images.clone())))?;
        registry.register(Arc::new(InstantInfluencerTool::new(images)))?;
        registry.register(Arc::new(GlobalVoiceTool::new(
            heygen,
            poller,
            config.polling.heygen.policy(),
        )))?;

        Ok(registry)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn router(&self) -> &TaskRouter {
        &self.router
    }

    /// Identity used when a request does not name one.
    pub fn default_identity(&self) -> &str {
        &self.config.default_identity
    }

    pub fn rate_limit_status(&self, identity: &str) -> RateLimitStatus {
        self.rate_limiter.status(identity)
    }
}
