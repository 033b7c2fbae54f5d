use anyhow::{bail, Context};
use clap::Parser;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};

use taskgate::app::{AppConfig, AppState, Credentials};
use taskgate::cli::{Cli, Commands, ConfigAction};
use taskgate::platform::AppPaths;
use taskgate::routing::TaskRequest;
use taskgate::tools::ToolRequest;
use taskgate::telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(result) => {
            emit(&json!({ "success": true, "result": result }));
            ExitCode::SUCCESS
        }
        Err(err) => {
            let body = match err.downcast_ref::<taskgate::Error>() {
                Some(error) => serde_json::to_value(error.to_body()).unwrap_or(Value::Null),
                None => json!({
                    "message": format!("{:#}", err),
                    "statusCode": 500,
                    "code": "INTERNAL_ERROR",
                }),
            };
            emit(&json!({ "success": false, "error": body }));
            ExitCode::FAILURE
        }
    }
}

fn emit(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", value),
    }
}

/// Explicit `--config` must exist; otherwise the per-user file is used when present.
fn config_file(cli: &Cli, paths: &AppPaths) -> Option<PathBuf> {
    cli.config.clone().or_else(|| {
        let default = paths.config_file();
        default.exists().then_some(default)
    })
}

async fn run(cli: Cli) -> anyhow::Result<Value> {
    let paths = AppPaths::new()?;

    if let Commands::Config {
        action: ConfigAction::Init { force },
    } = &cli.command
    {
        let target = cli.config.clone().unwrap_or_else(|| paths.config_file());
        if target.exists() && !force {
            bail!(
                "Configuration file {} already exists (use --force to overwrite)",
                target.display()
            );
        }
        AppConfig::default().save(&target).await?;
        return Ok(json!({ "path": target.display().to_string() }));
    }

    let file = config_file(&cli, &paths);
    let config = AppConfig::load(file.as_deref()).context("Failed to load configuration")?;
    let _guards = telemetry::init(&config.logging, cli.debug)?;

    info!("Starting taskgate {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &file {
        debug!("Using configuration file {}", path.display());
    }

    let state = AppState::bootstrap(config, Credentials::from_env())?;
    let router = state.router();

    let result = match cli.command {
        Commands::Task {
            task,
            provider,
            payload,
            identity,
            with_usage,
        } => {
            let identity = identity.unwrap_or_else(|| state.default_identity().to_string());
            let request = TaskRequest::new(provider, task, payload.read()?, identity.clone());
            let mut value = serde_json::to_value(router.run_task(request).await?)?;
            if with_usage {
                value["usage"] = serde_json::to_value(router.usage_summary(&identity))?;
                value["rateLimit"] = serde_json::to_value(state.rate_limit_status(&identity))?;
            }
            value
        }
        Commands::Tool {
            tool_id,
            provider,
            payload,
            identity,
        } => {
            let request = ToolRequest {
                tool_id,
                payload: payload.read()?,
                provider,
                identity: identity.unwrap_or_else(|| state.default_identity().to_string()),
            };
            serde_json::to_value(router.run_tool(request).await?)?
        }
        Commands::Tools => serde_json::to_value(router.tools().list())?,
        Commands::Providers => json!(router.providers().list()),
        Commands::Usage { identity } => {
            let identity = identity.unwrap_or_else(|| state.default_identity().to_string());
            serde_json::to_value(router.usage_summary(&identity))?
        }
        Commands::Config {
            action: ConfigAction::Show,
        } => serde_json::to_value(state.config())?,
        Commands::Config {
            action: ConfigAction::Init { .. },
        } => unreachable!("handled before bootstrap"),
    };

    Ok(result)
}
