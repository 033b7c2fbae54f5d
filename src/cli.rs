use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;

use crate::error::{Error, Result};

#[derive(Parser)]
#[command(name = "taskgate")]
#[command(about = "Route AI tasks to providers and composite media tools")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one task through the router
    Task {
        /// Task type, e.g. TEXT_GENERATION
        task: String,

        /// Provider or logical service name (OPENAI, GLOBAL_VOICE, ...)
        #[arg(short, long)]
        provider: String,

        #[command(flatten)]
        payload: PayloadArgs,

        /// Caller identity for rate limiting and usage
        #[arg(short, long)]
        identity: Option<String>,

        /// Append the identity's usage summary to the result
        #[arg(long)]
        with_usage: bool,
    },

    /// Invoke a registered tool directly
    Tool {
        /// Tool id, e.g. time-capsule
        tool_id: String,

        /// Vendor override for the tool
        #[arg(short, long)]
        provider: Option<String>,

        #[command(flatten)]
        payload: PayloadArgs,

        #[arg(short, long)]
        identity: Option<String>,
    },

    /// List registered tools
    Tools,

    /// List registered providers
    Providers,

    /// Show the usage summary for an identity
    Usage {
        #[arg(short, long)]
        identity: Option<String>,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

#[derive(Args, Debug, Default)]
pub struct PayloadArgs {
    /// JSON payload, or `-` to read it from stdin
    #[arg(long, conflicts_with = "payload_file")]
    pub payload: Option<String>,

    /// Read the JSON payload from a file
    #[arg(long)]
    pub payload_file: Option<PathBuf>,
}

impl PayloadArgs {
    /// An omitted payload is an empty object.
    pub fn read(&self) -> Result<Value> {
        let raw = match (&self.payload, &self.payload_file) {
            (Some(inline), _) if inline == "-" => {
                let mut buffer = String::new();
                std::io::stdin().read_to_string(&mut buffer)?;
                buffer
            }
            (Some(inline), _) => inline.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)?,
            (None, None) => return Ok(Value::Object(Default::default())),
        };

        serde_json::from_str(&raw)
            .map_err(|e| Error::invalid_input(format!("Payload is not valid JSON: {}", e)))
    }
}
