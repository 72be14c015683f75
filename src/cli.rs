use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "llm-keypool",
    version,
    about = "Multi-provider LLM API key pool with rotation and health checks",
    long_about = "Manages pools of API keys for OpenAI, Anthropic and Gemini: selects a key per request by rotation strategy, tracks usage, cost and health, and dispatches the provider call."
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "KEYPOOL_CONFIG", default_value = "keypool.yaml")]
    pub config: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "KEYPOOL_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration file
    Config {
        /// Configuration file to validate, defaults to --config
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Show detailed validation output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Key management commands
    Keys {
        #[command(subcommand)]
        action: KeyCommands,
    },

    /// Send a prompt through the pool
    Chat {
        /// Prompt text
        prompt: String,

        /// Provider to use, defaults to openai
        #[arg(short, long)]
        provider: Option<String>,

        /// Model name, defaults to the provider's first enabled model
        #[arg(short, long)]
        model: Option<String>,

        #[arg(long)]
        max_tokens: Option<u32>,
    },

    /// Run background health checks until interrupted
    Watch,
}

#[derive(Subcommand, Debug)]
pub enum KeyCommands {
    /// List all configured keys and their status
    List {
        /// Show key previews and limits
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print usage statistics as JSON
    Stats {
        /// Restrict to one provider
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Probe every key once against its provider
    Check {
        /// Restrict to one provider
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Show the rotation state of a provider
    Status {
        provider: String,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
