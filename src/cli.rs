//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, init, validate, health, send), and their associated
//! argument structs. Every server flag has an environment variable
//! equivalent for container deployments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "hdh-relay",
    version,
    about = "Routes clinical messages to a health data hub, directly or through a gateway",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        hdh-relay init                       Create a starter config\n  \
        hdh-relay run                        Start with ./hdh-relay.yaml or defaults\n  \
        hdh-relay run --gateway-url <url>    Route private domains through a gateway"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the relay server
    Run(Box<RunArgs>),

    /// Generate a starter config file
    Init(InitArgs),

    /// Validate a config file without starting
    Validate(ValidateArgs),

    /// Check health of a running instance
    Health(HealthArgs),

    /// Route one message or batch from the command line
    Send(Box<SendArgs>),
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        hdh-relay run                                       Auto-detect config\n  \
        hdh-relay run -c hdh-relay.yaml -p 8080 --pretty    Local dev mode\n  \
        hdh-relay run --serve-gateway                       Also act as a gateway")]
pub struct RunArgs {
    /// Config file path (.yaml, .json, .toml)
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // -- Routing --
    /// Gateway endpoint for private domains (overrides gateway.url)
    #[arg(long, env = "GATEWAY_URL", help_heading = "Routing")]
    pub gateway_url: Option<String>,

    /// Expose POST /gateway so other relays can use this instance as their gateway
    #[arg(long, env = "SERVE_GATEWAY", help_heading = "Routing")]
    pub serve_gateway: bool,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,

    // -- Observability --
    /// Sentry DSN (enables error tracking)
    #[cfg(feature = "sentry-integration")]
    #[arg(long, env = "SENTRY_DSN", help_heading = "Observability")]
    pub sentry_dsn: Option<String>,

    /// Sentry environment tag
    #[cfg(feature = "sentry-integration")]
    #[arg(long, env = "SENTRY_ENVIRONMENT", help_heading = "Observability")]
    pub sentry_environment: Option<String>,

    // -- Tuning --
    /// Direct request timeout in milliseconds (overrides direct.timeout)
    #[arg(long, env = "REQUEST_TIMEOUT_MS", help_heading = "Tuning")]
    pub timeout: Option<u64>,

    /// Max request body size in bytes
    #[arg(
        long,
        env = "MAX_BODY_SIZE",
        default_value_t = 1_048_576,
        help_heading = "Tuning"
    )]
    pub max_body: usize,

    /// Config file poll interval in seconds
    #[arg(
        long,
        env = "POLL_INTERVAL_SECS",
        default_value_t = 30,
        help_heading = "Tuning"
    )]
    pub poll_interval: u64,
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        hdh-relay init                          Minimal config (yaml)\n  \
        hdh-relay init --full                   Every option, documented\n  \
        hdh-relay init -f toml -o relay.toml    TOML format")]
pub struct InitArgs {
    /// Output format
    #[arg(short, long, default_value = "yaml")]
    pub format: ConfigFormat,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Include every option with documentation comments
    #[arg(long)]
    pub full: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Config file to validate
    #[arg(default_value = "hdh-relay.yaml")]
    pub config: PathBuf,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: ValidateFormat,
}

#[derive(Args)]
pub struct HealthArgs {
    /// URL of the running instance
    #[arg(default_value = "http://localhost:3000")]
    pub url: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        hdh-relay send -d https://hub.example.com -u lab -t hl7 -f adt.hl7\n  \
        hdh-relay send -d https://hub.example.com -u lab --batch bundles.json")]
pub struct SendArgs {
    /// Config file path (.yaml, .json, .toml)
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Hub domain, e.g. https://hub.example.com
    #[arg(short, long)]
    pub domain: String,

    /// Hub username
    #[arg(short, long)]
    pub username: String,

    /// Hub password (prompted for when absent)
    #[arg(long, env = "HDH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Message type
    #[arg(short = 't', long = "type", required_unless_present = "batch")]
    pub message_type: Option<String>,

    /// File holding the message content
    #[arg(short, long, required_unless_present = "batch", conflicts_with = "batch")]
    pub file: Option<PathBuf>,

    /// Data source identifier for HL7/CDA messages
    #[arg(long)]
    pub data_source: Option<String>,

    /// JSON file holding an array of transaction payloads
    #[arg(long, conflicts_with = "message_type")]
    pub batch: Option<PathBuf>,

    /// Gateway endpoint for private domains (overrides gateway.url)
    #[arg(long, env = "GATEWAY_URL")]
    pub gateway_url: Option<String>,

    /// Log level (logs go to stderr)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "warn")]
    pub log_level: LogLevel,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Toml => "toml",
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum ValidateFormat {
    Text,
    Json,
}
