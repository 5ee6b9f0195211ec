//! Structured logging setup using the `tracing` ecosystem.
//!
//! Configures a `tracing-subscriber` with either JSON output (for
//! production) or pretty-printed output (for TTY / local dev). Format
//! is auto-detected from the terminal but can be forced via `--json`
//! or `--pretty`. The filter is a plain [`Targets`] list that keeps
//! hyper's connection pool chatter at `warn` unless tracing everything.

use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::LogLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[must_use]
pub fn resolve_format(pretty: bool, json: bool) -> LogFormat {
    if json {
        LogFormat::Json
    } else if pretty || std::io::IsTerminal::is_terminal(&std::io::stdout()) {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    }
}

fn filter(level: &LogLevel) -> Targets {
    let tracing_level = level.to_tracing_level();
    let noisy = if matches!(level, LogLevel::Trace) {
        tracing::Level::TRACE
    } else {
        tracing::Level::WARN
    };
    Targets::new()
        .with_default(tracing_level)
        .with_target("hyper_util", noisy)
        .with_target("rustls", noisy)
}

#[cfg(feature = "sentry-integration")]
fn error_reporting<S>() -> sentry_tracing::SentryLayer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    crate::sentry_integration::layer()
}

#[cfg(not(feature = "sentry-integration"))]
fn error_reporting() -> tracing_subscriber::layer::Identity {
    tracing_subscriber::layer::Identity::new()
}

pub fn init(level: &LogLevel, format: LogFormat) {
    let filter = filter(level);

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(false))
                .with(error_reporting())
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty())
                .with(error_reporting())
                .init();
        }
    }
}

/// For one-shot commands: logs go to stderr so stdout stays clean JSON.
pub fn init_stderr(level: &LogLevel) {
    tracing_subscriber::registry()
        .with(filter(level))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
