//! hdh-relay routes clinical messages to a health data hub.
//!
//! A message (JSON transaction, HL7 or CDA) or a batch of transactions is
//! posted to the hub either directly or, when the hub domain is only
//! reachable from inside its private network, through a gateway that
//! performs the same direct call on the relay's behalf.
//!
//! # Architecture
//!
//! - [`api`] -- `POST /api/process-message`, `POST /api/proxy` and the
//!   optional `POST /gateway` handlers.
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, init, validate,
//!   health, send).
//! - [`config`] -- Configuration loading, validation, and hot-reloading via the
//!   [`ConfigSource`](config::ConfigSource) trait.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /health` endpoint handler returning runtime diagnostics.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`relay`] -- Domain classification, payload shaping, the outbound
//!   transport and the dual-transport dispatcher.
//! - [`server`] -- Axum server setup, shared application state, HTTP client, and
//!   graceful shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |
//! | `toml` | TOML config file support |
//! | `sentry-integration` | Sentry error tracking |
//! | `file-backends` | All file format backends |
//! | `full` | All features |

// Public functions are only consumed by the binary and the integration tests.
#![allow(clippy::missing_errors_doc)]

pub mod api;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod relay;
pub mod server;

#[cfg(feature = "sentry-integration")]
pub mod sentry_integration;
