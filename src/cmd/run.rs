//! `hdh-relay run`: start the relay server.
//!
//! Loads configuration from a file (or the built-in defaults), starts the
//! Axum HTTP server with graceful shutdown, and spawns a background config
//! refresh loop for hot-reloading.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cli::RunArgs;
use crate::config::model::Config;
use crate::config::sources;
use crate::config::validation::validate;
use crate::config::{BuiltinSource, ConfigSource, ConfigVersion, Overrides};
use crate::error::RelayError;
use crate::logging;
use crate::server::{self, AppState, LoadedConfig};

pub async fn execute(args: RunArgs) -> Result<(), RelayError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    #[cfg(feature = "sentry-integration")]
    let _sentry_guard = args
        .sentry_dsn
        .as_ref()
        .map(|dsn| crate::sentry_integration::init(dsn, args.sentry_environment.as_deref()));

    let overrides = Overrides {
        gateway_url: args.gateway_url.clone(),
        direct_timeout: args.timeout,
    };

    let source = resolve_source(args.config.as_deref()).await?;
    let (config, version) = load(source.as_ref(), &overrides).await?;

    let gateway = config.gateway.url.clone();
    let fallback = config.direct.fallback_to_gateway;
    let state = Arc::new(AppState::new(LoadedConfig::new(
        config,
        version,
        source.name(),
    )));

    // Shutdown signal: dropping shutdown_tx closes the channel and stops the refresh loop
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let refresh_state = state.clone();
    let poll_interval = args.poll_interval;
    let refresh_handle = tokio::spawn(async move {
        config_refresh_loop(refresh_state, source, overrides, poll_interval, shutdown_rx).await;
    });

    let router = server::build_router(state, args.max_body, args.serve_gateway);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        gateway = gateway.as_deref().unwrap_or("none"),
        fallback_to_gateway = fallback,
        serve_gateway = args.serve_gateway,
        "hdh-relay started"
    );
    if gateway.is_none() {
        tracing::warn!("no gateway configured, requests for private domains will fail");
    }

    let graceful_shutdown = async move {
        server::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    };

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful_shutdown)
    .await?;

    // Wait for the config refresh task to finish (catches panics)
    if let Err(e) = refresh_handle.await {
        tracing::error!(error = %e, "config refresh task failed");
    }

    tracing::info!("hdh-relay stopped");
    Ok(())
}

/// Load from `source`, then apply and re-validate the overrides.
pub async fn load(
    source: &dyn ConfigSource,
    overrides: &Overrides,
) -> Result<(Config, ConfigVersion), RelayError> {
    let (mut config, version) = source.load().await?;
    overrides.apply(&mut config);
    validate(&config).map_err(|errors| RelayError::ConfigValidation { errors })?;
    Ok((config, version))
}

/// The explicit file, else the first `hdh-relay.*` in the working
/// directory, else the built-in defaults.
pub async fn resolve_source(
    explicit: Option<&Path>,
) -> Result<Box<dyn ConfigSource>, RelayError> {
    if let Some(path) = explicit {
        return create_file_source(path);
    }

    let candidates = [
        "hdh-relay.yaml",
        "hdh-relay.yml",
        "hdh-relay.json",
        "hdh-relay.toml",
    ];

    for name in &candidates {
        let path = PathBuf::from(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(path = %path.display(), "auto-detected config file");
            return create_file_source(&path);
        }
    }

    tracing::info!("no config file found, using built-in defaults");
    Ok(Box::new(BuiltinSource))
}

fn create_file_source(path: &Path) -> Result<Box<dyn ConfigSource>, RelayError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => Ok(Box::new(sources::yaml::new(path.to_path_buf()))),

        #[cfg(feature = "json")]
        "json" => Ok(Box::new(sources::json::new(path.to_path_buf()))),

        #[cfg(feature = "toml")]
        "toml" => Ok(Box::new(sources::toml_source::new(path.to_path_buf()))),

        other => Err(RelayError::UnsupportedFormat(other.to_string())),
    }
}

async fn config_refresh_loop(
    state: Arc<AppState>,
    source: Box<dyn ConfigSource>,
    overrides: Overrides,
    interval_secs: u64,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    interval.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {
                tracing::debug!("config refresh loop shutting down");
                return;
            }
        }

        let current_version = state.config.read().await.version.clone();

        match source.has_changed(&current_version).await {
            Ok(true) => {
                tracing::info!("config change detected, reloading");
                match load(source.as_ref(), &overrides).await {
                    Ok((config, version)) => {
                        if config.direct.max_connections
                            != state.config.read().await.config.direct.max_connections
                        {
                            tracing::warn!(
                                "direct.max_connections changed, restart to apply the new limit"
                            );
                        }
                        let mut loaded = state.config.write().await;
                        loaded.config = Arc::new(config);
                        loaded.version = version;
                        loaded.loaded_at = Instant::now();
                        drop(loaded);
                        state.stats.config_reloads.fetch_add(1, Ordering::Relaxed);
                        tracing::info!("config reloaded");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "config reload failed, keeping current config");
                    }
                }
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, "config change check failed");
            }
        }
    }
}
