//! Logging bootstrap for the GHGP service.
//!
//! Installs a `tracing` registry with an `EnvFilter`-driven stdout layer and,
//! when enabled, daily-rolling JSON files for the `errors` and `requests`
//! targets.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingSettings;

pub const ERRORS_TARGET: &str = "errors";
pub const REQUESTS_TARGET: &str = "requests";
pub const SNAPSHOT_TARGET: &str = "snapshot";

/// Fallback directive when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVE: &str = "info";

pub fn init_tracing(settings: &LoggingSettings) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(env_filter);

    let registry = tracing_subscriber::registry().with(stdout_layer);

    if settings.json_files {
        std::fs::create_dir_all(&settings.log_dir)?;

        let errors_appender = tracing_appender::rolling::daily(&settings.log_dir, "errors.jsonl");
        let requests_appender =
            tracing_appender::rolling::daily(&settings.log_dir, "requests.jsonl");

        let errors_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(errors_appender)
            .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
                metadata.target() == ERRORS_TARGET
            }));

        let requests_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(requests_appender)
            .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
                metadata.target() == REQUESTS_TARGET
            }));

        registry.with(errors_layer).with(requests_layer).try_init()?;
    } else {
        registry.try_init()?;
    }

    Ok(())
}
