//! Tracing initialization for embedders.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing with an env-filter.
///
/// `ENSEMBLE_LOG` overrides the configured level, falling back to the
/// given default (typically from `ensembleconf`).
pub fn init(default_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_env("ENSEMBLE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
