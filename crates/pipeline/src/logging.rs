use anyhow::Result;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

pub const DEFAULT_FILTER: &str = "graphrag=info,pipeline=info,extract=info,ingest=info";

/// `RUST_LOG` wins over the configured filter.
pub fn filter_directives(config: &LoggingConfig) -> String {
    std::env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| config.filter.clone())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(filter_directives(config))?;
    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }
    Ok(())
}
