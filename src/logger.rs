use anyhow::{anyhow, Context};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry};

pub const DEFAULT_LEVEL: &str = "info";

/// Builds the filter: an explicit level wins, then `RUST_LOG`, then [`DEFAULT_LEVEL`].
pub fn build_filter(level: Option<&str>) -> anyhow::Result<EnvFilter> {
    match level {
        Some(level) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level {:?}", level)),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))),
    }
}

/// Installs the global subscriber. Logs go to stderr so stdout stays free for chat lines.
pub fn init_tracing(level: Option<&str>) -> anyhow::Result<()> {
    let filter = build_filter(level)?;
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .with_target(false);

    Registry::default()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|err| anyhow!("could not install the log subscriber: {}", err))
}
