use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// `RUST_LOG` wins over the configured level; an unparsable level falls back
/// to `info`.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")))
}

/// Install the global subscriber. Logs go to stderr unless `file` is set, so
/// report output on stdout stays clean.
pub fn init_tracing(cfg: &LoggingConfig) -> Result<()> {
    let filter = env_filter(&cfg.level);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match (&cfg.file, cfg.json) {
        (Some(path), json) => {
            let log_file = std::fs::File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            let builder = builder.with_writer(Mutex::new(log_file)).with_ansi(false);
            if json {
                builder.json().try_init()
            } else {
                builder.try_init()
            }
        }
        (None, true) => builder.with_writer(std::io::stderr).json().try_init(),
        (None, false) => builder.with_writer(std::io::stderr).try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}
