//! Tracing setup.

use cairn_config::LoggingConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::error::{MemoryError, Result};

/// Build the filter: `RUST_LOG` when set, otherwise the configured directives.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.filter)
        .map_err(|e| MemoryError::InvalidData(format!("log filter {:?}: {}", config.filter, e)))
}

/// Install the global tracing subscriber.
///
/// Emits human-readable lines, or JSON lines when `config.json` is set.
/// Fails instead of panicking if a subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;

    let human = (!config.json).then(|| tracing_subscriber::fmt::layer().with_target(true));
    let json = config
        .json
        .then(|| tracing_subscriber::fmt::layer().json().with_target(true));

    tracing_subscriber::registry()
        .with(filter)
        .with(human)
        .with(json)
        .try_init()
        .map_err(|e| MemoryError::InvalidData(format!("tracing already initialized: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_filter_is_rejected() {
        let config = LoggingConfig {
            filter: "cairn_memory=notalevel".to_string(),
            json: false,
        };
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(env_filter(&config).is_err());
        }
    }

    #[test]
    fn test_second_init_fails_without_panicking() {
        let config = LoggingConfig::default();
        // The first call may also fail if another test installed a subscriber.
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
