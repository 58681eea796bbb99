//! Structured logging setup

use tracing_subscriber::EnvFilter;

use crate::{config::Config, error::Result};

/// Initialize JSON tracing output filtered by `service.log_level`
///
/// An unparsable filter falls back to `info`. Calling this twice fails with
/// [`Error::Internal`](crate::error::Error::Internal) because a global
/// subscriber is already installed.
pub fn init_tracing(config: &Config) -> Result<()> {
    let log_level = config.service.log_level.clone();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| crate::error::Error::Internal(format!("Failed to initialize tracing: {e}")))?;

    tracing::info!("Tracing initialized for service: {}", config.service.name);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_with_bad_filter_falls_back() {
        let mut config = Config::default();
        config.service.log_level = "not a [valid filter".to_string();
        // Another test may already own the global subscriber.
        let _ = init_tracing(&config);
    }
}
