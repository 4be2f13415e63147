//! Subscriber setup for binaries embedding the credential service.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Log level filter, overridden by `RUST_LOG`
    pub log_level: String,
    /// Whether to output JSON format
    pub json_output: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "session-credentials".to_string(),
            log_level: "info".to_string(),
            json_output: false,
        }
    }
}

impl TracingConfig {
    /// Level matching the service's debug flag, so diagnostic events are kept.
    pub fn for_credentials(config: &Config) -> Self {
        let level = if config.debug { "debug" } else { "info" };
        Self::default().with_log_level(level)
    }

    /// Override the service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Override the level used when `RUST_LOG` is unset.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Emit one JSON object per event.
    #[must_use]
    pub const fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(config: &TracingConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // Exactly one of the two formatting layers is present.
    tracing_subscriber::registry()
        .with(filter)
        .with(config.json_output.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!config.json_output).then(|| tracing_subscriber::fmt::layer()))
        .try_init()?;

    tracing::info!(service = %config.service_name, "Tracing initialized");
    Ok(())
}
