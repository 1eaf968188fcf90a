use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Layer, Registry};

use portal_settings::LoggingSettings;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "portal_transport" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl From<&LoggingSettings> for TelemetryConfig {
    fn from(settings: &LoggingSettings) -> Self {
        let module_levels = settings
            .modules
            .iter()
            .filter_map(|(module, level)| Some((module.clone(), level.parse().ok()?)))
            .collect();
        Self {
            log_level: settings.level.parse().unwrap_or(Level::INFO),
            module_levels,
            json: settings.json,
        }
    }
}

impl TelemetryConfig {
    /// Filter directive string, e.g. `info,portal_transport=debug`.
    pub fn directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid filter directive: {0}")]
    InvalidFilter(#[from] tracing_subscriber::filter::ParseError),
    #[error("subscriber already installed: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
    #[error("filter reload failed: {0}")]
    Reload(#[from] reload::Error),
}

/// Handle kept by the application to adjust logging at runtime.
pub struct TelemetryGuard {
    filter: reload::Handle<EnvFilter, Registry>,
}

impl TelemetryGuard {
    /// Replace the active filter, e.g. `"debug"` or `"info,portal_resources=trace"`.
    pub fn set_filter(&self, directives: &str) -> Result<(), TelemetryError> {
        let filter = EnvFilter::try_new(directives)?;
        self.filter.reload(filter)?;
        Ok(())
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.directives())?,
    };
    let (filter, handle) = reload::Layer::new(env_filter);

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .try_init()?;

    Ok(TelemetryGuard { filter: handle })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_include_module_levels() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![("portal_transport".into(), Level::DEBUG)],
            json: false,
        };
        assert_eq!(config.directives(), "warn,portal_transport=debug");
    }

    #[test]
    fn config_from_logging_settings() {
        let settings = LoggingSettings {
            level: "debug".into(),
            json: true,
            modules: [
                ("portal_transport".to_string(), "trace".to_string()),
                ("portal_resources".to_string(), "loud".to_string()),
            ]
            .into(),
        };
        let config = TelemetryConfig::from(&settings);
        assert_eq!(config.log_level, Level::DEBUG);
        assert!(config.json);
        assert_eq!(config.directives(), "debug,portal_transport=trace");
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        let settings = LoggingSettings {
            level: "chatty".into(),
            ..LoggingSettings::default()
        };
        assert_eq!(TelemetryConfig::from(&settings).log_level, Level::INFO);
    }

    #[test]
    fn second_init_is_rejected() {
        let config = TelemetryConfig::default();
        let guard = init_telemetry(&config).unwrap();
        assert!(guard.set_filter("debug").is_ok());
        assert!(guard.set_filter("portal_transport=verbose").is_err());
        assert!(matches!(
            init_telemetry(&config),
            Err(TelemetryError::AlreadyInitialized(_))
        ));
    }
}
