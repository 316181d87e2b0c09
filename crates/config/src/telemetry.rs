use serde::Deserialize;

/// Structured logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// `log` level filter, e.g. `"info"`, `"debug"`, or a per-target
    /// directive string such as `"nexus=debug,info"`. Overridden by
    /// the `RUST_LOG` environment variable when set.
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
