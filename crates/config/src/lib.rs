//! Gateway configuration structures, mapping the TOML configuration file.

#![deny(missing_docs)]

mod headers;
mod health;
mod llm;
mod loader;
mod server;
mod telemetry;
mod tls;

use std::path::Path;

pub use context::ClientIdentity;
pub use headers::{HeaderForward, HeaderInsert, HeaderRemove, HeaderRenameDuplicate, HeaderRule, NameOrPattern, NamePattern};
pub use health::HealthConfig;
pub use llm::{
    ApiModelConfig, ApiProviderConfig, CacheBackendKind, CircuitBreakerConfig, FallbackConfig, FallbackMode, LlmConfig,
    LlmProtocol, LlmProviderConfig, ModelConfig, ModelFilter, PromptCacheConfig, ProviderType, RouterConfig,
    SemanticCacheConfig,
};
use serde::Deserialize;
pub use server::ServerConfig;
pub use telemetry::TelemetryConfig;
pub use tls::TlsServerConfig;

/// Root configuration structure for the gateway.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    pub server: ServerConfig,
    /// LLM gateway configuration settings.
    pub llm: LlmConfig,
    /// Telemetry (structured logging) configuration settings.
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates that the configuration has at least one functional provider.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate_has_downstreams(self)
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use crate::Config;

    #[test]
    fn defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_debug_snapshot!(&config, @r#"
        Config {
            server: ServerConfig {
                listen_address: None,
                tls: None,
                health: HealthConfig {
                    enabled: true,
                    listen: None,
                    path: "/health",
                },
            },
            llm: LlmConfig {
                enabled: true,
                protocols: LlmProtocolsConfig {
                    openai: OpenAIProtocolConfig {
                        enabled: true,
                        path: "/v1",
                    },
                    anthropic: AnthropicProtocolConfig {
                        enabled: true,
                        path: "/v1",
                    },
                    gemini: GeminiProtocolConfig {
                        enabled: true,
                        path: "/v1",
                    },
                },
                providers: {},
                router: None,
                cache: PromptCacheConfig {
                    backend: Memory,
                    redis_url: None,
                    capacity: 10000,
                    enabled: true,
                    semantic_threshold: 0.9,
                    embedding_model: None,
                },
                fallback: FallbackConfig {
                    mode: Sequential,
                    timeout_ms: 30000,
                    max_retries: 2,
                    race_width: 2,
                },
            },
            telemetry: TelemetryConfig {
                log_level: "info",
            },
        }
        "#);
    }
}
