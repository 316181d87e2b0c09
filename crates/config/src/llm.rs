//! LLM gateway configuration structures for AI model providers, routing, caching and fallback.

use std::{borrow::Cow, collections::BTreeMap, fmt};

use indexmap::IndexMap;
use serde_dynamic_string::DynamicString;

use crate::HeaderRule;
use regex::{Regex, RegexBuilder};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

/// Configuration for an individual model within a provider.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ApiModelConfig {
    /// Optional rename - the actual provider model name.
    /// If not specified, the model ID (map key) is used.
    pub rename: Option<String>,
    /// Header transformation rules for this model.
    pub headers: Vec<HeaderRule>,
}

/// Unified model configuration.
#[derive(Debug, Clone)]
pub enum ModelConfig {
    /// API-based model configuration (OpenAI, Anthropic, Google).
    Api(ApiModelConfig),
}

impl ModelConfig {
    /// Get the optional rename for this model.
    pub fn rename(&self) -> Option<&str> {
        match self {
            Self::Api(config) => config.rename.as_deref(),
        }
    }

    /// Get the headers for this model.
    pub fn headers(&self) -> &[HeaderRule] {
        match self {
            Self::Api(config) => &config.headers,
        }
    }
}

/// Case-insensitive regex filter for matching model identifiers.
#[derive(Clone)]
pub struct ModelFilter {
    regex: Regex,
}

impl ModelFilter {
    /// Create a new validated model filter.
    fn new(pattern: &str) -> Result<Self, String> {
        let trimmed = pattern.trim();

        if trimmed.is_empty() {
            return Err("model_filter cannot be empty".to_string());
        }

        let regex = RegexBuilder::new(trimmed)
            .case_insensitive(true)
            .build()
            .map_err(|err| format!("invalid model_filter regex: {err}"))?;

        Ok(Self { regex })
    }

    /// Return the original pattern string.
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Return the compiled regex.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Check whether the supplied model identifier matches the pattern.
    pub fn is_match(&self, model: &str) -> bool {
        self.regex.is_match(model)
    }
}

impl fmt::Debug for ModelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelFilter").field("pattern", &self.pattern()).finish()
    }
}

impl<'de> Deserialize<'de> for ModelFilter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pattern = Cow::<'de, str>::deserialize(deserializer)?;
        ModelFilter::new(pattern.as_ref()).map_err(serde::de::Error::custom)
    }
}

/// Protocol type for LLM endpoints.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProtocol {
    /// OpenAI protocol (default).
    OpenAI,
    /// Anthropic protocol.
    Anthropic,
    /// Gemini protocol.
    Gemini,
}

impl Default for LlmProtocol {
    fn default() -> Self {
        Self::OpenAI
    }
}

/// OpenAI-dialect endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpenAIProtocolConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for OpenAIProtocolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/v1".to_string(),
        }
    }
}

/// Anthropic-dialect endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnthropicProtocolConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for AnthropicProtocolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/v1".to_string(),
        }
    }
}

/// Gemini-dialect endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeminiProtocolConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for GeminiProtocolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/v1".to_string(),
        }
    }
}

/// Configuration for all LLM dialect endpoints.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct LlmProtocolsConfig {
    /// OpenAI chat-completions endpoint configuration.
    pub openai: OpenAIProtocolConfig,
    /// Anthropic messages endpoint configuration.
    pub anthropic: AnthropicProtocolConfig,
    /// Gemini generateContent endpoint configuration.
    pub gemini: GeminiProtocolConfig,
}

/// Storage backend for the prompt-response cache.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// Process-local, LRU-bounded in-memory cache.
    #[default]
    Memory,
    /// External Redis-backed cache, shared across instances.
    Redis,
}

/// Local semantic-selection cache settings used by the router client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SemanticCacheConfig {
    /// Whether semantic (cosine-similarity) matching is enabled for router selections.
    pub enabled: bool,
    /// Minimum cosine similarity for a semantic cache hit.
    pub threshold: f32,
    /// Maximum number of cached selections to retain.
    pub capacity: usize,
}

impl Default for SemanticCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.95,
            capacity: 10_000,
        }
    }
}

/// Configuration for the external model-selection service.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    /// URL of the model selection service.
    pub url: DynamicString<String>,
    /// Timeout for the selection RPC.
    #[serde(default = "default_router_timeout_ms")]
    pub timeout_ms: u64,
    /// Default cost/quality bias passed to the selection service, 0.0 (cheapest) to 1.0 (best).
    pub cost_bias: Option<f32>,
    /// Local cache of recent selections.
    #[serde(default)]
    pub semantic_cache: SemanticCacheConfig,
}

fn default_router_timeout_ms() -> u64 {
    2_000
}

/// Three-tier prompt-response cache settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PromptCacheConfig {
    /// Storage backend.
    pub backend: CacheBackendKind,
    /// Redis connection URL, required when `backend = "redis"`.
    pub redis_url: Option<DynamicString<String>>,
    /// Maximum number of entries retained by the in-memory backend.
    pub capacity: usize,
    /// Whether the cache is consulted/written at all.
    pub enabled: bool,
    /// Minimum cosine similarity for the `semantic_similar` tier.
    pub semantic_threshold: f32,
    /// Name of the embedding model used for semantic tiers.
    pub embedding_model: Option<String>,
}

impl Default for PromptCacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            redis_url: None,
            capacity: 10_000,
            enabled: true,
            semantic_threshold: 0.9,
            embedding_model: None,
        }
    }
}

/// Fallback executor strategy.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FallbackMode {
    /// Try candidates in order, one at a time.
    #[default]
    Sequential,
    /// Try several candidates concurrently, first success wins.
    Race,
    /// Only ever attempt the router's primary candidate.
    PrimaryOnly,
}

/// Fallback executor configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FallbackConfig {
    /// Execution strategy.
    pub mode: FallbackMode,
    /// Per-attempt timeout.
    pub timeout_ms: u64,
    /// Maximum number of candidates to try (sequential mode).
    pub max_retries: u32,
    /// Maximum number of concurrent attempts (race mode).
    pub race_width: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            mode: FallbackMode::Sequential,
            timeout_ms: 30_000,
            max_retries: 2,
            race_width: 2,
        }
    }
}

/// Circuit breaker parameters for a single provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures required to open the breaker.
    pub failure_threshold: u32,
    /// Consecutive successes required to close a half-open breaker.
    pub success_threshold: u32,
    /// Time an open breaker waits before probing again.
    pub reset_after_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_after_ms: 30_000,
        }
    }
}

/// Top-level LLM gateway configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    /// Whether the LLM gateway is enabled.
    enabled: bool,

    /// Dialect-specific endpoint configurations.
    pub protocols: LlmProtocolsConfig,

    /// Map of configured upstream providers, keyed by provider name.
    pub providers: IndexMap<String, LlmProviderConfig>,

    /// External model selection service. `None` disables routing; requests
    /// must then name a concrete `provider/model`.
    pub router: Option<RouterConfig>,

    /// Prompt-response cache configuration.
    pub cache: PromptCacheConfig,

    /// Fallback executor configuration.
    pub fallback: FallbackConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            protocols: LlmProtocolsConfig::default(),
            providers: IndexMap::new(),
            router: None,
            cache: PromptCacheConfig::default(),
            fallback: FallbackConfig::default(),
        }
    }
}

impl LlmConfig {
    /// Whether the LLM gateway is enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether there are any LLM providers configured.
    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Whether there are any protocol endpoints enabled.
    pub fn has_protocol_endpoints(&self) -> bool {
        self.protocols.openai.enabled || self.protocols.anthropic.enabled || self.protocols.gemini.enabled
    }
}

/// Provider type enumeration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderType {
    /// OpenAI provider.
    Openai,
    /// Anthropic provider.
    Anthropic,
    /// Google provider.
    Google,
}

/// Configuration for an upstream provider.
#[derive(Debug, Clone)]
pub struct ApiProviderConfig {
    /// API key for authentication.
    pub api_key: Option<SecretString>,

    /// Custom base URL for the provider API.
    pub base_url: Option<String>,

    /// Enable token forwarding from user requests (BYOK).
    pub forward_token: bool,

    /// Regular expression filter for automatically routing models to this provider.
    pub model_filter: Option<ModelFilter>,

    /// Explicitly configured models for this provider.
    pub models: BTreeMap<String, ApiModelConfig>,

    /// Header transformation rules applied to every request to this provider.
    pub headers: Vec<HeaderRule>,

    /// Requests-per-minute budget enforced by the circuit breaker layer; `None` disables it.
    pub rate_limit_rpm: Option<u32>,

    /// Authentication scheme used when calling this provider: `bearer`, `api_key`, `basic`, or `custom`.
    pub auth_type: Option<String>,

    /// Header name used to carry the credential when `auth_type = "custom"`.
    pub auth_header_name: Option<String>,

    /// Per-request timeout override for this provider.
    pub timeout_ms: Option<u64>,

    /// Circuit breaker parameters; defaults apply when omitted.
    pub circuit_breaker: CircuitBreakerConfig,
}

impl<'de> Deserialize<'de> for ApiProviderConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "snake_case", deny_unknown_fields)]
        struct ApiProviderConfigSerde {
            #[serde(default)]
            api_key: Option<SecretString>,
            #[serde(default)]
            base_url: Option<String>,
            #[serde(default)]
            forward_token: bool,
            #[serde(default)]
            model_filter: Option<ModelFilter>,
            #[serde(default)]
            models: BTreeMap<String, ApiModelConfig>,
            #[serde(default)]
            headers: Vec<HeaderRule>,
            #[serde(default)]
            rate_limit_rpm: Option<u32>,
            #[serde(default)]
            auth_type: Option<String>,
            #[serde(default)]
            auth_header_name: Option<String>,
            #[serde(default)]
            timeout_ms: Option<u64>,
            #[serde(default)]
            circuit_breaker: CircuitBreakerConfig,
        }

        let raw = ApiProviderConfigSerde::deserialize(deserializer)?;

        Ok(Self {
            api_key: raw.api_key,
            base_url: raw.base_url,
            forward_token: raw.forward_token,
            model_filter: raw.model_filter,
            models: raw.models,
            headers: raw.headers,
            rate_limit_rpm: raw.rate_limit_rpm,
            auth_type: raw.auth_type,
            auth_header_name: raw.auth_header_name,
            timeout_ms: raw.timeout_ms,
            circuit_breaker: raw.circuit_breaker,
        })
    }
}

/// Complete LLM provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum LlmProviderConfig {
    /// OpenAI provider configuration.
    Openai(ApiProviderConfig),

    /// Anthropic provider configuration.
    Anthropic(ApiProviderConfig),

    /// Google provider configuration.
    Google(ApiProviderConfig),
}

impl LlmProviderConfig {
    /// Get the provider type for this configuration.
    pub fn provider_type(&self) -> ProviderType {
        match self {
            Self::Openai(_) => ProviderType::Openai,
            Self::Anthropic(_) => ProviderType::Anthropic,
            Self::Google(_) => ProviderType::Google,
        }
    }

    /// Get the inner provider configuration.
    pub fn inner(&self) -> &ApiProviderConfig {
        match self {
            Self::Openai(config) | Self::Anthropic(config) | Self::Google(config) => config,
        }
    }

    /// Get the API key.
    pub fn api_key(&self) -> Option<&SecretString> {
        self.inner().api_key.as_ref()
    }

    /// Get the base URL, if overridden.
    pub fn base_url(&self) -> Option<&str> {
        self.inner().base_url.as_deref()
    }

    /// Get the configured model filter for this provider, if any.
    pub fn model_filter(&self) -> Option<&ModelFilter> {
        self.inner().model_filter.as_ref()
    }

    /// Check if token forwarding is enabled.
    pub fn forward_token(&self) -> bool {
        self.inner().forward_token
    }

    /// Get the configured models for this provider as unified `ModelConfig`.
    pub fn models(&self) -> BTreeMap<String, ModelConfig> {
        self.inner()
            .models
            .iter()
            .map(|(k, v)| (k.clone(), ModelConfig::Api(v.clone())))
            .collect()
    }

    /// Requests-per-minute budget for this provider, if configured.
    pub fn rate_limit_rpm(&self) -> Option<u32> {
        self.inner().rate_limit_rpm
    }

    /// Circuit breaker parameters for this provider.
    pub fn circuit_breaker(&self) -> &CircuitBreakerConfig {
        &self.inner().circuit_breaker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use insta::assert_debug_snapshot;

    #[test]
    fn llm_config_defaults() {
        let config: LlmConfig = toml::from_str("").unwrap();

        assert_debug_snapshot!(&config, @r#"
        LlmConfig {
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
        }
        "#);
    }

    #[test]
    fn llm_config_with_openai() {
        let config = indoc! {r#"
            [protocols.openai]
            enabled = true
            path = "/llm"

            [providers.openai]
            type = "openai"
            api_key = "sk-test"

            [providers.openai.models.gpt-4]

            [providers.openai.models.gpt-3-5-turbo]
        "#};

        let config: LlmConfig = toml::from_str(config).unwrap();

        assert_debug_snapshot!(&config, @r#"
        LlmConfig {
            enabled: true,
            protocols: LlmProtocolsConfig {
                openai: OpenAIProtocolConfig {
                    enabled: true,
                    path: "/llm",
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
            providers: {
                "openai": Openai(
                    ApiProviderConfig {
                        api_key: Some(
                            SecretBox<str>([REDACTED]),
                        ),
                        base_url: None,
                        forward_token: false,
                        model_filter: None,
                        models: {
                            "gpt-3-5-turbo": ApiModelConfig {
                                rename: None,
                                headers: [],
                            },
                            "gpt-4": ApiModelConfig {
                                rename: None,
                                headers: [],
                            },
                        },
                        headers: [],
                        rate_limit_rpm: None,
                        auth_type: None,
                        auth_header_name: None,
                        timeout_ms: None,
                        circuit_breaker: CircuitBreakerConfig {
                            failure_threshold: 5,
                            success_threshold: 2,
                            reset_after_ms: 30000,
                        },
                    },
                ),
            },
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
        }
        "#);
    }

    #[test]
    fn llm_config_rejects_empty_model_filter() {
        let config = indoc! {r#"
            [providers.openai]
            type = "openai"
            model_filter = ""
        "#};

        let err = toml::from_str::<LlmConfig>(config).unwrap_err();
        assert!(err.to_string().contains("model_filter cannot be empty"));
    }

    #[test]
    fn llm_config_rejects_invalid_regex_model_filter() {
        let config = indoc! {r#"
            [providers.openai]
            type = "openai"
            model_filter = "gpt-4("
        "#};

        let err = toml::from_str::<LlmConfig>(config).unwrap_err();
        assert!(err.to_string().contains("invalid model_filter regex"));
    }

    #[test]
    fn llm_config_invalid_provider_type() {
        let config = indoc! {r#"
            [providers.foo]
            type = "bedrock"
        "#};

        assert!(toml::from_str::<LlmConfig>(config).is_err());
    }

    #[test]
    fn llm_config_with_router_and_cache() {
        let config = indoc! {r#"
            [router]
            url = "http://localhost:8790/select"
            cost_bias = 0.3

            [cache]
            backend = "redis"
            redis_url = "redis://localhost:6379"
            semantic_threshold = 0.92

            [fallback]
            mode = "race"
            race_width = 3
        "#};

        let config: LlmConfig = toml::from_str(config).unwrap();

        assert!(config.router.is_some());
        assert_eq!(config.cache.backend, CacheBackendKind::Redis);
        assert_eq!(config.fallback.mode, FallbackMode::Race);
        assert_eq!(config.fallback.race_width, 3);
    }

    #[test]
    fn provider_rate_limit_and_circuit_breaker() {
        let config = indoc! {r#"
            [providers.openai]
            type = "openai"
            rate_limit_rpm = 600

            [providers.openai.circuit_breaker]
            failure_threshold = 3
            reset_after_ms = 10000
        "#};

        let config: LlmConfig = toml::from_str(config).unwrap();
        let provider = &config.providers["openai"];

        assert_eq!(provider.rate_limit_rpm(), Some(600));
        assert_eq!(provider.circuit_breaker().failure_threshold, 3);
        assert_eq!(provider.circuit_breaker().reset_after_ms, 10_000);
    }
}
