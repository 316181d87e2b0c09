//! Orchestration pipeline: wires the model router, prompt-response cache,
//! circuit breaker registry, and fallback executor together behind the
//! single entry point the dialect handlers call.

use std::{collections::HashMap, sync::Arc, time::Instant};

use config::{CircuitBreakerConfig, Config, FallbackConfig, FallbackMode, LlmProviderConfig};

use crate::{
    breaker::BreakerRegistry,
    cache::PromptCache,
    error::LlmError,
    fallback::{FallbackExecutor, ProviderLookup},
    fingerprint,
    messages::{
        openai::{ModelsResponse, ObjectType},
        unified::{UnifiedFallbackConfig, UnifiedRequest, UnifiedResponse},
    },
    provider::{
        ChatCompletionStream, Provider,
        anthropic::AnthropicProvider,
        google::GoogleProvider,
        openai::OpenAIProvider,
    },
    request::RequestContext,
    router::{
        Candidates, RouterClient,
        embedder::{Embedder, HashingEmbedder},
    },
    usage::{self, LoggingUsageSink, UsageRecord, UsageSink},
};

struct ProviderEntry {
    provider: Arc<dyn Provider>,
    breaker_config: CircuitBreakerConfig,
}

struct ProviderRegistry {
    entries: HashMap<String, ProviderEntry>,
}

impl ProviderLookup for ProviderRegistry {
    fn get(&self, provider: &str) -> Option<(Arc<dyn Provider>, CircuitBreakerConfig)> {
        self.entries.get(provider).map(|entry| (entry.provider.clone(), entry.breaker_config.clone()))
    }
}

/// Result of a direct router query, as returned from `/v1/select-model`.
pub(crate) struct Selection {
    pub provider: String,
    pub model: String,
    pub alternatives: Vec<crate::router::Candidate>,
    pub cache_tier: Option<String>,
}

/// Ties every pipeline stage together for a single configured gateway
/// instance. Built once at startup from `config.llm`.
pub(crate) struct LlmPipeline {
    providers: ProviderRegistry,
    router: Option<RouterClient>,
    router_breaker_config: CircuitBreakerConfig,
    cache: PromptCache,
    breaker: BreakerRegistry,
    embedder: Arc<dyn Embedder>,
    usage_sink: Arc<dyn UsageSink>,
    fallback_config: FallbackConfig,
}

impl LlmPipeline {
    pub(crate) fn new(config: &Config) -> anyhow::Result<Self> {
        let llm = &config.llm;
        let mut entries = HashMap::new();

        for (name, provider_config) in &llm.providers {
            let inner = provider_config.inner().clone();
            let breaker_config = provider_config.circuit_breaker().clone();

            let provider: Arc<dyn Provider> = match provider_config {
                LlmProviderConfig::Openai(_) => Arc::new(OpenAIProvider::new(name.clone(), inner)?),
                LlmProviderConfig::Anthropic(_) => Arc::new(AnthropicProvider::new(name.clone(), inner)?),
                LlmProviderConfig::Google(_) => Arc::new(GoogleProvider::new(name.clone(), inner)?),
            };

            entries.insert(name.clone(), ProviderEntry { provider, breaker_config });
        }

        Ok(Self {
            providers: ProviderRegistry { entries },
            router: llm.router.as_ref().map(RouterClient::new),
            router_breaker_config: CircuitBreakerConfig::default(),
            cache: PromptCache::new(&llm.cache),
            breaker: BreakerRegistry::new(),
            embedder: Arc::new(HashingEmbedder::default()),
            usage_sink: Arc::new(LoggingUsageSink),
            fallback_config: llm.fallback.clone(),
        })
    }

    /// Resolve provider/model candidates for `request` without executing it.
    async fn select(&self, request: &UnifiedRequest, context: &RequestContext) -> crate::Result<Candidates> {
        match &self.router {
            Some(router) => router.select(request, context, &self.breaker, &self.router_breaker_config).await,
            None => explicit_candidate(request),
        }
    }

    fn cache_disabled(request: &UnifiedRequest) -> bool {
        request.cache_config.as_ref().is_some_and(|c| c.disabled)
    }

    fn effective_fallback_config(&self, request: &UnifiedRequest) -> FallbackConfig {
        effective_fallback_config(&self.fallback_config, request.fallback_config.as_ref())
    }

    /// Run a non-streaming completion, consulting the prompt cache first and
    /// recording usage once it settles.
    pub(crate) async fn completions(
        &self,
        request: UnifiedRequest,
        context: &RequestContext,
        endpoint: &str,
    ) -> crate::Result<UnifiedResponse> {
        let started = Instant::now();
        let fp = fingerprint::of_request(&request);
        let cache_enabled = !Self::cache_disabled(&request);

        let embedding = if cache_enabled {
            self.embedder.embed(&crate::router::last_user_prompt(&request)).await.ok()
        } else {
            None
        };

        if cache_enabled
            && let Some(hit) = self.cache.lookup(&fp, embedding.as_deref())
        {
            let mut response = hit.response;
            response.usage.cache_tier = Some(hit.tier.to_string());
            return Ok(response);
        }

        let candidates = match self.select(&request, context).await {
            Ok(candidates) => candidates,
            Err(error) => {
                self.record_usage_error(context, endpoint, &request.model, &error, started);
                return Err(error);
            }
        };
        let fallback_config = self.effective_fallback_config(&request);
        let executor = FallbackExecutor::new(&self.providers, &self.breaker);

        let outcome = executor.complete(&candidates, &request, context, &fallback_config).await;

        match outcome {
            Ok((response, winner)) => {
                if cache_enabled {
                    self.cache.store(fp, response.clone(), embedding);
                }

                self.record_usage(context, endpoint, &winner.provider, &winner.model, &response.usage, 200, None, started);

                Ok(response)
            }
            Err(error) => {
                self.record_usage_error(context, endpoint, &request.model, &error, started);
                Err(error)
            }
        }
    }

    /// Run a streaming completion. Streamed responses are never read from or
    /// written to the prompt cache.
    pub(crate) async fn completions_stream(
        &self,
        request: UnifiedRequest,
        context: &RequestContext,
        endpoint: &str,
    ) -> crate::Result<ChatCompletionStream> {
        let started = Instant::now();
        let candidates = match self.select(&request, context).await {
            Ok(candidates) => candidates,
            Err(error) => {
                self.record_usage_error(context, endpoint, &request.model, &error, started);
                return Err(error);
            }
        };
        let fallback_config = self.effective_fallback_config(&request);
        let executor = FallbackExecutor::new(&self.providers, &self.breaker);

        match executor.stream(&candidates, &request, context, &fallback_config).await {
            Ok((stream, winner)) => {
                self.record_usage(
                    context,
                    endpoint,
                    &winner.provider,
                    &winner.model,
                    &crate::messages::unified::UnifiedUsage {
                        prompt_tokens: 0,
                        completion_tokens: 0,
                        total_tokens: 0,
                        cache_tier: None,
                    },
                    200,
                    None,
                    started,
                );
                Ok(stream)
            }
            Err(error) => {
                self.record_usage_error(context, endpoint, &request.model, &error, started);
                Err(error)
            }
        }
    }

    /// Resolve provider/model candidates for `request` and report whether a
    /// prompt-cache hit already exists for it, without executing the call.
    pub(crate) async fn select_model(&self, request: &UnifiedRequest, context: &RequestContext) -> crate::Result<Selection> {
        let candidates = self.select(request, context).await?;

        let cache_tier = if Self::cache_disabled(request) {
            None
        } else {
            let fp = fingerprint::of_request(request);
            let embedding = self.embedder.embed(&crate::router::last_user_prompt(request)).await.ok();
            self.cache.lookup(&fp, embedding.as_deref()).map(|hit| hit.tier.to_string())
        };

        Ok(Selection {
            provider: candidates.primary.provider.clone(),
            model: candidates.primary.model.clone(),
            alternatives: candidates.alternatives,
            cache_tier,
        })
    }

    /// List every model known across configured providers (live discovery
    /// plus configured aliases), merged into one response.
    pub(crate) async fn models(&self) -> ModelsResponse {
        let mut data = Vec::new();

        for entry in self.providers.entries.values() {
            match entry.provider.list_models().await {
                Ok(models) => data.extend(models),
                Err(error) => log::warn!("failed to list models for provider '{}': {error}", entry.provider.name()),
            }
        }

        ModelsResponse {
            object: ObjectType::List,
            data,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record_usage(
        &self,
        context: &RequestContext,
        endpoint: &str,
        provider: &str,
        model: &str,
        usage: &crate::messages::unified::UnifiedUsage,
        status_code: u16,
        error_message: Option<String>,
        started: Instant,
    ) {
        usage::emit(
            self.usage_sink.clone(),
            UsageRecord {
                api_key_id: context.client_identity.as_ref().map(|identity| identity.client_id.clone()),
                endpoint: endpoint.to_string(),
                provider: provider.to_string(),
                model: model.to_string(),
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
                status_code,
                latency_ms: started.elapsed().as_millis() as u64,
                error_message,
                request_id: context.request_id.clone(),
            },
        );
    }

    fn record_usage_error(&self, context: &RequestContext, endpoint: &str, model: &str, error: &LlmError, started: Instant) {
        let (provider, model) = model.split_once('/').unwrap_or(("unknown", model));

        self.record_usage(
            context,
            endpoint,
            provider,
            model,
            &crate::messages::unified::UnifiedUsage {
                prompt_tokens: 0,
                completion_tokens: 0,
                total_tokens: 0,
                cache_tier: None,
            },
            error.status_code().as_u16(),
            Some(error.client_message()),
            started,
        );
    }
}

fn explicit_candidate(request: &UnifiedRequest) -> crate::Result<Candidates> {
    match request.model.split_once('/') {
        Some((provider, model)) => Ok(Candidates::single(provider, model)),
        None => Err(LlmError::NoCandidate(format!(
            "no model router is configured and '{}' is not an explicit provider/model",
            request.model
        ))),
    }
}

fn effective_fallback_config(base: &FallbackConfig, overrides: Option<&UnifiedFallbackConfig>) -> FallbackConfig {
    let mut config = base.clone();

    let Some(overrides) = overrides else {
        return config;
    };

    if let Some(mode) = overrides.mode.as_deref() {
        config.mode = match mode {
            "sequential" => FallbackMode::Sequential,
            "race" => FallbackMode::Race,
            "" => FallbackMode::PrimaryOnly,
            _ => config.mode,
        };
    }

    if let Some(timeout_ms) = overrides.timeout_ms {
        config.timeout_ms = timeout_ms;
    }

    if let Some(max_retries) = overrides.max_retries {
        config.max_retries = max_retries;
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_override_empty_mode_means_primary_only() {
        let base = FallbackConfig {
            mode: FallbackMode::Sequential,
            timeout_ms: 1_000,
            max_retries: 2,
            race_width: 2,
        };
        let overrides = UnifiedFallbackConfig {
            mode: Some(String::new()),
            timeout_ms: None,
            max_retries: None,
        };

        let effective = effective_fallback_config(&base, Some(&overrides));
        assert_eq!(effective.mode, FallbackMode::PrimaryOnly);
        assert_eq!(effective.timeout_ms, 1_000);
    }

    #[test]
    fn no_override_keeps_base_config() {
        let base = FallbackConfig {
            mode: FallbackMode::Race,
            timeout_ms: 5_000,
            max_retries: 1,
            race_width: 3,
        };

        let effective = effective_fallback_config(&base, None);
        assert_eq!(effective.mode, FallbackMode::Race);
        assert_eq!(effective.max_retries, 1);
    }
}
