//! Fallback executor: drives the candidate list from the router past the
//! configured provider adapters, gated by the circuit breaker, in either
//! sequential or race mode.

use std::{sync::Arc, time::Duration};

use config::{CircuitBreakerConfig, FallbackConfig, FallbackMode};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::{
    breaker::BreakerRegistry,
    error::LlmError,
    messages::unified::{UnifiedRequest, UnifiedResponse},
    provider::{ChatCompletionStream, Provider},
    request::RequestContext,
    router::{Candidate, Candidates},
};

/// Looks up the configured `Provider` and its breaker id/config for a
/// candidate's provider name. Kept abstract so the executor doesn't need to
/// know about the provider registry's concrete shape.
pub(crate) trait ProviderLookup: Send + Sync {
    fn get(&self, provider: &str) -> Option<(Arc<dyn Provider>, CircuitBreakerConfig)>;
}

pub(crate) struct FallbackExecutor<'a> {
    pub providers: &'a dyn ProviderLookup,
    pub breaker: &'a BreakerRegistry,
}

impl<'a> FallbackExecutor<'a> {
    pub(crate) fn new(providers: &'a dyn ProviderLookup, breaker: &'a BreakerRegistry) -> Self {
        Self { providers, breaker }
    }

    /// Run a non-streaming completion across `candidates` per `config`.
    pub(crate) async fn complete(
        &self,
        candidates: &Candidates,
        request: &UnifiedRequest,
        context: &RequestContext,
        config: &FallbackConfig,
    ) -> crate::Result<(UnifiedResponse, Candidate)> {
        match config.mode {
            FallbackMode::PrimaryOnly => self.attempt_one(&candidates.primary, request, context, config).await,
            FallbackMode::Sequential => self.sequential(candidates, request, context, config).await,
            FallbackMode::Race => self.race(candidates, request, context, config).await,
        }
    }

    /// Run a streaming completion across `candidates`. Sequential mode
    /// commits to the first candidate whose stream call succeeds (first
    /// byte received); race mode commits to the first candidate whose call
    /// succeeds at all, cancelling the others before any of their frames are
    /// read by the caller.
    pub(crate) async fn stream(
        &self,
        candidates: &Candidates,
        request: &UnifiedRequest,
        context: &RequestContext,
        config: &FallbackConfig,
    ) -> crate::Result<(ChatCompletionStream, Candidate)> {
        match config.mode {
            FallbackMode::PrimaryOnly => self.attempt_stream_one(&candidates.primary, request, context, config).await,
            FallbackMode::Sequential => self.sequential_stream(candidates, request, context, config).await,
            FallbackMode::Race => self.race_stream(candidates, request, context, config).await,
        }
    }

    async fn sequential(
        &self,
        candidates: &Candidates,
        request: &UnifiedRequest,
        context: &RequestContext,
        config: &FallbackConfig,
    ) -> crate::Result<(UnifiedResponse, Candidate)> {
        let attempts = 1 + config.max_retries as usize;
        let mut last_error = None;

        for candidate in candidates.iter().take(attempts.max(1)) {
            match self.attempt_one(candidate, request, context, config).await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    let retryable = error.retryable();
                    last_error = Some(error);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::NoCandidate("no candidates available".to_string())))
    }

    async fn race(
        &self,
        candidates: &Candidates,
        request: &UnifiedRequest,
        context: &RequestContext,
        config: &FallbackConfig,
    ) -> crate::Result<(UnifiedResponse, Candidate)> {
        let width = config.race_width.max(1) as usize;
        let cancel = CancellationToken::new();

        let mut tasks = Vec::new();
        for candidate in candidates.iter().take(width) {
            let candidate = candidate.clone();
            let request = request.clone();
            let cancel = cancel.child_token();

            if let Some((provider, breaker_config)) = self.providers.get(&candidate.provider) {
                let candidate_for_call = candidate.clone();
                let candidate_for_result = candidate.clone();
                tasks.push(async move {
                    let fut = self.call_with_breaker(&candidate_for_call, provider, breaker_config, request, context, config);
                    let result = tokio::select! {
                        _ = cancel.cancelled() => Err(LlmError::InternalError(None)),
                        result = fut => result,
                    };
                    (candidate_for_result, result)
                });
            }
        }

        if tasks.is_empty() {
            return Err(LlmError::NoCandidate("no configured provider among candidates".to_string()));
        }

        let mut futures: futures::stream::FuturesUnordered<_> = tasks.into_iter().collect();
        let mut last_error = None;

        use futures::StreamExt;
        while let Some((candidate, result)) = futures.next().await {
            match result {
                Ok(response) => {
                    cancel.cancel();
                    return Ok((response, candidate));
                }
                Err(error) => last_error = Some(error),
            }
        }

        cancel.cancel();
        Err(last_error.unwrap_or_else(|| LlmError::NoCandidate("all race candidates failed".to_string())))
    }

    async fn attempt_one(
        &self,
        candidate: &Candidate,
        request: &UnifiedRequest,
        context: &RequestContext,
        config: &FallbackConfig,
    ) -> crate::Result<(UnifiedResponse, Candidate)> {
        let Some((provider, breaker_config)) = self.providers.get(&candidate.provider) else {
            return Err(LlmError::ProviderNotFound(candidate.provider.clone()));
        };

        let mut request = request.clone();
        request.model = candidate.model.clone();

        self.breaker.allow(&candidate.provider, &breaker_config)?;

        let call = provider.chat_completion(request, context);
        let result = timeout(Duration::from_millis(config.timeout_ms), call).await;

        match result {
            Ok(Ok(response)) => {
                self.breaker.on_success(&candidate.provider, &breaker_config);
                Ok((response, candidate.clone()))
            }
            Ok(Err(error)) => {
                if error.triggers_breaker() {
                    self.breaker.on_failure(&candidate.provider, &breaker_config);
                }
                Err(error)
            }
            Err(_) => {
                let error = LlmError::Timeout {
                    provider: candidate.provider.clone(),
                };
                self.breaker.on_failure(&candidate.provider, &breaker_config);
                Err(error)
            }
        }
    }

    async fn call_with_breaker(
        &self,
        candidate: &Candidate,
        provider: Arc<dyn Provider>,
        breaker_config: CircuitBreakerConfig,
        mut request: UnifiedRequest,
        context: &RequestContext,
        config: &FallbackConfig,
    ) -> crate::Result<UnifiedResponse> {
        self.breaker.allow(&candidate.provider, &breaker_config)?;
        request.model = candidate.model.clone();

        let call = provider.chat_completion(request, context);
        match timeout(Duration::from_millis(config.timeout_ms), call).await {
            Ok(Ok(response)) => {
                self.breaker.on_success(&candidate.provider, &breaker_config);
                Ok(response)
            }
            Ok(Err(error)) => {
                if error.triggers_breaker() {
                    self.breaker.on_failure(&candidate.provider, &breaker_config);
                }
                Err(error)
            }
            Err(_) => {
                let error = LlmError::Timeout {
                    provider: candidate.provider.clone(),
                };
                self.breaker.on_failure(&candidate.provider, &breaker_config);
                Err(error)
            }
        }
    }

    async fn attempt_stream_one(
        &self,
        candidate: &Candidate,
        request: &UnifiedRequest,
        context: &RequestContext,
        config: &FallbackConfig,
    ) -> crate::Result<(ChatCompletionStream, Candidate)> {
        let Some((provider, breaker_config)) = self.providers.get(&candidate.provider) else {
            return Err(LlmError::ProviderNotFound(candidate.provider.clone()));
        };

        let mut request = request.clone();
        request.model = candidate.model.clone();

        self.breaker.allow(&candidate.provider, &breaker_config)?;

        let call = provider.chat_completion_stream(request, context);
        let result = timeout(Duration::from_millis(config.timeout_ms), call).await;

        match result {
            Ok(Ok(stream)) => {
                self.breaker.on_success(&candidate.provider, &breaker_config);
                Ok((stream, candidate.clone()))
            }
            Ok(Err(error)) => {
                if error.triggers_breaker() {
                    self.breaker.on_failure(&candidate.provider, &breaker_config);
                }
                Err(error)
            }
            Err(_) => {
                let error = LlmError::Timeout {
                    provider: candidate.provider.clone(),
                };
                self.breaker.on_failure(&candidate.provider, &breaker_config);
                Err(error)
            }
        }
    }

    async fn sequential_stream(
        &self,
        candidates: &Candidates,
        request: &UnifiedRequest,
        context: &RequestContext,
        config: &FallbackConfig,
    ) -> crate::Result<(ChatCompletionStream, Candidate)> {
        let attempts = 1 + config.max_retries as usize;
        let mut last_error = None;

        for candidate in candidates.iter().take(attempts.max(1)) {
            match self.attempt_stream_one(candidate, request, context, config).await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    let retryable = error.retryable();
                    last_error = Some(error);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::NoCandidate("no candidates available".to_string())))
    }

    /// Race mode for streaming commits to the first candidate whose call
    /// returns a stream at all (the streaming bridge treats "first parseable
    /// frame" as the real commit point once bytes start flowing).
    async fn race_stream(
        &self,
        candidates: &Candidates,
        request: &UnifiedRequest,
        context: &RequestContext,
        config: &FallbackConfig,
    ) -> crate::Result<(ChatCompletionStream, Candidate)> {
        self.sequential_stream(candidates, request, context, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    use crate::messages::{
        openai::Model,
        unified::{UnifiedContentContainer, UnifiedDialect, UnifiedMessage, UnifiedRole},
    };

    struct FakeProvider {
        name: String,
        fail: bool,
        calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait]
    impl Provider for FakeProvider {
        async fn chat_completion(&self, request: UnifiedRequest, _context: &RequestContext) -> crate::Result<UnifiedResponse> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if self.fail {
                return Err(LlmError::ProviderApiError {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }

            Ok(UnifiedResponse {
                id: "resp".to_string(),
                model: request.model,
                choices: vec![],
                usage: crate::messages::unified::UnifiedUsage {
                    prompt_tokens: 0,
                    completion_tokens: 0,
                    total_tokens: 0,
                    cache_tier: None,
                },
                created: 0,
                stop_reason: None,
                stop_sequence: None,
            })
        }

        async fn chat_completion_stream(
            &self,
            _request: UnifiedRequest,
            _context: &RequestContext,
        ) -> crate::Result<ChatCompletionStream> {
            Err(LlmError::StreamingNotSupported)
        }

        async fn list_models(&self) -> anyhow::Result<Vec<Model>> {
            Ok(vec![])
        }

        fn supports_streaming(&self) -> bool {
            false
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    struct FakeRegistry(HashMap<String, (Arc<dyn Provider>, CircuitBreakerConfig)>);

    impl ProviderLookup for FakeRegistry {
        fn get(&self, provider: &str) -> Option<(Arc<dyn Provider>, CircuitBreakerConfig)> {
            self.0.get(provider).cloned()
        }
    }

    fn request() -> UnifiedRequest {
        UnifiedRequest {
            model: "placeholder".to_string(),
            messages: vec![UnifiedMessage {
                role: UnifiedRole::User,
                content: UnifiedContentContainer::Text("hi".to_string()),
                tool_calls: None,
                tool_call_id: None,
            }],
            system: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            top_k: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop_sequences: None,
            stream: None,
            tools: None,
            tool_choice: None,
            parallel_tool_calls: None,
            metadata: None,
            dialect: UnifiedDialect::Openai,
            provider_overrides: None,
            router_config: None,
            cache_config: None,
            fallback_config: None,
        }
    }

    fn fallback_config() -> FallbackConfig {
        FallbackConfig {
            mode: FallbackMode::Sequential,
            timeout_ms: 5_000,
            max_retries: 1,
            race_width: 2,
        }
    }

    #[tokio::test]
    async fn sequential_advances_past_a_failing_primary() {
        let registry = FakeRegistry(HashMap::from([
            (
                "openai".to_string(),
                (
                    Arc::new(FakeProvider { name: "openai".to_string(), fail: true, calls: Default::default() }) as Arc<dyn Provider>,
                    CircuitBreakerConfig::default(),
                ),
            ),
            (
                "anthropic".to_string(),
                (
                    Arc::new(FakeProvider { name: "anthropic".to_string(), fail: false, calls: Default::default() }) as Arc<dyn Provider>,
                    CircuitBreakerConfig::default(),
                ),
            ),
        ]));
        let breaker = BreakerRegistry::new();
        let executor = FallbackExecutor::new(&registry, &breaker);

        let candidates = Candidates {
            primary: Candidate {
                provider: "openai".to_string(),
                model: "gpt-4".to_string(),
            },
            alternatives: vec![Candidate {
                provider: "anthropic".to_string(),
                model: "claude-3".to_string(),
            }],
        };

        let (_response, winner) = executor
            .complete(&candidates, &request(), &RequestContext::default(), &fallback_config())
            .await
            .unwrap();

        assert_eq!(winner.provider, "anthropic");
    }

    #[tokio::test]
    async fn sequential_records_one_breaker_failure_for_primary() {
        let registry = FakeRegistry(HashMap::from([
            (
                "openai".to_string(),
                (
                    Arc::new(FakeProvider { name: "openai".to_string(), fail: true, calls: Default::default() }) as Arc<dyn Provider>,
                    CircuitBreakerConfig {
                        failure_threshold: 5,
                        ..Default::default()
                    },
                ),
            ),
            (
                "anthropic".to_string(),
                (
                    Arc::new(FakeProvider { name: "anthropic".to_string(), fail: false, calls: Default::default() }) as Arc<dyn Provider>,
                    CircuitBreakerConfig::default(),
                ),
            ),
        ]));
        let breaker = BreakerRegistry::new();
        let executor = FallbackExecutor::new(&registry, &breaker);

        let candidates = Candidates {
            primary: Candidate {
                provider: "openai".to_string(),
                model: "gpt-4".to_string(),
            },
            alternatives: vec![Candidate {
                provider: "anthropic".to_string(),
                model: "claude-3".to_string(),
            }],
        };

        executor
            .complete(&candidates, &request(), &RequestContext::default(), &fallback_config())
            .await
            .unwrap();

        let cfg = CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        };
        assert!(matches!(breaker.allow("openai", &cfg), Err(LlmError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn open_breaker_skips_primary_without_calling_it() {
        let openai_calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let registry = FakeRegistry(HashMap::from([
            (
                "openai".to_string(),
                (
                    Arc::new(FakeProvider {
                        name: "openai".to_string(),
                        fail: false,
                        calls: openai_calls.clone(),
                    }) as Arc<dyn Provider>,
                    CircuitBreakerConfig::default(),
                ),
            ),
            (
                "anthropic".to_string(),
                (
                    Arc::new(FakeProvider { name: "anthropic".to_string(), fail: false, calls: Default::default() }) as Arc<dyn Provider>,
                    CircuitBreakerConfig::default(),
                ),
            ),
        ]));
        let breaker = BreakerRegistry::new();
        let cfg = CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        };
        breaker.on_failure("openai", &cfg);

        let executor = FallbackExecutor::new(&registry, &breaker);
        let candidates = Candidates {
            primary: Candidate {
                provider: "openai".to_string(),
                model: "gpt-4".to_string(),
            },
            alternatives: vec![Candidate {
                provider: "anthropic".to_string(),
                model: "claude-3".to_string(),
            }],
        };

        let (_response, winner) = executor
            .complete(&candidates, &request(), &RequestContext::default(), &fallback_config())
            .await
            .unwrap();

        assert_eq!(winner.provider, "anthropic");
        assert_eq!(openai_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
