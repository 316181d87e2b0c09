//! Model router client: delegates provider/model selection to an external
//! service, with a local semantic cache so repeated or near-duplicate
//! prompts don't pay for a round trip every time.

mod cache;
pub(crate) mod embedder;

use std::sync::Arc;

use config::{CircuitBreakerConfig, RouterConfig};
use serde::{Deserialize, Serialize};

use self::{cache::SelectionCache, embedder::Embedder};
use crate::{
    breaker::{BreakerRegistry, ROUTER_BREAKER_ID},
    error::LlmError,
    fingerprint,
    messages::unified::{UnifiedContentContainer, UnifiedRequest, UnifiedRole},
    request::RequestContext,
};

/// A single provider+model the fallback executor may attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Candidate {
    pub provider: String,
    pub model: String,
}

/// A primary candidate plus ordered alternatives, as returned by the router
/// (or synthesized locally when the router is unavailable).
#[derive(Debug, Clone)]
pub(crate) struct Candidates {
    pub primary: Candidate,
    pub alternatives: Vec<Candidate>,
}

impl Candidates {
    pub(crate) fn single(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            primary: Candidate {
                provider: provider.into(),
                model: model.into(),
            },
            alternatives: Vec::new(),
        }
    }

    /// All candidates in attempt order: primary first, then alternatives.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Candidate> {
        std::iter::once(&self.primary).chain(self.alternatives.iter())
    }
}

#[derive(Debug, Serialize)]
struct SelectionRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    models: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cost_bias: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct SelectionResponse {
    provider: String,
    model: String,
    #[serde(default)]
    alternatives: Vec<AlternativeResponse>,
}

#[derive(Debug, Deserialize)]
struct AlternativeResponse {
    provider: String,
    model: String,
}

impl From<SelectionResponse> for Candidates {
    fn from(response: SelectionResponse) -> Self {
        Self {
            primary: Candidate {
                provider: response.provider,
                model: response.model,
            },
            alternatives: response
                .alternatives
                .into_iter()
                .map(|a| Candidate {
                    provider: a.provider,
                    model: a.model,
                })
                .collect(),
        }
    }
}

pub(crate) struct RouterClient {
    client: reqwest::Client,
    url: String,
    timeout_ms: u64,
    default_cost_bias: Option<f32>,
    cache: SelectionCache,
    embedder: Arc<dyn Embedder>,
}

impl RouterClient {
    pub(crate) fn new(config: &RouterConfig) -> Self {
        Self::with_embedder(config, Arc::new(embedder::HashingEmbedder::default()))
    }

    pub(crate) fn with_embedder(config: &RouterConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            client: crate::http_client::http_client(),
            url: config.url.as_ref().clone(),
            timeout_ms: config.timeout_ms,
            default_cost_bias: config.cost_bias,
            cache: SelectionCache::new(config.semantic_cache.capacity, config.semantic_cache.threshold),
            embedder,
        }
    }

    /// Select provider/model candidates for `request`, consulting the local
    /// cache first, then the external RPC, falling back to a single
    /// caller-supplied candidate if the RPC is unavailable.
    pub(crate) async fn select(
        &self,
        request: &UnifiedRequest,
        context: &RequestContext,
        breaker: &BreakerRegistry,
        router_breaker_config: &CircuitBreakerConfig,
    ) -> crate::Result<Candidates> {
        let prompt = last_user_prompt(request);
        let cost_bias = request
            .router_config
            .as_ref()
            .and_then(|c| c.cost_bias)
            .or(self.default_cost_bias);
        let models = request.router_config.as_ref().map(|c| c.models.clone());

        let selection_key = fingerprint::of_value(&serde_json::json!({
            "prompt": prompt,
            "cost_bias": cost_bias.map(|b| (b * 100.0).round() / 100.0),
            "models": models.clone().map(|mut m| { m.sort(); m }),
        }));

        if let Some(hit) = self.cache.exact(&selection_key) {
            return Ok(hit);
        }

        let embedding = self.embedder.embed(&prompt).await.unwrap_or_default();
        if !embedding.is_empty()
            && let Some(hit) = self.cache.semantic(&embedding)
        {
            return Ok(hit);
        }

        if breaker.allow(ROUTER_BREAKER_ID, router_breaker_config).is_err() {
            return self.fallback(request);
        }

        match self.call(&prompt, request, context, cost_bias, models.as_deref()).await {
            Ok(candidates) => {
                breaker.on_success(ROUTER_BREAKER_ID, router_breaker_config);
                if !embedding.is_empty() {
                    self.cache.insert(selection_key, embedding, &candidates);
                }
                Ok(candidates)
            }
            Err(error) => {
                if error.triggers_breaker() {
                    breaker.on_failure(ROUTER_BREAKER_ID, router_breaker_config);
                }
                log::warn!("model router RPC failed, falling back to explicit candidate: {error}");
                self.fallback(request)
            }
        }
    }

    async fn call(
        &self,
        prompt: &str,
        request: &UnifiedRequest,
        context: &RequestContext,
        cost_bias: Option<f32>,
        models: Option<&[String]>,
    ) -> crate::Result<Candidates> {
        let body = SelectionRequest {
            prompt,
            tool_call: request.tools.as_ref().map(|tools| !tools.is_empty()),
            tools: request
                .tools
                .as_ref()
                .map(|tools| tools.iter().map(|t| t.function.name.as_str()).collect()),
            user_id: context.client_identity.as_ref().map(|_| context.request_id.as_str()),
            models,
            cost_bias,
        };

        let response = self
            .client
            .post(&self.url)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(format!("router request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::ProviderApiError {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json::<SelectionResponse>()
            .await
            .map(Candidates::from)
            .map_err(|e| LlmError::InternalError(Some(format!("invalid router response: {e}"))))
    }

    fn fallback(&self, request: &UnifiedRequest) -> crate::Result<Candidates> {
        match request.model.split_once('/') {
            Some((provider, model)) => Ok(Candidates::single(provider, model)),
            None => Err(LlmError::NoCandidate(format!(
                "model router is unavailable and '{}' is not an explicit provider/model",
                request.model
            ))),
        }
    }
}

pub(crate) fn last_user_prompt(request: &UnifiedRequest) -> String {
    request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == UnifiedRole::User)
        .map(|m| match &m.content {
            UnifiedContentContainer::Text(text) => text.clone(),
            UnifiedContentContainer::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    crate::messages::unified::UnifiedContent::Text { text } => Some(text.clone()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::unified::{UnifiedDialect, UnifiedMessage};

    fn request_with_model(model: &str) -> UnifiedRequest {
        UnifiedRequest {
            model: model.to_string(),
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

    #[test]
    fn fallback_splits_explicit_provider_model() {
        let config = RouterConfig {
            url: "http://example.invalid/select".parse().unwrap(),
            timeout_ms: 100,
            cost_bias: None,
            semantic_cache: Default::default(),
        };
        let client = RouterClient::new(&config);

        let candidates = client.fallback(&request_with_model("openai/gpt-4")).unwrap();
        assert_eq!(candidates.primary.provider, "openai");
        assert_eq!(candidates.primary.model, "gpt-4");
    }

    #[test]
    fn fallback_without_explicit_model_is_no_candidate() {
        let config = RouterConfig {
            url: "http://example.invalid/select".parse().unwrap(),
            timeout_ms: 100,
            cost_bias: None,
            semantic_cache: Default::default(),
        };
        let client = RouterClient::new(&config);

        let err = client.fallback(&request_with_model("gpt-4")).unwrap_err();
        assert!(matches!(err, LlmError::NoCandidate(_)));
    }

    #[test]
    fn extracts_last_user_message_as_prompt() {
        let mut request = request_with_model("openai/gpt-4");
        request.messages.push(UnifiedMessage {
            role: UnifiedRole::Assistant,
            content: UnifiedContentContainer::Text("reply".to_string()),
            tool_calls: None,
            tool_call_id: None,
        });
        request.messages.push(UnifiedMessage {
            role: UnifiedRole::User,
            content: UnifiedContentContainer::Text("second question".to_string()),
            tool_calls: None,
            tool_call_id: None,
        });

        assert_eq!(last_user_prompt(&request), "second question");
    }
}
