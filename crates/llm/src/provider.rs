//! Upstream provider adapters: OpenAI, Anthropic, and Google dialects.

pub(crate) mod anthropic;
pub(crate) mod google;
pub(crate) mod http_client;
pub(crate) mod openai;
pub(crate) mod token;

use std::{collections::BTreeMap, pin::Pin};

use async_trait::async_trait;
use config::{HeaderRule, ModelConfig};
use futures::Stream;

use crate::{
    error::LlmError,
    messages::{
        anthropic::CountTokensResponse,
        openai::Model,
        unified::{UnifiedRequest, UnifiedResponse},
    },
    request::RequestContext,
};

/// A stream of incremental chat completion chunks.
pub(crate) type ChatCompletionStream = Pin<Box<dyn Stream<Item = crate::Result<crate::messages::unified::UnifiedChunk>> + Send>>;

/// Uniform interface every upstream provider adapter implements.
#[async_trait]
pub(crate) trait Provider: Send + Sync {
    /// Send a non-streaming chat completion request.
    async fn chat_completion(&self, request: UnifiedRequest, context: &RequestContext) -> crate::Result<UnifiedResponse>;

    /// Send a streaming chat completion request.
    async fn chat_completion_stream(
        &self,
        request: UnifiedRequest,
        context: &RequestContext,
    ) -> crate::Result<ChatCompletionStream>;

    /// List models this provider exposes (remote discovery plus configured aliases).
    async fn list_models(&self) -> anyhow::Result<Vec<Model>>;

    /// Count tokens a request would consume without generating a completion.
    ///
    /// Only Anthropic exposes a dedicated endpoint for this; other providers
    /// report that the operation isn't supported upstream.
    async fn count_tokens(&self, _request: UnifiedRequest, _context: &RequestContext) -> crate::Result<CountTokensResponse> {
        Err(LlmError::InvalidRequest(
            "count_tokens is not supported by this provider".to_string(),
        ))
    }

    /// Whether this provider supports streaming responses.
    fn supports_streaming(&self) -> bool;

    /// The configured name of this provider instance.
    fn name(&self) -> &str;
}

/// Providers that talk to their upstream over plain HTTP, sharing header-rule
/// application and a pooled `reqwest::Client`.
pub(crate) trait HttpProvider: Provider {
    /// Header rules configured at the provider level.
    fn get_provider_headers(&self) -> &[HeaderRule];

    /// The pooled HTTP client to issue requests with.
    fn get_http_client(&self) -> &reqwest::Client;

    /// Build a request, applying provider-level header rules first and then
    /// any model-specific header rules, so model rules can override provider ones.
    fn request_builder(
        &self,
        method: reqwest::Method,
        url: &str,
        context: &RequestContext,
        model_config: Option<ModelConfig>,
    ) -> reqwest::RequestBuilder {
        let builder = self.get_http_client().request(method, url);
        let builder = header_rules::apply(self.get_provider_headers(), &context.headers, builder);

        match model_config {
            Some(model_config) => header_rules::apply(model_config.headers(), &context.headers, builder),
            None => builder,
        }
    }
}

/// Resolves requested model aliases against the configured model map for a
/// single provider and exposes the combined (discovered + configured) model list.
pub(crate) struct ModelManager {
    provider_name: String,
    models: BTreeMap<String, ModelConfig>,
}

impl ModelManager {
    pub(crate) fn new(models: impl IntoIterator<Item = (String, ModelConfig)>, provider_name: &str) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            models: models.into_iter().collect(),
        }
    }

    /// Resolve a requested model id to its configured upstream name, if an
    /// explicit rename is configured.
    pub(crate) fn resolve_model(&self, requested: &str) -> Option<String> {
        self.models
            .get(requested)
            .and_then(|config| config.rename())
            .map(str::to_string)
    }

    /// Get the configuration for a requested model id, if explicitly configured.
    pub(crate) fn get_model_config(&self, requested: &str) -> Option<ModelConfig> {
        self.models.get(requested).cloned()
    }

    /// List every explicitly configured model, without the provider name prefix.
    pub(crate) fn get_configured_models(&self) -> Vec<Model> {
        self.models
            .keys()
            .map(|id| Model {
                id: id.clone(),
                object: crate::messages::openai::ObjectType::Model,
                created: 0,
                owned_by: self.provider_name.clone(),
            })
            .collect()
    }
}
