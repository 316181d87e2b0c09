use std::{convert::Infallible, sync::Arc};

use axum::{
    Router,
    body::Bytes,
    extract::{Extension, Json, Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Sse, sse::Event},
    routing::{get, post},
};
use axum_serde::Sonic;
use error::GeminiResult;
use futures::StreamExt;
use messages::{anthropic, gemini, openai};
use serde::{Deserialize, Serialize};

mod breaker;
mod cache;
mod error;
mod fallback;
mod fingerprint;
mod http_client;
mod messages;
mod pipeline;
pub mod provider;
mod request;
mod router;
pub mod token_counter;
mod usage;

pub use error::{AnthropicResult, LlmError, LlmResult as Result};
use pipeline::LlmPipeline;

use crate::messages::unified;

/// Creates an axum router for LLM endpoints.
pub async fn router(config: &config::Config) -> anyhow::Result<Router> {
    let pipeline = Arc::new(LlmPipeline::new(config).map_err(|e| anyhow::anyhow!("Failed to initialize LLM pipeline: {e}"))?);

    let mut router = Router::new().route("/v1/select-model", post(select_model)).with_state(pipeline.clone());

    if config.llm.protocols.openai.enabled {
        let openai_routes = Router::new()
            .route("/v1/chat/completions", post(chat_completions))
            .route("/v1/models", get(list_models))
            .with_state(pipeline.clone());

        router = router.nest(&config.llm.protocols.openai.path, openai_routes);
    }

    if config.llm.protocols.anthropic.enabled {
        let anthropic_routes = Router::new()
            .route("/v1/messages", post(anthropic_messages))
            .route("/v1/models", get(anthropic_list_models))
            .with_state(pipeline.clone());

        router = router.nest(&config.llm.protocols.anthropic.path, anthropic_routes);
    }

    if config.llm.protocols.gemini.enabled {
        let gemini_routes = Router::new()
            .route("/v1/generate", post(gemini_generate))
            .route("/v1/generate/stream", post(gemini_generate_stream))
            .route("/v1beta/models/{model_action}", post(gemini_model_action))
            .with_state(pipeline.clone());

        router = router.nest(&config.llm.protocols.gemini.path, gemini_routes);
    }

    Ok(router)
}

/// Handle chat completion requests.
///
/// This endpoint supports both streaming and non-streaming responses.
/// When `stream: true` is set in the request, the response is sent as
/// Server-Sent Events (SSE). Otherwise, a standard JSON response is returned.
async fn chat_completions(
    State(pipeline): State<Arc<LlmPipeline>>,
    headers: HeaderMap,
    client_identity: Option<Extension<config::ClientIdentity>>,
    Sonic(request): Sonic<openai::ChatCompletionRequest>,
) -> Result<impl IntoResponse> {
    log::debug!("OpenAI chat completions handler called for model: {}", request.model);
    log::debug!("Request has {} messages", request.messages.len());
    log::debug!("Streaming: {}", request.stream.unwrap_or(false));

    // Extract request context including client identity
    let context = request::extract_context(&headers, client_identity.map(|ext| ext.0));

    // Check if streaming is requested
    if request.stream.unwrap_or(false) {
        // Convert OpenAI request to unified format
        let unified_request = unified::UnifiedRequest::from(request);
        let stream = pipeline
            .completions_stream(unified_request, &context, "/v1/chat/completions")
            .await?;

        let event_stream = stream.map(move |result| {
            let event = match result {
                Ok(unified_chunk) => {
                    // Convert UnifiedChunk to OpenAI format for OpenAI protocol
                    let openai_chunk = openai::ChatCompletionChunk::from(unified_chunk);
                    let json = sonic_rs::to_string(&openai_chunk).unwrap_or_else(|e| {
                        log::error!("Failed to serialize chunk: {e}");
                        r#"{"error":"serialization failed"}"#.to_string()
                    });

                    Event::default().data(json)
                }
                Err(e) => {
                    log::error!("Stream error: {e}");
                    Event::default().data(format!(r#"{{"error":"{e}"}}"#))
                }
            };

            Ok::<_, Infallible>(event)
        });

        let with_done = event_stream.chain(futures::stream::once(async {
            Ok::<_, Infallible>(Event::default().data("[DONE]"))
        }));

        log::debug!("Returning streaming response");
        Ok(Sse::new(with_done).into_response())
    } else {
        // Non-streaming response
        // Convert OpenAI request to unified format
        let unified_request = unified::UnifiedRequest::from(request);
        let unified_response = pipeline.completions(unified_request, &context, "/v1/chat/completions").await?;

        // Convert back to OpenAI format
        let response = openai::ChatCompletionResponse::from(unified_response);

        log::debug!(
            "Chat completion successful, returning response with {} choices",
            response.choices.len()
        );

        Ok(Json(response).into_response())
    }
}

/// Handle list models requests.
async fn list_models(State(pipeline): State<Arc<LlmPipeline>>) -> Result<impl IntoResponse> {
    let response = pipeline.models().await;

    log::debug!("Returning {} models", response.data.len());
    Ok(Json(response))
}

/// Handle Anthropic messages requests.
///
/// This endpoint supports both streaming and non-streaming responses.
/// When `stream: true` is set in the request, the response is sent as
/// Server-Sent Events (SSE). Otherwise, a standard JSON response is returned.
async fn anthropic_messages(
    State(pipeline): State<Arc<LlmPipeline>>,
    headers: HeaderMap,
    client_identity: Option<Extension<config::ClientIdentity>>,
    Sonic(request): Sonic<anthropic::AnthropicChatRequest>,
) -> AnthropicResult<impl IntoResponse> {
    log::debug!("Anthropic messages handler called for model: {}", request.model);
    log::debug!("Request has {} messages", request.messages.len());
    log::debug!("Streaming: {}", request.stream.unwrap_or(false));

    // Extract request context including client identity
    let context = request::extract_context(&headers, client_identity.map(|ext| ext.0));

    // Convert Anthropic request to unified format
    let unified_request = unified::UnifiedRequest::from(request);

    // Check if streaming is requested
    if unified_request.stream.unwrap_or(false) {
        let stream = pipeline.completions_stream(unified_request, &context, "/v1/messages").await?;

        let event_stream = stream.map(move |result| {
            let event = match result {
                Ok(chunk) => {
                    // Convert unified chunk to Anthropic streaming event format
                    let anthropic_event = anthropic::AnthropicStreamEvent::from(chunk);
                    let json = sonic_rs::to_string(&anthropic_event).unwrap_or_else(|e| {
                        log::error!("Failed to serialize Anthropic streaming event: {e}");
                        r#"{"error":"serialization failed"}"#.to_string()
                    });

                    Event::default().data(json)
                }
                Err(e) => {
                    log::error!("Stream error: {e}");
                    let anthropic_error = anthropic::AnthropicError::from(e);
                    let error_event = anthropic::AnthropicStreamEvent::Error {
                        error: anthropic_error.error,
                    };
                    let json = sonic_rs::to_string(&error_event).unwrap_or_else(|se| {
                        log::error!("Failed to serialize Anthropic stream error event: {se}");
                        r#"{"type":"error","error":{"type":"internal_error","message":"serialization failed"}}"#
                            .to_string()
                    });

                    Event::default().data(json)
                }
            };

            Ok::<_, Infallible>(event)
        });

        // Anthropic doesn't use [DONE] marker, just end the stream
        log::debug!("Returning Anthropic streaming response");

        Ok(Sse::new(event_stream).into_response())
    } else {
        // Non-streaming response - use unified types directly!
        let unified_response = pipeline.completions(unified_request, &context, "/v1/messages").await?;
        let anthropic_response = anthropic::AnthropicChatResponse::from(unified_response);

        log::debug!("Anthropic messages completion successful");

        Ok(Json(anthropic_response).into_response())
    }
}

/// Handle Anthropic list models requests.
async fn anthropic_list_models(State(pipeline): State<Arc<LlmPipeline>>) -> AnthropicResult<impl IntoResponse> {
    let openai_response = pipeline.models().await;

    // Convert OpenAI models response to Anthropic format
    let anthropic_response = anthropic::AnthropicModelsResponse::from(openai_response);

    log::debug!("Returning {} models for Anthropic", anthropic_response.data.len());
    Ok(Json(anthropic_response))
}

/// Query parameters accepted by the native Gemini endpoints. Gemini's wire
/// request carries no model field of its own, unlike OpenAI and Anthropic, so
/// the model travels as a query parameter here instead.
#[derive(Debug, Deserialize)]
struct GenerateQuery {
    model: Option<String>,
}

fn gemini_unified_request(request: gemini::GenerateContentRequest, model: Option<String>) -> Result<unified::UnifiedRequest> {
    let mut unified_request = unified::UnifiedRequest::from(request);
    if let Some(model) = model {
        unified_request.model = model;
    }
    if unified_request.model.is_empty() {
        return Err(LlmError::InvalidRequest(
            "no model specified; pass ?model=provider/model or rely on the router".to_string(),
        ));
    }
    Ok(unified_request)
}

/// Handle the native, non-streaming `generateContent` endpoint.
async fn gemini_generate(
    State(pipeline): State<Arc<LlmPipeline>>,
    headers: HeaderMap,
    client_identity: Option<Extension<config::ClientIdentity>>,
    Query(query): Query<GenerateQuery>,
    Sonic(request): Sonic<gemini::GenerateContentRequest>,
) -> GeminiResult<impl IntoResponse> {
    let context = request::extract_context(&headers, client_identity.map(|ext| ext.0));
    let unified_request = gemini_unified_request(request, query.model).map_err(error::GeminiErrorResponse::from)?;

    let unified_response = pipeline
        .completions(unified_request, &context, "/v1/generate")
        .await
        .map_err(error::GeminiErrorResponse::from)?;

    Ok(Json(gemini::GenerateContentResponse::from(unified_response)))
}

/// Handle the native, streaming `streamGenerateContent` endpoint.
async fn gemini_generate_stream(
    State(pipeline): State<Arc<LlmPipeline>>,
    headers: HeaderMap,
    client_identity: Option<Extension<config::ClientIdentity>>,
    Query(query): Query<GenerateQuery>,
    Sonic(request): Sonic<gemini::GenerateContentRequest>,
) -> GeminiResult<impl IntoResponse> {
    let context = request::extract_context(&headers, client_identity.map(|ext| ext.0));
    let unified_request = gemini_unified_request(request, query.model).map_err(error::GeminiErrorResponse::from)?;

    let stream = pipeline
        .completions_stream(unified_request, &context, "/v1/generate/stream")
        .await
        .map_err(error::GeminiErrorResponse::from)?;

    let event_stream = stream.map(move |result| {
        let event = match result {
            Ok(chunk) => {
                let gemini_chunk = gemini::GenerateContentResponse::from(chunk);
                let json = sonic_rs::to_string(&gemini_chunk).unwrap_or_else(|e| {
                    log::error!("Failed to serialize Gemini stream chunk: {e}");
                    r#"{"error":"serialization failed"}"#.to_string()
                });

                Event::default().data(json)
            }
            Err(e) => {
                log::error!("Stream error: {e}");
                Event::default().data(format!(r#"{{"error":"{e}"}}"#))
            }
        };

        Ok::<_, Infallible>(event)
    });

    Ok(Sse::new(event_stream).into_response())
}

/// Dispatches the SDK-compatible `/v1beta/models/{model}:{action}` family.
///
/// Axum's router matches whole path segments, so `gemini-1.5-pro:generateContent`
/// arrives as one captured segment; this handler splits it on the last `:` to
/// recover the model name and the requested action, then deserializes the
/// body according to that action since `generateContent`/`streamGenerateContent`
/// and `countTokens` expect different shapes.
async fn gemini_model_action(
    State(pipeline): State<Arc<LlmPipeline>>,
    headers: HeaderMap,
    client_identity: Option<Extension<config::ClientIdentity>>,
    Path(model_action): Path<String>,
    body: Bytes,
) -> GeminiResult<axum::response::Response> {
    let Some((model, action)) = model_action.rsplit_once(':') else {
        return Err(error::GeminiErrorResponse::from(LlmError::InvalidRequest(format!(
            "expected 'model:action', got '{model_action}'"
        ))));
    };

    let context = request::extract_context(&headers, client_identity.map(|ext| ext.0));

    match action {
        "countTokens" => {
            let request: gemini::CountTokensRequest =
                sonic_rs::from_slice(&body).map_err(|e| error::GeminiErrorResponse::from(LlmError::InvalidRequest(e.to_string())))?;

            let generate_request = gemini::GenerateContentRequest {
                contents: request.contents,
                ..Default::default()
            };
            let mut unified_request = unified::UnifiedRequest::from(generate_request);
            unified_request.model = model.to_string();

            let total_tokens = token_counter::count_input_tokens(&unified_request);

            Ok(Json(gemini::CountTokensResponse { total_tokens }).into_response())
        }
        "generateContent" => {
            let request: gemini::GenerateContentRequest =
                sonic_rs::from_slice(&body).map_err(|e| error::GeminiErrorResponse::from(LlmError::InvalidRequest(e.to_string())))?;
            let unified_request = gemini_unified_request(request, Some(model.to_string())).map_err(error::GeminiErrorResponse::from)?;

            let unified_response = pipeline
                .completions(unified_request, &context, "/v1beta/models:generateContent")
                .await
                .map_err(error::GeminiErrorResponse::from)?;

            Ok(Json(gemini::GenerateContentResponse::from(unified_response)).into_response())
        }
        "streamGenerateContent" => {
            let request: gemini::GenerateContentRequest =
                sonic_rs::from_slice(&body).map_err(|e| error::GeminiErrorResponse::from(LlmError::InvalidRequest(e.to_string())))?;
            let unified_request = gemini_unified_request(request, Some(model.to_string())).map_err(error::GeminiErrorResponse::from)?;

            let stream = pipeline
                .completions_stream(unified_request, &context, "/v1beta/models:streamGenerateContent")
                .await
                .map_err(error::GeminiErrorResponse::from)?;

            let event_stream = stream.map(move |result| {
                let event = match result {
                    Ok(chunk) => {
                        let gemini_chunk = gemini::GenerateContentResponse::from(chunk);
                        let json = sonic_rs::to_string(&gemini_chunk).unwrap_or_else(|e| {
                            log::error!("Failed to serialize Gemini stream chunk: {e}");
                            r#"{"error":"serialization failed"}"#.to_string()
                        });

                        Event::default().data(json)
                    }
                    Err(e) => {
                        log::error!("Stream error: {e}");
                        Event::default().data(format!(r#"{{"error":"{e}"}}"#))
                    }
                };

                Ok::<_, Infallible>(event)
            });

            Ok(Sse::new(event_stream).into_response())
        }
        _ => Err(error::GeminiErrorResponse::from(LlmError::InvalidRequest(format!(
            "unsupported action '{action}'"
        )))),
    }
}

/// Response body for `POST /v1/select-model`: reports the provider/model the
/// router (or explicit `provider/model` fallback) would pick for a request,
/// without executing it.
#[derive(Debug, Serialize)]
struct SelectModelResponse {
    provider: String,
    model: String,
    alternatives: Vec<SelectModelAlternative>,
    cache_tier: Option<String>,
}

#[derive(Debug, Serialize)]
struct SelectModelAlternative {
    provider: String,
    model: String,
}

/// Resolve provider/model selection for a request without executing it.
/// Accepts the same body as `/v1/chat/completions` since selection only
/// depends on the unified request shape, not the calling dialect.
async fn select_model(
    State(pipeline): State<Arc<LlmPipeline>>,
    headers: HeaderMap,
    client_identity: Option<Extension<config::ClientIdentity>>,
    Sonic(request): Sonic<openai::ChatCompletionRequest>,
) -> Result<impl IntoResponse> {
    let context = request::extract_context(&headers, client_identity.map(|ext| ext.0));
    let unified_request = unified::UnifiedRequest::from(request);

    let selection = pipeline.select_model(&unified_request, &context).await?;

    Ok(Json(SelectModelResponse {
        provider: selection.provider,
        model: selection.model,
        alternatives: selection
            .alternatives
            .into_iter()
            .map(|candidate| SelectModelAlternative {
                provider: candidate.provider,
                model: candidate.model,
            })
            .collect(),
        cache_tier: selection.cache_tier,
    }))
}
