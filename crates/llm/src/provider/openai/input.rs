//! Outbound request shape for the OpenAI provider.
//!
//! OpenAI's wire format is the dialect's own native format, so this is a
//! thin adapter over [`crate::messages::openai::ChatCompletionRequest`]
//! rather than a full reimplementation: the only difference is that
//! `stream` is forced to a concrete `bool` here, since the provider call
//! sites always know which mode they're making before serializing.

use serde::Serialize;

use crate::messages::{openai::ChatCompletionRequest, unified::UnifiedRequest};

#[derive(Debug, Clone, Serialize)]
pub(crate) struct OpenAIRequest {
    pub model: String,
    pub messages: Vec<crate::messages::openai::ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<crate::messages::openai::Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<crate::messages::openai::ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
}

impl From<UnifiedRequest> for OpenAIRequest {
    fn from(request: UnifiedRequest) -> Self {
        let req: ChatCompletionRequest = request.into();
        Self {
            model: req.model,
            messages: req.messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            top_p: req.top_p,
            frequency_penalty: req.frequency_penalty,
            presence_penalty: req.presence_penalty,
            stop: req.stop,
            stream: req.stream.unwrap_or(false),
            tools: req.tools,
            tool_choice: req.tool_choice,
            parallel_tool_calls: req.parallel_tool_calls,
        }
    }
}
