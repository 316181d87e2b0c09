//! Wire shapes shared between outbound Gemini requests and inbound Gemini
//! responses: `GoogleContent`/`GooglePart` appear in both directions, so
//! they live here rather than being duplicated between `input.rs` and this
//! module.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::messages::{
    openai,
    unified::{UnifiedChoice, UnifiedChoiceDelta, UnifiedChunk, UnifiedMessage, UnifiedMessageDelta, UnifiedResponse, UnifiedUsage},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum GoogleRole {
    User,
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleContent {
    pub parts: Vec<GooglePart>,
    pub role: GoogleRole,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GooglePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<GoogleFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<GoogleFunctionResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleFunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleFunctionResponse {
    pub name: String,
    pub response: Value,
}

/// Response body from the Gemini `generateContent` API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GoogleGenerateResponse {
    #[serde(default)]
    pub candidates: Vec<GoogleCandidate>,
    #[serde(default)]
    pub usage_metadata: GoogleUsageMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GoogleCandidate {
    #[serde(default)]
    pub content: GoogleContent,
    #[serde(default)]
    pub finish_reason: Option<GoogleFinishReason>,
    #[serde(default)]
    pub index: u32,
}

impl Default for GoogleContent {
    fn default() -> Self {
        Self {
            parts: Vec::new(),
            role: GoogleRole::Model,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GoogleUsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum GoogleFinishReason {
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    #[serde(other)]
    Other,
}

impl From<GoogleFinishReason> for openai::FinishReason {
    fn from(reason: GoogleFinishReason) -> Self {
        match reason {
            GoogleFinishReason::Stop => openai::FinishReason::Stop,
            GoogleFinishReason::MaxTokens => openai::FinishReason::Length,
            GoogleFinishReason::Safety | GoogleFinishReason::Recitation => openai::FinishReason::ContentFilter,
            GoogleFinishReason::Other => openai::FinishReason::Other("other".to_string()),
        }
    }
}

fn content_to_unified_message(content: GoogleContent) -> UnifiedMessage {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for part in content.parts {
        if let Some(part_text) = part.text {
            text.push_str(&part_text);
        }
        if let Some(call) = part.function_call {
            tool_calls.push(crate::messages::unified::UnifiedToolCall {
                id: format!("call_{}", uuid::Uuid::new_v4()),
                function: crate::messages::unified::UnifiedFunctionCall {
                    name: call.name,
                    arguments: crate::messages::unified::UnifiedArguments::Value(call.args),
                },
            });
        }
    }

    UnifiedMessage {
        role: crate::messages::unified::UnifiedRole::Assistant,
        content: crate::messages::unified::UnifiedContentContainer::Text(text),
        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        tool_call_id: None,
    }
}

impl From<GoogleGenerateResponse> for UnifiedResponse {
    fn from(response: GoogleGenerateResponse) -> Self {
        let usage = UnifiedUsage {
            cache_tier: None,
            prompt_tokens: response.usage_metadata.prompt_token_count,
            completion_tokens: response.usage_metadata.candidates_token_count,
            total_tokens: response.usage_metadata.total_token_count,
        };

        let choices = response
            .candidates
            .into_iter()
            .map(|candidate| UnifiedChoice {
                index: candidate.index,
                message: content_to_unified_message(candidate.content),
                finish_reason: candidate.finish_reason.map(|r| openai::FinishReason::from(r).into()),
            })
            .collect();

        Self {
            id: format!("gemini-{}", uuid::Uuid::new_v4()),
            model: String::new(),
            created: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            choices,
            usage,
            stop_reason: None,
            stop_sequence: None,
        }
    }
}

/// A single `streamGenerateContent` SSE frame. Gemini sends the same
/// `GoogleGenerateResponse` shape per frame rather than an OpenAI-style
/// incremental delta, so chunk conversion folds each frame's full candidate
/// content into a single-delta `UnifiedChunk`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GoogleStreamChunk<'a> {
    #[serde(default)]
    pub candidates: Vec<GoogleCandidate>,
    #[serde(default)]
    pub usage_metadata: GoogleUsageMetadata,
    #[serde(skip)]
    _marker: std::marker::PhantomData<&'a ()>,
}

impl<'a> GoogleStreamChunk<'a> {
    pub(crate) fn into_chunk(self, provider: &str, model: &str) -> UnifiedChunk {
        let choices = self
            .candidates
            .into_iter()
            .map(|candidate| {
                let message = content_to_unified_message(candidate.content);
                UnifiedChoiceDelta {
                    index: candidate.index,
                    delta: UnifiedMessageDelta {
                        role: Some(message.role),
                        content: match message.content {
                            crate::messages::unified::UnifiedContentContainer::Text(text) => Some(text),
                            crate::messages::unified::UnifiedContentContainer::Blocks(_) => None,
                        },
                        tool_calls: None,
                    },
                    finish_reason: candidate.finish_reason.map(|r| openai::FinishReason::from(r).into()),
                }
            })
            .collect();

        UnifiedChunk {
            id: std::borrow::Cow::Owned(format!("{provider}-{}", uuid::Uuid::new_v4())),
            model: std::borrow::Cow::Owned(model.to_string()),
            created: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            choices,
            usage: Some(UnifiedUsage {
                cache_tier: None,
                prompt_tokens: self.usage_metadata.prompt_token_count,
                completion_tokens: self.usage_metadata.candidates_token_count,
                total_tokens: self.usage_metadata.total_token_count,
            }),
        }
    }
}
