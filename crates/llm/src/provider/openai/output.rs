//! Inbound response shapes for the OpenAI provider.
//!
//! Parsed straight out of `sonic_rs` with borrowed strings where it's cheap
//! to do so (stream chunks arrive one SSE frame at a time, so avoiding an
//! allocation per field matters on high-throughput routes).

use std::borrow::Cow;

use serde::Deserialize;

use crate::messages::{
    openai::{ChatChoice, FinishReason, Usage},
    unified::{
        UnifiedChoice, UnifiedChoiceDelta, UnifiedChunk, UnifiedMessage, UnifiedMessageDelta, UnifiedResponse,
        UnifiedStreamingToolCall, UnifiedUsage,
    },
};

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAIResponse {
    pub id: String,
    #[serde(default)]
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Usage,
}

impl From<OpenAIResponse> for UnifiedResponse {
    fn from(response: OpenAIResponse) -> Self {
        Self {
            id: response.id,
            model: response.model,
            created: response.created,
            choices: response
                .choices
                .into_iter()
                .map(|choice| UnifiedChoice {
                    index: choice.index,
                    message: UnifiedMessage::from(choice.message),
                    finish_reason: unified_finish_reason(choice.finish_reason),
                })
                .collect(),
            usage: UnifiedUsage {
                cache_tier: None,
                prompt_tokens: response.usage.prompt_tokens,
                completion_tokens: response.usage.completion_tokens,
                total_tokens: response.usage.total_tokens,
            },
            stop_reason: None,
            stop_sequence: None,
        }
    }
}

fn unified_finish_reason(reason: FinishReason) -> Option<crate::messages::unified::UnifiedFinishReason> {
    if reason == FinishReason::Pending {
        None
    } else {
        Some(reason.into())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAIStreamChunk<'a> {
    #[serde(borrow)]
    pub id: Cow<'a, str>,
    #[serde(default)]
    pub created: u64,
    #[serde(borrow)]
    pub model: Cow<'a, str>,
    pub choices: Vec<OpenAIStreamChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAIStreamChoice {
    pub index: u32,
    pub delta: crate::messages::openai::ChatMessageDelta,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

impl<'a> OpenAIStreamChunk<'a> {
    pub(crate) fn into_chunk(self, provider: &str) -> UnifiedChunk {
        let OpenAIStreamChunk {
            id,
            created,
            model,
            choices,
            usage,
        } = self;

        UnifiedChunk {
            id: Cow::Owned(format!("{provider}:{id}")),
            model: Cow::Owned(model.into_owned()),
            created,
            choices: choices
                .into_iter()
                .map(|choice| UnifiedChoiceDelta {
                    index: choice.index,
                    delta: UnifiedMessageDelta {
                        role: choice.delta.role.map(Into::into),
                        content: choice.delta.content,
                        tool_calls: choice.delta.tool_calls.map(|calls| {
                            calls
                                .into_iter()
                                .map(UnifiedStreamingToolCall::from)
                                .collect()
                        }),
                    },
                    finish_reason: choice.finish_reason.and_then(unified_finish_reason),
                })
                .collect(),
            usage: usage.map(|u| UnifiedUsage {
                cache_tier: None,
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        }
    }
}
