//! Conversions from the Gemini dialect to unified types.

use std::borrow::Cow;

use crate::messages::{gemini, unified};

impl From<gemini::Role> for unified::UnifiedRole {
    fn from(role: gemini::Role) -> Self {
        match role {
            gemini::Role::User => unified::UnifiedRole::User,
            gemini::Role::Model => unified::UnifiedRole::Assistant,
        }
    }
}

/// Folds a Gemini `Content` turn into a unified message.
///
/// Plain text turns collapse to `UnifiedContentContainer::Text`. Turns
/// carrying a function call or function response become content blocks,
/// since Gemini has no per-call id to carry as a flat `tool_calls` entry.
fn content_to_unified_message(content: gemini::Content) -> unified::UnifiedMessage {
    let role = content.role.map(unified::UnifiedRole::from).unwrap_or(unified::UnifiedRole::User);

    let has_tool_content = content.parts.iter().any(|part| part.function_call.is_some() || part.function_response.is_some());

    if !has_tool_content {
        let text = content.parts.into_iter().filter_map(|part| part.text).collect::<String>();
        return unified::UnifiedMessage {
            role,
            content: unified::UnifiedContentContainer::Text(text),
            tool_calls: None,
            tool_call_id: None,
        };
    }

    let mut blocks = Vec::new();
    let mut tool_call_id = None;

    for part in content.parts {
        if let Some(text) = part.text {
            if !text.is_empty() {
                blocks.push(unified::UnifiedContent::Text { text });
            }
        }
        if let Some(call) = part.function_call {
            blocks.push(unified::UnifiedContent::ToolUse {
                id: format!("call_{}", uuid::Uuid::new_v4()),
                name: call.name,
                input: call.args,
            });
        }
        if let Some(response) = part.function_response {
            let id = format!("call_{}", response.name);
            tool_call_id = Some(id.clone());
            blocks.push(unified::UnifiedContent::ToolResult {
                tool_use_id: id,
                content: unified::UnifiedToolResultContent::Text(response.response.to_string()),
                is_error: None,
            });
        }
    }

    let mut message = unified::UnifiedMessage {
        role,
        content: unified::UnifiedContentContainer::Blocks(blocks),
        tool_calls: None,
        tool_call_id,
    };
    message.tool_calls = message.compute_tool_calls();
    message
}

impl From<gemini::GenerateContentRequest> for unified::UnifiedRequest {
    fn from(req: gemini::GenerateContentRequest) -> Self {
        let system = req.system_instruction.map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("\n")
        });

        let messages = req.contents.into_iter().map(content_to_unified_message).collect();

        let generation_config = req.generation_config.unwrap_or_default();

        let tools = req.tools.map(|tools| {
            tools
                .into_iter()
                .filter_map(|tool| tool.function_declarations)
                .flatten()
                .map(|decl| unified::UnifiedTool {
                    function: unified::UnifiedFunction {
                        name: decl.name,
                        description: decl.description.unwrap_or_default(),
                        parameters: Box::new(decl.parameters.unwrap_or_else(|| serde_json::json!({}))),
                        strict: None,
                    },
                })
                .collect()
        });

        let tool_choice = req.tool_config.and_then(|config| config.function_calling_config).map(|config| {
            match config.mode {
                gemini::FunctionCallingMode::None => {
                    unified::UnifiedToolChoice::Mode(unified::UnifiedToolChoiceMode::None)
                }
                gemini::FunctionCallingMode::Auto => {
                    unified::UnifiedToolChoice::Mode(unified::UnifiedToolChoiceMode::Auto)
                }
                gemini::FunctionCallingMode::Any => match config.allowed_function_names.and_then(|mut names| names.pop()) {
                    Some(name) => unified::UnifiedToolChoice::Specific {
                        function: unified::UnifiedFunctionChoice { name },
                    },
                    None => unified::UnifiedToolChoice::Mode(unified::UnifiedToolChoiceMode::Required),
                },
            }
        });

        Self {
            model: String::new(),
            messages,
            system,
            max_tokens: generation_config.max_output_tokens.map(|n| n as u32),
            temperature: generation_config.temperature,
            top_p: generation_config.top_p,
            top_k: generation_config.top_k.map(|n| n as u32),
            frequency_penalty: None,
            presence_penalty: None,
            stop_sequences: generation_config.stop_sequences,
            stream: None,
            tools,
            tool_choice,
            parallel_tool_calls: None,
            metadata: None,
            dialect: unified::UnifiedDialect::Gemini,
            provider_overrides: None,
            router_config: None,
            cache_config: None,
            fallback_config: None,
        }
    }
}

impl From<gemini::FinishReason> for unified::UnifiedFinishReason {
    fn from(reason: gemini::FinishReason) -> Self {
        match reason {
            gemini::FinishReason::Stop => unified::UnifiedFinishReason::Stop,
            gemini::FinishReason::MaxTokens => unified::UnifiedFinishReason::Length,
            gemini::FinishReason::Safety | gemini::FinishReason::Recitation => unified::UnifiedFinishReason::ContentFilter,
            gemini::FinishReason::Other => unified::UnifiedFinishReason::Stop,
        }
    }
}

fn usage_from_metadata(usage: gemini::UsageMetadata) -> unified::UnifiedUsage {
    unified::UnifiedUsage {
        prompt_tokens: usage.prompt_token_count,
        completion_tokens: usage.candidates_token_count,
        total_tokens: usage.total_token_count,
        cache_tier: usage.cache_tier,
    }
}

impl From<gemini::GenerateContentResponse> for unified::UnifiedResponse {
    fn from(response: gemini::GenerateContentResponse) -> Self {
        let usage = response.usage_metadata.map(usage_from_metadata).unwrap_or(unified::UnifiedUsage {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            cache_tier: None,
        });

        let choices = response
            .candidates
            .into_iter()
            .map(|candidate| unified::UnifiedChoice {
                index: candidate.index,
                message: content_to_unified_message(candidate.content),
                finish_reason: candidate.finish_reason.map(unified::UnifiedFinishReason::from),
            })
            .collect();

        Self {
            id: format!("gemini-{}", uuid::Uuid::new_v4()),
            model: response.model_version.unwrap_or_default(),
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

/// Folds a single `streamGenerateContent` frame into a `UnifiedChunk`.
///
/// Gemini streams the same `GenerateContentResponse` shape per frame rather
/// than an OpenAI-style incremental delta, so each frame becomes a
/// single-delta chunk carrying that frame's full text and, if present, a
/// fresh tool call.
impl From<gemini::GenerateContentResponse> for unified::UnifiedChunk {
    fn from(response: gemini::GenerateContentResponse) -> Self {
        let usage = response.usage_metadata.map(usage_from_metadata);

        let choices = response
            .candidates
            .into_iter()
            .map(|candidate| {
                let message = content_to_unified_message(candidate.content);

                let content = match &message.content {
                    unified::UnifiedContentContainer::Text(text) if !text.is_empty() => Some(text.clone()),
                    _ => None,
                };

                let tool_calls = message.tool_calls.map(|calls| {
                    calls
                        .into_iter()
                        .enumerate()
                        .map(|(index, call)| {
                            let arguments = match call.function.arguments {
                                unified::UnifiedArguments::String(s) => s,
                                unified::UnifiedArguments::Value(v) => v.to_string(),
                            };
                            unified::UnifiedStreamingToolCall::Start {
                                index,
                                id: call.id,
                                function: unified::UnifiedFunctionStart {
                                    name: call.function.name,
                                    arguments,
                                },
                            }
                        })
                        .collect()
                });

                unified::UnifiedChoiceDelta {
                    index: candidate.index,
                    delta: unified::UnifiedMessageDelta {
                        role: Some(message.role),
                        content,
                        tool_calls,
                    },
                    finish_reason: candidate.finish_reason.map(unified::UnifiedFinishReason::from),
                }
            })
            .collect();

        Self {
            id: Cow::Owned(format!("gemini-{}", uuid::Uuid::new_v4())),
            model: Cow::Owned(response.model_version.unwrap_or_default()),
            created: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            choices,
            usage,
        }
    }
}
