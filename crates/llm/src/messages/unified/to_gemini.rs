//! Conversions from unified types to the Gemini dialect.

use crate::messages::{gemini, unified};

impl From<unified::UnifiedRole> for gemini::Role {
    fn from(role: unified::UnifiedRole) -> Self {
        match role {
            unified::UnifiedRole::Assistant => gemini::Role::Model,
            // Gemini has no system/tool role; system is pulled out separately
            // and tool results ride back as a user-role functionResponse part.
            unified::UnifiedRole::System | unified::UnifiedRole::User | unified::UnifiedRole::Tool => gemini::Role::User,
        }
    }
}

impl From<unified::UnifiedMessage> for gemini::Content {
    fn from(msg: unified::UnifiedMessage) -> Self {
        let role = gemini::Role::from(msg.role);

        let mut parts = match msg.content {
            unified::UnifiedContentContainer::Text(text) => {
                if text.is_empty() {
                    Vec::new()
                } else {
                    vec![gemini::Part {
                        text: Some(text),
                        function_call: None,
                        function_response: None,
                    }]
                }
            }
            unified::UnifiedContentContainer::Blocks(blocks) => blocks
                .into_iter()
                .filter_map(|block| match block {
                    unified::UnifiedContent::Text { text } => Some(gemini::Part {
                        text: Some(text),
                        function_call: None,
                        function_response: None,
                    }),
                    unified::UnifiedContent::ToolUse { name, input, .. } => Some(gemini::Part {
                        text: None,
                        function_call: Some(gemini::FunctionCall { name, args: input }),
                        function_response: None,
                    }),
                    unified::UnifiedContent::ToolResult { tool_use_id, content, .. } => {
                        let response = match content {
                            unified::UnifiedToolResultContent::Text(text) => serde_json::json!({ "content": text }),
                            unified::UnifiedToolResultContent::Multiple(texts) => serde_json::json!({ "content": texts }),
                        };
                        // from_gemini mints tool_use_id as "call_{name}"; recover the name.
                        let name = tool_use_id.strip_prefix("call_").unwrap_or(&tool_use_id).to_string();
                        Some(gemini::Part {
                            text: None,
                            function_response: Some(gemini::FunctionResponse { name, response }),
                            function_call: None,
                        })
                    }
                    unified::UnifiedContent::Image { .. } => None,
                })
                .collect(),
        };

        if let Some(calls) = msg.tool_calls {
            for call in calls {
                let args = match call.function.arguments {
                    unified::UnifiedArguments::Value(v) => v,
                    unified::UnifiedArguments::String(s) => {
                        serde_json::from_str(&s).unwrap_or(serde_json::Value::Null)
                    }
                };
                parts.push(gemini::Part {
                    text: None,
                    function_call: Some(gemini::FunctionCall { name: call.function.name, args }),
                    function_response: None,
                });
            }
        }

        Self { role: Some(role), parts }
    }
}

impl From<unified::UnifiedTool> for gemini::Tool {
    fn from(tool: unified::UnifiedTool) -> Self {
        Self {
            function_declarations: Some(vec![gemini::FunctionDeclaration {
                name: tool.function.name,
                description: Some(tool.function.description),
                parameters: Some(*tool.function.parameters),
            }]),
        }
    }
}

impl From<unified::UnifiedToolChoice> for gemini::ToolConfig {
    fn from(choice: unified::UnifiedToolChoice) -> Self {
        let function_calling_config = match choice {
            unified::UnifiedToolChoice::Mode(unified::UnifiedToolChoiceMode::None) => gemini::FunctionCallingConfig {
                mode: gemini::FunctionCallingMode::None,
                allowed_function_names: None,
            },
            unified::UnifiedToolChoice::Mode(unified::UnifiedToolChoiceMode::Auto) => gemini::FunctionCallingConfig {
                mode: gemini::FunctionCallingMode::Auto,
                allowed_function_names: None,
            },
            unified::UnifiedToolChoice::Mode(unified::UnifiedToolChoiceMode::Required) => gemini::FunctionCallingConfig {
                mode: gemini::FunctionCallingMode::Any,
                allowed_function_names: None,
            },
            unified::UnifiedToolChoice::Specific { function } => gemini::FunctionCallingConfig {
                mode: gemini::FunctionCallingMode::Any,
                allowed_function_names: Some(vec![function.name]),
            },
        };

        Self {
            function_calling_config: Some(function_calling_config),
        }
    }
}

impl From<unified::UnifiedRequest> for gemini::GenerateContentRequest {
    fn from(req: unified::UnifiedRequest) -> Self {
        let system_instruction = req.system.filter(|s| !s.is_empty()).map(|text| gemini::Content {
            role: None,
            parts: vec![gemini::Part {
                text: Some(text),
                function_call: None,
                function_response: None,
            }],
        });

        Self {
            contents: req.messages.into_iter().map(gemini::Content::from).collect(),
            system_instruction,
            tools: req.tools.map(|tools| tools.into_iter().map(gemini::Tool::from).collect()),
            tool_config: req.tool_choice.map(gemini::ToolConfig::from),
            generation_config: Some(gemini::GenerationConfig {
                stop_sequences: req.stop_sequences,
                candidate_count: None,
                max_output_tokens: req.max_tokens.map(|n| n as i32),
                temperature: req.temperature,
                top_p: req.top_p,
                top_k: req.top_k.map(|n| n as i32),
            }),
        }
    }
}

impl From<unified::UnifiedFinishReason> for gemini::FinishReason {
    fn from(reason: unified::UnifiedFinishReason) -> Self {
        match reason {
            unified::UnifiedFinishReason::Stop | unified::UnifiedFinishReason::ToolCalls => gemini::FinishReason::Stop,
            unified::UnifiedFinishReason::Length => gemini::FinishReason::MaxTokens,
            unified::UnifiedFinishReason::ContentFilter => gemini::FinishReason::Safety,
        }
    }
}

fn usage_metadata(usage: unified::UnifiedUsage) -> gemini::UsageMetadata {
    gemini::UsageMetadata {
        prompt_token_count: usage.prompt_tokens,
        candidates_token_count: usage.completion_tokens,
        total_token_count: usage.total_tokens,
        cache_tier: usage.cache_tier,
    }
}

impl From<unified::UnifiedResponse> for gemini::GenerateContentResponse {
    fn from(resp: unified::UnifiedResponse) -> Self {
        Self {
            candidates: resp
                .choices
                .into_iter()
                .map(|choice| gemini::Candidate {
                    content: gemini::Content::from(choice.message),
                    finish_reason: choice.finish_reason.map(gemini::FinishReason::from),
                    index: choice.index,
                })
                .collect(),
            usage_metadata: Some(usage_metadata(resp.usage)),
            model_version: Some(resp.model),
        }
    }
}

/// Folds a `UnifiedChunk` into a single `streamGenerateContent` frame.
///
/// Gemini streaming has no incremental tool-call delta shape, so a
/// `Start` tool call becomes a full `functionCall` part and a `Delta` is
/// dropped (Gemini providers never emit deltas against this dialect).
impl From<unified::UnifiedChunk> for gemini::GenerateContentResponse {
    fn from(chunk: unified::UnifiedChunk) -> Self {
        let candidates = chunk
            .choices
            .into_iter()
            .map(|choice| {
                let mut parts = Vec::new();
                if let Some(text) = choice.delta.content {
                    if !text.is_empty() {
                        parts.push(gemini::Part {
                            text: Some(text),
                            function_call: None,
                            function_response: None,
                        });
                    }
                }
                if let Some(calls) = choice.delta.tool_calls {
                    for call in calls {
                        if let unified::UnifiedStreamingToolCall::Start { function, .. } = call {
                            let args = serde_json::from_str(&function.arguments).unwrap_or(serde_json::Value::Null);
                            parts.push(gemini::Part {
                                text: None,
                                function_call: Some(gemini::FunctionCall { name: function.name, args }),
                                function_response: None,
                            });
                        }
                    }
                }

                gemini::Candidate {
                    content: gemini::Content {
                        role: Some(gemini::Role::Model),
                        parts,
                    },
                    finish_reason: choice.finish_reason.map(gemini::FinishReason::from),
                    index: choice.index,
                }
            })
            .collect();

        Self {
            candidates,
            usage_metadata: chunk.usage.map(usage_metadata),
            model_version: Some(chunk.model.into_owned()),
        }
    }
}
