//! Token counting for requests that don't go through a provider's own
//! counting endpoint (only Anthropic exposes one upstream).

use crate::messages::unified::{UnifiedContent, UnifiedContentContainer, UnifiedRequest};

fn get_bpe(tokenizer: tiktoken_rs::tokenizer::Tokenizer) -> &'static tiktoken_rs::CoreBPE {
    use tiktoken_rs::tokenizer::Tokenizer;

    match tokenizer {
        Tokenizer::O200kBase => tiktoken_rs::o200k_base_singleton(),
        Tokenizer::Cl100kBase => tiktoken_rs::cl100k_base_singleton(),
        Tokenizer::R50kBase | Tokenizer::P50kBase | Tokenizer::P50kEdit | Tokenizer::Gpt2 => {
            tiktoken_rs::r50k_base_singleton()
        }
        _ => tiktoken_rs::cl100k_base_singleton(),
    }
}

/// Estimate the number of input tokens a request would consume, counting
/// message text and tool definitions. Uses the model-specific encoding when
/// tiktoken recognizes it, otherwise falls back to `cl100k_base`.
pub fn count_input_tokens(request: &UnifiedRequest) -> u32 {
    let tokenizer = tiktoken_rs::tokenizer::get_tokenizer(&request.model).unwrap_or(tiktoken_rs::tokenizer::Tokenizer::Cl100kBase);
    let bpe = get_bpe(tokenizer);

    let mut total = 0usize;

    if let Some(system) = &request.system {
        total += bpe.encode_with_special_tokens(system).len();
    }

    for message in &request.messages {
        total += count_content(&bpe, &message.content);
    }

    if let Some(tools) = &request.tools {
        for tool in tools {
            total += bpe.encode_with_special_tokens(&tool.function.name).len();
            total += bpe.encode_with_special_tokens(&tool.function.description).len();
        }
    }

    total as u32
}

fn count_content(bpe: &tiktoken_rs::CoreBPE, content: &UnifiedContentContainer) -> usize {
    match content {
        UnifiedContentContainer::Text(text) => bpe.encode_with_special_tokens(text).len(),
        UnifiedContentContainer::Blocks(blocks) => blocks
            .iter()
            .map(|block| match block {
                UnifiedContent::Text { text } => bpe.encode_with_special_tokens(text).len(),
                UnifiedContent::ToolResult { content, .. } => match content {
                    crate::messages::unified::UnifiedToolResultContent::Text(text) => {
                        bpe.encode_with_special_tokens(text).len()
                    }
                    crate::messages::unified::UnifiedToolResultContent::Multiple(texts) => texts
                        .iter()
                        .map(|text| bpe.encode_with_special_tokens(text).len())
                        .sum(),
                },
                _ => 0,
            })
            .sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::unified::{UnifiedDialect, UnifiedMessage, UnifiedRole};

    fn request_with_text(model: &str, text: &str) -> UnifiedRequest {
        UnifiedRequest {
            model: model.to_string(),
            messages: vec![UnifiedMessage {
                role: UnifiedRole::User,
                content: UnifiedContentContainer::Text(text.to_string()),
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
    fn counts_at_least_one_token_for_nonempty_text() {
        let request = request_with_text("gpt-4", "hello world");
        assert!(count_input_tokens(&request) > 0);
    }

    #[test]
    fn longer_text_counts_more_tokens() {
        let short = count_input_tokens(&request_with_text("gpt-4", "hi"));
        let long = count_input_tokens(&request_with_text(
            "gpt-4",
            "this is a much longer message with many more words in it",
        ));
        assert!(long > short);
    }
}
