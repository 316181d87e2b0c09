//! Outbound request shape for the Anthropic provider.
//!
//! Anthropic's wire format is the dialect's own native format (unlike
//! Gemini or OpenAI-compatible third parties), so the outbound request is
//! exactly [`crate::messages::anthropic::AnthropicChatRequest`] — the same
//! type `messages::unified::to_anthropic` already knows how to build from a
//! [`crate::messages::unified::UnifiedRequest`].

pub(crate) use crate::messages::anthropic::AnthropicChatRequest as AnthropicRequest;
