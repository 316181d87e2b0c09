//! Bring-your-own-key resolution: prefer a client-supplied key when the
//! provider allows forwarding, otherwise fall back to the configured one.

use secrecy::SecretString;

use crate::{error::LlmError, request::RequestContext};

/// Resolve the API key to use for an upstream call.
pub(crate) fn get(
    forward_token: bool,
    configured: &Option<SecretString>,
    context: &RequestContext,
) -> crate::Result<SecretString> {
    if forward_token
        && let Some(key) = &context.api_key
    {
        return Ok(key.clone());
    }

    configured
        .clone()
        .ok_or_else(|| LlmError::AuthenticationFailed("no API key configured for this provider".to_string()))
}
