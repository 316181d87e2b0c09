use std::{path::Path, str::FromStr};

use anyhow::bail;
use indoc::indoc;
use serde::Deserialize;
use serde_dynamic_string::DynamicString;
use std::fmt::Write;
use toml::Value;

use crate::Config;

/// Loads and validates configuration from a TOML file at `path`.
///
/// String values of the form `{{ env.VAR }}` are expanded against the
/// process environment before deserialization.
pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref().to_path_buf();
    let content = std::fs::read_to_string(&path)?;
    let mut raw_config: Value = toml::from_str(&content)?;

    expand_dynamic_strings(&mut Vec::new(), &mut raw_config)?;

    let config = Config::deserialize(raw_config)?;
    validate_has_downstreams(&config)?;

    Ok(config)
}

pub(crate) fn validate_has_downstreams(config: &Config) -> anyhow::Result<()> {
    if !config.llm.enabled() || !config.llm.has_providers() {
        bail!(indoc! {r#"
            No LLM providers configured. The gateway requires at least one provider to function.

            Example configuration:

              [llm.providers.openai]
              type = "openai"
              api_key = "{{ env.OPENAI_API_KEY }}"
        "#});
    }

    if !config.llm.has_protocol_endpoints() {
        bail!(indoc! {r#"
            LLM providers are configured but no protocol endpoints are enabled. At least one protocol endpoint must be enabled.

            All protocols are enabled by default. To explicitly enable them in configuration:

              [llm.protocols.openai]
              enabled = true
              path = "/v1"

              [llm.protocols.anthropic]
              enabled = true
              path = "/v1"
        "#});
    }

    if config.llm.protocols.openai.enabled
        && config.llm.protocols.anthropic.enabled
        && config.llm.protocols.openai.path == config.llm.protocols.anthropic.path
    {
        bail!(
            "Duplicate LLM protocol endpoint path: OpenAI and Anthropic protocols cannot use the same path ({})",
            config.llm.protocols.openai.path
        );
    }

    Ok(())
}

fn expand_dynamic_strings<'a>(path: &mut Vec<Result<&'a str, usize>>, value: &'a mut Value) -> anyhow::Result<()> {
    match value {
        Value::String(s) => match DynamicString::<String>::from_str(s) {
            Ok(out) => *s = out.into_inner(),
            Err(err) => {
                let mut p = String::new();

                for segment in path {
                    match segment {
                        Ok(s) => {
                            p.push_str(s);
                            p.push('.');
                        }
                        Err(i) => write!(p, "[{i}]").unwrap(),
                    }
                }

                if p.ends_with('.') {
                    p.pop();
                }

                bail!("Failed to expand dynamic string at path '{p}': {err}");
            }
        },
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map {
                path.push(Ok(key.as_str()));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_config_without_providers() {
        let mut raw: Value = toml::from_str("").unwrap();
        expand_dynamic_strings(&mut Vec::new(), &mut raw).unwrap();
        let config = Config::deserialize(raw).unwrap();

        let err = validate_has_downstreams(&config).unwrap_err();
        assert!(err.to_string().contains("No LLM providers configured"));
    }

    #[test]
    fn expands_env_vars() {
        // SAFETY: test-only, single-threaded access to this specific var.
        unsafe { std::env::set_var("NEXUS_TEST_LOADER_KEY", "sk-test-123") };

        let mut raw: Value = toml::from_str(
            r#"
            [llm.providers.openai]
            type = "openai"
            api_key = "{{ env.NEXUS_TEST_LOADER_KEY }}"
        "#,
        )
        .unwrap();

        expand_dynamic_strings(&mut Vec::new(), &mut raw).unwrap();

        let key = raw["llm"]["providers"]["openai"]["api_key"].as_str().unwrap();
        assert_eq!(key, "sk-test-123");

        unsafe { std::env::remove_var("NEXUS_TEST_LOADER_KEY") };
    }
}
