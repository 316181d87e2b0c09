//! A string wrapper that expands `{{ env.VAR }}` placeholders against the
//! process environment before parsing into the target type.
//!
//! Plain strings without placeholders pass through unchanged.

use std::{fmt, marker::PhantomData, str::FromStr, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Deserializer, de};

/// A value of type `T` that was parsed from a string which may have
/// contained `{{ env.VAR }}` placeholders, already expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicString<T>(T);

impl<T> DynamicString<T> {
    /// Consume the wrapper, returning the parsed inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> AsRef<T> for DynamicString<T> {
    fn as_ref(&self) -> &T {
        &self.0
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*env\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap())
}

fn expand(input: &str) -> Result<String, String> {
    let re = placeholder_regex();

    if !re.is_match(input) {
        return Ok(input.to_string());
    }

    let mut err = None;
    let expanded = re.replace_all(input, |caps: &regex::Captures<'_>| {
        let var = &caps[1];
        match std::env::var(var) {
            Ok(value) => value,
            Err(_) => {
                err = Some(format!("environment variable '{var}' is not set"));
                String::new()
            }
        }
    });

    match err {
        Some(e) => Err(e),
        None => Ok(expanded.into_owned()),
    }
}

impl<T> FromStr for DynamicString<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expanded = expand(s)?;
        expanded
            .parse::<T>()
            .map(DynamicString)
            .map_err(|e| format!("failed to parse expanded value: {e}"))
    }
}

impl<'de, T> Deserialize<'de> for DynamicString<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor<T>(PhantomData<T>);

        impl<T> de::Visitor<'_> for Visitor<T>
        where
            T: FromStr,
            T::Err: fmt::Display,
        {
            type Value = DynamicString<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string, optionally containing {{ env.VAR }} placeholders")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                DynamicString::from_str(v).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(Visitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_plain_strings() {
        let out = DynamicString::<String>::from_str("hello world").unwrap();
        assert_eq!(out.into_inner(), "hello world");
    }

    #[test]
    fn expands_env_placeholder() {
        // SAFETY: test-only, single-threaded access to this specific var.
        unsafe { std::env::set_var("SERDE_DYNAMIC_STRING_TEST_VAR", "sk-abc123") };

        let out = DynamicString::<String>::from_str("{{ env.SERDE_DYNAMIC_STRING_TEST_VAR }}").unwrap();
        assert_eq!(out.into_inner(), "sk-abc123");

        unsafe { std::env::remove_var("SERDE_DYNAMIC_STRING_TEST_VAR") };
    }

    #[test]
    fn expands_placeholder_within_larger_string() {
        // SAFETY: test-only, single-threaded access to this specific var.
        unsafe { std::env::set_var("SERDE_DYNAMIC_STRING_TEST_HOST", "localhost") };

        let out = DynamicString::<String>::from_str("http://{{ env.SERDE_DYNAMIC_STRING_TEST_HOST }}:8080").unwrap();
        assert_eq!(out.into_inner(), "http://localhost:8080");

        unsafe { std::env::remove_var("SERDE_DYNAMIC_STRING_TEST_HOST") };
    }

    #[test]
    fn errors_on_missing_env_var() {
        let err = DynamicString::<String>::from_str("{{ env.SERDE_DYNAMIC_STRING_DEFINITELY_MISSING }}").unwrap_err();
        assert!(err.contains("is not set"));
    }

    #[test]
    fn parses_into_non_string_types() {
        let out = DynamicString::<u64>::from_str("42").unwrap();
        assert_eq!(out.into_inner(), 42);
    }
}
