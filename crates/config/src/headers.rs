use regex::Regex;
use serde::Deserialize;

/// A single header transformation rule applied to outgoing provider requests.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HeaderRule {
    /// Forward an inbound client header to the upstream request, optionally renaming it.
    Forward(HeaderForward),
    /// Insert a static header, overwriting any existing value.
    Insert(HeaderInsert),
    /// Remove a header matching a name or pattern.
    Remove(HeaderRemove),
    /// Rename a header, keeping the original alongside the renamed copy.
    RenameDuplicate(HeaderRenameDuplicate),
}

/// Forward a client header to the upstream request.
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderForward {
    /// Name or pattern of the header to forward.
    pub name: NameOrPattern,
    /// Name to forward the header under, if different from `name`.
    pub rename: Option<String>,
    /// Default value to use when the header is absent.
    pub default: Option<String>,
}

/// Insert a static header with a fixed value.
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderInsert {
    /// Header name to insert.
    pub name: String,
    /// Header value to insert.
    pub value: String,
}

/// Remove a header before forwarding the request.
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderRemove {
    /// Name or pattern of the header to remove.
    pub name: NameOrPattern,
}

/// Duplicate a header under a new name, keeping the original.
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderRenameDuplicate {
    /// Name of the header to duplicate.
    pub name: String,
    /// Name to duplicate the header under.
    pub rename: String,
}

/// Matches a header either by exact name or by regex pattern.
#[derive(Debug, Clone)]
pub enum NameOrPattern {
    /// Exact header name.
    Name(String),
    /// Regex pattern matched against header names.
    Pattern(NamePattern),
}

/// A compiled regex used to match header names.
#[derive(Debug, Clone)]
pub struct NamePattern(pub Regex);

impl<'de> Deserialize<'de> for NameOrPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            Pattern { pattern: String },
        }

        match Raw::deserialize(deserializer)? {
            Raw::Name(name) => Ok(NameOrPattern::Name(name)),
            Raw::Pattern { pattern } => {
                let regex = Regex::new(&pattern).map_err(serde::de::Error::custom)?;
                Ok(NameOrPattern::Pattern(NamePattern(regex)))
            }
        }
    }
}
