//! Applies configured header transformation rules to outgoing provider requests.

use config::{HeaderRule, NameOrPattern};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Build the set of headers produced by `rules` against the client's `incoming` headers,
/// then attach them to `builder`.
pub fn apply(rules: &[HeaderRule], incoming: &HeaderMap, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    let mut out = HeaderMap::new();

    for rule in rules {
        match rule {
            HeaderRule::Forward(forward) => match &forward.name {
                NameOrPattern::Name(name) => {
                    let target = forward.rename.as_deref().unwrap_or(name);

                    if let Some(value) = incoming.get(name) {
                        insert(&mut out, target, value.clone());
                    } else if let Some(default) = &forward.default {
                        insert_str(&mut out, target, default);
                    }
                }
                NameOrPattern::Pattern(pattern) => {
                    for (name, value) in incoming.iter() {
                        if pattern.0.is_match(name.as_str()) {
                            insert(&mut out, name.as_str(), value.clone());
                        }
                    }
                }
            },
            HeaderRule::Insert(insert_rule) => {
                insert_str(&mut out, &insert_rule.name, &insert_rule.value);
            }
            HeaderRule::Remove(remove) => match &remove.name {
                NameOrPattern::Name(name) => {
                    if let Ok(header_name) = HeaderName::try_from(name.as_str()) {
                        out.remove(&header_name);
                    }
                }
                NameOrPattern::Pattern(pattern) => {
                    let mut filtered = HeaderMap::new();
                    let mut last_name: Option<HeaderName> = None;
                    for (name, value) in out.into_iter() {
                        let header_name = match name {
                            Some(n) => {
                                last_name = Some(n.clone());
                                n
                            }
                            None => last_name.clone().expect("HeaderMap iteration always yields a name first"),
                        };
                        if !pattern.0.is_match(header_name.as_str()) {
                            filtered.append(header_name, value);
                        }
                    }
                    out = filtered;
                }
            },
            HeaderRule::RenameDuplicate(rename) => {
                let existing = out.get(&rename.name).cloned().or_else(|| incoming.get(&rename.name).cloned());

                if let Some(value) = existing {
                    insert(&mut out, &rename.rename, value);
                }
            }
        }
    }

    builder.headers(out)
}

fn insert(map: &mut HeaderMap, name: &str, value: HeaderValue) {
    if let Ok(header_name) = HeaderName::try_from(name) {
        map.insert(header_name, value);
    }
}

fn insert_str(map: &mut HeaderMap, name: &str, value: &str) {
    if let (Ok(header_name), Ok(header_value)) = (HeaderName::try_from(name), HeaderValue::from_str(value)) {
        map.insert(header_name, header_value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{HeaderForward, HeaderInsert, NameOrPattern};

    fn client() -> reqwest::Client {
        reqwest::Client::new()
    }

    #[test]
    fn forward_renames_header() {
        let mut incoming = HeaderMap::new();
        incoming.insert("x-client-id", HeaderValue::from_static("abc"));

        let rules = vec![HeaderRule::Forward(HeaderForward {
            name: NameOrPattern::Name("x-client-id".to_string()),
            rename: Some("x-upstream-client".to_string()),
            default: None,
        })];

        let request = apply(&rules, &incoming, client().get("http://example.com"))
            .build()
            .unwrap();

        assert_eq!(request.headers().get("x-upstream-client").unwrap(), "abc");
        assert!(request.headers().get("x-client-id").is_none());
    }

    #[test]
    fn insert_adds_static_header() {
        let rules = vec![HeaderRule::Insert(HeaderInsert {
            name: "x-gateway".to_string(),
            value: "nexus".to_string(),
        })];

        let request = apply(&rules, &HeaderMap::new(), client().get("http://example.com"))
            .build()
            .unwrap();

        assert_eq!(request.headers().get("x-gateway").unwrap(), "nexus");
    }
}
