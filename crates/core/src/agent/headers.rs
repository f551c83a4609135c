use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::events::{Headers, stringify_header_value};

const NON_UTF8_VALUE: &str = "[non-utf8 header value]";

/// Headers in whichever shape the call surface hands them over.
#[derive(Debug, Clone, Default)]
pub enum RawHeaders {
    #[default]
    None,
    Collection(HeaderMap),
    Pairs(Vec<(String, String)>),
    Mapping(BTreeMap<String, serde_json::Value>),
}

impl RawHeaders {
    /// Lower-cased name to value. Never fails; values that cannot be rendered become placeholders.
    pub fn normalize(&self) -> Option<Headers> {
        match self {
            RawHeaders::None => None,
            RawHeaders::Collection(map) => {
                let mut out = Headers::new();
                for name in map.keys() {
                    let joined = map
                        .get_all(name)
                        .iter()
                        .map(|v| v.to_str().unwrap_or(NON_UTF8_VALUE))
                        .collect::<Vec<_>>()
                        .join(", ");
                    out.insert(name.as_str().to_ascii_lowercase(), joined);
                }
                Some(out)
            }
            RawHeaders::Pairs(pairs) => Some(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_lowercase(), v.clone()))
                    .collect(),
            ),
            RawHeaders::Mapping(map) => Some(
                map.iter()
                    .map(|(k, v)| (k.to_lowercase(), stringify_header_value(v)))
                    .collect(),
            ),
        }
    }

    /// Case-insensitive lookup of a single header.
    pub fn get(&self, name: &str) -> Option<String> {
        match self {
            RawHeaders::None => None,
            RawHeaders::Collection(map) => map
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            RawHeaders::Pairs(pairs) => pairs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone()),
            RawHeaders::Mapping(map) => map
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| stringify_header_value(v)),
        }
    }

    /// Add or replace a header on the outgoing call.
    pub fn insert(&mut self, name: &str, value: &str) {
        match self {
            RawHeaders::None => {
                *self = RawHeaders::Pairs(vec![(name.to_string(), value.to_string())]);
            }
            RawHeaders::Collection(map) => {
                match (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(value)) => {
                        map.insert(name, value);
                    }
                    _ => tracing::debug!(header = name, "skipping header that is not valid HTTP"),
                }
            }
            RawHeaders::Pairs(pairs) => {
                pairs.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
                pairs.push((name.to_string(), value.to_string()));
            }
            RawHeaders::Mapping(map) => {
                map.retain(|k, _| !k.eq_ignore_ascii_case(name));
                map.insert(name.to_string(), serde_json::Value::String(value.to_string()));
            }
        }
    }
}

/// Case-insensitive lookup in an already normalized map.
pub fn header_lookup<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .get(&name.to_ascii_lowercase())
        .or_else(|| {
            headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
        .map(String::as_str)
}
