use fetchbridge_core::{BridgeError, BridgeResult};
use serde_json::{Map, Value};

/// Characters allowed in a field name besides ASCII alphanumerics.
const TOKEN_PUNCTUATION: &[u8] = b"!#$%&'*+-.^_`|~";

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || TOKEN_PUNCTUATION.contains(&b))
}

/// Trim, validate and lowercase a header field name.
pub(crate) fn normalize_name(name: &str) -> BridgeResult<String> {
    let trimmed = name.trim();
    if !is_token(trimmed) {
        return Err(BridgeError::MalformedHeaderName(name.to_owned()));
    }
    Ok(trimmed.to_ascii_lowercase())
}

pub(crate) fn is_method_token(method: &str) -> bool {
    is_token(method)
}

/// Ordered, case-insensitive header dictionary.
///
/// Each normalized name maps to one combined value: repeated appends join
/// with `", "`. Iteration follows the order in which names were first
/// added; `set` on an existing name keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

/// The shapes a header collection can be built from.
#[derive(Debug, Clone)]
pub enum HeadersInit {
    Headers(Headers),
    Pairs(Vec<(String, String)>),
    /// A property bag; non-string values are stringified.
    Record(Map<String, Value>),
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from any supported shape, appending every entry in order.
    pub fn from_init(init: impl Into<HeadersInit>) -> BridgeResult<Self> {
        let mut headers = Self::new();
        match init.into() {
            HeadersInit::Headers(other) => {
                for (name, value) in other.entries {
                    headers.append(&name, value)?;
                }
            }
            HeadersInit::Pairs(pairs) => {
                for (name, value) in pairs {
                    headers.append(&name, value)?;
                }
            }
            HeadersInit::Record(record) => {
                for (name, value) in record {
                    let value = match value {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    headers.append(&name, value)?;
                }
            }
        }
        Ok(headers)
    }

    fn position(&self, normalized: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n == normalized)
    }

    pub fn append(&mut self, name: &str, value: impl Into<String>) -> BridgeResult<()> {
        let name = normalize_name(name)?;
        let value = value.into();
        match self.position(&name) {
            Some(i) => {
                let existing = &mut self.entries[i].1;
                existing.push_str(", ");
                existing.push_str(&value);
            }
            None => self.entries.push((name, value)),
        }
        Ok(())
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) -> BridgeResult<()> {
        let name = normalize_name(name)?;
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((name, value)),
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> BridgeResult<Option<&str>> {
        let name = normalize_name(name)?;
        Ok(self.position(&name).map(|i| self.entries[i].1.as_str()))
    }

    pub fn has(&self, name: &str) -> BridgeResult<bool> {
        let name = normalize_name(name)?;
        Ok(self.position(&name).is_some())
    }

    pub fn delete(&mut self, name: &str) -> BridgeResult<()> {
        let name = normalize_name(name)?;
        self.entries.retain(|(n, _)| *n != name);
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, v)| v.as_str())
    }

    /// `(name, value)` entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Guest-style visitor: the callback receives `(value, name)`.
    pub fn for_each(&self, mut f: impl FnMut(&str, &str)) {
        for (name, value) in &self.entries {
            f(value, name);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flattened pairs for the host boundary.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.entries.clone()
    }
}

impl From<Headers> for HeadersInit {
    fn from(headers: Headers) -> Self {
        HeadersInit::Headers(headers)
    }
}

impl From<Vec<(String, String)>> for HeadersInit {
    fn from(pairs: Vec<(String, String)>) -> Self {
        HeadersInit::Pairs(pairs)
    }
}

impl From<Vec<(&str, &str)>> for HeadersInit {
    fn from(pairs: Vec<(&str, &str)>) -> Self {
        HeadersInit::Pairs(
            pairs
                .into_iter()
                .map(|(n, v)| (n.to_owned(), v.to_owned()))
                .collect(),
        )
    }
}

impl<const N: usize> From<[(&str, &str); N]> for HeadersInit {
    fn from(pairs: [(&str, &str); N]) -> Self {
        HeadersInit::from(Vec::from(pairs))
    }
}

impl From<Map<String, Value>> for HeadersInit {
    fn from(record: Map<String, Value>) -> Self {
        HeadersInit::Record(record)
    }
}
