//! Header normalization
//!
//! The protocol delivers request headers as a flat mapping and response
//! headers as an ordered list. Collaborators may send either form back in a
//! patch. Everything is funneled through the ordered `HeaderEntry` list,
//! with a mapping view derived from it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cdp::HeaderEntry;

/// Mapping view of a header list
pub type HeaderMap = BTreeMap<String, String>;

/// Separator used when a list carries the same name more than once
const DUPLICATE_SEPARATOR: &str = "\n";

/// Headers supplied by a collaborator in a patch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeadersPatch {
    List(Vec<PatchHeaderEntry>),
    Map(Map<String, Value>),
}

/// List entry in a patch; the value may be missing or null
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchHeaderEntry {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

/// Both views of a set of headers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    pub list: Vec<HeaderEntry>,
    pub map: HeaderMap,
}

/// Normalize raw protocol header data
///
/// Accepts an ordered `[{name, value}]` list or a `{name: value}` mapping.
/// Any other shape degrades to empty headers; individual entries that are
/// not name/value strings are skipped.
pub fn normalize(raw: &Value) -> Headers {
    let list = match raw {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let name = item.get("name")?.as_str()?;
                let value = scalar_to_string(item.get("value")?)?;
                Some(HeaderEntry::new(name, value))
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(name, value)| Some(HeaderEntry::new(name.as_str(), scalar_to_string(value)?)))
            .collect(),
        Value::Null => Vec::new(),
        other => {
            tracing::warn!(kind = %json_kind(other), "Malformed header data; using empty headers");
            Vec::new()
        }
    };

    let map = list_to_map(&list);
    Headers { list, map }
}

/// Fold a header list into a mapping
///
/// Repeated names are joined with a newline, the way the protocol reports
/// multi-valued headers such as `Set-Cookie`.
pub fn list_to_map(list: &[HeaderEntry]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for entry in list {
        map.entry(entry.name.clone())
            .and_modify(|existing: &mut String| {
                existing.push_str(DUPLICATE_SEPARATOR);
                existing.push_str(&entry.value);
            })
            .or_insert_with(|| entry.value.clone());
    }
    map
}

/// Expand a mapping into an ordered list
pub fn map_to_list(map: &HeaderMap) -> Vec<HeaderEntry> {
    map.iter()
        .map(|(name, value)| HeaderEntry::new(name.as_str(), value.as_str()))
        .collect()
}

/// Convert patch headers into the list the protocol expects
///
/// Names and values are trimmed. Entries with an empty name or without a
/// scalar value are dropped.
pub fn patch_to_list(patch: &HeadersPatch) -> Vec<HeaderEntry> {
    let pairs: Box<dyn Iterator<Item = (&str, &Value)>> = match patch {
        HeadersPatch::List(items) => {
            Box::new(items.iter().map(|e| (e.name.as_str(), &e.value)))
        }
        HeadersPatch::Map(map) => Box::new(map.iter().map(|(k, v)| (k.as_str(), v))),
    };

    pairs
        .filter_map(|(name, value)| {
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = scalar_to_string(value)?;
            Some(HeaderEntry::new(name, value.trim()))
        })
        .collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
