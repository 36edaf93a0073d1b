//! The dynamically-typed payload a [`crate::object::ChavaObject`] carries.
//!
//! The original source lets `value` be any Python object; spec.md §9 notes
//! the Rust port needs a closed, serializable stand-in. [`Value`] is that
//! stand-in — a `serde_json::Value`-shaped enum, kept as its own type
//! (rather than a direct re-export of `serde_json::Value`) so callers are
//! not tied to `chava-core` depending on `serde_json`'s exact value
//! representation.

use std::collections::BTreeMap;

/// A JSON-shaped dynamic value.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// `null`.
    Null,
    /// `true`/`false`.
    Bool(bool),
    /// Any JSON number, kept as `f64` the way `serde_json::Number` collapses
    /// to on the common path.
    Number(f64),
    /// A UTF-8 string.
    String(String),
    /// Raw bytes, represented on the wire as `{"@b": "<base64>"}` (see
    /// [`Value::to_json`]/[`Value::from_json`]) so they round-trip without
    /// being confused with an ordinary string; not a bare JSON type, but
    /// the original's `bytes` values need a lossless carrier.
    Bytes(Vec<u8>),
    /// An ordered array of values.
    Array(Vec<Value>),
    /// An object, keyed by string, insertion order not significant.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Resolves an RFC 6901 pointer against this value, returning `None`
    /// if any segment fails to resolve — mirrors `jsonpointer.resolve_pointer`
    /// falling back to `None` in the original source's `discharge`.
    pub fn resolve(&self, pointer: &crate::pointer::Pointer<'_>) -> Option<&Value> {
        let mut cur = self;
        for segment in pointer.segments() {
            cur = match cur {
                Value::Object(map) => map.get(segment.as_ref())?,
                Value::Array(items) => {
                    let idx: usize = segment.parse().ok()?;
                    items.get(idx)?
                }
                _ => return None,
            };
        }
        Some(cur)
    }

    /// Converts to a `serde_json::Value` for wire serialization.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::json!(n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => {
                let mut tagged = serde_json::Map::with_capacity(1);
                tagged.insert("@b".to_string(), serde_json::Value::String(base64_encode(b)));
                serde_json::Value::Object(tagged)
            }
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Reconstructs a [`Value`] from its `serde_json::Value` wire form,
    /// reversing [`Value::to_json`] (including the `{"@b": ...}` bytes tag).
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::Array(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(serde_json::Value::String(b64)) = map.get("@b") {
                        if let Some(bytes) = base64_decode(b64) {
                            return Value::Bytes(bytes);
                        }
                    }
                }
                Value::Object(map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    const TABLE: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity((bytes.len() + 2) / 3 * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0];
        let b1 = *chunk.get(1).unwrap_or(&0);
        let b2 = *chunk.get(2).unwrap_or(&0);
        let n = ((b0 as u32) << 16) | ((b1 as u32) << 8) | b2 as u32;
        let _ = write!(
            out,
            "{}{}{}{}",
            TABLE[(n >> 18 & 0x3f) as usize] as char,
            TABLE[(n >> 12 & 0x3f) as usize] as char,
            if chunk.len() > 1 { TABLE[(n >> 6 & 0x3f) as usize] as char } else { '=' },
            if chunk.len() > 2 { TABLE[(n & 0x3f) as usize] as char } else { '=' },
        );
    }
    out
}

fn base64_decode(s: &str) -> Option<Vec<u8>> {
    const TABLE: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    fn index(c: u8) -> Option<u32> {
        TABLE.iter().position(|&t| t == c).map(|i| i as u32)
    }

    let s = s.trim_end_matches('=');
    let mut out = Vec::with_capacity(s.len() / 4 * 3);
    let chars: Vec<u8> = s.bytes().collect();
    for chunk in chars.chunks(4) {
        let vals: Option<Vec<u32>> = chunk.iter().map(|&c| index(c)).collect();
        let vals = vals?;
        let n = vals.iter().enumerate().fold(0u32, |acc, (i, v)| acc | (v << (18 - 6 * i)));
        out.push((n >> 16) as u8);
        if vals.len() > 2 {
            out.push((n >> 8) as u8);
        }
        if vals.len() > 3 {
            out.push(n as u8);
        }
    }
    Some(out)
}
