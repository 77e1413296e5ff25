//! Dedup key construction.
//!
//! A key is `<event>_<identifier>_<digest>` where the digest is the base64 of
//! the canonical JSON of the event's significant fields, reduced to ASCII
//! alphanumerics. Keys built for the same logical event are byte-identical, so
//! the ledger can recognise re-fires.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;

use crate::error::CoreError;
use crate::event::{EventName, Payload};

const ANONYMOUS: &str = "anonymous";

/// Byte encoding applied to the canonical string before base64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyEncoding {
    /// One byte per char; chars above U+00FF cannot be encoded and trigger the
    /// fallback key. Matches the range of the in-page encoder.
    #[default]
    Latin1,
    /// UTF-8 bytes; never fails.
    Utf8,
}

impl FromStr for KeyEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "latin1" | "latin-1" => Ok(Self::Latin1),
            "utf8" | "utf-8" => Ok(Self::Utf8),
            other => Err(format!("unknown key encoding '{other}' (expected latin1 or utf8)")),
        }
    }
}

/// Derived key used to recognise repeated occurrences of one logical event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    value: String,
    fallback: bool,
}

impl DedupKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// `true` when the key was built from the timestamp fallback and therefore
    /// cannot match any other call.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Payload fields that identify "the same" event for known names.
/// `None` means the whole payload is significant.
#[must_use]
pub fn significant_fields(name: &EventName) -> Option<&'static [&'static str]> {
    let fields: &'static [&'static str] = match name {
        EventName::PageView => &["event_source_url", "page_path"],
        EventName::ViewContent => &["content_ids", "content_type"],
        EventName::AddToCart
        | EventName::RemoveFromCart
        | EventName::InitiateCheckout => &["content_ids", "currency", "num_items", "value"],
        EventName::Purchase => &["content_ids", "currency", "order_id", "value"],
        EventName::Search => &["search_string"],
        EventName::AddToWishlist | EventName::CustomizeProduct => &["content_ids"],
        EventName::Lead | EventName::Contact | EventName::CompleteRegistration => {
            &["content_category", "content_name", "lead_type"]
        }
        EventName::ViewCategory => &["content_category"],
        EventName::Custom(_) => return None,
    };
    Some(fields)
}

/// Builds the dedup key for one call.
///
/// Falls back to `<event>_<identifier>_<now_ms>` when the canonical string
/// cannot be encoded; such keys never collide, so duplicate suppression is
/// lost for that call only.
#[must_use]
pub fn build_dedup_key(
    name: &EventName,
    payload: &Payload,
    identifier: Option<&str>,
    encoding: KeyEncoding,
    now_ms: i64,
) -> DedupKey {
    let identifier = identifier.filter(|s| !s.is_empty()).unwrap_or(ANONYMOUS);

    match digest(name, payload, encoding) {
        Ok(digest) => DedupKey {
            value: format!("{name}_{identifier}_{digest}"),
            fallback: false,
        },
        Err(err) => {
            tracing::debug!(event_name = %name, error = %err, "dedup key encoding failed, using fallback key");
            DedupKey {
                value: format!("{name}_{identifier}_{now_ms}"),
                fallback: true,
            }
        }
    }
}

fn digest(name: &EventName, payload: &Payload, encoding: KeyEncoding) -> Result<String, CoreError> {
    let selected = match significant_fields(name) {
        Some(fields) => {
            let mut subset = serde_json::Map::new();
            for field in fields {
                if let Some(v) = payload.get(*field) {
                    subset.insert((*field).to_owned(), canonicalize(v));
                }
            }
            Value::Object(subset)
        }
        None => canonicalize(&Value::Object(payload.clone())),
    };

    let canonical = serde_json::to_string(&selected)
        .map_err(|e| CoreError::KeyEncoding(e.to_string()))?;
    let bytes = encode(&canonical, encoding)?;

    Ok(STANDARD
        .encode(bytes)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect())
}

fn encode(s: &str, encoding: KeyEncoding) -> Result<Vec<u8>, CoreError> {
    match encoding {
        KeyEncoding::Utf8 => Ok(s.as_bytes().to_vec()),
        KeyEncoding::Latin1 => s
            .chars()
            .map(|c| {
                u8::try_from(u32::from(c)).map_err(|_| {
                    CoreError::KeyEncoding(format!("character {c:?} is outside latin-1"))
                })
            })
            .collect(),
    }
}

/// Rebuilds objects with sorted keys so serialization is order independent.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for key in keys {
                out.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
#[path = "dedup_key_test.rs"]
mod tests;
