//! Event vocabulary shared by validation, dedup keys, and delivery.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Free-form event parameters (`value`, `currency`, `content_ids`, ...).
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Semantic action name understood by the ad platform.
///
/// Known names carry a required/optional field table and a dedup field
/// subset. Anything else is kept verbatim as [`EventName::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    PageView,
    ViewContent,
    AddToCart,
    InitiateCheckout,
    Purchase,
    Search,
    AddToWishlist,
    Lead,
    CompleteRegistration,
    Contact,
    CustomizeProduct,
    ViewCategory,
    RemoveFromCart,
    Custom(String),
}

impl EventName {
    /// Wire name sent to both delivery channels.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::PageView => "PageView",
            Self::ViewContent => "ViewContent",
            Self::AddToCart => "AddToCart",
            Self::InitiateCheckout => "InitiateCheckout",
            Self::Purchase => "Purchase",
            Self::Search => "Search",
            Self::AddToWishlist => "AddToWishlist",
            Self::Lead => "Lead",
            Self::CompleteRegistration => "CompleteRegistration",
            Self::Contact => "Contact",
            Self::CustomizeProduct => "CustomizeProduct",
            Self::ViewCategory => "ViewCategory",
            Self::RemoveFromCart => "RemoveFromCart",
            Self::Custom(name) => name,
        }
    }

    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl From<&str> for EventName {
    fn from(s: &str) -> Self {
        match s {
            "PageView" => Self::PageView,
            "ViewContent" => Self::ViewContent,
            "AddToCart" => Self::AddToCart,
            "InitiateCheckout" => Self::InitiateCheckout,
            "Purchase" => Self::Purchase,
            "Search" => Self::Search,
            "AddToWishlist" => Self::AddToWishlist,
            "Lead" => Self::Lead,
            "CompleteRegistration" => Self::CompleteRegistration,
            "Contact" => Self::Contact,
            "CustomizeProduct" => Self::CustomizeProduct,
            "ViewCategory" => Self::ViewCategory,
            "RemoveFromCart" => Self::RemoveFromCart,
            other => Self::Custom(other.to_owned()),
        }
    }
}

impl FromStr for EventName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventName {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw.as_str()))
    }
}

/// Opaque id shared by every delivery channel for one logical occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns `true` when `key` is present and carries a non-empty value.
///
/// `null`, `""`, `[]` and `{}` all count as absent.
#[must_use]
pub fn has_value(payload: &Payload, key: &str) -> bool {
    match payload.get(key) {
        None | Some(serde_json::Value::Null) => false,
        Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
        Some(serde_json::Value::Array(a)) => !a.is_empty(),
        Some(serde_json::Value::Object(o)) => !o.is_empty(),
        Some(_) => true,
    }
}

/// Reads a string-ish field, stringifying numbers.
#[must_use]
pub fn string_field(payload: &Payload, key: &str) -> Option<String> {
    match payload.get(key)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First product id of an event: `content_ids[0]`, falling back to `content_id`.
#[must_use]
pub fn primary_content_id(payload: &Payload) -> Option<String> {
    if let Some(serde_json::Value::Array(ids)) = payload.get("content_ids") {
        return ids.first().and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
    }
    string_field(payload, "content_id")
}
