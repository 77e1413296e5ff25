//! User-matching fields sent alongside events.
//!
//! Values are normalized here so the script and server channels always see
//! the same representation of a contact.

use serde::{Deserialize, Serialize};

/// Best-effort identity hints for ad-platform matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_id: Option<String>,
}

impl UserData {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Contact details the visitor has disclosed (checkout form, login, URL).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub login_id: Option<String>,
}

impl ContactInfo {
    /// Normalizes every field, dropping values that end up blank.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            email: self.email.as_deref().and_then(normalize_email),
            phone: self.phone.as_deref().and_then(normalize_phone),
            city: self.city.as_deref().and_then(normalize_text),
            country: self.country.as_deref().and_then(normalize_country),
            first_name: self.first_name.as_deref().and_then(normalize_text),
            last_name: self.last_name.as_deref().and_then(normalize_text),
            login_id: self
                .login_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned),
        }
    }

    /// Fields set in `newer` win; the rest keep their current value.
    #[must_use]
    pub fn merged_with(&self, newer: &Self) -> Self {
        Self {
            email: newer.email.clone().or_else(|| self.email.clone()),
            phone: newer.phone.clone().or_else(|| self.phone.clone()),
            city: newer.city.clone().or_else(|| self.city.clone()),
            country: newer.country.clone().or_else(|| self.country.clone()),
            first_name: newer.first_name.clone().or_else(|| self.first_name.clone()),
            last_name: newer.last_name.clone().or_else(|| self.last_name.clone()),
            login_id: newer.login_id.clone().or_else(|| self.login_id.clone()),
        }
    }
}

#[must_use]
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    (email.contains('@') && !email.starts_with('@') && !email.ends_with('@')).then_some(email)
}

/// Keeps digits only. Fewer than 6 digits is not a usable phone number.
#[must_use]
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    (digits.len() >= 6).then_some(digits)
}

#[must_use]
pub fn normalize_text(raw: &str) -> Option<String> {
    let text = raw.trim().to_lowercase();
    (!text.is_empty()).then_some(text)
}

/// Two-letter lowercase country code.
#[must_use]
pub fn normalize_country(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_lowercase();
    (code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic())).then_some(code)
}

/// Click id in the `fb.1.<ts>.<fbclid>` form the platform expects.
#[must_use]
pub fn click_id_from_fbclid(fbclid: &str, now_ms: i64) -> Option<String> {
    let fbclid = fbclid.trim();
    (!fbclid.is_empty()).then(|| format!("fb.1.{now_ms}.{fbclid}"))
}
