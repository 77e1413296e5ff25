//! HTTP client for the first-party conversions endpoint (the server channel).
//!
//! Wraps `reqwest` with endpoint validation, typed response decoding, and
//! `"success": false` detection. Deliveries are never retried here: the
//! dispatcher treats a failure as a lost server copy and relies on the client
//! channel and later duplicates for another chance.

use std::time::Duration;

use pixeltrack_core::event::{has_value, primary_content_id};
use pixeltrack_core::Payload;
use reqwest::{Client, Url};
use serde_json::{json, Value};

use crate::error::TrackerError;
use crate::types::{ServerEvent, ServerResponse};

/// Client for the conversions endpoint.
///
/// Use [`ServerClient::new`] with the configured endpoint, or point it at a
/// mock server in tests.
#[derive(Debug, Clone)]
pub struct ServerClient {
    client: Client,
    endpoint: Url,
}

impl ServerClient {
    /// Creates a client posting to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`TrackerError::InvalidEndpoint`] if
    /// `endpoint` is not an absolute http(s) URL.
    pub fn new(endpoint: &str, timeout_secs: u64, user_agent: &str) -> Result<Self, TrackerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;

        let parsed = Url::parse(endpoint).map_err(|e| TrackerError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TrackerError::InvalidEndpoint {
                endpoint: endpoint.to_owned(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        Ok(Self {
            client,
            endpoint: parsed,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Posts one event and decodes the endpoint's verdict.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::Http`] on network failure.
    /// - [`TrackerError::UnexpectedStatus`] on any non-2xx status.
    /// - [`TrackerError::Deserialize`] if the body is not the expected envelope.
    /// - [`TrackerError::Rejected`] if the body reports `"success": false`.
    pub async fn send(&self, event: &ServerEvent) -> Result<ServerResponse, TrackerError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(event)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::UnexpectedStatus {
                status: status.as_u16(),
                url: self.endpoint.to_string(),
            });
        }

        let body = response.text().await?;
        let parsed: ServerResponse =
            serde_json::from_str(&body).map_err(|e| TrackerError::Deserialize {
                context: format!("{} ({})", self.endpoint, event.event_name),
                source: e,
            })?;

        if !parsed.success {
            return Err(TrackerError::Rejected {
                event_id: event.event_id.to_string(),
                reason: parsed
                    .error
                    .clone()
                    .unwrap_or_else(|| "no reason given".to_owned()),
            });
        }

        Ok(parsed)
    }
}

/// Fills in fields the server-side API expects but callers often omit.
///
/// - `contents`: one `{ id, quantity, item_price }` per entry of
///   `content_ids` (or the single `content_id`), with quantity from
///   `quantity` / `num_items` (default 1) and price from `price` / `value`.
/// - `event_source_url`: the current page when known.
///
/// Fields the caller already supplied are left untouched.
#[must_use]
pub fn augment_custom_data(payload: &Payload, page_url: Option<&str>) -> Payload {
    let mut out = payload.clone();

    if !has_value(&out, "contents") {
        let ids: Vec<Value> = match out.get("content_ids") {
            Some(Value::Array(ids)) if !ids.is_empty() => ids.clone(),
            _ => primary_content_id(&out).map(Value::from).into_iter().collect(),
        };
        if !ids.is_empty() {
            let quantity = first_number(&out, &["quantity", "num_items"]).unwrap_or(json!(1));
            let price = first_number(&out, &["price", "value"]);
            let contents: Vec<Value> = ids
                .into_iter()
                .map(|id| {
                    let mut item = serde_json::Map::new();
                    item.insert("id".to_owned(), id);
                    item.insert("quantity".to_owned(), quantity.clone());
                    if let Some(price) = &price {
                        item.insert("item_price".to_owned(), price.clone());
                    }
                    Value::Object(item)
                })
                .collect();
            out.insert("contents".to_owned(), Value::Array(contents));
        }
    }

    if !has_value(&out, "event_source_url") {
        if let Some(url) = page_url.filter(|u| !u.is_empty()) {
            out.insert("event_source_url".to_owned(), Value::from(url));
        }
    }

    out
}

fn first_number(payload: &Payload, keys: &[&str]) -> Option<Value> {
    keys.iter()
        .filter_map(|k| payload.get(*k))
        .find(|v| v.is_number())
        .cloned()
}
