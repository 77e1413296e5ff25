//! Required/optional parameter table per known event.
//!
//! Validation never fails hard: callers get a [`ValidationReport`] and decide
//! whether to abort delivery. Custom event names bypass the table entirely so
//! free-form analytics events always pass.

use serde::Serialize;

use crate::event::{has_value, EventName, Payload};

/// Field requirements for one known event.
#[derive(Debug, Clone, Copy)]
pub struct EventRequirements {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

/// Outcome of [`validate_event`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub missing: Vec<String>,
    /// Completeness in `0.0..=10.0`, one decimal.
    pub score: f64,
}

impl ValidationReport {
    fn pass() -> Self {
        Self {
            valid: true,
            missing: Vec::new(),
            score: 10.0,
        }
    }
}

/// Looks up the field table for `name`. `None` for custom events.
#[must_use]
pub fn requirements(name: &EventName) -> Option<EventRequirements> {
    let table = match name {
        EventName::PageView => fields(&[], &["page_path", "page_title"]),
        EventName::ViewContent => fields(
            &["content_ids", "content_type"],
            &["value", "currency", "content_name", "content_category"],
        ),
        EventName::AddToCart => fields(
            &["content_ids", "content_type", "value", "currency"],
            &["content_name", "content_category", "contents", "num_items"],
        ),
        EventName::InitiateCheckout => fields(
            &["value", "currency"],
            &["content_ids", "contents", "num_items", "content_category"],
        ),
        EventName::Purchase => fields(
            &["value", "currency"],
            &[
                "content_ids",
                "content_type",
                "contents",
                "num_items",
                "order_id",
            ],
        ),
        EventName::Search => fields(
            &["search_string"],
            &["content_ids", "content_category", "value", "currency"],
        ),
        EventName::AddToWishlist => fields(
            &["content_ids"],
            &["value", "currency", "content_name", "content_category"],
        ),
        EventName::Lead => fields(
            &[],
            &[
                "value",
                "currency",
                "content_name",
                "content_category",
                "lead_type",
            ],
        ),
        EventName::CompleteRegistration => {
            fields(&[], &["value", "currency", "content_name", "status"])
        }
        EventName::Contact => fields(&[], &["content_name", "contact_method"]),
        EventName::CustomizeProduct => fields(
            &["content_ids"],
            &["content_name", "content_category", "value", "currency"],
        ),
        EventName::ViewCategory => fields(&["content_category"], &["content_ids", "content_name"]),
        EventName::RemoveFromCart => {
            fields(&["content_ids"], &["value", "currency", "content_name"])
        }
        EventName::Custom(_) => return None,
    };
    Some(table)
}

const fn fields(
    required: &'static [&'static str],
    optional: &'static [&'static str],
) -> EventRequirements {
    EventRequirements { required, optional }
}

/// Checks `payload` against the field table for `name`.
///
/// Required fields earn full credit, optional fields half credit; the total is
/// normalized to 10. A table with no fields at all scores 10.
#[must_use]
pub fn validate_event(name: &EventName, payload: &Payload) -> ValidationReport {
    let Some(req) = requirements(name) else {
        return ValidationReport::pass();
    };

    let missing: Vec<String> = req
        .required
        .iter()
        .filter(|field| !has_value(payload, field))
        .map(|field| (*field).to_owned())
        .collect();

    let required_present = req.required.len() - missing.len();
    let optional_present = req
        .optional
        .iter()
        .filter(|field| has_value(payload, field))
        .count();

    #[allow(clippy::cast_precision_loss)]
    let max = req.required.len() as f64 + 0.5 * req.optional.len() as f64;
    let score = if req.required.is_empty() && req.optional.is_empty() {
        10.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let earned = required_present as f64 + 0.5 * optional_present as f64;
        (earned / max * 100.0).round() / 10.0
    };

    ValidationReport {
        valid: missing.is_empty(),
        missing,
        score,
    }
}
