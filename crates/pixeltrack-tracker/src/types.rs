//! Wire types for the first-party conversions endpoint.
//!
//! The endpoint accepts one event per `POST` and relays it to the ad
//! platform's server-side API, using `event_id` to reconcile with the copy the
//! in-page script sent.

use pixeltrack_core::{EventId, EventName, Payload, UserData};
use serde::{Deserialize, Serialize};

/// Request body for one server-channel delivery.
#[derive(Debug, Clone, Serialize)]
pub struct ServerEvent {
    pub event_name: EventName,
    pub event_id: EventId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_event_code: Option<String>,
    pub user_data: UserData,
    pub custom_data: Payload,
}

/// Response envelope returned by the endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerResponse {
    pub success: bool,
    #[serde(default)]
    pub deduplication_key: Option<String>,
    #[serde(default)]
    pub tracking_data: Option<TrackingData>,
    /// Human-readable reason when `success` is `false`.
    #[serde(default, alias = "message")]
    pub error: Option<String>,
}

/// Quality diagnostics the endpoint echoes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingData {
    #[serde(default)]
    pub match_quality_score: Option<f64>,
    #[serde(default)]
    pub event_validation_score: Option<f64>,
}
