//! Script adapter for running outside a browser.
//!
//! Calls that would reach the in-page tracking script are written to the log
//! instead, so `track` shows exactly what the client channel would receive.

use pixeltrack_core::{EventId, EventName, Payload, UserData};
use pixeltrack_tracker::{PixelScript, ScriptError};

#[derive(Debug, Default)]
pub struct TracingScript;

impl PixelScript for TracingScript {
    fn inject(&self) -> Result<(), ScriptError> {
        tracing::info!("script: inject");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn init(&self, account_id: &str, matching: &UserData) -> Result<(), ScriptError> {
        let matching = serde_json::to_string(matching).map_err(|e| ScriptError::Call {
            call: "init".to_owned(),
            reason: e.to_string(),
        })?;
        tracing::info!(account_id, %matching, "script: init");
        Ok(())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ScriptError> {
        tracing::info!(key, value, "script: set");
        Ok(())
    }

    fn track(
        &self,
        event_name: &EventName,
        payload: &Payload,
        event_id: &EventId,
    ) -> Result<(), ScriptError> {
        tracing::info!(
            event_name = %event_name,
            event_id = %event_id,
            payload = %serde_json::Value::Object(payload.clone()),
            "script: track"
        );
        Ok(())
    }
}
