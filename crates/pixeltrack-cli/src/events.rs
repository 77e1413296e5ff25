//! Offline event inspection: validation scores and dedup keys.
//!
//! Neither command touches storage or the network, so they run without a
//! configured account.

use clap::Args;
use pixeltrack_core::{
    build_dedup_key, validate_event, Clock, EventName, KeyEncoding, Payload, SystemClock,
};

/// An event name plus its JSON payload.
#[derive(Debug, Args)]
pub struct EventArgs {
    /// Event name (standard, e.g. Purchase, or any custom name)
    #[arg(long)]
    pub event: String,
    /// Event parameters as a JSON object
    #[arg(long, default_value = "{}")]
    pub payload: String,
}

impl EventArgs {
    /// Parses the event name and payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a JSON object.
    pub(crate) fn parse(&self) -> anyhow::Result<(EventName, Payload)> {
        let value: serde_json::Value = serde_json::from_str(&self.payload)
            .map_err(|e| anyhow::anyhow!("--payload is not valid JSON: {e}"))?;
        let serde_json::Value::Object(payload) = value else {
            anyhow::bail!("--payload must be a JSON object");
        };
        Ok((EventName::from(self.event.as_str()), payload))
    }
}

/// Print the validation report for an event as JSON.
///
/// # Errors
///
/// Returns an error if the payload cannot be parsed.
pub(crate) fn run_validate(args: &EventArgs) -> anyhow::Result<()> {
    let (name, payload) = args.parse()?;
    let report = validate_event(&name, &payload);
    if !report.valid {
        tracing::warn!(event_name = %name, missing = ?report.missing, "event is missing required fields");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Print the dedup key for an event.
///
/// # Errors
///
/// Returns an error if the payload cannot be parsed or the encoding is unknown.
pub(crate) fn run_dedup_key(
    args: &EventArgs,
    identifier: Option<&str>,
    encoding: &str,
) -> anyhow::Result<()> {
    let (name, payload) = args.parse()?;
    let encoding: KeyEncoding = encoding.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let key = build_dedup_key(&name, &payload, identifier, encoding, SystemClock.now_ms());
    if key.is_fallback() {
        println!("{key}  (fallback: payload not representable in {encoding:?})");
    } else {
        println!("{key}");
    }
    Ok(())
}
