//! Delivery command handlers for the CLI.
//!
//! Each run builds a tracker over the configured JSON store, so the stable
//! identifier, contact fields and page-view locks carry over between runs.
//! The in-memory dedup ledger lives for one invocation only.

use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use pixeltrack_core::{AppConfig, ContactInfo};
use pixeltrack_tracker::{
    BootstrapOptions, BootstrapStatus, JsonFileStore, TrackOptions, TrackOutcome, Tracker,
};

use crate::events::EventArgs;
use crate::script::TracingScript;

/// Channel switches and visitor context shared by delivering commands.
#[derive(Debug, Args)]
pub struct DeliverArgs {
    /// Skip the in-page script channel
    #[arg(long)]
    pub no_client: bool,
    /// Skip the server channel
    #[arg(long)]
    pub no_server: bool,
    /// Current page URL (fills event_source_url)
    #[arg(long)]
    pub page_url: Option<String>,
    /// Test event code for this run (overrides PIXELTRACK_TEST_EVENT_CODE)
    #[arg(long)]
    pub test_event_code: Option<String>,
    /// Visitor email for matching
    #[arg(long)]
    pub email: Option<String>,
    /// Visitor phone for matching
    #[arg(long)]
    pub phone: Option<String>,
}

impl DeliverArgs {
    fn track_options(&self) -> TrackOptions {
        TrackOptions {
            client: !self.no_client,
            server: !self.no_server,
            test_event_code: self.test_event_code.clone(),
            ..TrackOptions::default()
        }
    }
}

fn open_tracker(config: &AppConfig) -> anyhow::Result<Tracker> {
    let store = JsonFileStore::open(&config.store_path)
        .with_context(|| format!("opening store {}", config.store_path.display()))?;
    let tracker = Tracker::from_config(config, Arc::new(TracingScript), Arc::new(store))
        .context("building tracker")?;
    tracing::info!(
        env = %config.env,
        endpoint = %config.server_endpoint,
        store = %config.store_path.display(),
        "tracker ready"
    );
    Ok(tracker)
}

/// Build a tracker, apply visitor context, and bootstrap the script.
fn start_session(config: &AppConfig, args: &DeliverArgs) -> anyhow::Result<Tracker> {
    let tracker = open_tracker(config)?;
    if let Some(url) = &args.page_url {
        tracker.set_page_url(url.clone());
        tracker.seed_from_url(url);
    }
    if args.email.is_some() || args.phone.is_some() {
        tracker.refresh_user_matching(&ContactInfo {
            email: args.email.clone(),
            phone: args.phone.clone(),
            ..ContactInfo::default()
        });
    }

    if !args.no_client {
        let status = tracker.bootstrap(&BootstrapOptions {
            account_id: config.account_id.clone(),
            test_event_code: args.test_event_code.clone(),
        });
        if let BootstrapStatus::Failed { reason } = status {
            tracing::warn!(%reason, "script bootstrap failed; client deliveries will queue");
        }
    }
    Ok(tracker)
}

fn print_outcome(outcome: &TrackOutcome) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(())
}

/// Track one event, optionally several times to show deduplication.
///
/// # Errors
///
/// Returns an error if the payload cannot be parsed or the tracker cannot be
/// built. Delivery failures are reported in the printed outcome instead.
pub(crate) async fn run_track(
    config: &AppConfig,
    event: &EventArgs,
    args: &DeliverArgs,
    repeat: u32,
) -> anyhow::Result<()> {
    let (name, payload) = event.parse()?;
    let tracker = start_session(config, args)?;

    let mut delivered = 0_u32;
    for _ in 0..repeat.max(1) {
        let outcome = tracker
            .track(name.clone(), payload.clone(), args.track_options())
            .await;
        if outcome.success() {
            delivered += 1;
        }
        print_outcome(&outcome)?;
    }

    tracing::info!(
        event_name = %name,
        calls = repeat.max(1),
        delivered,
        "track finished"
    );
    Ok(())
}

/// Send a forced page view for `path`.
///
/// # Errors
///
/// Returns an error if the tracker cannot be built.
pub(crate) async fn run_page_view(
    config: &AppConfig,
    path: &str,
    args: &DeliverArgs,
) -> anyhow::Result<()> {
    let tracker = start_session(config, args)?;
    match tracker
        .force_page_view(path, pixeltrack_core::Payload::new())
        .await
    {
        Some(outcome) => print_outcome(&outcome)?,
        None => println!("page view for {path} skipped: lock still held"),
    }
    Ok(())
}

/// Persist matching data found in a landing URL.
///
/// # Errors
///
/// Returns an error if the store cannot be opened.
pub(crate) fn run_seed_url(config: &AppConfig, url: &str) -> anyhow::Result<()> {
    let tracker = open_tracker(config)?;
    let seed = tracker.seed_from_url(url);
    if seed.is_empty() {
        println!("nothing to seed from {url}");
    } else {
        println!("{}", serde_json::to_string_pretty(&seed)?);
    }
    Ok(())
}

/// Print the stable identifier and matching fields currently on record.
///
/// # Errors
///
/// Returns an error if the store cannot be opened.
pub(crate) fn run_identity(config: &AppConfig) -> anyhow::Result<()> {
    let tracker = open_tracker(config)?;
    println!("store: {}", config.store_path.display());
    println!("{}", serde_json::to_string_pretty(&tracker.user_data())?);
    Ok(())
}
