//! Session-scoped tracker: validation, deduplication, and two-channel delivery.
//!
//! A [`Tracker`] owns everything that used to be page-global: the dedup
//! ledger, the pending queue, and the script initialization guard. Clones
//! share one session. State sits behind a mutex that is never held across an
//! `.await`, so each call mutates it in one uninterrupted step.
//!
//! Nothing here returns an error to the caller. Every failure is logged and
//! reported as a failed channel in [`TrackOutcome`].

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use pixeltrack_core::policy::window_ms;
use pixeltrack_core::{
    build_dedup_key, validate_event, AppConfig, Clock, DedupKey, EventId, EventIdGenerator,
    EventName, KeyEncoding, Payload, SuppressionPolicy, SystemClock, ValidationReport,
};
use serde::Serialize;

use crate::error::TrackerError;
use crate::identity::BrowserIds;
use crate::ledger::{DedupLedger, Occurrence};
use crate::queue::{PendingEvent, PendingQueue, QueueStats, RetrySchedule};
use crate::script::PixelScript;
use crate::server::{augment_custom_data, ServerClient};
use crate::storage::{self, page_view_lock_key, KeyValueStore};
use crate::types::{ServerEvent, ServerResponse};

/// Per-call delivery switches.
#[derive(Debug, Clone)]
pub struct TrackOptions {
    pub client: bool,
    pub server: bool,
    /// Overrides the tracker-wide test event code for this call.
    pub test_event_code: Option<String>,
    /// Overrides the policy's dedup window for this call.
    pub dedup_window: Option<Duration>,
    /// Record the occurrence without checking it for duplicates.
    pub bypass_dedup: bool,
}

impl Default for TrackOptions {
    fn default() -> Self {
        Self {
            client: true,
            server: true,
            test_event_code: None,
            dedup_window: None,
            bypass_dedup: false,
        }
    }
}

impl TrackOptions {
    #[must_use]
    pub fn client_only() -> Self {
        Self {
            server: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn server_only() -> Self {
        Self {
            client: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClientDelivery {
    Disabled,
    /// Duplicate: the script already has this event id.
    Skipped,
    Sent,
    /// Waiting for the script; accepted for delivery.
    Queued { seq: u64 },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServerDelivery {
    /// Turned off for the call, or no endpoint configured.
    Disabled,
    /// Duplicate whose server copy was already confirmed, or a call
    /// suppressed before its key ever fired.
    Skipped,
    Delivered { response: ServerResponse },
    Failed { reason: String },
}

/// What happened to one [`Tracker::track`] call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackOutcome {
    pub event_name: EventName,
    /// `None` only when validation aborted the call.
    pub event_id: Option<EventId>,
    pub dedup_key: Option<String>,
    pub validation: ValidationReport,
    pub duplicate: bool,
    pub client: ClientDelivery,
    pub server: ServerDelivery,
}

impl TrackOutcome {
    /// `true` if at least one channel sent or accepted the event on this call.
    #[must_use]
    pub fn success(&self) -> bool {
        matches!(
            self.client,
            ClientDelivery::Sent | ClientDelivery::Queued { .. }
        ) || matches!(self.server, ServerDelivery::Delivered { .. })
    }

    fn invalid(event_name: EventName, validation: ValidationReport) -> Self {
        Self {
            event_name,
            event_id: None,
            dedup_key: None,
            validation,
            duplicate: false,
            client: ClientDelivery::Disabled,
            server: ServerDelivery::Disabled,
        }
    }
}

/// Arguments for [`Tracker::bootstrap`].
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub account_id: String,
    pub test_event_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BootstrapStatus {
    Initialized { flushed: usize },
    AlreadyInitialized,
    Failed { reason: String },
}

pub(crate) struct SessionState {
    pub(crate) ledger: DedupLedger,
    pub(crate) queue: PendingQueue,
    pub(crate) script_injected: bool,
    pub(crate) script_initialized: bool,
    pub(crate) account_id: Option<String>,
    pub(crate) browser: BrowserIds,
    pub(crate) page_url: Option<String>,
}

pub(crate) struct Inner {
    pub(crate) script: Arc<dyn PixelScript>,
    pub(crate) store: Arc<dyn KeyValueStore>,
    pub(crate) server: Option<ServerClient>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: EventIdGenerator,
    pub(crate) policy: SuppressionPolicy,
    pub(crate) key_encoding: KeyEncoding,
    pub(crate) test_event_code: Option<String>,
    pub(crate) schedule: RetrySchedule,
    pub(crate) identifier: OnceLock<String>,
    pub(crate) state: Mutex<SessionState>,
}

/// Event tracker for one visitor session. Cheap to clone.
#[derive(Clone)]
pub struct Tracker {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("session", &self.inner.ids.session())
            .field("server", &self.inner.server.as_ref().map(ServerClient::endpoint))
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

pub struct TrackerBuilder {
    script: Arc<dyn PixelScript>,
    store: Arc<dyn KeyValueStore>,
    server: Option<ServerClient>,
    clock: Arc<dyn Clock>,
    policy: SuppressionPolicy,
    key_encoding: KeyEncoding,
    test_event_code: Option<String>,
    schedule: RetrySchedule,
}

impl TrackerBuilder {
    #[must_use]
    pub fn server(mut self, server: ServerClient) -> Self {
        self.server = Some(server);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: SuppressionPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn key_encoding(mut self, encoding: KeyEncoding) -> Self {
        self.key_encoding = encoding;
        self
    }

    #[must_use]
    pub fn test_event_code(mut self, code: Option<String>) -> Self {
        self.test_event_code = code;
        self
    }

    #[must_use]
    pub fn retry_schedule(mut self, schedule: RetrySchedule) -> Self {
        self.schedule = schedule;
        self
    }

    #[must_use]
    pub fn build(self) -> Tracker {
        let state = SessionState {
            ledger: DedupLedger::new(self.policy.clone()),
            queue: PendingQueue::new(),
            script_injected: false,
            script_initialized: false,
            account_id: None,
            browser: BrowserIds::default(),
            page_url: None,
        };
        Tracker {
            inner: Arc::new(Inner {
                script: self.script,
                store: self.store,
                server: self.server,
                clock: self.clock,
                ids: EventIdGenerator::new(),
                policy: self.policy,
                key_encoding: self.key_encoding,
                test_event_code: self.test_event_code,
                schedule: self.schedule,
                identifier: OnceLock::new(),
                state: Mutex::new(state),
            }),
        }
    }
}

impl Tracker {
    #[must_use]
    pub fn builder(script: Arc<dyn PixelScript>, store: Arc<dyn KeyValueStore>) -> TrackerBuilder {
        TrackerBuilder {
            script,
            store,
            server: None,
            clock: Arc::new(SystemClock),
            policy: SuppressionPolicy::default(),
            key_encoding: KeyEncoding::default(),
            test_event_code: None,
            schedule: RetrySchedule::default(),
        }
    }

    /// Builds a tracker wired to the configured server endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] if the server client cannot be constructed.
    pub fn from_config(
        config: &AppConfig,
        script: Arc<dyn PixelScript>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, TrackerError> {
        let server = ServerClient::new(
            &config.server_endpoint,
            config.request_timeout_secs,
            &config.user_agent,
        )?;
        Ok(Self::builder(script, store)
            .server(server)
            .policy(config.policy.clone())
            .key_encoding(config.key_encoding)
            .test_event_code(config.test_event_code.clone())
            .build())
    }

    /// Validates, deduplicates, and delivers one event.
    ///
    /// A duplicate reuses the stored event id and skips the client channel.
    /// If the server never confirmed that id, the duplicate still makes one
    /// server delivery so at least one authoritative copy lands.
    pub async fn track(
        &self,
        event_name: EventName,
        payload: Payload,
        options: TrackOptions,
    ) -> TrackOutcome {
        let validation = validate_event(&event_name, &payload);
        if !validation.valid {
            tracing::warn!(
                event_name = %event_name,
                missing = ?validation.missing,
                score = validation.score,
                "event failed validation, not delivered"
            );
            return TrackOutcome::invalid(event_name, validation);
        }

        let identifier = self.stable_identifier();
        let now = self.inner.clock.now_ms();
        let key = build_dedup_key(
            &event_name,
            &payload,
            Some(&identifier),
            self.inner.key_encoding,
            now,
        );
        let window = options.dedup_window.unwrap_or(self.inner.policy.dedup_window);

        let (admission, client, page_url) = {
            let mut state = self.state();
            let page_url = state.page_url.clone();
            let occurrence = Occurrence {
                key: &key,
                event_name: &event_name,
                payload: &payload,
                page_url: page_url.as_deref(),
            };
            let admission = state.ledger.admit(
                &occurrence,
                window,
                options.bypass_dedup,
                now,
                || self.inner.ids.generate(now),
            );
            let client = match (options.client, admission.duplicate) {
                (false, _) => ClientDelivery::Disabled,
                (true, true) => ClientDelivery::Skipped,
                (true, false) => {
                    self.deliver_client(&mut state, &event_name, &payload, &admission.event_id)
                }
            };
            (admission, client, page_url)
        };

        if let ClientDelivery::Queued { seq } = client {
            self.spawn_retry_driver(seq);
        }

        let server = match &self.inner.server {
            Some(server) if options.server => {
                // A guard-suppressed call never fired, so there is no earlier
                // server copy to complete.
                if admission.duplicate && (admission.server_confirmed || !admission.reused_id) {
                    ServerDelivery::Skipped
                } else {
                    if admission.duplicate {
                        tracing::debug!(
                            event_name = %event_name,
                            event_id = %admission.event_id,
                            "duplicate without server confirmation, delivering server copy"
                        );
                    }
                    self.deliver_server(
                        server,
                        &event_name,
                        &payload,
                        &admission.event_id,
                        &key,
                        options.test_event_code.as_deref(),
                        page_url.as_deref(),
                    )
                    .await
                }
            }
            _ => ServerDelivery::Disabled,
        };

        let outcome = TrackOutcome {
            event_name,
            event_id: Some(admission.event_id),
            dedup_key: Some(key.as_str().to_owned()),
            validation,
            duplicate: admission.duplicate,
            client,
            server,
        };
        tracing::debug!(
            event_name = %outcome.event_name,
            dedup_key = %key,
            duplicate = outcome.duplicate,
            success = outcome.success(),
            "event processed"
        );
        outcome
    }

    /// Sends a page view for `path`, at most once per path per lock window.
    ///
    /// The lock lives in durable storage, so it holds across reloads; the
    /// in-memory ledger is bypassed. Returns `None` while the lock is held.
    pub async fn force_page_view(&self, path: &str, mut payload: Payload) -> Option<TrackOutcome> {
        let store = &self.inner.store;
        let now = self.inner.clock.now_ms();
        let lock_key = page_view_lock_key(path);

        let locked_at = store.get(&lock_key).and_then(|v| v.parse::<i64>().ok());
        if let Some(at) = locked_at {
            if now - at < window_ms(self.inner.policy.page_view_lock) {
                tracing::debug!(path, "page view lock held, skipping forced page view");
                return None;
            }
        }
        if let Err(err) = store.set(&lock_key, &now.to_string()) {
            tracing::warn!(path, error = %err, "could not persist page view lock");
        }

        payload
            .entry("page_path")
            .or_insert_with(|| serde_json::Value::from(path));
        let options = TrackOptions {
            bypass_dedup: true,
            ..TrackOptions::default()
        };
        Some(self.track(EventName::PageView, payload, options).await)
    }

    /// Injects and initializes the tracking script, once per tracker.
    ///
    /// On success any queued events are flushed in the order they were
    /// produced (if the script is already callable; otherwise the pending
    /// retry ticks pick them up).
    pub fn bootstrap(&self, options: &BootstrapOptions) -> BootstrapStatus {
        let script = &self.inner.script;
        let mut state = self.state();

        if state.script_initialized {
            tracing::debug!("tracking script already initialized");
            return BootstrapStatus::AlreadyInitialized;
        }

        if !state.script_injected {
            if let Err(err) = script.inject() {
                tracing::warn!(error = %err, "tracking script injection failed");
                return BootstrapStatus::Failed {
                    reason: err.to_string(),
                };
            }
            state.script_injected = true;
        }

        let matching = self.user_data_locked(&state);
        if let Err(err) = script.init(&options.account_id, &matching) {
            tracing::warn!(error = %err, "tracking script init failed");
            return BootstrapStatus::Failed {
                reason: err.to_string(),
            };
        }

        let test_code = options
            .test_event_code
            .as_deref()
            .or(self.inner.test_event_code.as_deref());
        if let Some(code) = test_code {
            if let Err(err) = script.set("test_event_code", code) {
                tracing::warn!(error = %err, "could not set test event code");
            }
        }

        state.account_id = Some(options.account_id.clone());
        state.script_initialized = true;

        let flushed = if script.is_ready() {
            self.flush_locked(&mut state)
        } else {
            0
        };
        tracing::info!(
            flushed,
            matched_fields = !matching.is_empty(),
            "tracking script initialized"
        );
        BootstrapStatus::Initialized { flushed }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state().script_initialized
    }

    /// Events still waiting for the script, oldest first.
    #[must_use]
    pub fn pending_events(&self) -> Vec<PendingEvent> {
        self.state().queue.iter().cloned().collect()
    }

    #[must_use]
    pub fn queue_stats(&self) -> QueueStats {
        self.state().queue.stats()
    }

    /// Ledger entries currently remembered.
    #[must_use]
    pub fn ledger_len(&self) -> usize {
        self.state().ledger.len()
    }

    #[must_use]
    pub fn is_server_confirmed(&self, key: &DedupKey) -> bool {
        self.state().ledger.is_server_confirmed(key)
    }

    /// The stable identifier anchoring dedup keys and `external_id`.
    #[must_use]
    pub fn stable_identifier(&self) -> String {
        self.inner
            .identifier
            .get_or_init(|| storage::stable_identifier(self.inner.store.as_ref()))
            .clone()
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver_client(
        &self,
        state: &mut SessionState,
        event_name: &EventName,
        payload: &Payload,
        event_id: &EventId,
    ) -> ClientDelivery {
        let script = &self.inner.script;
        if state.script_initialized && script.is_ready() {
            if !state.queue.is_empty() {
                self.flush_locked(state);
            }
            if state.queue.is_empty() {
                return match script.track(event_name, payload, event_id) {
                    Ok(()) => ClientDelivery::Sent,
                    Err(err) => {
                        tracing::warn!(
                            event_name = %event_name,
                            event_id = %event_id,
                            error = %err,
                            "client delivery failed"
                        );
                        ClientDelivery::Failed {
                            reason: err.to_string(),
                        }
                    }
                };
            }
        }

        let seq = state
            .queue
            .enqueue(event_name.clone(), payload.clone(), event_id.clone());
        tracing::debug!(
            event_name = %event_name,
            event_id = %event_id,
            seq,
            "tracking script not ready, event queued"
        );
        ClientDelivery::Queued { seq }
    }

    #[allow(clippy::too_many_arguments)]
    async fn deliver_server(
        &self,
        server: &ServerClient,
        event_name: &EventName,
        payload: &Payload,
        event_id: &EventId,
        key: &DedupKey,
        test_event_code: Option<&str>,
        page_url: Option<&str>,
    ) -> ServerDelivery {
        let event = ServerEvent {
            event_name: event_name.clone(),
            event_id: event_id.clone(),
            test_event_code: test_event_code
                .map(ToOwned::to_owned)
                .or_else(|| self.inner.test_event_code.clone()),
            user_data: self.user_data(),
            custom_data: augment_custom_data(payload, page_url),
        };

        match server.send(&event).await {
            Ok(response) => {
                self.state().ledger.mark_server_confirmed(key);
                tracing::debug!(
                    event_name = %event_name,
                    event_id = %event_id,
                    match_quality = ?response.tracking_data.as_ref().and_then(|t| t.match_quality_score),
                    "server delivery confirmed"
                );
                ServerDelivery::Delivered { response }
            }
            Err(err) => {
                tracing::warn!(
                    event_name = %event_name,
                    event_id = %event_id,
                    error = %err,
                    "server delivery failed"
                );
                ServerDelivery::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Flushes the queue into the script; returns how many were delivered.
    fn flush_locked(&self, state: &mut SessionState) -> usize {
        let script = &self.inner.script;
        let delivered = state
            .queue
            .flush(|e| script.track(&e.event_name, &e.payload, &e.event_id));
        if !delivered.is_empty() {
            tracing::info!(
                delivered = delivered.len(),
                remaining = state.queue.len(),
                "flushed pending events to tracking script"
            );
        }
        delivered.len()
    }

    fn spawn_retry_driver(&self, seq: u64) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let tracker = self.clone();
                handle.spawn(async move { tracker.drive_retries(seq).await });
            }
            Err(_) => {
                tracing::warn!(seq, "no async runtime, queued event waits for bootstrap flush");
            }
        }
    }

    /// Walks the retry schedule for one queued event.
    ///
    /// Ends early once the event has left the queue, whether this driver
    /// flushed it or something else did.
    async fn drive_retries(self, seq: u64) {
        let max_attempts = self.inner.schedule.max_attempts();
        for delay in self.inner.schedule.delays() {
            tokio::time::sleep(delay).await;
            if self.retry_tick(seq, delay) {
                return;
            }
        }
        if let Some(expired) = self.state().queue.exhaust(seq) {
            tracing::warn!(
                event_name = %expired.event_name,
                event_id = %expired.event_id,
                attempts = expired.attempts,
                max_attempts,
                "tracking script never became ready, dropping client delivery"
            );
        }
    }

    /// One scheduled retry. Returns `true` when `seq` needs no more ticks.
    fn retry_tick(&self, seq: u64, delay: Duration) -> bool {
        let mut state = self.state();
        let Some(attempt) = state.queue.record_attempt(seq) else {
            return true;
        };
        if state.script_initialized && self.inner.script.is_ready() {
            self.flush_locked(&mut state);
            return !state.queue.contains(seq);
        }
        tracing::debug!(
            seq,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "tracking script not ready after retry tick"
        );
        false
    }
}

#[cfg(test)]
#[path = "tracker_test.rs"]
mod tests;
