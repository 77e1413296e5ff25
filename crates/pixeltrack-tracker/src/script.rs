//! Seam to the third-party in-page tracking script (the client channel).
//!
//! The host provides a [`PixelScript`] that forwards to the real script API
//! (`init`, `set`, `track`). [`RecordingScript`] keeps every call in memory
//! for dry runs and tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use pixeltrack_core::{EventId, EventName, Payload, UserData};

use crate::error::ScriptError;

pub trait PixelScript: Send + Sync {
    /// Adds the script to the page. Called at most once per tracker.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Injection`] if the script cannot be added.
    fn inject(&self) -> Result<(), ScriptError>;

    /// `true` once the script's global API is callable.
    fn is_ready(&self) -> bool;

    /// `init(account_id, matching)`.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError`] if the script rejects the call.
    fn init(&self, account_id: &str, matching: &UserData) -> Result<(), ScriptError>;

    /// `set(key, value)`, used for the test event code.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError`] if the script rejects the call.
    fn set(&self, key: &str, value: &str) -> Result<(), ScriptError>;

    /// `track(event_name, payload, { eventID })`.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError`] if the script is not ready or rejects the call.
    fn track(
        &self,
        event_name: &EventName,
        payload: &Payload,
        event_id: &EventId,
    ) -> Result<(), ScriptError>;
}

/// One call received by a [`RecordingScript`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptCall {
    Init {
        account_id: String,
        matching: UserData,
    },
    Set {
        key: String,
        value: String,
    },
    Track {
        event_name: EventName,
        payload: Payload,
        event_id: EventId,
    },
}

/// In-memory [`PixelScript`] whose readiness is switched by hand.
#[derive(Debug, Default)]
pub struct RecordingScript {
    ready: AtomicBool,
    ready_on_inject: bool,
    injections: Mutex<u32>,
    calls: Mutex<Vec<ScriptCall>>,
}

impl RecordingScript {
    /// A script that becomes ready as soon as it is injected.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready_on_inject: true,
            ..Self::default()
        }
    }

    /// A script that stays unavailable until [`RecordingScript::set_ready`].
    #[must_use]
    pub fn slow_loading() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    #[must_use]
    pub fn injections(&self) -> u32 {
        *lock(&self.injections)
    }

    #[must_use]
    pub fn calls(&self) -> Vec<ScriptCall> {
        lock(&self.calls).clone()
    }

    /// Event ids passed to `track`, in call order.
    #[must_use]
    pub fn tracked_ids(&self) -> Vec<EventId> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                ScriptCall::Track { event_id, .. } => Some(event_id.clone()),
                _ => None,
            })
            .collect()
    }
}

impl PixelScript for RecordingScript {
    fn inject(&self) -> Result<(), ScriptError> {
        *lock(&self.injections) += 1;
        if self.ready_on_inject {
            self.set_ready(true);
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn init(&self, account_id: &str, matching: &UserData) -> Result<(), ScriptError> {
        lock(&self.calls).push(ScriptCall::Init {
            account_id: account_id.to_owned(),
            matching: matching.clone(),
        });
        Ok(())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ScriptError> {
        lock(&self.calls).push(ScriptCall::Set {
            key: key.to_owned(),
            value: value.to_owned(),
        });
        Ok(())
    }

    fn track(
        &self,
        event_name: &EventName,
        payload: &Payload,
        event_id: &EventId,
    ) -> Result<(), ScriptError> {
        if !self.is_ready() {
            return Err(ScriptError::NotReady);
        }
        lock(&self.calls).push(ScriptCall::Track {
            event_name: event_name.clone(),
            payload: payload.clone(),
            event_id: event_id.clone(),
        });
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
