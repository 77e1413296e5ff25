//! In-memory deduplication ledger.
//!
//! Remembers, per dedup key, when the event last fired, which event id it was
//! given, and whether the server channel ever confirmed it. Category guards
//! add stricter, cross-key windows for events that storefront UIs tend to
//! fire twice (add-to-cart buttons, page hooks, lead forms).

use std::collections::HashMap;
use std::time::Duration;

use pixeltrack_core::event::{primary_content_id, string_field};
use pixeltrack_core::policy::window_ms;
use pixeltrack_core::{DedupKey, EventId, EventName, Payload, SuppressionPolicy};

/// What the ledger knows about one dedup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub last_fired_ms: i64,
    pub event_id: Option<EventId>,
    pub server_confirmed: bool,
}

/// One call to check against the ledger.
#[derive(Debug, Clone, Copy)]
pub struct Occurrence<'a> {
    pub key: &'a DedupKey,
    pub event_name: &'a EventName,
    pub payload: &'a Payload,
    /// Current page, used when a page view carries no page of its own.
    pub page_url: Option<&'a str>,
}

/// Result of [`DedupLedger::admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub event_id: EventId,
    pub duplicate: bool,
    /// The id was stored by an earlier firing of the same key.
    pub reused_id: bool,
    pub server_confirmed: bool,
}

#[derive(Debug, Default)]
pub struct DedupLedger {
    entries: HashMap<String, LedgerEntry>,
    guards: HashMap<String, i64>,
    policy: SuppressionPolicy,
}

impl DedupLedger {
    #[must_use]
    pub fn new(policy: SuppressionPolicy) -> Self {
        Self {
            entries: HashMap::new(),
            guards: HashMap::new(),
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &SuppressionPolicy {
        &self.policy
    }

    /// Duplicate check plus event id assignment for one call.
    ///
    /// With `bypass` set the occurrence is recorded without being checked.
    /// The stored event id is reused whenever the key's entry survives;
    /// otherwise `mint` is called once. A call suppressed only by a category
    /// guard never fired, so it leaves no entry behind and gets a transient id.
    pub fn admit(
        &mut self,
        occurrence: &Occurrence<'_>,
        window: Duration,
        bypass: bool,
        now_ms: i64,
        mint: impl FnOnce() -> EventId,
    ) -> Admission {
        let duplicate = if bypass {
            self.sweep(now_ms);
            self.record(occurrence, now_ms);
            false
        } else {
            self.is_duplicate(occurrence, window, now_ms)
        };

        // Non-duplicates were just recorded, so a missing entry means the
        // key was suppressed by a category guard before it ever fired.
        let Some(entry) = self.entries.get_mut(occurrence.key.as_str()) else {
            return Admission {
                event_id: mint(),
                duplicate,
                reused_id: false,
                server_confirmed: false,
            };
        };
        let reused_id = entry.event_id.is_some();
        let event_id = entry.event_id.get_or_insert_with(mint).clone();

        Admission {
            event_id,
            duplicate,
            reused_id,
            server_confirmed: entry.server_confirmed,
        }
    }

    /// `true` if the occurrence repeats one seen inside its window.
    ///
    /// Sweeps expired entries first. A non-duplicate is recorded at `now_ms`;
    /// a duplicate leaves every timestamp untouched, so windows are measured
    /// from the first firing.
    pub fn is_duplicate(&mut self, occurrence: &Occurrence<'_>, window: Duration, now_ms: i64) -> bool {
        self.sweep(now_ms);

        let window = window_ms(window);
        let seen_recently = self
            .entries
            .get(occurrence.key.as_str())
            .is_some_and(|e| now_ms - e.last_fired_ms < window);
        if seen_recently {
            tracing::debug!(dedup_key = %occurrence.key, "duplicate within dedup window");
            return true;
        }

        for (guard, guard_window) in self.category_guards(occurrence) {
            let hit = self
                .guards
                .get(&guard)
                .is_some_and(|fired| now_ms - fired < window_ms(guard_window));
            if hit {
                tracing::debug!(dedup_key = %occurrence.key, guard = %guard, "duplicate within category window");
                return true;
            }
        }

        self.record(occurrence, now_ms);
        false
    }

    #[must_use]
    pub fn get(&self, key: &DedupKey) -> Option<&LedgerEntry> {
        self.entries.get(key.as_str())
    }

    #[must_use]
    pub fn is_server_confirmed(&self, key: &DedupKey) -> bool {
        self.get(key).is_some_and(|e| e.server_confirmed)
    }

    pub fn mark_server_confirmed(&mut self, key: &DedupKey) {
        if let Some(entry) = self.entries.get_mut(key.as_str()) {
            entry.server_confirmed = true;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record(&mut self, occurrence: &Occurrence<'_>, now_ms: i64) {
        self.entries
            .entry(occurrence.key.as_str().to_owned())
            .and_modify(|e| e.last_fired_ms = now_ms)
            .or_insert_with(|| LedgerEntry {
                last_fired_ms: now_ms,
                event_id: None,
                server_confirmed: false,
            });
        for (guard, _) in self.category_guards(occurrence) {
            self.guards.insert(guard, now_ms);
        }
    }

    fn sweep(&mut self, now_ms: i64) {
        let horizon = now_ms - window_ms(self.policy.retention);
        self.entries.retain(|_, e| e.last_fired_ms >= horizon);
        self.guards.retain(|_, fired| *fired >= horizon);
    }

    fn category_guards(&self, occurrence: &Occurrence<'_>) -> Vec<(String, Duration)> {
        let p = &self.policy;
        let payload = occurrence.payload;
        match occurrence.event_name {
            EventName::AddToCart => {
                let mut guards = Vec::with_capacity(2);
                if let Some(product) = primary_content_id(payload) {
                    guards.push((
                        format!("AddToCart:product:{product}"),
                        p.add_to_cart_same_product,
                    ));
                }
                guards.push(("AddToCart:any".to_owned(), p.add_to_cart_any));
                guards
            }
            EventName::PageView => {
                let page = string_field(payload, "page_path")
                    .or_else(|| string_field(payload, "event_source_url"))
                    .or_else(|| occurrence.page_url.map(ToOwned::to_owned))
                    .map_or_else(|| "/".to_owned(), |p| logical_page(&p));
                vec![
                    (format!("PageView:page:{page}"), p.page_view_same_page),
                    ("PageView:any".to_owned(), p.page_view_any),
                ]
            }
            EventName::Lead => {
                let lead_type = string_field(payload, "lead_type")
                    .or_else(|| string_field(payload, "content_name"))
                    .unwrap_or_else(|| "default".to_owned());
                vec![
                    (format!("Lead:type:{lead_type}"), p.lead_same_type),
                    ("Lead:any".to_owned(), p.lead_any),
                ]
            }
            _ => Vec::new(),
        }
    }
}

/// Strips query string and fragment so tracking parameters do not make the
/// same page look new.
fn logical_page(raw: &str) -> String {
    let end = raw.find(['?', '#']).unwrap_or(raw.len());
    raw[..end].to_owned()
}

#[cfg(test)]
#[path = "ledger_test.rs"]
mod tests;
