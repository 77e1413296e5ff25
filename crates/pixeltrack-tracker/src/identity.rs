//! Matching identity for the current visitor.
//!
//! Combines browser cookies, persisted contact fields, the stored click id,
//! and the stable identifier into the [`UserData`] both channels send.

use pixeltrack_core::matching::{click_id_from_fbclid, normalize_email, normalize_phone};
use pixeltrack_core::{ContactInfo, UserData};
use reqwest::Url;
use serde::Serialize;

use crate::storage::{self, CLICK_ID_KEY};
use crate::tracker::{SessionState, Tracker};

/// First-party cookies set by the tracking script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowserIds {
    /// `_fbp` browser id.
    pub fbp: Option<String>,
    /// `_fbc` click id cookie; takes precedence over the stored click id.
    pub fbc: Option<String>,
}

/// What [`Tracker::seed_from_url`] picked up from a landing URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UrlSeed {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub click_id: Option<String>,
}

impl UrlSeed {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Tracker {
    pub fn set_browser_ids(&self, ids: BrowserIds) {
        self.state().browser = ids;
    }

    /// Current page, used to fill `event_source_url` and page-view guards.
    pub fn set_page_url(&self, url: impl Into<String>) {
        self.state().page_url = Some(url.into());
    }

    #[must_use]
    pub fn page_url(&self) -> Option<String> {
        self.state().page_url.clone()
    }

    /// Best-available matching fields right now.
    #[must_use]
    pub fn user_data(&self) -> UserData {
        let state = self.state();
        self.user_data_locked(&state)
    }

    pub(crate) fn user_data_locked(&self, state: &SessionState) -> UserData {
        let contact = storage::load_contact(self.inner.store.as_ref());
        self.user_data_with(state, &contact)
    }

    fn user_data_with(&self, state: &SessionState, contact: &ContactInfo) -> UserData {
        let stored_click_id = || {
            self.inner
                .store
                .get(CLICK_ID_KEY)
                .filter(|v| !v.is_empty())
        };
        UserData {
            fbp: state.browser.fbp.clone(),
            fbc: state.browser.fbc.clone().or_else(stored_click_id),
            email: contact.email.clone(),
            phone: contact.phone.clone(),
            external_id: Some(self.stable_identifier()),
            city: contact.city.clone(),
            country: contact.country.clone(),
            first_name: contact.first_name.clone(),
            last_name: contact.last_name.clone(),
            login_id: contact.login_id.clone(),
        }
    }

    /// Merges newly disclosed contact fields into storage and re-runs the
    /// script's `init` with them (without injecting again).
    ///
    /// Before bootstrap the fields are only persisted; bootstrap picks them
    /// up. Returns the matching data now in effect.
    pub fn refresh_user_matching(&self, contact: &ContactInfo) -> UserData {
        let store = self.inner.store.as_ref();
        let merged = storage::load_contact(store).merged_with(&contact.normalized());
        if let Err(err) = storage::save_contact(store, &merged) {
            tracing::warn!(error = %err, "could not persist contact fields");
        }

        let state = self.state();
        let matching = self.user_data_with(&state, &merged);
        match (&state.account_id, state.script_initialized) {
            (Some(account_id), true) => {
                if let Err(err) = self.inner.script.init(account_id, &matching) {
                    tracing::warn!(error = %err, "re-initializing tracking script failed");
                } else {
                    tracing::debug!("tracking script re-initialized with updated matching");
                }
            }
            _ => tracing::debug!("contact stored, script not initialized yet"),
        }
        matching
    }

    /// Picks up `email`, `phone`, and `fbclid` from a landing URL.
    ///
    /// Contact values are normalized and persisted. `fbclid` becomes a click
    /// id only when none is stored yet. Unparseable URLs are logged and
    /// ignored.
    pub fn seed_from_url(&self, url: &str) -> UrlSeed {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(url, error = %err, "could not parse landing url");
                return UrlSeed::default();
            }
        };

        let mut seed = UrlSeed::default();
        let mut fbclid = None;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "email" => seed.email = normalize_email(&value),
                "phone" => seed.phone = normalize_phone(&value),
                "fbclid" => fbclid = Some(value.into_owned()),
                _ => {}
            }
        }

        if seed.email.is_some() || seed.phone.is_some() {
            let contact = ContactInfo {
                email: seed.email.clone(),
                phone: seed.phone.clone(),
                ..ContactInfo::default()
            };
            if let Err(err) = storage::save_contact(self.inner.store.as_ref(), &contact) {
                tracing::warn!(error = %err, "could not persist contact from landing url");
            }
        }

        let store = &self.inner.store;
        let has_click_id = store.get(CLICK_ID_KEY).is_some_and(|v| !v.is_empty());
        if !has_click_id {
            let now = self.inner.clock.now_ms();
            if let Some(click_id) = fbclid.and_then(|f| click_id_from_fbclid(&f, now)) {
                match store.set(CLICK_ID_KEY, &click_id) {
                    Ok(()) => seed.click_id = Some(click_id),
                    Err(err) => tracing::warn!(error = %err, "could not persist click id"),
                }
            }
        }

        if !seed.is_empty() {
            tracing::debug!(
                email = seed.email.is_some(),
                phone = seed.phone.is_some(),
                click_id = seed.click_id.is_some(),
                "seeded matching data from landing url"
            );
        }
        seed
    }
}
