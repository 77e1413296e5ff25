//! Event id generation.
//!
//! Ids have the shape `<timestamp_ms>-<random>-<session>`: the timestamp keeps
//! them roughly sortable, the random part separates events minted in the same
//! millisecond, and the session part separates concurrent sessions that happen
//! to draw the same random value.

use crate::event::EventId;

const RANDOM_LEN: usize = 9;
const SESSION_LEN: usize = 8;

/// Mints [`EventId`]s for one tracker session.
#[derive(Debug, Clone)]
pub struct EventIdGenerator {
    session: String,
}

impl EventIdGenerator {
    /// Draws the session-scoped component once.
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: random_base36(SESSION_LEN),
        }
    }

    #[must_use]
    pub fn session(&self) -> &str {
        &self.session
    }

    #[must_use]
    pub fn generate(&self, now_ms: i64) -> EventId {
        EventId::new(format!(
            "{now_ms}-{}-{}",
            random_base36(RANDOM_LEN),
            self.session
        ))
    }
}

impl Default for EventIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn random_base36(len: usize) -> String {
    let encoded = to_base36(rand::random::<u64>());
    if encoded.len() >= len {
        encoded[encoded.len() - len..].to_owned()
    } else {
        format!("{encoded:0>len$}")
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_owned();
    }
    let mut out = Vec::with_capacity(13);
    while n > 0 {
        // n % 36 < 36, the cast cannot truncate.
        #[allow(clippy::cast_possible_truncation)]
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
