//! Pure domain logic for pixel event tracking: configuration, the event
//! vocabulary, parameter validation, dedup keys, event ids, and suppression
//! policy. Nothing in this crate performs I/O beyond reading env vars.

pub mod app_config;
pub mod clock;
pub mod config;
pub mod dedup_key;
pub mod error;
pub mod event;
pub mod event_id;
pub mod matching;
pub mod policy;
pub mod validation;

pub use app_config::{AppConfig, Environment};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_app_config, load_app_config_from_env};
pub use dedup_key::{build_dedup_key, DedupKey, KeyEncoding};
pub use error::{ConfigError, CoreError};
pub use event::{EventId, EventName, Payload};
pub use event_id::EventIdGenerator;
pub use matching::{ContactInfo, UserData};
pub use policy::SuppressionPolicy;
pub use validation::{validate_event, ValidationReport};
