//! Stateful event delivery: dedup ledger, pending queue, script bootstrap,
//! and the server channel.

pub mod error;
pub mod identity;
pub mod ledger;
pub mod queue;
pub mod script;
pub mod server;
pub mod storage;
pub mod tracker;
pub mod types;

pub use error::{ScriptError, StoreError, TrackerError};
pub use identity::{BrowserIds, UrlSeed};
pub use ledger::{Admission, DedupLedger, LedgerEntry, Occurrence};
pub use queue::{PendingEvent, PendingQueue, PendingState, QueueStats, RetrySchedule};
pub use script::{PixelScript, RecordingScript, ScriptCall};
pub use server::{augment_custom_data, ServerClient};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};
pub use tracker::{
    BootstrapOptions, BootstrapStatus, ClientDelivery, ServerDelivery, TrackOptions, TrackOutcome,
    Tracker, TrackerBuilder,
};
pub use types::{ServerEvent, ServerResponse, TrackingData};
