use std::path::PathBuf;

use crate::dedup_key::KeyEncoding;
use crate::policy::SuppressionPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    /// Ad-platform account the in-page script is initialized with.
    pub account_id: String,
    /// First-party endpoint receiving server-channel events.
    pub server_endpoint: String,
    pub test_event_code: Option<String>,
    pub log_level: String,
    /// JSON file backing durable storage (identifier, contact, locks).
    pub store_path: PathBuf,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub key_encoding: KeyEncoding,
    pub policy: SuppressionPolicy,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("account_id", &"[redacted]")
            .field("server_endpoint", &self.server_endpoint)
            .field(
                "test_event_code",
                &self.test_event_code.as_ref().map(|_| "[redacted]"),
            )
            .field("log_level", &self.log_level)
            .field("store_path", &self.store_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("key_encoding", &self.key_encoding)
            .field("policy", &self.policy)
            .finish()
    }
}
