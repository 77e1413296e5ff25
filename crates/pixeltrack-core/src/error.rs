use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("dedup key encoding failed: {0}")]
    KeyEncoding(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
