use std::time::Duration;

use crate::app_config::{AppConfig, Environment};
use crate::dedup_key::KeyEncoding;
use crate::policy::SuppressionPolicy;
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files; useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing and validation live here, decoupled from the process environment,
/// so tests can drive it with a plain `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_ms = |var: &str, default: Duration| -> Result<Duration, ConfigError> {
        let default_ms = default.as_millis().to_string();
        parse_u64(var, &default_ms).map(Duration::from_millis)
    };

    let env = parse_environment(&or_default("PIXELTRACK_ENV", "development"))?;
    let account_id = require("PIXELTRACK_ACCOUNT_ID")?;

    let server_endpoint = or_default(
        "PIXELTRACK_SERVER_ENDPOINT",
        "http://localhost:3000/api/conversions",
    );
    if !(server_endpoint.starts_with("http://") || server_endpoint.starts_with("https://")) {
        return Err(ConfigError::InvalidEnvVar {
            var: "PIXELTRACK_SERVER_ENDPOINT".to_string(),
            reason: format!("'{server_endpoint}' is not an http(s) URL"),
        });
    }

    let test_event_code = lookup("PIXELTRACK_TEST_EVENT_CODE")
        .ok()
        .filter(|v| !v.trim().is_empty());
    let log_level = or_default("PIXELTRACK_LOG_LEVEL", "info");
    let store_path = PathBuf::from(or_default(
        "PIXELTRACK_STORE_PATH",
        "./.pixeltrack/store.json",
    ));
    let request_timeout_secs = parse_u64("PIXELTRACK_REQUEST_TIMEOUT_SECS", "30")?;
    let user_agent = or_default("PIXELTRACK_USER_AGENT", "pixeltrack/0.1 (event-delivery)");

    let key_encoding = or_default("PIXELTRACK_KEY_ENCODING", "latin1")
        .parse::<KeyEncoding>()
        .map_err(|reason| ConfigError::InvalidEnvVar {
            var: "PIXELTRACK_KEY_ENCODING".to_string(),
            reason,
        })?;

    let defaults = SuppressionPolicy::default();
    let policy = SuppressionPolicy {
        dedup_window: parse_ms("PIXELTRACK_DEDUP_WINDOW_MS", defaults.dedup_window)?,
        retention: defaults.retention,
        add_to_cart_same_product: parse_ms(
            "PIXELTRACK_ADD_TO_CART_PRODUCT_WINDOW_MS",
            defaults.add_to_cart_same_product,
        )?,
        add_to_cart_any: parse_ms(
            "PIXELTRACK_ADD_TO_CART_ANY_WINDOW_MS",
            defaults.add_to_cart_any,
        )?,
        page_view_same_page: parse_ms(
            "PIXELTRACK_PAGE_VIEW_PAGE_WINDOW_MS",
            defaults.page_view_same_page,
        )?,
        page_view_any: parse_ms("PIXELTRACK_PAGE_VIEW_ANY_WINDOW_MS", defaults.page_view_any)?,
        lead_same_type: parse_ms("PIXELTRACK_LEAD_TYPE_WINDOW_MS", defaults.lead_same_type)?,
        lead_any: parse_ms("PIXELTRACK_LEAD_ANY_WINDOW_MS", defaults.lead_any)?,
        page_view_lock: defaults.page_view_lock,
    };

    Ok(AppConfig {
        env,
        account_id,
        server_endpoint,
        test_event_code,
        log_level,
        store_path,
        request_timeout_secs,
        user_agent,
        key_encoding,
        policy,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for anything other than
/// `development`, `test`, or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PIXELTRACK_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
