//! Configuration module for environment variable parsing.
//!
//! Every binary reads its settings from the environment. The CLI layers its
//! flags on top of the values loaded here.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// AWS region hosting the SES endpoint.
    /// Credentials are resolved by the AWS provider chain, not read here.
    pub aws_region: String,

    /// Optional SES endpoint override (e.g. a local SES emulator)
    pub ses_endpoint: Option<String>,

    /// Display name used in the From header
    pub sender_name: String,

    /// Sender address used in the From header and as the SES source
    pub sender_email: String,

    /// Maximum send attempts per rolling one-second window
    pub rate_limit_per_second: usize,

    /// Number of recipients dispatched concurrently (1 = strictly sequential)
    pub concurrency: usize,

    /// Directory that per-recipient attachment names are resolved against
    pub attachment_dir: Option<PathBuf>,

    /// Per-operation timeout in milliseconds for the transport client
    pub request_timeout_ms: u64,

    // =========================================================================
    // Web Control Plane
    // =========================================================================

    /// Port for the control plane to listen on
    pub port: u16,

    /// Shared token required in `X-Control-Auth` for mutating routes
    pub control_auth_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "ap-south-1".to_string()),

            ses_endpoint: non_empty("SES_ENDPOINT"),

            sender_name: env::var("SENDER_NAME").unwrap_or_else(|_| "E-Cell Team".to_string()),

            sender_email: env::var("SENDER_EMAIL")
                .unwrap_or_else(|_| "no-reply@ecell.in".to_string()),

            rate_limit_per_second: parse_at_least_one("RATE_LIMIT_PER_SECOND", 50),

            concurrency: parse_at_least_one("CONCURRENCY", 1),

            attachment_dir: non_empty("ATTACHMENT_DIR").map(PathBuf::from),

            request_timeout_ms: parse_or("REQUEST_TIMEOUT_MS", 10_000),

            port: parse_or("PORT", 8080),

            control_auth_token: non_empty("CONTROL_AUTH_TOKEN"),
        }
    }

    /// Transport request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Read a variable, treating blank values as unset.
fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a variable, falling back to `default` when unset or malformed.
fn parse_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

/// Parse a count that must be at least one.
fn parse_at_least_one(name: &str, default: usize) -> usize {
    let value = parse_or(name, default);
    if value == 0 {
        warn!(env_var = name, clamped_to = 1, "Zero is not allowed, clamping");
        return 1;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_valid() {
        env::set_var("BULKMAIL_TEST_PORT", "9090");
        let result: u16 = parse_or("BULKMAIL_TEST_PORT", 8080);
        assert_eq!(result, 9090);
        env::remove_var("BULKMAIL_TEST_PORT");
    }

    #[test]
    fn test_parse_or_malformed_uses_default() {
        env::set_var("BULKMAIL_TEST_TIMEOUT", "soon");
        let result: u64 = parse_or("BULKMAIL_TEST_TIMEOUT", 42);
        assert_eq!(result, 42);
        env::remove_var("BULKMAIL_TEST_TIMEOUT");
    }

    #[test]
    fn test_parse_at_least_one_clamps_zero() {
        env::set_var("BULKMAIL_TEST_RATE", "0");
        assert_eq!(parse_at_least_one("BULKMAIL_TEST_RATE", 50), 1);
        env::remove_var("BULKMAIL_TEST_RATE");
    }

    #[test]
    fn test_non_empty_ignores_blank() {
        env::set_var("BULKMAIL_TEST_BLANK", "   ");
        assert_eq!(non_empty("BULKMAIL_TEST_BLANK"), None);
        env::remove_var("BULKMAIL_TEST_BLANK");
    }
}
