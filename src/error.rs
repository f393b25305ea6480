use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::PartialFailure;

/// Why one (account, query) fetch produced no data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("authentication failed (token invalid or expired)")]
    AuthFailure,
    #[error("rate limited{}", reset_suffix(.0))]
    RateLimited(Option<DateTime<Utc>>),
    #[error("network error: {0}")]
    Network(String),
    #[error("GitHub API error (HTTP {0}): {1}")]
    ApiError(u16, String),
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
    #[error("token not found in environment variable {0}")]
    MissingToken(String),
}

fn reset_suffix(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(at) => format!(" until {}", at.format("%H:%M:%S UTC")),
        None => String::new(),
    }
}

impl FetchError {
    /// Whether the next refresh cycle may succeed without user intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited(_)
                | FetchError::Network(_)
                | FetchError::ApiError(..)
                | FetchError::InvalidResponse(_)
        )
    }
}

/// Raised by the aggregator only when every (account, query) pair failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatherError {
    #[error("all {} queries failed; first: {}", .failures.len(), first_failure(.failures))]
    AllFailed { failures: Vec<PartialFailure> },
}

fn first_failure(failures: &[PartialFailure]) -> String {
    failures
        .first()
        .map(|f| f.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("no usable accounts configured")]
    NoAccounts,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_rate_limited_message_includes_reset() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            FetchError::RateLimited(Some(at)).to_string(),
            "rate limited until 03:04:05 UTC"
        );
        assert_eq!(FetchError::RateLimited(None).to_string(), "rate limited");
    }

    #[test]
    fn test_auth_failure_is_not_retryable() {
        assert!(!FetchError::AuthFailure.is_retryable());
        assert!(!FetchError::MissingToken("X".into()).is_retryable());
        assert!(FetchError::Network("timeout".into()).is_retryable());
    }
}
