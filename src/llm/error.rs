//! LLM error types with retry classification.
//!
//! Distinguishes between transient errors (the adapter backs off and retries)
//! and permanent errors (surfaced to the engine as transport failures).

use std::time::Duration;

use thiserror::Error;

/// Upper bound for a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Error from an LLM provider call.
#[derive(Debug, Clone, Error)]
#[error("{kind}{}: {message}", status_suffix(.status_code))]
pub struct LlmError {
    /// The kind of error
    pub kind: LlmErrorKind,
    /// HTTP status code, if applicable
    pub status_code: Option<u16>,
    /// Error message
    pub message: String,
    /// Suggested retry delay (from Retry-After header)
    pub retry_after: Option<Duration>,
}

fn status_suffix(status_code: &Option<u16>) -> String {
    status_code
        .map(|code| format!(" (HTTP {})", code))
        .unwrap_or_default()
}

impl LlmError {
    fn new(kind: LlmErrorKind, status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status_code,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Create a rate limit error.
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(LlmErrorKind::RateLimited, Some(429), message)
        }
    }

    /// Create a network error (connect failure, timeout, broken body).
    pub fn network_error(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::NetworkError, None, message)
    }

    /// Create a parse error.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::ParseError, None, message)
    }

    /// Build an error from a non-success HTTP response.
    pub fn from_status(status_code: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let kind = classify_http_status(status_code);
        let mut error = Self::new(kind, Some(status_code), body.trim());
        if kind == LlmErrorKind::RateLimited {
            error.retry_after = retry_after;
        }
        error
    }

    /// Build an error from a failed `reqwest` send.
    pub fn from_transport(error: &reqwest::Error) -> Self {
        let prefix = if error.is_timeout() {
            "Request timeout"
        } else if error.is_connect() {
            "Connection failed"
        } else {
            "Request failed"
        };
        Self::network_error(format!("{}: {}", prefix, error))
    }

    /// Check if this error is transient and should be retried.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Get the suggested delay before retry number `attempt` (0-based).
    ///
    /// A provider-supplied `Retry-After` wins. Otherwise the delay grows
    /// exponentially from a per-kind base, plus a small deterministic jitter,
    /// capped at 60 seconds.
    pub fn suggested_delay(&self, attempt: u32) -> Duration {
        if let Some(retry_after) = self.retry_after {
            return retry_after;
        }

        let base_secs: u64 = match self.kind {
            LlmErrorKind::RateLimited => 5,
            LlmErrorKind::ServerError => 2,
            _ => 1,
        };
        let delay_secs = base_secs.saturating_mul(2u64.saturating_pow(attempt));
        let jitter_range = delay_secs / 4;
        let jitter = if jitter_range > 0 {
            (u64::from(attempt) * 7) % jitter_range
        } else {
            0
        };

        Duration::from_secs(delay_secs.saturating_add(jitter)).min(MAX_BACKOFF)
    }
}

/// Classification of LLM errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Rate limited (429) - transient, retry with backoff
    RateLimited,
    /// Server error (5xx) - transient
    ServerError,
    /// Client error (400, 401, 403, 404) - permanent
    ClientError,
    /// Connection failed or timed out - transient
    NetworkError,
    /// Response body could not be understood - permanent
    ParseError,
}

impl LlmErrorKind {
    /// Check if this error kind is transient (worth retrying with the same model).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmErrorKind::RateLimited | LlmErrorKind::ServerError | LlmErrorKind::NetworkError
        )
    }
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LlmErrorKind::RateLimited => "Rate limited",
            LlmErrorKind::ServerError => "Server error",
            LlmErrorKind::ClientError => "Client error",
            LlmErrorKind::NetworkError => "Network error",
            LlmErrorKind::ParseError => "Parse error",
        };
        f.write_str(label)
    }
}

/// Configuration for adapter-level retry behavior.
///
/// This only covers transport flakiness. Evaluator-driven revision is the
/// engine's job and never goes through here.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Maximum total time to spend retrying
    pub max_retry_duration: Duration,
    /// Whether to retry on rate limit errors
    pub retry_rate_limits: bool,
    /// Whether to retry on server errors
    pub retry_server_errors: bool,
    /// Whether to retry on network errors
    pub retry_network_errors: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_retry_duration: Duration::from_secs(120),
            retry_rate_limits: true,
            retry_server_errors: true,
            retry_network_errors: true,
        }
    }
}

impl RetryConfig {
    /// Default policy with a different retry count. `0` fails on the first error.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Check if the given error should be retried based on this config.
    pub fn should_retry(&self, error: &LlmError) -> bool {
        match error.kind {
            LlmErrorKind::RateLimited => self.retry_rate_limits,
            LlmErrorKind::ServerError => self.retry_server_errors,
            LlmErrorKind::NetworkError => self.retry_network_errors,
            LlmErrorKind::ClientError | LlmErrorKind::ParseError => false,
        }
    }
}

/// Parse HTTP status code into error kind. Only 429 and 5xx are worth retrying.
pub fn classify_http_status(status: u16) -> LlmErrorKind {
    match status {
        429 => LlmErrorKind::RateLimited,
        500..=599 => LlmErrorKind::ServerError,
        _ => LlmErrorKind::ClientError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LlmErrorKind::RateLimited.is_transient());
        assert!(LlmErrorKind::ServerError.is_transient());
        assert!(LlmErrorKind::NetworkError.is_transient());
        assert!(!LlmErrorKind::ClientError.is_transient());
        assert!(!LlmErrorKind::ParseError.is_transient());
    }

    #[test]
    fn test_http_status_classification() {
        assert_eq!(classify_http_status(429), LlmErrorKind::RateLimited);
        assert_eq!(classify_http_status(500), LlmErrorKind::ServerError);
        assert_eq!(classify_http_status(503), LlmErrorKind::ServerError);
        assert_eq!(classify_http_status(400), LlmErrorKind::ClientError);
        assert_eq!(classify_http_status(401), LlmErrorKind::ClientError);
        assert_eq!(classify_http_status(302), LlmErrorKind::ClientError);
        assert_eq!(classify_http_status(100), LlmErrorKind::ClientError);
        assert_eq!(classify_http_status(600), LlmErrorKind::ClientError);
        assert!(!LlmError::from_status(301, "moved", None).is_transient());
    }

    #[test]
    fn from_status_keeps_retry_after_only_for_rate_limits() {
        let wait = Some(Duration::from_secs(9));
        let limited = LlmError::from_status(429, "slow down", wait);
        assert_eq!(limited.retry_after, wait);

        let server = LlmError::from_status(502, "bad gateway", wait);
        assert_eq!(server.kind, LlmErrorKind::ServerError);
        assert_eq!(server.retry_after, None);
    }

    #[test]
    fn display_includes_status_when_present() {
        let error = LlmError::from_status(401, "invalid key\n", None);
        assert_eq!(error.to_string(), "Client error (HTTP 401): invalid key");
        assert_eq!(
            LlmError::network_error("refused").to_string(),
            "Network error: refused"
        );
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let error = LlmError::rate_limited("test", None);
        let delay_0 = error.suggested_delay(0);
        let delay_1 = error.suggested_delay(1);
        let delay_2 = error.suggested_delay(2);

        assert!(delay_1 > delay_0);
        assert!(delay_2 > delay_1);
        assert!(error.suggested_delay(10) <= MAX_BACKOFF);
    }

    #[test]
    fn test_retry_after_respected() {
        let error = LlmError::rate_limited("test", Some(Duration::from_secs(30)));
        assert_eq!(error.suggested_delay(0), Duration::from_secs(30));
        assert_eq!(error.suggested_delay(5), Duration::from_secs(30));
    }

    #[test]
    fn zero_retries_keeps_the_classification() {
        let config = RetryConfig::with_max_retries(0);
        assert_eq!(config.max_retries, 0);
        assert!(!config.should_retry(&LlmError::parse_error("bad json")));
        assert!(config.should_retry(&LlmError::network_error("reset")));
    }
}
