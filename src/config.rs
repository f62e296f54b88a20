//! Runtime settings. Values arrive through clap (flags or `env =`), so a
//! malformed environment variable is a parse error, not a silent default.

use std::time::Duration;

pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_FEED_POLL_MS: u64 = 2_000;
pub const MIN_FEED_POLL_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl ApiConfig {
    pub fn new(base_url: &str, token: Option<String>, timeout_ms: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FeedConfig {
    pub poll_interval: Duration,
}

impl FeedConfig {
    pub fn new(poll_ms: u64) -> Self {
        Self {
            poll_interval: Duration::from_millis(poll_ms.max(MIN_FEED_POLL_MS)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_drops_trailing_slash() {
        let config = ApiConfig::new(
            "https://clearance.example.edu/api/",
            None,
            DEFAULT_HTTP_TIMEOUT_MS,
        );
        assert_eq!(config.base_url, "https://clearance.example.edu/api");
        assert_eq!(config.timeout, Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS));
    }

    #[test]
    fn blank_token_is_ignored() {
        let config = ApiConfig::new("https://clearance.example.edu", Some(" ".to_string()), 500);
        assert!(config.token.is_none());
    }

    #[test]
    fn poll_interval_has_a_floor() {
        assert_eq!(FeedConfig::new(5).poll_interval, Duration::from_millis(MIN_FEED_POLL_MS));
        assert_eq!(FeedConfig::new(2_500).poll_interval, Duration::from_millis(2_500));
    }
}
