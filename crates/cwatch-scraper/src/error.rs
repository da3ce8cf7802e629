use chromiumoxide::error::CdpError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("browser protocol error: {0}")]
    Browser(#[from] CdpError),

    #[error("navigation to {url} timed out after {timeout_ms} ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("page script evaluation failed: {reason}")]
    Evaluation { reason: String },

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("no browser context is open")]
    NoContext,

    #[error("gave up on {url} after {attempts} attempts: {last_error}")]
    AttemptsExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

impl ScraperError {
    /// Navigation and protocol timeouts get their own context-restart cadence.
    #[must_use]
    pub fn is_navigation_timeout(&self) -> bool {
        matches!(
            self,
            ScraperError::NavigationTimeout { .. } | ScraperError::Browser(CdpError::Timeout)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_classification() {
        let timeout = ScraperError::NavigationTimeout {
            url: "https://example.com".to_owned(),
            timeout_ms: 3000,
        };
        assert!(timeout.is_navigation_timeout());
        assert!(ScraperError::Browser(CdpError::Timeout).is_navigation_timeout());

        let other = ScraperError::Navigation {
            url: "https://example.com".to_owned(),
            reason: "net::ERR_NAME_NOT_RESOLVED".to_owned(),
        };
        assert!(!other.is_navigation_timeout());
        assert!(!ScraperError::NoContext.is_navigation_timeout());
    }

    #[test]
    fn exhausted_message_names_url_and_attempts() {
        let err = ScraperError::AttemptsExhausted {
            url: "https://tokcounter.com/id?user=x".to_owned(),
            attempts: 4,
            last_error: "boom".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "gave up on https://tokcounter.com/id?user=x after 4 attempts: boom"
        );
    }
}
