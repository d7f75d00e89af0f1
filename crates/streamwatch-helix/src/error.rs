//! Error types for the Helix client.

use thiserror::Error;

/// Errors that can occur when talking to the Helix API.
#[derive(Debug, Error)]
pub enum HelixError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not the expected JSON shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Helix answered with a non-success status.
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Rate limited.
    #[error("rate limited{}", match retry_after_secs {
        Some(secs) => format!(" (retry after {}s)", secs),
        None => String::new(),
    })]
    RateLimited {
        /// Seconds until the rate limit window resets, if Helix told us.
        retry_after_secs: Option<u64>,
    },

    /// Helix returned an empty `data` array for a required lookup.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

impl HelixError {
    /// Whether this error means the record does not exist upstream.
    pub fn is_not_found(&self) -> bool {
        matches!(self, HelixError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_display() {
        let err = HelixError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert_eq!(err.to_string(), "rate limited (retry after 30s)");

        let err = HelixError::RateLimited {
            retry_after_secs: None,
        };
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn test_not_found() {
        let err = HelixError::NotFound {
            kind: "user",
            id: "42".to_string(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "user not found: 42");

        let err = HelixError::Upstream {
            status: 500,
            message: "boom".to_string(),
        };
        assert!(!err.is_not_found());
    }
}
