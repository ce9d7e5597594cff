//! Errors a single judge backend call can produce.

/// Failure of one backend call. The gateway converts these into retry,
/// rotation, or fall-through decisions; they never reach gateway callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The endpoint answered HTTP 429.
    #[error("rate limited")]
    RateLimited,

    /// The call did not complete within the configured timeout.
    #[error("timed out")]
    Timeout,

    /// The endpoint returned a non-2xx status code.
    #[error("judge API error ({status}): {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The request never produced a response (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// The backend cannot serve this kind of request.
    #[error("request not supported by this backend")]
    Unsupported,

    /// A hosted backend was called without an API credential.
    #[error("no API credential available")]
    MissingCredential,

    /// The response body could not be turned into a judgment.
    #[error("undecodable judge response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Whether retrying the same backend can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited | Self::Timeout | Self::Transport(_) => true,
            Self::Http { status, .. } => *status >= 500,
            Self::Unsupported | Self::MissingCredential | Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(BackendError::RateLimited.is_retryable());
        assert!(BackendError::Timeout.is_retryable());
        assert!(BackendError::Http {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!BackendError::Http {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!BackendError::Unsupported.is_retryable());
        assert!(!BackendError::Decode("prose".into()).is_retryable());
    }

    #[test]
    fn http_error_display() {
        let err = BackendError::Http {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "judge API error (502): bad gateway");
    }
}
