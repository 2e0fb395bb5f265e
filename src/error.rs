use thiserror::Error;

/// Failure taxonomy shared by the store, the command router and the outbound clients.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A required secret or token is missing; the feature is disabled.
    #[error("{feature} is disabled: {detail}")]
    Configuration {
        feature: &'static str,
        detail: String,
    },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("comment {0} not found")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    /// Network, timeout or rejection from an outbound collaborator.
    #[error("{service} call failed: {detail}")]
    External {
        service: &'static str,
        detail: String,
        retryable: bool,
    },

    #[error("storage failure: {0}")]
    Storage(String),
}

impl BridgeError {
    pub fn configuration(feature: &'static str, detail: impl Into<String>) -> Self {
        Self::Configuration {
            feature,
            detail: detail.into(),
        }
    }

    pub fn external(service: &'static str, detail: impl Into<String>, retryable: bool) -> Self {
        Self::External {
            service,
            detail: detail.into(),
            retryable,
        }
    }

    /// Maps a reqwest transport failure; timeouts and connection errors can be retried.
    pub fn from_transport(service: &'static str, err: reqwest::Error) -> Self {
        let retryable = err.is_timeout() || err.is_connect() || err.is_request();
        let detail = if err.is_timeout() {
            "request timed out".to_string()
        } else {
            err.to_string()
        };
        Self::external(service, detail, retryable)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::External { retryable: true, .. })
    }
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
