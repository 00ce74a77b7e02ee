use std::time::Duration;

use thiserror::Error;

/// Failures talking to the generative backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to reach backend: {0}")]
    Unavailable(#[source] reqwest::Error),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed backend response: {0}")]
    Protocol(String),
    #[error("backend call timed out after {0:?}")]
    TimedOut(Duration),
}

impl BackendError {
    /// Whether a fresh attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Unavailable(_) | BackendError::TimedOut(_) => true,
            BackendError::Status { status, .. } => *status == 429 || *status >= 500,
            BackendError::Protocol(_) => false,
        }
    }
}

/// Errors a detector run can surface to its caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("analysis call failed: {0}")]
    Analysis(#[source] BackendError),
}

/// Why the classification stage could not produce a usable result.
/// Always recovered by the fallback classifier.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("classification call failed: {0}")]
    Backend(#[source] BackendError),
    #[error("no recovery strategy could parse the classification output")]
    Unparseable,
    #[error("label {0:?} is not in the detector's label set")]
    LabelOutOfSet(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::TimedOut(Duration::from_secs(1)).is_transient());
        assert!(BackendError::Status { status: 503, body: String::new() }.is_transient());
        assert!(BackendError::Status { status: 429, body: String::new() }.is_transient());
        assert!(!BackendError::Status { status: 401, body: String::new() }.is_transient());
        assert!(!BackendError::Protocol("no choices".into()).is_transient());
    }
}
