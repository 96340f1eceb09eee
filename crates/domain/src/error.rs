//! Shared error type for the run-orchestration core.
//!
//! Every fallible boundary — the state store, the signal store, the run
//! lock, the step loop's setup phase — returns this type. Propagation
//! policy lives with the callers (see `corun-runtime`); this module only
//! names the kinds.

/// Error kinds the core can surface, matching the taxonomy callers must
/// distinguish: `NotFound`, `BadRequest`, `AlreadyRunning`, `Timeout`,
/// `Internal`.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("already running")]
    AlreadyRunning,

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("internal: {0}")]
    Internal(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// The stable error `code` surfaced on a terminal `failed`/`error`
    /// result record.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::AlreadyRunning => "already_running",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) | Self::Io(_) | Self::Json(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_matches_kind() {
        assert_eq!(CoreError::NotFound("x".into()).code(), "not_found");
        assert_eq!(CoreError::BadRequest("x".into()).code(), "bad_request");
        assert_eq!(CoreError::AlreadyRunning.code(), "already_running");
        assert_eq!(CoreError::Timeout("x".into()).code(), "timeout");
        assert_eq!(CoreError::Internal("x".into()).code(), "internal");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: CoreError = io.into();
        assert_eq!(err.code(), "internal");
    }
}
