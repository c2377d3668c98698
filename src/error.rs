use thiserror::Error;

/// Service-wide error type.
///
/// Every variant maps to a stable machine-readable code via [`ServiceError::code`];
/// messages are safe to return to callers and never carry internal identifiers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("backend error: {0}")]
    Backend(anyhow::Error),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Stable machine-readable code for transport mapping.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidArgument(_) => "invalid_argument",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::AlreadyExists(_) => "already_exists",
            ServiceError::Unauthenticated(_) => "unauthenticated",
            ServiceError::PermissionDenied(_) => "permission_denied",
            ServiceError::FailedPrecondition(_) => "failed_precondition",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Backend(_) => "backend",
            ServiceError::Schema(_) => "schema",
            ServiceError::Internal(_) => "internal",
        }
    }

    /// Whether a caller may retry the failed call.
    ///
    /// Only backend failures are retryable, and only for idempotent
    /// reads and deletes; schema errors are fatal to the caller.
    pub fn retryable(&self) -> bool {
        matches!(self, ServiceError::Backend(_))
    }

    pub fn backend<E: Into<anyhow::Error>>(err: E) -> Self {
        ServiceError::Backend(err.into())
    }
}
