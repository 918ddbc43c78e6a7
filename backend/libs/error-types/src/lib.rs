//! Unified error types for Medialib backend services
//!
//! Domain code returns [`ServiceError`]; transport code inspects the kind
//! through the predicate API and converts exactly once, at the gRPC boundary,
//! with [`ServiceError::to_status`].
//!
//! # Design Principles
//!
//! 1. **Type Safety**: Kinds are an enum, never matched on message text
//! 2. **Sanitized Output**: Internal detail is logged, not returned
//! 3. **gRPC Integration**: Maps cleanly to gRPC status codes

use std::fmt;
use thiserror::Error;
use tonic::{Code, Status};

pub mod grpc;

pub use grpc::StatusExt;

/// Error kinds, independent of any transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    BadRequest,
    Unauthorized,
    Forbidden,
    Internal,
    Unimplemented,
}

impl ErrorKind {
    /// gRPC status code for this kind
    pub fn code(self) -> Code {
        match self {
            ErrorKind::NotFound => Code::NotFound,
            ErrorKind::Conflict => Code::AlreadyExists,
            ErrorKind::BadRequest => Code::InvalidArgument,
            ErrorKind::Unauthorized => Code::Unauthenticated,
            ErrorKind::Forbidden => Code::PermissionDenied,
            ErrorKind::Internal => Code::Internal,
            ErrorKind::Unimplemented => Code::Unimplemented,
        }
    }

    /// Stable machine-readable code attached as `x-error-code` metadata
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::Internal => "INTERNAL",
            ErrorKind::Unimplemented => "UNIMPLEMENTED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core service error type
///
/// # Example
/// ```rust
/// use error_types::ServiceError;
///
/// let err = ServiceError::not_found("library", "42");
/// assert!(err.is_not_found());
/// assert_eq!(err.to_status().code(), tonic::Code::NotFound);
/// ```
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Resource not found
    #[error("Resource not found: {resource}")]
    NotFound { resource: &'static str, id: String },

    /// Uniqueness or state conflict
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Malformed or invalid input
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// Missing or invalid credentials
    #[error("Authentication required")]
    Unauthorized,

    /// Authenticated but not allowed
    #[error("Permission denied")]
    Forbidden { action: String, resource: String },

    /// Operation exists on the wire but has no implementation
    #[error("Not implemented: {operation}")]
    Unimplemented { operation: &'static str },

    /// Internal server error (catch-all)
    #[error("Internal server error")]
    Internal {
        #[source]
        source: anyhow::Error,
    },
}

impl ServiceError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn forbidden(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self::Forbidden {
            action: action.into(),
            resource: resource.into(),
        }
    }

    /// Create internal error from any error type
    pub fn internal<E: Into<anyhow::Error>>(error: E) -> Self {
        Self::Internal {
            source: error.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::BadRequest { .. } => ErrorKind::BadRequest,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Unimplemented { .. } => ErrorKind::Unimplemented,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    pub fn is_bad_request(&self) -> bool {
        self.kind() == ErrorKind::BadRequest
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind() == ErrorKind::Unauthorized
    }

    pub fn is_forbidden(&self) -> bool {
        self.kind() == ErrorKind::Forbidden
    }

    pub fn is_internal(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }

    pub fn is_unimplemented(&self) -> bool {
        self.kind() == ErrorKind::Unimplemented
    }

    /// Convert to gRPC Status for service boundaries
    ///
    /// Messages are built from the variant's public fields only; internal
    /// sources never reach the client.
    pub fn to_status(&self) -> Status {
        let status = match self {
            Self::NotFound { resource, .. } => Status::not_found(format!("{} not found", resource)),
            Self::Conflict { message } => Status::already_exists(message.clone()),
            Self::BadRequest { message } => Status::invalid_argument(message.clone()),
            Self::Unauthorized => Status::unauthenticated("Authentication required"),
            Self::Forbidden { .. } => Status::permission_denied("Insufficient permissions"),
            Self::Unimplemented { operation } => {
                Status::unimplemented(format!("{} is not implemented", operation))
            }
            Self::Internal { .. } => Status::internal("internal server error"),
        };
        status.with_error_code(self.kind().as_str())
    }

    /// Log error with appropriate level and context
    pub fn log(&self) {
        match self {
            Self::NotFound { .. } | Self::BadRequest { .. } | Self::Conflict { .. } => {
                tracing::debug!(error = %self, "Client error");
            }
            Self::Unauthorized | Self::Forbidden { .. } => {
                tracing::warn!(error = %self, "Authorization failure");
            }
            Self::Unimplemented { .. } => {
                tracing::info!(error = %self, "Unimplemented operation called");
            }
            Self::Internal { source } => {
                tracing::error!(error = ?source, "Server error");
            }
        }
    }
}

impl From<ServiceError> for Status {
    fn from(err: ServiceError) -> Self {
        err.log();
        err.to_status()
    }
}

/// Result type alias for Service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error context extension trait for adding context to Results
pub trait ErrorContext<T> {
    /// Add context to an error, turning it into [`ServiceError::Internal`]
    fn context<C>(self, context: C) -> ServiceResult<T>
    where
        C: fmt::Display + Send + Sync + 'static;

    /// Add lazy context (only evaluated on error)
    fn with_context<C, F>(self, f: F) -> ServiceResult<T>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<C>(self, context: C) -> ServiceResult<T>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| ServiceError::internal(anyhow::anyhow!("{}: {}", context, e)))
    }

    fn with_context<C, F>(self, f: F) -> ServiceResult<T>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| ServiceError::internal(anyhow::anyhow!("{}: {}", f(), e)))
    }
}
