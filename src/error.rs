//! Error kinds shared by the catalog contract and the Flight handlers.
//!
//! Catalog implementations return [`AirportError`]; the handler layer maps
//! each kind onto the matching `tonic::Status` code. Unknown failures from
//! a backend should be wrapped with [`AirportError::internal`] so the
//! original message survives the mapping.

use std::panic::AssertUnwindSafe;

use futures::Future;
use futures::FutureExt;
use thiserror::Error;
use tonic::Status;

use crate::logging::{AirportLogger, LogCategory, LogLevel};

#[derive(Debug, Error)]
pub enum AirportError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("unimplemented: {0}")]
    Unimplemented(String),

    #[error("internal: {0}")]
    Internal(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),
}

impl AirportError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        AirportError::NotFound(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        AirportError::InvalidArgument(msg.into())
    }

    pub fn failed_precondition(msg: impl Into<String>) -> Self {
        AirportError::FailedPrecondition(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        AirportError::AlreadyExists(msg.into())
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        AirportError::Unauthenticated(msg.into())
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        AirportError::PermissionDenied(msg.into())
    }

    pub fn unimplemented(msg: impl Into<String>) -> Self {
        AirportError::Unimplemented(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AirportError::Internal(msg.into())
    }
}

impl From<AirportError> for Status {
    fn from(err: AirportError) -> Status {
        match err {
            AirportError::NotFound(m) => Status::not_found(m),
            AirportError::InvalidArgument(m) => Status::invalid_argument(m),
            AirportError::FailedPrecondition(m) => Status::failed_precondition(m),
            AirportError::AlreadyExists(m) => Status::already_exists(m),
            AirportError::Unauthenticated(m) => Status::unauthenticated(m),
            AirportError::PermissionDenied(m) => Status::permission_denied(m),
            AirportError::Unimplemented(m) => Status::unimplemented(m),
            AirportError::Internal(m) => Status::internal(m),
            AirportError::Cancelled(m) => Status::cancelled(m),
            AirportError::DeadlineExceeded(m) => Status::deadline_exceeded(m),
        }
    }
}

impl From<arrow::error::ArrowError> for AirportError {
    fn from(err: arrow::error::ArrowError) -> Self {
        AirportError::Internal(err.to_string())
    }
}

impl From<arrow_flight::error::FlightError> for AirportError {
    fn from(err: arrow_flight::error::FlightError) -> Self {
        AirportError::Internal(err.to_string())
    }
}

impl From<Status> for AirportError {
    fn from(status: Status) -> Self {
        use tonic::Code;
        let msg = status.message().to_string();
        match status.code() {
            Code::NotFound => AirportError::NotFound(msg),
            Code::InvalidArgument => AirportError::InvalidArgument(msg),
            Code::FailedPrecondition => AirportError::FailedPrecondition(msg),
            Code::AlreadyExists => AirportError::AlreadyExists(msg),
            Code::Unauthenticated => AirportError::Unauthenticated(msg),
            Code::PermissionDenied => AirportError::PermissionDenied(msg),
            Code::Unimplemented => AirportError::Unimplemented(msg),
            Code::Cancelled => AirportError::Cancelled(msg),
            Code::DeadlineExceeded => AirportError::DeadlineExceeded(msg),
            _ => AirportError::Internal(msg),
        }
    }
}

/// Run a handler future, converting a panic into an Internal error instead
/// of tearing down the connection. Catalog implementations are user code;
/// a panic in one call must not poison the server.
pub(crate) async fn recover<T, F>(category: LogCategory, fut: F) -> Result<T, AirportError>
where
    F: Future<Output = Result<T, AirportError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            AirportLogger::log(
                LogLevel::Error,
                category,
                &format!("handler panicked: {detail}"),
                &[],
            );
            Err(AirportError::Internal(format!("handler panicked: {detail}")))
        }
    }
}
