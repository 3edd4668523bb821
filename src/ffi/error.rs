use std::fmt;
use serde::{Deserialize, Serialize};
use crate::errors::{DbError, DomainError, ServiceError};

/// Message returned in place of internal error details
const GENERIC_FAILURE_MESSAGE: &str = "The export could not be completed. Please try again later.";

/// Error codes for FFI boundary
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Success (no error)
    Success = 0,

    // General errors (1-99)
    Unknown = 1,
    InvalidArgument = 2,
    NullPointer = 3,
    InvalidUtf8 = 4,
    InvalidUuid = 5,
    InternalError = 6,

    // Database errors (100-199)
    DatabaseGeneral = 100,
    DatabaseConflict = 102,
    DatabaseMigration = 106,

    // Domain errors (200-299)
    DomainGeneral = 200,
    EntityNotFound = 201,
    InvalidStateTransition = 202,
    ExternalServiceError = 203,

    // Service errors (300-399)
    Unauthorized = 300,
    PermissionDenied = 301,
    Conflict = 302,
    PackagingFailed = 303,
    PublishFailed = 304,
}

impl ErrorCode {
    /// HTTP status an embedding server should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::Success => 200,
            ErrorCode::InvalidArgument
            | ErrorCode::NullPointer
            | ErrorCode::InvalidUtf8
            | ErrorCode::InvalidUuid => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::PermissionDenied => 403,
            ErrorCode::EntityNotFound => 404,
            ErrorCode::Conflict | ErrorCode::DatabaseConflict => 409,
            _ => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, *self as i32)
    }
}

/// Error type for FFI boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FFIError {
    /// Error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (JSON string)
    pub details: Option<String>,

    #[serde(rename = "httpStatus")]
    pub http_status: u16,
}

impl fmt::Display for FFIError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(details) = &self.details {
            write!(f, "{}: {} ({})", self.code, self.message, details)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for FFIError {}

impl FFIError {
    pub fn new(code: ErrorCode, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            details: None,
            http_status: code.http_status(),
        }
    }

    pub fn with_details(code: ErrorCode, message: &str, details: &str) -> Self {
        Self {
            details: Some(details.to_string()),
            ..Self::new(code, message)
        }
    }

    pub fn invalid_argument(message: &str) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn null_pointer(message: &str) -> Self {
        Self::new(ErrorCode::NullPointer, message)
    }

    // Helper for internal errors
    pub fn internal(message: String) -> Self {
        Self::new(ErrorCode::InternalError, &message)
    }

    /// Server-side failure whose detail has already been logged.
    fn concealed(code: ErrorCode, detail: &str) -> Self {
        log::error!("{}: {}", code, detail);
        Self::new(code, GENERIC_FAILURE_MESSAGE)
    }

    pub fn http_status(&self) -> u16 {
        self.http_status
    }
}

// Implement From traits for converting domain errors to FFI errors

impl From<DbError> for FFIError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Conflict(msg) => Self::new(ErrorCode::DatabaseConflict, &msg),
            DbError::Migration(msg) => Self::concealed(ErrorCode::DatabaseMigration, &msg),
            other => Self::concealed(ErrorCode::DatabaseGeneral, &other.to_string()),
        }
    }
}

impl From<DomainError> for FFIError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Database(db_err) => db_err.into(),
            DomainError::EntityNotFound(entity, id) => Self::with_details(
                ErrorCode::EntityNotFound,
                &format!("Entity not found: {} with ID {}", entity, id),
                &format!("{{\"entity\":\"{}\",\"id\":\"{}\"}}", entity, id),
            ),
            DomainError::InvalidUuid(uuid_str) => Self::with_details(
                ErrorCode::InvalidUuid,
                &format!("Invalid UUID: {}", uuid_str),
                &format!("{{\"uuid\":\"{}\"}}", uuid_str),
            ),
            err @ DomainError::InvalidStateTransition { .. } => {
                Self::concealed(ErrorCode::InvalidStateTransition, &err.to_string())
            }
            DomainError::External(msg) => Self::concealed(ErrorCode::ExternalServiceError, &msg),
            DomainError::Internal(msg) => Self::concealed(ErrorCode::InternalError, &msg),
        }
    }
}

impl From<ServiceError> for FFIError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Domain(domain_err) => domain_err.into(),
            ServiceError::Unauthorized(msg) => Self::new(ErrorCode::Unauthorized, &msg),
            ServiceError::PermissionDenied(msg) => Self::new(ErrorCode::PermissionDenied, &msg),
            ServiceError::Conflict(msg) => Self::new(ErrorCode::Conflict, &msg),
            ServiceError::PackagingFailed(msg) => Self::concealed(ErrorCode::PackagingFailed, &msg),
            ServiceError::PublishFailed(msg) => Self::concealed(ErrorCode::PublishFailed, &msg),
            ServiceError::Internal(msg) => Self::concealed(ErrorCode::InternalError, &msg),
        }
    }
}

impl From<std::ffi::NulError> for FFIError {
    fn from(_: std::ffi::NulError) -> Self {
        Self::new(ErrorCode::InvalidUtf8, "String contains null bytes, cannot create CString")
    }
}

// Result type alias for FFI functions
pub type FFIResult<T> = Result<T, FFIError>;
