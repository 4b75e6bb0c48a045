//! ASIC status codes, error type and the shared status-handling policy.

use std::fmt;
use thiserror::Error;

/// Status codes returned by the ASIC driver.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsicStatus {
    Success = 0,
    Failure = -1,
    NotSupported = -2,
    NoMemory = -3,
    InsufficientResources = -4,
    InvalidParameter = -5,
    ItemAlreadyExists = -6,
    ItemNotFound = -7,
    Uninitialized = -8,
    TableFull = -9,
    ObjectInUse = -10,
    NotExecuted = -11,
}

impl AsicStatus {
    pub fn is_success(&self) -> bool {
        *self == AsicStatus::Success
    }

    pub fn into_result(self) -> AsicResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(AsicError::Status { status: self })
        }
    }
}

impl fmt::Display for AsicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AsicStatus::Success => "SUCCESS",
            AsicStatus::Failure => "FAILURE",
            AsicStatus::NotSupported => "NOT_SUPPORTED",
            AsicStatus::NoMemory => "NO_MEMORY",
            AsicStatus::InsufficientResources => "INSUFFICIENT_RESOURCES",
            AsicStatus::InvalidParameter => "INVALID_PARAMETER",
            AsicStatus::ItemAlreadyExists => "ITEM_ALREADY_EXISTS",
            AsicStatus::ItemNotFound => "ITEM_NOT_FOUND",
            AsicStatus::Uninitialized => "UNINITIALIZED",
            AsicStatus::TableFull => "TABLE_FULL",
            AsicStatus::ObjectInUse => "OBJECT_IN_USE",
            AsicStatus::NotExecuted => "NOT_EXECUTED",
        };
        write!(f, "{}", s)
    }
}

/// Error type for ASIC operations.
#[derive(Debug, Clone, Error)]
pub enum AsicError {
    /// The driver returned a non-success status.
    #[error("ASIC operation failed: {status}")]
    Status { status: AsicStatus },

    /// A referenced object id was null or stale.
    #[error("invalid object id for {object}")]
    InvalidObject { object: String },

    /// The request itself was malformed.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
}

impl AsicError {
    pub fn invalid_object(object: impl Into<String>) -> Self {
        AsicError::InvalidObject {
            object: object.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        AsicError::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<AsicStatus> {
        match self {
            AsicError::Status { status } => Some(*status),
            _ => None,
        }
    }

    /// Resource-pressure statuses that are worth retrying once the ASIC
    /// frees up.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.status(),
            Some(
                AsicStatus::InsufficientResources
                    | AsicStatus::NoMemory
                    | AsicStatus::TableFull
                    | AsicStatus::NotExecuted
            )
        )
    }
}

pub type AsicResult<T> = Result<T, AsicError>;

/// Outcome of the shared status-handling policy.
///
/// Every orchestrator routes non-success driver statuses through
/// [`classify_create_status`] / [`classify_remove_status`] /
/// [`classify_set_status`] instead of inventing its own mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    /// Treat the operation as done (e.g. create of an existing object).
    Handled,
    /// Leave the entry pending and try again next tick.
    Retry,
    /// Unrecoverable for this entry; drop it and surface the failure.
    Fatal,
}

pub fn classify_create_status(status: AsicStatus) -> StatusAction {
    match status {
        AsicStatus::Success | AsicStatus::ItemAlreadyExists => StatusAction::Handled,
        AsicStatus::InsufficientResources
        | AsicStatus::NoMemory
        | AsicStatus::TableFull
        | AsicStatus::NotExecuted => StatusAction::Retry,
        _ => StatusAction::Fatal,
    }
}

pub fn classify_remove_status(status: AsicStatus) -> StatusAction {
    match status {
        AsicStatus::Success | AsicStatus::ItemNotFound => StatusAction::Handled,
        AsicStatus::ObjectInUse | AsicStatus::NotExecuted => StatusAction::Retry,
        _ => StatusAction::Fatal,
    }
}

pub fn classify_set_status(status: AsicStatus) -> StatusAction {
    match status {
        AsicStatus::Success => StatusAction::Handled,
        AsicStatus::NotExecuted => StatusAction::Retry,
        _ => StatusAction::Fatal,
    }
}

/// Classify an operation error, treating non-status errors as fatal.
pub fn classify_create_error(err: &AsicError) -> StatusAction {
    match err.status() {
        Some(status) => classify_create_status(status),
        None => StatusAction::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_into_result() {
        assert!(AsicStatus::Success.into_result().is_ok());
        assert!(AsicStatus::Failure.into_result().is_err());
    }

    #[test]
    fn test_retryable() {
        let err = AsicError::Status {
            status: AsicStatus::InsufficientResources,
        };
        assert!(err.is_retryable());

        let err = AsicError::Status {
            status: AsicStatus::InvalidParameter,
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_create_policy() {
        assert_eq!(
            classify_create_status(AsicStatus::ItemAlreadyExists),
            StatusAction::Handled
        );
        assert_eq!(
            classify_create_status(AsicStatus::TableFull),
            StatusAction::Retry
        );
        assert_eq!(
            classify_create_status(AsicStatus::InvalidParameter),
            StatusAction::Fatal
        );
    }

    #[test]
    fn test_remove_policy() {
        assert_eq!(
            classify_remove_status(AsicStatus::ItemNotFound),
            StatusAction::Handled
        );
        assert_eq!(
            classify_remove_status(AsicStatus::ObjectInUse),
            StatusAction::Retry
        );
        assert_eq!(
            classify_remove_status(AsicStatus::Failure),
            StatusAction::Fatal
        );
    }
}
