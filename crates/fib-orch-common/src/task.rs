//! Task processing status and result types.

use thiserror::Error;

/// Outcome of processing a single bus entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Entry handled, consume it.
    Success,
    /// Entry malformed, drop it.
    InvalidEntry,
    /// Entry failed for good, drop it and surface the failure.
    Failed,
    /// A dependency is not ready; leave the entry pending for the next tick.
    NeedRetry,
    /// Nothing to do (e.g. delete of an unknown key); consume it.
    Ignore,
    /// Entry duplicates existing state that must not change; consume it.
    Duplicated,
}

impl TaskStatus {
    /// Statuses that consume the entry.
    pub fn consumes_entry(&self) -> bool {
        !matches!(self, TaskStatus::NeedRetry)
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Ignore | TaskStatus::Duplicated
        )
    }
}

/// Error carried by a failed task.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("invalid entry: {message}")]
    InvalidEntry { message: String },

    #[error("ASIC error: {message}")]
    AsicFailure { message: String },

    #[error("retry needed: {reason}")]
    NeedRetry { reason: String },

    #[error("ignored: {reason}")]
    Ignored { reason: String },

    #[error("duplicated: {reason}")]
    Duplicated { reason: String },
}

impl TaskError {
    pub fn invalid_entry(message: impl Into<String>) -> Self {
        TaskError::InvalidEntry {
            message: message.into(),
        }
    }

    pub fn asic_failure(message: impl Into<String>) -> Self {
        TaskError::AsicFailure {
            message: message.into(),
        }
    }

    pub fn need_retry(reason: impl Into<String>) -> Self {
        TaskError::NeedRetry {
            reason: reason.into(),
        }
    }

    pub fn ignored(reason: impl Into<String>) -> Self {
        TaskError::Ignored {
            reason: reason.into(),
        }
    }

    pub fn duplicated(reason: impl Into<String>) -> Self {
        TaskError::Duplicated {
            reason: reason.into(),
        }
    }

    pub fn to_status(&self) -> TaskStatus {
        match self {
            TaskError::InvalidEntry { .. } => TaskStatus::InvalidEntry,
            TaskError::AsicFailure { .. } => TaskStatus::Failed,
            TaskError::NeedRetry { .. } => TaskStatus::NeedRetry,
            TaskError::Ignored { .. } => TaskStatus::Ignore,
            TaskError::Duplicated { .. } => TaskStatus::Duplicated,
        }
    }
}

pub type TaskResult<T> = Result<T, TaskError>;

pub trait TaskResultExt {
    fn to_status(&self) -> TaskStatus;
}

impl<T> TaskResultExt for TaskResult<T> {
    fn to_status(&self) -> TaskStatus {
        match self {
            Ok(_) => TaskStatus::Success,
            Err(e) => e.to_status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert!(TaskStatus::Success.consumes_entry());
        assert!(TaskStatus::Duplicated.consumes_entry());
        assert!(!TaskStatus::NeedRetry.consumes_entry());

        assert!(TaskStatus::Ignore.is_success());
        assert!(!TaskStatus::Failed.is_success());
    }

    #[test]
    fn test_error_to_status() {
        assert_eq!(
            TaskError::need_retry("neighbor").to_status(),
            TaskStatus::NeedRetry
        );
        assert_eq!(
            TaskError::duplicated("pic context").to_status(),
            TaskStatus::Duplicated
        );
        assert_eq!(
            TaskError::invalid_entry("bad key").to_status(),
            TaskStatus::InvalidEntry
        );
    }
}
