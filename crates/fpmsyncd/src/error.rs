//! Synchronizer error type.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum FpmSyncError {
    #[error("malformed route message: {0}")]
    MalformedMessage(String),

    #[error("unknown interface index {0}")]
    UnknownInterface(u32),

    #[error("unknown local SID action id {0}")]
    UnknownAction(u32),
}
