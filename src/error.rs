use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TerminalError>;

#[derive(Error, Debug)]
pub enum TerminalError {
    #[error("device not connected")]
    NotConnected,
    #[error("device is busy: {0}")]
    DeviceBusy(&'static str),
    #[error("connection attempt timed out after {0:?}")]
    ConnectionTimeout(Duration),
    #[error("device connection error: {0}")]
    ConnectionError(String),
    #[error("transaction timed out after {0:?}")]
    TransactionTimeout(Duration),
    #[error("host unreachable: {0}")]
    HostUnreachable(String),
    #[error("offline queue limit exceeded: {0}")]
    QueueLimitExceeded(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("stored transaction not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}

/// Stable machine-readable codes for faults surfaced inside a
/// `TransactionResult` rather than as an `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    NotConnected,
    DeviceBusy,
    ConnectionTimeout,
    ConnectionError,
    TransactionTimeout,
    HostUnreachable,
    QueueLimitExceeded,
    InvalidRequest,
    NotFound,
    Storage,
}

impl TerminalError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TerminalError::NotConnected => ErrorCode::NotConnected,
            TerminalError::DeviceBusy(_) => ErrorCode::DeviceBusy,
            TerminalError::ConnectionTimeout(_) => ErrorCode::ConnectionTimeout,
            TerminalError::ConnectionError(_) => ErrorCode::ConnectionError,
            TerminalError::TransactionTimeout(_) => ErrorCode::TransactionTimeout,
            TerminalError::HostUnreachable(_) => ErrorCode::HostUnreachable,
            TerminalError::QueueLimitExceeded(_) => ErrorCode::QueueLimitExceeded,
            TerminalError::InvalidRequest(_) | TerminalError::InvalidConfig(_) => {
                ErrorCode::InvalidRequest
            }
            TerminalError::NotFound(_) => ErrorCode::NotFound,
            TerminalError::Storage(_) | TerminalError::Io(_) => ErrorCode::Storage,
            #[cfg(feature = "storage-rocksdb")]
            TerminalError::RocksDb(_) => ErrorCode::Storage,
        }
    }
}

/// Fault description attached to a `TransactionResult` with status `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&TerminalError> for ErrorDetail {
    fn from(err: &TerminalError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}
