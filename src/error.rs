use crate::domain::delivery::Disposition;
use crate::domain::order::OrderStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("invalid order: {0}")]
    InvalidOrder(String),
    #[error("order with ID={0} already exists")]
    AlreadyExists(String),
    #[error("order with ID={0} not found")]
    NotFound(String),
    #[error("cannot process order {id} with current status: {current}")]
    InvalidTransition { id: String, current: OrderStatus },
    #[error("failed to decode payload: {0}")]
    DecodeFailure(String),
    #[error("failed to publish to {subject}: {reason}")]
    PublishFailure { subject: String, reason: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}

impl OrderError {
    /// The transport disposition a delivery should receive when its handling
    /// fails with this error.
    ///
    /// Duplicate creates are absorbed as success. Domain rejections that a
    /// redelivery cannot change, including a missing order, are terminated.
    /// Malformed payloads and transient storage or transport trouble ask for
    /// redelivery, subject to the retry budget.
    pub fn disposition(&self) -> Disposition {
        match self {
            OrderError::AlreadyExists(_) => Disposition::Ack,
            OrderError::InvalidOrder(_)
            | OrderError::InvalidTransition { .. }
            | OrderError::NotFound(_) => Disposition::Term,
            _ => Disposition::Nak,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrderError>;
