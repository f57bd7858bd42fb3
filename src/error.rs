use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Payee not found: {0}")]
    PayeeNotFound(String),
    #[error("Gateway unreachable: {0}")]
    GatewayConnect(String),
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("Gateway rejected request: {0}")]
    GatewayRejected(String),
    #[error("Gateway circuit is open, request not attempted")]
    CircuitOpen,
    #[error("Text generation error: {0}")]
    TextGenerationError(String),
    #[error("Text generation timed out after {0:?}")]
    TextGenerationTimeout(Duration),
    #[error("Recommendation unavailable: {0}")]
    RecommendationUnavailable(String),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl PaymentError {
    /// Whether a gateway call failing with this error may succeed if repeated.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PaymentError::GatewayConnect(_) | PaymentError::GatewayUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
