use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Remote service rejected {operation}: {message}")]
    Rejected { operation: String, message: String },

    #[error("Remote operation timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether retrying the same operation later may succeed.
    ///
    /// Rejections are final for the payload that was sent; everything else is
    /// treated as a transient delivery problem.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, BridgeError::Rejected { .. })
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
