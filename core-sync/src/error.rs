use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Remote error: {0}")]
    Remote(#[from] BridgeError),

    #[error("Invalid request ID: {0}")]
    InvalidRequestId(String),

    #[error("Engine is not initialized")]
    NotInitialized,

    #[error("Playlist {0} not found")]
    PlaylistNotFound(String),
}

impl SyncError {
    /// Whether the failed operation may succeed on a later trigger.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_retryable(),
            SyncError::Library(LibraryError::Database(_)) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
