use thiserror::Error;

/// Top-level error type for the server.
#[derive(Debug, Error)]
pub enum TideKvError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

impl TideKvError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}
