use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid feed: {message}")]
    InvalidFeed { message: String },

    #[error("Arrangement '{id}' not found")]
    ArrangementNotFound { id: String },
}

impl CoreError {
    pub(crate) fn invalid_feed(message: impl Into<String>) -> Self {
        CoreError::InvalidFeed {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
