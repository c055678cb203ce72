use thiserror::Error;

#[derive(Error, Debug)]
pub enum FudWatchError {
    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Malformed classification response: {0}")]
    MalformedResponse(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
