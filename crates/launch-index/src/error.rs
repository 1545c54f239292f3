#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Launch failed: {0}")]
    Launch(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;

impl From<serde_json::Error> for IndexError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<notify::Error> for IndexError {
    fn from(error: notify::Error) -> Self {
        Self::Watch(error.to_string())
    }
}
