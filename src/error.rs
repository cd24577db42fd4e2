use thiserror::Error;

#[derive(Debug, Error)]
pub enum MgError {
    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Resource failure: {0}")]
    Resource(String),

    #[error("Setup error: {0}")]
    Setup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MgError>;
