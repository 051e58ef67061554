use thiserror::Error;

/// Common error types used across the application.
///
/// None of these abort a cycle: the controller decides how each one degrades.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ticket source error: {0}")]
    Source(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

pub type AppResult<T> = Result<T, AppError>;
