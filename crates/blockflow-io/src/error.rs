use thiserror::Error;

use blockflow_core::error::Error as CoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("line {line}, column {column}: {message}")]
    Parse {
        line: u64,
        column: usize,
        message: String,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<Error> for CoreError {
    fn from(e: Error) -> Self {
        match e {
            Error::Core(e) => e,
            Error::Config(m) => CoreError::Config(m),
            other => CoreError::Io(other.to_string()),
        }
    }
}
