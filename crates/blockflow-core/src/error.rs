use thiserror::Error;

/// Canonical result for core and every crate that reports into it.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind}: expected {expected} input(s), got {actual}")]
    InvalidArity {
        kind: String,
        expected: String,
        actual: usize,
    },

    #[error("Malformed plan: {0}")]
    MalformedPlan(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Evaluator failure: {0}")]
    EvaluatorFailure(String),

    // The core crate does not do I/O; higher layers map their I/O errors here.
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal invariant failed: {0}")]
    Invariant(String),
}

impl Error {
    /// Errors the caller can act on (fix the plan, retry the evaluator) as
    /// opposed to broken engine invariants.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Invariant(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
