use thiserror::Error;

/// Result type local to blockflow-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("block pool exhausted: {outstanding} blocks outstanding, limit {limit}")]
    Exhausted { outstanding: usize, limit: usize },
}

impl From<Error> for blockflow_core::error::Error {
    fn from(e: Error) -> Self {
        blockflow_core::error::Error::Invariant(e.to_string())
    }
}
