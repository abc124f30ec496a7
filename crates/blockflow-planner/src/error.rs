use thiserror::Error;

use blockflow_core::error::Error as CoreError;

pub type Result<T> = std::result::Result<T, PlanError>;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("node '{0}' is not defined before it is used")]
    UnknownNode(String),

    #[error("node '{0}' is defined twice")]
    DuplicateNode(String),

    #[error("table '{0}' is not available")]
    UnknownTable(String),

    #[error("node '{0}' needs a lambda evaluator but none is configured")]
    MissingEvaluator(String),

    #[error("node '{node}': {message}")]
    Invalid { node: String, message: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl PlanError {
    pub(crate) fn invalid(node: &str, message: impl Into<String>) -> Self {
        PlanError::Invalid {
            node: node.to_string(),
            message: message.into(),
        }
    }
}

impl From<PlanError> for CoreError {
    fn from(e: PlanError) -> Self {
        match e {
            PlanError::Core(e) => e,
            other => CoreError::MalformedPlan(other.to_string()),
        }
    }
}
