use serde::Serialize;
use thiserror::Error;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: &'static str,
    pub message: String,
}

impl Violation {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("submission is invalid")]
    Validation(Vec<Violation>),
    #[error("not authorized: {0}")]
    Authorization(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{message}")]
    Conflict {
        message: String,
        current_status: String,
    },
    #[error("duplicate submission: {0}")]
    Duplicate(String),
    #[error("dependency unavailable: {0}")]
    Dependency(String),
    #[error("publication failed: {0}")]
    Publish(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn conflict(message: impl Into<String>, current_status: &str) -> Self {
        Self::Conflict {
            message: message.into(),
            current_status: current_status.to_string(),
        }
    }

    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation(vec![Violation::new(field, message)])
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(anyhow::Error::from(err))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(anyhow::Error::from(err))
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
