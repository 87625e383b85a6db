use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("invalid request: {0}")]
    Validation(String),
}

impl TrackerError {
    pub fn not_found(what: impl Into<String>) -> Self {
        TrackerError::NotFound(what.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        TrackerError::Validation(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TrackerError::NotFound(_))
    }
}

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// Outcome of a command as seen by the UI layer: a success flag plus either a
/// payload or an error message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> CommandResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

impl<T> From<TrackerResult<T>> for CommandResponse<T> {
    fn from(result: TrackerResult<T>) -> Self {
        match result {
            Ok(data) => CommandResponse::ok(data),
            Err(err) => CommandResponse::failure(err.to_string()),
        }
    }
}
