use super::model::TransitionStatus;
use thiserror::Error;

pub type TransitionResult<T> = Result<T, TransitionError>;

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// A lifecycle guard rejected the call. `status` is what the row held.
    #[error("{message}")]
    StateConflict {
        message: String,
        status: TransitionStatus,
    },

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl TransitionError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>, status: TransitionStatus) -> Self {
        Self::StateConflict {
            message: message.into(),
            status,
        }
    }

    pub fn transition_not_found() -> Self {
        Self::NotFound("transition not found".to_string())
    }

    /// Wire code used by the sidecar error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "bad_params",
            Self::NotFound(_) => "not_found",
            Self::StateConflict { .. } => "state_conflict",
            Self::Store(_) => "db_tx_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::StateConflict { status, .. } => {
                Some(serde_json::json!({ "status": status.as_str() }))
            }
            _ => None,
        }
    }
}
