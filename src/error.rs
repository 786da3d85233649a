use crate::domain::TaskStatus;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the task engine
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("cannot {action} task {id} while it is {from}")]
    InvalidTransition {
        id: Uuid,
        from: TaskStatus,
        action: &'static str,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Errors raised by a persistence gateway
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T, E = TaskError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let id = Uuid::nil();
        let err = TaskError::InvalidTransition {
            id,
            from: TaskStatus::Pending,
            action: "pause",
        };
        assert_eq!(
            err.to_string(),
            format!("cannot pause task {} while it is pending", id)
        );
    }

    #[test]
    fn test_persistence_error_converts() {
        let err: TaskError = PersistenceError::Unavailable("disk full".to_string()).into();
        assert!(matches!(err, TaskError::Persistence(_)));
        assert_eq!(err.to_string(), "store unavailable: disk full");
    }
}
