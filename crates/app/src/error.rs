use aviary_foundation::{Categorized, ErrorKind};
use thiserror::Error;

/// Failure of a side-effecting action or of an external collaborator.
///
/// Variants carry the component and operation that failed so telemetry and
/// log lines stay structured; the job queue looks only at `kind()` to decide
/// retryability.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("{component}: invalid input in {operation}: {message}")]
    Validation {
        component: &'static str,
        operation: &'static str,
        message: String,
    },

    #[error("{component}: {operation} target not found: {message}")]
    NotFound {
        component: &'static str,
        operation: &'static str,
        message: String,
    },

    #[error("{component}: permission denied in {operation}: {message}")]
    Permission {
        component: &'static str,
        operation: &'static str,
        message: String,
    },

    #[error("{component}: {operation} timed out")]
    Timeout {
        component: &'static str,
        operation: &'static str,
    },

    #[error("{component}: transport failure in {operation}: {message}")]
    Network {
        component: &'static str,
        operation: &'static str,
        message: String,
    },

    #[error("{component}: transient HTTP {status} in {operation}")]
    HttpTransient {
        component: &'static str,
        operation: &'static str,
        status: u16,
    },

    #[error("{component}: HTTP {status} in {operation}")]
    HttpPermanent {
        component: &'static str,
        operation: &'static str,
        status: u16,
    },

    #[error("command {command} exited with status {exit_code}: {output}")]
    CommandExecution {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("{component}: store failure in {operation}: {message}")]
    Storage {
        component: &'static str,
        operation: &'static str,
        message: String,
    },

    #[error("{component}: sub-action panicked: {message}")]
    Panicked {
        component: &'static str,
        message: String,
    },
}

impl Categorized for ActionError {
    fn kind(&self) -> ErrorKind {
        match self {
            ActionError::Validation { .. } => ErrorKind::Validation,
            ActionError::NotFound { .. } => ErrorKind::NotFound,
            ActionError::Permission { .. } => ErrorKind::Permission,
            ActionError::Timeout { .. } => ErrorKind::Timeout,
            ActionError::Network { .. } => ErrorKind::Network,
            ActionError::HttpTransient { .. } => ErrorKind::HttpTransient,
            ActionError::HttpPermanent { .. } => ErrorKind::HttpPermanent,
            ActionError::CommandExecution { .. } => ErrorKind::CommandExecution,
            ActionError::Storage { .. } => ErrorKind::Storage,
            ActionError::Panicked { .. } => ErrorKind::System,
        }
    }
}
