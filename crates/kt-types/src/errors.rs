use thiserror::Error;

/// Main error type for the KnobTune system
#[derive(Error, Debug)]
pub enum TuneError {
    #[error("Remote service error: {0}")]
    Remote(String),

    #[error("Script `{command}` failed: {message}")]
    Script { command: String, message: String },

    #[error("Project error: {0}")]
    Project(String),

    #[error("project {0} not found")]
    ProjectNotFound(String),

    #[error("{0} project has not been executed the dynamic optimizer search")]
    BaselineMissing(String),

    #[error("dynamic optimizer search or analysis has been in running")]
    SessionBusy,

    #[error("create task failed for client ask iters less than tuning history")]
    BudgetExhausted,

    #[error("Evaluation parse error: {0}")]
    Evaluation(String),

    #[error("Peer sync to {peer} failed: {message}")]
    PeerSync { peer: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session channel closed")]
    ChannelClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for KnobTune operations
pub type TuneResult<T> = Result<T, TuneError>;

impl TuneError {
    /// Remote-service error from any displayable cause.
    pub fn remote(err: impl std::fmt::Display) -> Self {
        Self::Remote(err.to_string())
    }

    /// Script failure for `command` with the underlying cause.
    pub fn script(command: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Script {
            command: command.into(),
            message: err.to_string(),
        }
    }
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::errors::TuneError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::errors::TuneError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = TuneError::Script {
            command: "sysctl -n vm.swappiness".to_string(),
            message: "exit status 1".to_string(),
        };
        assert!(error.to_string().contains("sysctl -n vm.swappiness"));
        assert!(error.to_string().contains("exit status 1"));
    }

    #[test]
    fn test_baseline_missing_names_project() {
        let error = TuneError::BaselineMissing("nginx".to_string());
        assert!(error.to_string().starts_with("nginx project"));
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TuneError = io_err.into();
        match err {
            TuneError::Io(_) => (),
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn test_macros() {
        let _internal = internal_error!("iteration {} out of range", 42);
        let _config = config_error!("missing key: {}", "address");
    }
}
