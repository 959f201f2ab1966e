use thiserror::Error;

/// Application-wide error types for plugpoll.
///
/// Every failure of a single scrape or parse is one of these and stays scoped
/// to the target it happened on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Malformed response, rejected status or content type, or an unparsable payload.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A required field is absent from a parsed payload.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Connection, DNS, TLS or timeout failure reported by the HTTP transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Unexpected internal state, e.g. the transport could not be initialized.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Invalid startup configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Prefix the message with `context`, keeping the error kind.
    pub fn context(self, context: impl std::fmt::Display) -> Self {
        match self {
            AppError::InvalidInput(msg) => AppError::InvalidInput(format!("{context}: {msg}")),
            AppError::NotFound(msg) => AppError::NotFound(format!("{context}: {msg}")),
            AppError::Transport(msg) => AppError::Transport(format!("{context}: {msg}")),
            AppError::Internal(msg) => AppError::Internal(format!("{context}: {msg}")),
            AppError::Config(msg) => AppError::Config(format!("{context}: {msg}")),
        }
    }

    /// Short, stable name of the error kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::NotFound(_) => "not_found",
            AppError::Transport(_) => "transport",
            AppError::Internal(_) => "internal",
            AppError::Config(_) => "config",
        }
    }
}

/// Misuse of the [`Poller`](crate::poller::Poller) lifecycle.
///
/// These are returned from the offending call and never affect ticks that are
/// already in progress.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollerError {
    #[error("Poller is already running; stop it before running it again")]
    AlreadyRunning,

    #[error("Cannot add target \"{0}\" while the poller is running")]
    TargetsFrozen(String),

    #[error("Duplicate target name \"{0}\"")]
    DuplicateTarget(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_preserves_kind() {
        let err = AppError::Transport("connection refused".into()).context("Failed to scrape x");
        assert!(matches!(err, AppError::Transport(_)));
        assert_eq!(
            err.to_string(),
            "Transport error: Failed to scrape x: connection refused"
        );

        let err = AppError::NotFound("voltage".into()).context("Failed to parse JSON");
        assert!(matches!(err, AppError::NotFound(ref m) if m.ends_with("voltage")));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(AppError::InvalidInput(String::new()).kind(), "invalid_input");
        assert_eq!(AppError::Transport(String::new()).kind(), "transport");
        assert_eq!(AppError::Config(String::new()).kind(), "config");
    }

    #[test]
    fn test_poller_error_messages() {
        assert!(
            PollerError::TargetsFrozen("kitchen".into())
                .to_string()
                .contains("kitchen")
        );
        assert!(
            PollerError::DuplicateTarget("office".into())
                .to_string()
                .contains("Duplicate")
        );
    }
}
