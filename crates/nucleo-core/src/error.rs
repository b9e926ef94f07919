//! Error type shared by every Nucleo crate.

use thiserror::Error;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, NucleoError>;

#[derive(Debug, Error)]
pub enum NucleoError {
    /// Network, protocol or API failure reported by a collaborator.
    #[error("Channel error: {0}")]
    Channel(String),

    /// A collaborator call did not finish within its timeout.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Credentials were rejected.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Config error: {0}")]
    Config(String),

    /// A task could not be executed.
    #[error("Task error: {0}")]
    Task(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl NucleoError {
    /// Transient errors are swallowed where they happen and treated as
    /// "no result" for that call. Anything else that escapes a cycle is fatal
    /// for that cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, NucleoError::Channel(_) | NucleoError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(NucleoError::Channel("reset".into()).is_transient());
        assert!(NucleoError::Timeout("imap".into()).is_transient());
        assert!(!NucleoError::AuthFailed("bad password".into()).is_transient());
        assert!(!NucleoError::Config("missing".into()).is_transient());
        assert!(!NucleoError::Task("boom".into()).is_transient());
    }

    #[test]
    fn test_display() {
        let err = NucleoError::Timeout("send_notification after 10s".into());
        assert_eq!(err.to_string(), "Timed out: send_notification after 10s");
    }
}
