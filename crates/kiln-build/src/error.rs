//! Error types for kiln-build

use thiserror::Error;

use crate::session::SessionPhase;

/// Result type alias using kiln-build Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a build session
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the completion provider layer
    #[error(transparent)]
    Ai(#[from] kiln_ai::Error),

    /// The completion service failed or returned nothing usable
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// The prompt was classified as neither supported project kind
    #[error("Forbidden: prompt does not map to a supported project template")]
    Forbidden,

    /// A round-trip is already in flight for this session
    #[error("A request is already in progress")]
    Busy,

    /// The operation is not valid in the session's current phase
    #[error("Operation requires phase {expected:?}, session is {actual:?}")]
    InvalidPhase {
        expected: SessionPhase,
        actual: SessionPhase,
    },

    /// The initial prompt was empty
    #[error("Prompt is empty")]
    EmptyPrompt,

    /// The session was shut down and accepts no more requests
    #[error("Session has been shut down")]
    ShutDown,

    /// The sandbox could not be booted or driven
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// A generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the prompt itself was rejected, so retrying is pointless
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Error::Forbidden)
    }

    /// Human-readable detail suitable for an error banner
    pub fn detail(&self) -> String {
        match self {
            Error::Ai(e) => e.detail(),
            Error::Upstream(msg) | Error::Sandbox(msg) | Error::Other(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_is_distinct_from_upstream() {
        assert!(Error::Forbidden.is_forbidden());
        assert!(!Error::Upstream("timeout".into()).is_forbidden());
        assert!(!Error::Ai(kiln_ai::Error::InvalidApiKey).is_forbidden());
    }

    #[test]
    fn test_detail() {
        assert_eq!(Error::Upstream("No response generated".into()).detail(), "No response generated");
        assert_eq!(
            Error::Ai(kiln_ai::Error::api("x", "quota exhausted")).detail(),
            "quota exhausted"
        );
        assert_eq!(Error::Busy.detail(), "A request is already in progress");
    }
}
