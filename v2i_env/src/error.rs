//! Error types for the environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Datagram send failed (socket closed, unreachable, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The target address could not be resolved or bound
    #[error("Cannot reach {target}: {reason}")]
    Unresolvable { target: String, reason: String },

    /// Context operation failed
    #[error("Context error: {0}")]
    ContextError(String),
}

impl EnvError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }

    /// Creates an unresolvable-target error.
    pub fn unresolvable(target: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Self::Unresolvable {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<std::io::Error> for EnvError {
    fn from(err: std::io::Error) -> Self {
        Self::NetworkError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EnvError::unresolvable("nowhere:1", "no such host");
        assert_eq!(err.to_string(), "Cannot reach nowhere:1: no such host");

        let err: EnvError = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, EnvError::NetworkError(_)));
    }
}
