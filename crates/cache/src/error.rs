//! Error types shared across the cache.

use std::fmt::Display;
use std::io;

/// Why a resource could not be produced.
///
/// Loaders return these; the cache hands them to the waiting callback
/// unchanged. A failure never creates a cache entry, so the next request
/// for the same key tries again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// The resource does not exist.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The source is temporarily unable to answer.
    #[error("temporary failure: {0}")]
    TemporaryFailure(String),

    /// The source could not be reached.
    #[error("communication failure: {0}")]
    CommunicationFailure(String),

    /// Access to the resource was denied.
    #[error("privilege violation: {0}")]
    PrivilegeViolation(String),

    /// The resource is bigger than the configured cap.
    #[error("resource too large (limit is {max_size} bytes)")]
    TooLarge { max_size: usize },

    /// Any other fault inside a loader, including a panic.
    #[error("internal loader failure: {0}")]
    Internal(String),
}

impl LoadError {
    /// Wrap an arbitrary loader fault.
    pub fn internal(err: impl Display) -> Self {
        LoadError::Internal(err.to_string())
    }

    /// Returns `true` if a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LoadError::TemporaryFailure(_) | LoadError::CommunicationFailure(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::NotFound(_))
    }
}

impl From<io::Error> for LoadError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => LoadError::NotFound(err.to_string()),
            io::ErrorKind::PermissionDenied => LoadError::PrivilegeViolation(err.to_string()),
            io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock => LoadError::TemporaryFailure(err.to_string()),
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe => LoadError::CommunicationFailure(err.to_string()),
            _ => LoadError::Internal(err.to_string()),
        }
    }
}

/// Errors raised while constructing a cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to spawn fetch worker: {0}")]
    SpawnWorker(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LoadError::TemporaryFailure("busy".into()).is_transient());
        assert!(LoadError::CommunicationFailure("reset".into()).is_transient());
        assert!(!LoadError::NotFound("gone".into()).is_transient());
        assert!(!LoadError::PrivilegeViolation("401".into()).is_transient());
        assert!(!LoadError::TooLarge { max_size: 10 }.is_transient());
    }

    #[test]
    fn test_from_io_error() {
        let not_found = io::Error::new(io::ErrorKind::NotFound, "missing");
        assert!(LoadError::from(not_found).is_not_found());

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(LoadError::from(denied), LoadError::PrivilegeViolation(_)));

        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(LoadError::from(reset).is_transient());

        let other = io::Error::new(io::ErrorKind::Other, "weird");
        assert!(matches!(LoadError::from(other), LoadError::Internal(_)));
    }

    #[test]
    fn test_display() {
        let err = LoadError::TooLarge { max_size: 30_000_000 };
        assert_eq!(err.to_string(), "resource too large (limit is 30000000 bytes)");
    }
}
