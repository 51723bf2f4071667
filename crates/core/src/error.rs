// Error Taxonomy
//
// The closed set of error kinds surfaced to transports. Driver and operating
// system error detail never enters these values; it is logged at the failure
// site and the caller receives the kind alone.

use thiserror::Error;

/// Stable, classifiable error kinds carried end-to-end.
///
/// Transports map these to their own wire statuses via [`Error::tag`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An identifier failed structural validation.
    #[error("invalid id")]
    InvalidId,

    /// Input data is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested resource has not been found.
    #[error("not found")]
    NotFound,

    /// The resource cannot be created because it already exists.
    #[error("already exists")]
    AlreadyExists,

    /// The request does not carry valid authentication credentials.
    #[error("authentication failed")]
    Unauthenticated,

    /// The caller is identified but has no permission to execute the
    /// operation.
    #[error("permission denied")]
    Unauthorized,

    /// Transient storage failure, including serialization aborts.
    /// Callers should retry with a backoff.
    #[error("temporarily unavailable")]
    Unavailable,

    /// The engine is shutting down and no longer accepts operations.
    #[error("graceful shutdown")]
    GracefulShutdown,

    /// A batch exceeds the allowed size limits.
    #[error("invalid batch size")]
    InvalidBatchSize,
}

impl Error {
    /// Stable tag used for transport status mapping and structured logging.
    pub fn tag(&self) -> &'static str {
        match self {
            Error::InvalidId => "invalid_id",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::NotFound => "not_found",
            Error::AlreadyExists => "already_exists",
            Error::Unauthenticated => "unauthenticated",
            Error::Unauthorized => "unauthorized",
            Error::Unavailable => "unavailable",
            Error::GracefulShutdown => "graceful_shutdown",
            Error::InvalidBatchSize => "invalid_batch_size",
        }
    }
}

/// Result type alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_stable() {
        let cases = [
            (Error::InvalidId, "invalid_id"),
            (Error::InvalidArgument("x".into()), "invalid_argument"),
            (Error::NotFound, "not_found"),
            (Error::AlreadyExists, "already_exists"),
            (Error::Unauthenticated, "unauthenticated"),
            (Error::Unauthorized, "unauthorized"),
            (Error::Unavailable, "unavailable"),
            (Error::GracefulShutdown, "graceful_shutdown"),
            (Error::InvalidBatchSize, "invalid_batch_size"),
        ];

        for (err, tag) in cases {
            assert_eq!(err.tag(), tag);
        }
    }

    #[test]
    fn display_does_not_leak_context_for_infra_kinds() {
        assert_eq!(Error::Unavailable.to_string(), "temporarily unavailable");
        assert_eq!(Error::NotFound.to_string(), "not found");
    }

    #[test]
    fn invalid_argument_carries_reason() {
        let err = Error::InvalidArgument("queue name is empty".into());
        assert_eq!(err.to_string(), "invalid argument: queue name is empty");
    }
}
