//! Error types for distla
//!
//! Only conditions a correct caller can run into are errors: transport
//! failures and numerical breakdowns. Misuse (bad indices, nonconformant
//! operands, mismatched grids) panics at the call site.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using distla's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in distla operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The transport could not deliver or receive a message
    #[error("Transport error: {0}")]
    Transport(String),

    /// A blocking receive waited longer than the configured timeout
    #[error("Timed out after {waited:?} waiting for a message from world rank {source_rank}")]
    Timeout {
        /// World rank the receive was waiting on
        source_rank: usize,
        /// How long the receive waited
        waited: Duration,
    },

    /// An exactly-zero pivot was met during a factorization
    #[error("Singular pivot at index {index}")]
    SingularPivot {
        /// Step of the factorization that failed
        index: usize,
    },

    /// A Cholesky factorization met a non-positive diagonal entry
    #[error("Matrix is not Hermitian positive definite (failed at index {index})")]
    NotPositiveDefinite {
        /// Step of the factorization that failed
        index: usize,
    },

    /// An iterative method hit its iteration cap
    #[error("Only {converged} of {total} estimates converged within {iterations} iterations")]
    NoConvergence {
        /// Number of converged items
        converged: usize,
        /// Total number of items
        total: usize,
        /// Iterations performed
        iterations: usize,
    },

    /// Invalid argument provided at runtime (configuration, file contents)
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// I/O failure while reading or writing a matrix
    #[error("I/O error: {0}")]
    Io(String),

    /// Feature not yet implemented
    #[error("Not implemented: {feature}")]
    NotImplemented {
        /// Description of the unimplemented feature
        feature: &'static str,
    },
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }

    /// Whether this error reports a numerical breakdown rather than a
    /// communication failure
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            Self::SingularPivot { .. } | Self::NotPositiveDefinite { .. } | Self::NoConvergence { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
