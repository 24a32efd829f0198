//! Error types for the benchmark driver.
//!
//! Every variant is fatal: this harness measures the happy path only, and
//! masking a failure would corrupt the measurement. `main` prints the
//! diagnostic and exits nonzero.

use std::fmt;

use cqrpc::Status;

/// Fatal benchmark error.
#[derive(Debug)]
pub enum BenchError {
    /// Fixture or slot setup failed; the configuration cannot run.
    Config(cqrpc::Error),
    /// An unexpected tag was drained, a completion reported failure, or an
    /// expected completion never arrived.
    Invariant(String),
    /// The RPC completed with a non-success status.
    CallFailed(Status),
}

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchError::Config(e) => write!(f, "configuration error: {}", e),
            BenchError::Invariant(msg) => write!(f, "protocol invariant violated: {}", msg),
            BenchError::CallFailed(status) => write!(
                f,
                "call failed with status {:?}: {}",
                status.code(),
                status.message()
            ),
        }
    }
}

impl std::error::Error for BenchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BenchError::Config(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, BenchError>;
