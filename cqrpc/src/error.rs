//! Error types for cqrpc.

use std::fmt;

/// Error type for cqrpc operations.
#[derive(Debug)]
pub enum Error {
    /// IO error from the underlying transport.
    Io(std::io::Error),
    /// The connection (or an in-process channel end) has been closed.
    Disconnected,
    /// Message exceeds the configured maximum size.
    MessageTooLarge { size: usize, max: usize },
    /// Invalid magic number in a frame header.
    InvalidMagic { expected: u8, got: u8 },
    /// Invalid frame kind byte.
    InvalidFrameKind(u8),
    /// Invalid status code byte.
    InvalidStatusCode(u8),
    /// Metadata entry failed to decode.
    InvalidMetadata(&'static str),
    /// Buffer too small to hold a frame header.
    BufferTooSmall { required: usize, available: usize },
    /// The operation has not completed yet.
    NotReady,
    /// The call was already finished or consumed.
    AlreadyFinished,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Disconnected => write!(f, "Connection closed"),
            Error::MessageTooLarge { size, max } => {
                write!(f, "Message too large: {} bytes, max {} bytes", size, max)
            }
            Error::InvalidMagic { expected, got } => {
                write!(f, "Invalid magic: expected {:#x}, got {:#x}", expected, got)
            }
            Error::InvalidFrameKind(k) => write!(f, "Invalid frame kind: {}", k),
            Error::InvalidStatusCode(c) => write!(f, "Invalid status code: {}", c),
            Error::InvalidMetadata(msg) => write!(f, "Invalid metadata: {}", msg),
            Error::BufferTooSmall { required, available } => {
                write!(
                    f,
                    "Buffer too small: required {} bytes, available {} bytes",
                    required, available
                )
            }
            Error::NotReady => write!(f, "Operation has not completed"),
            Error::AlreadyFinished => write!(f, "Call was already finished"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Disconnected
        } else {
            Error::Io(e)
        }
    }
}

/// Result type for cqrpc operations.
pub type Result<T> = std::result::Result<T, Error>;
