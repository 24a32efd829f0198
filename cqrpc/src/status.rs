//! Call status carried on response frames.

use crate::error::{Error, Result};

/// Status code for a completed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    /// The call completed successfully.
    Ok = 0,
    /// The call was cancelled.
    Cancelled = 1,
    /// Unknown failure.
    Unknown = 2,
    /// Internal error on the serving side.
    Internal = 13,
    /// The service is unavailable.
    Unavailable = 14,
}

impl TryFrom<u8> for StatusCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(StatusCode::Ok),
            1 => Ok(StatusCode::Cancelled),
            2 => Ok(StatusCode::Unknown),
            13 => Ok(StatusCode::Internal),
            14 => Ok(StatusCode::Unavailable),
            _ => Err(Error::InvalidStatusCode(value)),
        }
    }
}

/// Final status of a unary call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: StatusCode,
    message: String,
}

impl Status {
    /// Create a new status.
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Successful status with an empty message.
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: String::new(),
        }
    }

    /// Check whether the status indicates success.
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }

    /// Get the status code.
    #[inline]
    pub fn code(&self) -> StatusCode {
        self.code
    }

    /// Get the status message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::ok()
    }
}
