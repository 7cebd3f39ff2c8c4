//! Error taxonomy shared by every transport

use thiserror::Error;

use crate::address::AddressError;

#[derive(Error, Debug)]
pub enum CommunicationError {
    /// Native socket or USB resource could not be created or opened
    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Device is not open")]
    NotConnected,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Host {0} is unreachable")]
    Unreachable(String),

    #[error("Address error: {0}")]
    AddressFormat(#[from] AddressError),

    #[error("Transfer kind '{transfer}' is not supported by the {transport} transport")]
    UnsupportedTransferKind {
        transport: &'static str,
        transfer: &'static str,
    },

    /// Failure reported by the native backend with its own error code
    #[error("{message} (code {code})")]
    Native { code: i32, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CommunicationError {
    /// Native code carried by this error, if any
    pub fn native_code(&self) -> Option<i32> {
        match self {
            Self::Native { code, .. } => Some(*code),
            Self::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CommunicationError>;

/// Reject empty buffers before any native call
pub fn check_buffer(len: usize) -> Result<()> {
    if len == 0 {
        return Err(CommunicationError::InvalidArgument(
            "buffer must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_code() {
        let err = CommunicationError::Native {
            code: -4,
            message: "LIBUSB_ERROR_NO_DEVICE".to_string(),
        };
        assert_eq!(err.native_code(), Some(-4));
        assert_eq!(err.to_string(), "LIBUSB_ERROR_NO_DEVICE (code -4)");
        assert_eq!(CommunicationError::NotConnected.native_code(), None);
    }

    #[test]
    fn test_check_buffer() {
        assert!(matches!(
            check_buffer(0),
            Err(CommunicationError::InvalidArgument(_))
        ));
        assert!(check_buffer(1).is_ok());
    }
}
