//! libusb error codes and names

use tether_core::CommunicationError;

/// libusb numeric code for a rusb error
pub fn error_code(error: &rusb::Error) -> i32 {
    match error {
        rusb::Error::Io => -1,
        rusb::Error::InvalidParam => -2,
        rusb::Error::Access => -3,
        rusb::Error::NoDevice => -4,
        rusb::Error::NotFound => -5,
        rusb::Error::Busy => -6,
        rusb::Error::Timeout => -7,
        rusb::Error::Overflow => -8,
        rusb::Error::Pipe => -9,
        rusb::Error::Interrupted => -10,
        rusb::Error::NoMem => -11,
        rusb::Error::NotSupported => -12,
        _ => -99,
    }
}

/// Symbolic name of a libusb error code, as `libusb_error_name` prints it
pub fn error_name(code: i32) -> &'static str {
    match code {
        0 => "LIBUSB_SUCCESS",
        -1 => "LIBUSB_ERROR_IO",
        -2 => "LIBUSB_ERROR_INVALID_PARAM",
        -3 => "LIBUSB_ERROR_ACCESS",
        -4 => "LIBUSB_ERROR_NO_DEVICE",
        -5 => "LIBUSB_ERROR_NOT_FOUND",
        -6 => "LIBUSB_ERROR_BUSY",
        -7 => "LIBUSB_ERROR_TIMEOUT",
        -8 => "LIBUSB_ERROR_OVERFLOW",
        -9 => "LIBUSB_ERROR_PIPE",
        -10 => "LIBUSB_ERROR_INTERRUPTED",
        -11 => "LIBUSB_ERROR_NO_MEM",
        -12 => "LIBUSB_ERROR_NOT_SUPPORTED",
        -99 => "LIBUSB_ERROR_OTHER",
        _ => "**UNKNOWN**",
    }
}

pub(crate) fn native(error: rusb::Error) -> CommunicationError {
    let code = error_code(&error);
    CommunicationError::Native {
        code,
        message: error_name(code).to_string(),
    }
}
