//! libusb context shared by both USB backends

use rusb::UsbContext as _;
use std::fmt;
use tether_core::{CommunicationError, Result};
use tracing::debug;

/// Owned libusb context. Cloning shares the same native context.
#[derive(Clone)]
pub struct UsbContext {
    context: rusb::Context,
}

impl UsbContext {
    pub fn new() -> Result<Self> {
        let mut context = rusb::Context::new()
            .map_err(|e| CommunicationError::Resource(format!("failed to create libusb context: {}", e)))?;
        context.set_log_level(rusb::LogLevel::Warning);

        debug!("libusb context created");
        Ok(Self { context })
    }

    pub(crate) fn devices(&self) -> Result<rusb::DeviceList<rusb::Context>> {
        self.context.devices().map_err(crate::error::native)
    }
}

impl fmt::Debug for UsbContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsbContext").finish_non_exhaustive()
    }
}
