//! Asynchronous discovery sessions

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::DiscoveryError;

/// Phase of a discovery request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStatus {
    /// Waiting for an earlier discovery to finish
    Queued,
    EnumeratingUsb,
    EnumeratingEthernet,
    Completed,
}

impl fmt::Display for DiscoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Queued => "queued",
            Self::EnumeratingUsb => "enumerating-usb",
            Self::EnumeratingEthernet => "enumerating-ethernet",
            Self::Completed => "completed",
        };
        f.write_str(text)
    }
}

/// Record of one in-flight asynchronous discovery.
///
/// Dropping the session detaches the task; it still runs to completion.
#[derive(Debug)]
pub struct DiscoverySession {
    id: Uuid,
    started_at: DateTime<Utc>,
    status: watch::Receiver<DiscoveryStatus>,
    handle: JoinHandle<()>,
}

impl DiscoverySession {
    pub(crate) fn new(
        id: Uuid,
        status: watch::Receiver<DiscoveryStatus>,
        handle: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            started_at: Utc::now(),
            status,
            handle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Latest reported phase
    pub fn status(&self) -> DiscoveryStatus {
        *self.status.borrow()
    }

    /// Channel that observes every later phase change
    pub fn subscribe(&self) -> watch::Receiver<DiscoveryStatus> {
        self.status.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the session to complete
    pub async fn wait(self) -> Result<(), DiscoveryError> {
        self.handle.await?;
        Ok(())
    }
}
