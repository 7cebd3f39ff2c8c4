use thiserror::Error;

/// Failures of a discovery request as a whole. Individual unreachable hosts
/// or unreadable USB devices never surface here.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Device manager has been shut down")]
    ShutDown,

    #[error("Synchronous discovery cannot run inside an async runtime; use `discover` instead")]
    NestedRuntime,

    #[error("Failed to start discovery runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Discovery task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
