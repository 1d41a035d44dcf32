//! Error types for the interprocess transport

use std::path::PathBuf;
use thiserror::Error;

/// Errors from shared regions, queues and the remote process lifecycle
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Shared region '{name}' is {actual} bytes, need at least {required}")]
    RegionTooSmall {
        name: String,
        actual: usize,
        required: usize,
    },

    #[error("Peer did not publish '{0}' in time")]
    PeerNotReady(String),

    #[error("Shared region '{name}' has layout version {found}, expected {expected}")]
    VersionMismatch {
        name: String,
        found: u32,
        expected: u32,
    },

    #[error("Audio block of {channels} channels x {samples} samples exceeds the shared region")]
    BlockTooLarge { channels: usize, samples: usize },

    #[error("Corrupt audio header: {channels} channels, {samples} samples")]
    CorruptHeader { channels: i32, samples: i32 },

    #[error("Message of {size} bytes exceeds the {max}-byte limit")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Control queue '{0}' is full, message dropped")]
    MessageDropped(String),

    #[error("Remote executable not found (searched {searched:?})")]
    RemoteNotFound { searched: Vec<PathBuf> },

    #[error("Failed to launch {path:?}: {source}")]
    LaunchFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error("Instance id {0:?} cannot name a shared resource")]
    InvalidInstanceId(String),

    #[error("Control channel is not connected")]
    Disconnected,
}

impl IpcError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// Result type for IPC operations
pub type IpcResult<T> = Result<T, IpcError>;
