//! Error types for the engine process
//!
//! Patch-level failures are reported back to the editor and never stop the
//! engine; transport failures at startup are fatal.

use std::path::PathBuf;
use thiserror::Error;

use pdbridge_core::ipc::IpcError;

/// Errors that can occur while serving an editor
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Shared-memory transport failure
    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),

    /// Failed to initialize the patch interpreter
    #[error("Failed to initialize the interpreter: {0}")]
    InitializationFailed(String),

    /// Patch file not found
    #[error("Patch file not found: {0}")]
    PatchNotFound(PathBuf),

    /// Failed to open a patch file
    #[error("Failed to open patch '{path}': {reason}")]
    PatchOpenFailed { path: PathBuf, reason: String },

    /// No open patch has this id
    #[error("Unknown patch '{0}'")]
    UnknownPatch(String),

    /// The patch has no object with this id
    #[error("Unknown object '{object_id}' in patch '{patch_id}'")]
    UnknownObject { patch_id: String, object_id: String },

    /// The interpreter rejected a command
    #[error("Command '{command}' failed: {reason}")]
    CommandFailed { command: &'static str, reason: String },
}

/// Result type for engine operations
pub type RemoteResult<T> = Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RemoteError::PatchNotFound(PathBuf::from("/foo/bar.pd"));
        assert!(err.to_string().contains("/foo/bar.pd"));

        let err = RemoteError::UnknownObject {
            patch_id: "1001".to_string(),
            object_id: "7".to_string(),
        };
        assert!(err.to_string().contains("'7'"));
        assert!(err.to_string().contains("'1001'"));

        let err: RemoteError = IpcError::Disconnected.into();
        assert!(matches!(err, RemoteError::Ipc(_)));
    }
}
