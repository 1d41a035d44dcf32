//! Interprocess transport between the editor (host) and the engine (remote)
//!
//! Every resource lives in a file-backed shared-memory region named after the
//! instance id:
//!
//! | Region               | Owner | Contents                                   |
//! |----------------------|-------|--------------------------------------------|
//! | `<id>_audiobuffer`   | host  | audio block header + channel-major samples |
//! | `<id>_sync`          | host  | handshake flags (magic/version/ready)      |
//! | `<id>_receive`       | host  | control queue, host → remote               |
//! | `<id>_send`          | host  | control queue, remote → host               |
//! | `<id>_levelmeter`    | host  | four telemetry slots                       |
//!
//! The reserved id [`TEST_MODE_ID`] makes the remote create the control
//! resources itself so it can run without a host.

mod audio;
mod control;
mod error;
mod liveness;
mod mailbox;
mod process;
mod queue;
mod region;
mod telemetry;

pub use audio::{AudioChannel, AudioMode, AUDIO_REGION_BYTES, MAX_CHANNELS, MAX_SAMPLES_PER_CHANNEL};
pub use control::{ControlChannel, Role};
pub use error::{IpcError, IpcResult};
pub use process::{
    locate_remote_executable, ExecutableLauncher, RemoteLauncher, RemoteProcess, REMOTE_EXECUTABLE,
};
pub use queue::SharedQueue;
pub use region::{SharedRegion, ShmNamespace};
pub use telemetry::{LevelMeterStatus, TelemetryRegion};

/// Instance id that lets the remote run standalone
pub const TEST_MODE_ID: &str = "test_mode";

pub(crate) const AUDIO_BUFFER_SUFFIX: &str = "audiobuffer";
pub(crate) const SYNC_SUFFIX: &str = "sync";
pub(crate) const REMOTE_TO_HOST_SUFFIX: &str = "send";
pub(crate) const HOST_TO_REMOTE_SUFFIX: &str = "receive";
pub(crate) const LEVEL_METER_SUFFIX: &str = "levelmeter";

/// `<instance_id>_<suffix>`
///
/// The id becomes part of a file name inside the namespace directory, so ids
/// that are empty or carry path syntax are rejected.
pub fn resource_name(instance_id: &str, suffix: &str) -> IpcResult<String> {
    let has_path_syntax = instance_id.contains(['/', '\\', '\0']) || instance_id.contains("..");
    if instance_id.is_empty() || has_path_syntax {
        return Err(IpcError::InvalidInstanceId(instance_id.to_string()));
    }
    Ok(format!("{}_{}", instance_id, suffix))
}

/// Embedding hosts (plugins) run the engine on a thread instead of a process
pub fn uses_in_process_audio(instance_id: &str) -> bool {
    instance_id.contains("plugin")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_name() {
        assert_eq!(resource_name("pd-1", SYNC_SUFFIX).unwrap(), "pd-1_sync");
        assert_eq!(resource_name(TEST_MODE_ID, LEVEL_METER_SUFFIX).unwrap(), "test_mode_levelmeter");
    }

    #[test]
    fn test_ids_cannot_leave_the_namespace() {
        for id in ["", "../escape", "a/b", "..", "a\\b", "nul\0id"] {
            assert!(
                matches!(resource_name(id, SYNC_SUFFIX), Err(IpcError::InvalidInstanceId(_))),
                "{:?} accepted",
                id
            );
        }
    }

    #[test]
    fn test_plugin_ids_use_in_process_audio() {
        assert!(uses_in_process_audio("plugin-42"));
        assert!(!uses_in_process_audio("standalone-42"));
    }
}
