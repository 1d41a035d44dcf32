//! Locating, launching and stopping the remote engine process

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::error::{IpcError, IpcResult};
use crate::config::IpcConfig;

/// File stem of the engine binary
pub const REMOTE_EXECUTABLE: &str = "pdbridge-remote";

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A running remote
pub trait RemoteProcess: Send {
    fn is_running(&mut self) -> bool;

    /// Wait up to `timeout` for exit; `true` once it has exited
    fn wait_timeout(&mut self, timeout: Duration) -> bool;

    /// Terminate forcefully and reap
    fn kill(&mut self);
}

/// Starts a remote for an instance id
pub trait RemoteLauncher: Send {
    fn launch(&mut self, instance_id: &str) -> IpcResult<Box<dyn RemoteProcess>>;
}

impl RemoteProcess for Child {
    fn is_running(&mut self) -> bool {
        matches!(self.try_wait(), Ok(None))
    }

    fn wait_timeout(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            match self.try_wait() {
                Ok(Some(_)) | Err(_) => return true,
                Ok(None) => {}
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }

    fn kill(&mut self) {
        if let Err(e) = Child::kill(self) {
            log::debug!("kill remote {}: {}", self.id(), e);
        }
        let _ = self.wait();
    }
}

/// Search order: explicit path, next to the current executable, the user data dir
pub fn locate_remote_executable(explicit: Option<&Path>) -> IpcResult<PathBuf> {
    let file_name = format!("{}{}", REMOTE_EXECUTABLE, std::env::consts::EXE_SUFFIX);

    let mut searched = Vec::new();
    if let Some(path) = explicit {
        searched.push(path.to_path_buf());
    }
    if let Some(dir) = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
        searched.push(dir.join(&file_name));
    }
    if let Some(data) = dirs::data_dir() {
        searched.push(data.join("pdbridge").join(&file_name));
    }

    match searched.iter().find(|path| path.is_file()) {
        Some(path) => Ok(path.clone()),
        None => Err(IpcError::RemoteNotFound { searched }),
    }
}

/// Launches the `pdbridge-remote` binary with the instance id as its only argument
#[derive(Debug, Clone, Default)]
pub struct ExecutableLauncher {
    explicit: Option<PathBuf>,
}

impl ExecutableLauncher {
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self { explicit }
    }

    pub fn from_config(config: &IpcConfig) -> Self {
        Self::new(config.remote_executable.clone())
    }
}

impl RemoteLauncher for ExecutableLauncher {
    fn launch(&mut self, instance_id: &str) -> IpcResult<Box<dyn RemoteProcess>> {
        let path = locate_remote_executable(self.explicit.as_deref())?;
        let child = Command::new(&path)
            .arg(instance_id)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| IpcError::LaunchFailed {
                path: path.clone(),
                source,
            })?;

        log::info!("Launched remote {:?} for '{}' (pid {})", path, instance_id, child.id());
        Ok(Box::new(child))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("custom-remote");
        std::fs::write(&exe, b"").unwrap();
        assert_eq!(locate_remote_executable(Some(&exe)).unwrap(), exe);
    }

    #[test]
    fn test_missing_explicit_path_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("missing");
        match locate_remote_executable(Some(&exe)) {
            Ok(found) => assert_ne!(found, exe),
            Err(IpcError::RemoteNotFound { searched }) => assert_eq!(searched[0], exe),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_launch_failure_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        // A plain file without exec permission cannot be spawned
        let exe = dir.path().join("not-executable");
        std::fs::write(&exe, b"not a program").unwrap();
        let mut launcher = ExecutableLauncher::new(Some(exe.clone()));
        match launcher.launch("id") {
            Err(IpcError::LaunchFailed { path, .. }) => assert_eq!(path, exe),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(mut process) => {
                process.kill();
                panic!("launching a non-executable file succeeded");
            }
        }
    }
}
