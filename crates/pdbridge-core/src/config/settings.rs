//! Bridge configuration schema

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::paths::default_shm_dir;

/// Default config file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "bridge.yaml";

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Shared memory, queues and liveness
    pub ipc: IpcConfig,
    /// Fixed-latency engine
    pub engine: EngineConfig,
}

/// Interprocess transport settings
///
/// Times are stored in milliseconds; use the accessor methods for `Duration`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Directory for the file-backed regions
    /// Default: `/dev/shm/pdbridge`, or the temp dir when unavailable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shm_dir: Option<PathBuf>,

    /// Messages each control queue holds before sends are dropped
    /// Default: 100
    pub queue_depth: usize,

    /// Largest control frame in bytes
    /// Default: 20480
    pub max_message_size: usize,

    /// Heartbeat period
    /// Default: 1000 ms
    pub ping_interval_ms: u64,

    /// Time without a reply before the remote is considered lost
    /// Default: 1000 ms
    pub ping_timeout_ms: u64,

    /// Time the remote gets to exit after `Quit` before it is killed
    /// Default: 500 ms
    pub quit_grace_ms: u64,

    /// Remote-side wait for the next input block
    /// Default: 500 ms
    pub input_timeout_ms: u64,

    /// Host-side wait for a processed block; `None` waits forever
    /// Default: 500 ms
    pub output_timeout_ms: Option<u64>,

    /// How long a peer waits for the owner's regions to become ready
    /// Default: 5000 ms
    pub peer_open_timeout_ms: u64,

    /// Remote exits after this long without a ping once connected
    /// Default: 8000 ms
    pub remote_watchdog_ms: u64,

    /// Explicit path to the engine executable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_executable: Option<PathBuf>,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            shm_dir: None,
            queue_depth: 100,
            max_message_size: 20480,
            ping_interval_ms: 1000,
            ping_timeout_ms: 1000,
            quit_grace_ms: 500,
            input_timeout_ms: 500,
            output_timeout_ms: Some(500),
            peer_open_timeout_ms: 5000,
            remote_watchdog_ms: 8000,
            remote_executable: None,
        }
    }
}

impl IpcConfig {
    /// Region directory, resolved against the platform default
    pub fn shm_dir(&self) -> PathBuf {
        self.shm_dir.clone().unwrap_or_else(default_shm_dir)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms.max(1))
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn quit_grace(&self) -> Duration {
        Duration::from_millis(self.quit_grace_ms)
    }

    pub fn input_timeout(&self) -> Duration {
        Duration::from_millis(self.input_timeout_ms)
    }

    pub fn output_timeout(&self) -> Option<Duration> {
        self.output_timeout_ms.map(Duration::from_millis)
    }

    pub fn peer_open_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_open_timeout_ms)
    }

    pub fn remote_watchdog(&self) -> Duration {
        Duration::from_millis(self.remote_watchdog_ms)
    }

    /// Number of missed ticks tolerated before declaring the remote lost
    ///
    /// `ceil(timeout / interval) + 1`
    pub fn ping_countdown_ticks(&self) -> u32 {
        let interval = self.ping_interval_ms.max(1);
        (self.ping_timeout_ms.div_ceil(interval) + 1) as u32
    }
}

/// Fixed-latency engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Internal block size (and latency) in samples
    /// Default: 64
    pub block_size: usize,

    /// Sample rate used until the host reports its own
    /// Default: 44100
    pub sample_rate: f64,

    /// Channels processed by the engine
    /// Default: 2
    pub channels: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: 64,
            sample_rate: 44100.0,
            channels: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.ipc.queue_depth, 100);
        assert_eq!(config.ipc.max_message_size, 20480);
        assert_eq!(config.ipc.output_timeout(), Some(Duration::from_millis(500)));
        assert_eq!(config.engine.block_size, 64);
        assert_eq!(config.engine.channels, 2);
    }

    #[test]
    fn test_countdown_ticks() {
        let mut ipc = IpcConfig::default();
        assert_eq!(ipc.ping_countdown_ticks(), 2);

        ipc.ping_interval_ms = 10;
        ipc.ping_timeout_ms = 25;
        assert_eq!(ipc.ping_countdown_ticks(), 4);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "ipc:\n  queue_depth: 8\nengine:\n  block_size: 128\n";
        let config: BridgeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.ipc.queue_depth, 8);
        assert_eq!(config.ipc.ping_interval_ms, 1000);
        assert_eq!(config.engine.block_size, 128);
        assert_eq!(config.engine.sample_rate, 44100.0);
    }
}
