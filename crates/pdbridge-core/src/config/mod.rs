//! Configuration for pdbridge processes
//!
//! Both the editor and the engine process read the same YAML file, so timing
//! and sizing knobs stay consistent across the process boundary.
//!
//! ```ignore
//! use pdbridge_core::config::{default_config_path, load_config, BridgeConfig};
//!
//! let config: BridgeConfig = load_config(&default_config_path("bridge.yaml"));
//! ```

mod io;
mod paths;
mod settings;

pub use io::{load_config, save_config};
pub use paths::{config_dir, default_config_path, default_shm_dir};
pub use settings::{BridgeConfig, EngineConfig, IpcConfig, CONFIG_FILE_NAME};
