//! Standard locations for pdbridge files

use std::path::{Path, PathBuf};

const APP_DIR: &str = "pdbridge";

/// Per-user configuration directory
///
/// Returns: `<config dir>/pdbridge` (e.g. `~/.config/pdbridge` on Linux),
/// falling back to `./pdbridge` when the platform has no config dir.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Path of a config file inside [`config_dir`]
pub fn default_config_path(filename: &str) -> PathBuf {
    config_dir().join(filename)
}

/// Directory holding the shared-memory regions
///
/// `/dev/shm/pdbridge` where a RAM-backed `/dev/shm` exists, otherwise
/// `pdbridge` under the system temp dir.
pub fn default_shm_dir() -> PathBuf {
    let shm = Path::new("/dev/shm");
    if shm.is_dir() {
        shm.join(APP_DIR)
    } else {
        std::env::temp_dir().join(APP_DIR)
    }
}
