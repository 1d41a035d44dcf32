//! pdbridge-remote - engine process launched by the editor
//!
//! Usage: `pdbridge-remote <instance-id>`
//!
//! The instance id names the shared-memory resources to attach to. The id
//! `test_mode` creates them instead so the engine can run without an editor.

use anyhow::{Context, Result};

use pdbridge_core::config::{default_config_path, load_config, BridgeConfig, CONFIG_FILE_NAME};
use pdbridge_remote::RemoteEngine;

fn main() -> Result<()> {
    let Some(instance_id) = std::env::args().nth(1) else {
        eprintln!("usage: pdbridge-remote <instance-id>");
        std::process::exit(2);
    };

    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("pdbridge-remote starting for '{}'", instance_id);

    let config: BridgeConfig = load_config(&default_config_path(CONFIG_FILE_NAME));
    run(&instance_id, &config)
}

#[cfg(feature = "pd")]
fn run(instance_id: &str, config: &BridgeConfig) -> Result<()> {
    let runtime = pdbridge_remote::pd::PdRuntime::new(config.engine.channels, config.engine.sample_rate)
        .context("starting libpd")?;
    let mut engine = RemoteEngine::connect(instance_id, config, runtime)
        .with_context(|| format!("attaching to editor '{}'", instance_id))?;
    engine.run();
    Ok(())
}

#[cfg(not(feature = "pd"))]
fn run(instance_id: &str, config: &BridgeConfig) -> Result<()> {
    log::info!("Built without the `pd` feature; patches are not rendered");
    let runtime = pdbridge_remote::HeadlessRuntime::new();
    let mut engine = RemoteEngine::connect(instance_id, config, runtime)
        .with_context(|| format!("attaching to editor '{}'", instance_id))?;
    engine.run();
    Ok(())
}
