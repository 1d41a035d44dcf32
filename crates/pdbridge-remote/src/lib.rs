//! pdbridge Remote - the headless engine process
//!
//! Serves one editor over the shared-memory transport in `pdbridge-core`:
//!
//! - [`remote`]: the message handler and block loop ([`RemoteEngine`])
//! - [`patches`]: the interpreter boundary ([`PatchHost`]) and the default
//!   [`HeadlessRuntime`]
//! - [`console`]: joins interpreter print fragments into console lines
//! - [`meter`]: level and MIDI activity telemetry
//! - [`midi`]: MIDI in the interpreter's terms
//! - `pd` (feature `pd`): [`PdRuntime`](pd::PdRuntime) on libpd-rs

pub mod console;
pub mod error;
pub mod meter;
pub mod midi;
pub mod patches;
#[cfg(feature = "pd")]
pub mod pd;
pub mod remote;

pub use error::{RemoteError, RemoteResult};
pub use patches::{HeadlessRuntime, PatchHost};
pub use remote::{AudioStatus, RemoteEngine};
