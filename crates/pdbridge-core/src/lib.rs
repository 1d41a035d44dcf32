//! pdbridge Core - audio/control plumbing between a patch editor and its engine process
//!
//! The editor (host) owns the audio device and the GUI; the engine (remote)
//! runs the patch interpreter. This crate holds everything both sides share:
//!
//! - [`fifo`]: ring FIFOs for audio and MIDI that decouple block sizes
//! - [`engine`]: the fixed-latency wrapper that feeds a renderer exact blocks
//! - [`ipc`]: shared-memory audio handoff, framed control queues, liveness
//! - [`protocol`]: the byte framing for control messages
//! - [`host`]: the host audio-callback side of the handoff
//! - [`config`]: YAML configuration

pub mod config;
pub mod engine;
pub mod fifo;
pub mod host;
pub mod ipc;
pub mod protocol;
pub mod types;

pub use types::*;
