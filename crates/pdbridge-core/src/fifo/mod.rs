//! Ring FIFOs that decouple producer and consumer block sizes
//!
//! [`AudioFifo`] stores per-channel sample rows; [`MidiFifo`] stores
//! time-stamped events against a running sample clock. Both are sized up
//! front and never allocate once configured, so they are safe to drive from
//! the audio thread.

mod audio;
mod midi;

pub use audio::AudioFifo;
pub use midi::MidiFifo;
