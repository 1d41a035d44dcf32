//! Fixed-latency block engine
//!
//! - [`BlockRenderer`]: the strategy a patch runtime implements
//! - [`FixedLatencyEngine`]: wraps a renderer so it always sees exactly
//!   `internal_block_size` samples, whatever the host delivers

mod fixed_latency;
mod renderer;

pub use fixed_latency::*;
pub use renderer::*;
