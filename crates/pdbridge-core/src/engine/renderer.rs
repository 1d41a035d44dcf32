//! Render strategy trait

use crate::types::{AudioBlock, MidiBuffer};

/// Block processor driven by [`FixedLatencyEngine`](super::FixedLatencyEngine)
///
/// `render` and `bypass` are always called with blocks of exactly the
/// engine's internal block size. MIDI offsets are relative to the block.
/// Lifecycle hooks default to no-ops.
pub trait BlockRenderer: Send {
    /// Render one block
    ///
    /// `output` arrives zeroed with the same shape as `input`. Events left in
    /// `midi` when this returns are the block's MIDI output.
    fn render(&mut self, input: &AudioBlock, output: &mut AudioBlock, midi: &mut MidiBuffer);

    /// Called instead of `render` while bypassed; audio passes through untouched
    fn bypass(&mut self, _input: &AudioBlock, _midi: &mut MidiBuffer) {}

    /// First-time (or post-release) setup
    fn on_initialize(&mut self, _block_size: usize, _sample_rate: f64) {}

    /// The host is about to start streaming at `sample_rate`
    fn on_prepare(&mut self, _sample_rate: f64) {}

    /// Transient state should be dropped (transport jump, device restart)
    fn on_reset(&mut self) {}

    /// Resources were released; the next call will be `on_initialize`
    fn on_release(&mut self) {}

    /// The internal block size (and therefore the latency) changed
    fn on_latency_changed(&mut self, _block_size: usize) {}
}

impl<R: BlockRenderer + ?Sized> BlockRenderer for Box<R> {
    fn render(&mut self, input: &AudioBlock, output: &mut AudioBlock, midi: &mut MidiBuffer) {
        (**self).render(input, output, midi)
    }

    fn bypass(&mut self, input: &AudioBlock, midi: &mut MidiBuffer) {
        (**self).bypass(input, midi)
    }

    fn on_initialize(&mut self, block_size: usize, sample_rate: f64) {
        (**self).on_initialize(block_size, sample_rate)
    }

    fn on_prepare(&mut self, sample_rate: f64) {
        (**self).on_prepare(sample_rate)
    }

    fn on_reset(&mut self) {
        (**self).on_reset()
    }

    fn on_release(&mut self) {
        (**self).on_release()
    }

    fn on_latency_changed(&mut self, block_size: usize) {
        (**self).on_latency_changed(block_size)
    }
}

/// Renderer that copies input to output
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl BlockRenderer for Passthrough {
    fn render(&mut self, input: &AudioBlock, output: &mut AudioBlock, _midi: &mut MidiBuffer) {
        output.copy_from(input);
    }
}
