//! Block-size decoupling wrapper with a constant latency of one internal block
//!
//! Hosts deliver arbitrary block sizes; patch runtimes want a fixed quantum.
//! Audio and MIDI are buffered through FIFOs sized to twice the internal
//! block. The output side is primed with one block of silence so that input
//! stored plus output stored always equals the block size between calls,
//! which makes the latency exactly one block for every chunk pattern.

use std::mem;

use super::BlockRenderer;
use crate::fifo::{AudioFifo, MidiFifo};
use crate::types::{AudioBlock, MidiBuffer, Sample};

/// Channel count used by [`FixedLatencyEngine::new`]
pub const DEFAULT_CHANNELS: usize = 2;

/// Lower bound on preallocated MIDI event slots per FIFO
const MIN_MIDI_EVENTS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fade {
    None,
    In,
    Out,
}

/// Fixed-latency engine around a [`BlockRenderer`]
///
/// Lifecycle: `initialize` (or `prepare` / `change_latency`, which initialize
/// on demand), then `process` from the audio thread. `release_resources`
/// frees the buffers and forces a new initialization.
pub struct FixedLatencyEngine<R: BlockRenderer> {
    renderer: R,
    num_channels: usize,
    internal_block_size: usize,
    sample_rate: f64,
    is_initialized: bool,
    resources_released: bool,
    was_bypassed_last_callback: bool,

    input_fifo: AudioFifo,
    output_fifo: AudioFifo,
    midi_input_fifo: MidiFifo,
    midi_output_fifo: MidiFifo,

    /// Exactly one internal block handed to the renderer
    in_block: AudioBlock,
    out_block: AudioBlock,
    block_midi: MidiBuffer,

    /// Scratch for splitting oversized host blocks
    chunk_midi_in: MidiBuffer,
    chunk_midi_out: MidiBuffer,
    in_place_input: AudioBlock,

    /// Read-only zeros, one block long
    silence: Vec<Sample>,
    /// Sink for channels the host did not supply
    discard: Vec<Sample>,
}

impl<R: BlockRenderer> FixedLatencyEngine<R> {
    /// Stereo engine
    pub fn new(renderer: R) -> Self {
        Self::with_channels(renderer, DEFAULT_CHANNELS)
    }

    /// Engine with a fixed channel count
    pub fn with_channels(renderer: R, num_channels: usize) -> Self {
        Self {
            renderer,
            num_channels,
            internal_block_size: 0,
            sample_rate: 0.0,
            is_initialized: false,
            resources_released: false,
            was_bypassed_last_callback: true,
            input_fifo: AudioFifo::new(),
            output_fifo: AudioFifo::new(),
            midi_input_fifo: MidiFifo::new(),
            midi_output_fifo: MidiFifo::new(),
            in_block: AudioBlock::default(),
            out_block: AudioBlock::default(),
            block_midi: MidiBuffer::new(),
            chunk_midi_in: MidiBuffer::new(),
            chunk_midi_out: MidiBuffer::new(),
            in_place_input: AudioBlock::default(),
            silence: Vec::new(),
            discard: Vec::new(),
        }
    }

    /// Set up for `sample_rate` with an internal block (and latency) of `block_size`
    pub fn initialize(&mut self, sample_rate: f64, block_size: usize) {
        debug_assert!(sample_rate > 0.0, "sample rate must be positive");
        debug_assert!(block_size > 0, "block size must be positive");

        self.sample_rate = sample_rate;
        self.was_bypassed_last_callback = true;
        self.is_initialized = true;
        self.resources_released = false;

        self.renderer.on_initialize(block_size, sample_rate);
        self.change_latency(block_size);

        log::info!(
            "FixedLatencyEngine initialized: {} channels, block {} @ {}Hz",
            self.num_channels,
            block_size,
            sample_rate
        );
    }

    /// Prepare for streaming, initializing first if needed
    pub fn prepare(&mut self, sample_rate: f64) {
        debug_assert!(sample_rate > 0.0, "sample rate must be positive");
        self.sample_rate = sample_rate;

        if !self.is_initialized {
            if self.internal_block_size == 0 {
                log::warn!("FixedLatencyEngine: prepare before any block size is known");
                return;
            }
            self.initialize(sample_rate, self.internal_block_size);
        }

        self.resources_released = false;
        self.renderer.on_prepare(sample_rate);
    }

    /// Change the internal block size
    ///
    /// Buffers are resized and the output side re-primed, so audio in flight
    /// is dropped and the new latency holds from the next call.
    pub fn change_latency(&mut self, block_size: usize) {
        debug_assert!(block_size > 0, "block size must be positive");
        if block_size == 0 {
            log::warn!("FixedLatencyEngine: ignoring zero block size");
            return;
        }

        if !self.is_initialized {
            if self.sample_rate > 0.0 {
                self.initialize(self.sample_rate, block_size);
                return;
            }
            log::debug!("FixedLatencyEngine: latency set before sample rate is known");
        }

        let fifo_size = block_size * 2;
        let nc = self.num_channels;

        self.internal_block_size = block_size;
        self.in_block.resize(nc, block_size);
        self.out_block.resize(nc, block_size);
        self.silence.clear();
        self.silence.resize(block_size, 0.0);
        self.discard.resize(block_size, 0.0);

        self.input_fifo.change_size(nc, fifo_size);
        self.output_fifo.change_size(nc, fifo_size);

        let max_events = fifo_size.max(MIN_MIDI_EVENTS);
        self.midi_input_fifo.set_size(max_events);
        self.midi_output_fifo.set_size(max_events);
        self.block_midi.ensure_capacity(max_events);
        self.chunk_midi_in.ensure_capacity(max_events);
        self.chunk_midi_out.ensure_capacity(max_events);

        self.prime_output();

        self.is_initialized = true;
        self.resources_released = false;
        self.renderer.on_latency_changed(block_size);
    }

    /// Drop buffered audio and MIDI without deallocating
    pub fn reset(&mut self) {
        if self.is_initialized && self.internal_block_size > 0 {
            self.prime_output();
        }
        self.block_midi.clear();
        self.chunk_midi_in.clear();
        self.chunk_midi_out.clear();
        self.renderer.on_reset();
    }

    /// Free all buffers; the next use re-initializes
    ///
    /// The block size and sample rate are remembered for [`prepare`](Self::prepare).
    pub fn release_resources(&mut self) {
        self.in_block = AudioBlock::default();
        self.out_block = AudioBlock::default();
        self.in_place_input = AudioBlock::default();
        self.input_fifo.release_resources();
        self.output_fifo.release_resources();
        self.midi_input_fifo.clear();
        self.midi_output_fifo.clear();
        self.block_midi = MidiBuffer::new();
        self.chunk_midi_in = MidiBuffer::new();
        self.chunk_midi_out = MidiBuffer::new();
        self.silence = Vec::new();
        self.discard = Vec::new();

        self.was_bypassed_last_callback = true;
        self.is_initialized = false;
        self.resources_released = true;
        self.renderer.on_release();

        log::debug!("FixedLatencyEngine resources released");
    }

    /// Process one host block of any size
    ///
    /// `midi` holds the block's input events and is replaced by the output
    /// events. Output is the renderer's result delayed by exactly one
    /// internal block.
    pub fn process(
        &mut self,
        input: &AudioBlock,
        output: &mut AudioBlock,
        midi: &mut MidiBuffer,
        bypassed: bool,
    ) {
        let num_samples = input.num_samples();
        if num_samples == 0 {
            return;
        }

        debug_assert!(
            self.is_initialized && !self.resources_released,
            "process called before initialize"
        );
        debug_assert_eq!(
            num_samples,
            output.num_samples(),
            "input/output length mismatch"
        );

        let block = self.internal_block_size;
        if !self.is_initialized || block == 0 || output.num_samples() < num_samples {
            output.clear();
            midi.clear();
            return;
        }

        let mut fade = match (self.was_bypassed_last_callback, bypassed) {
            (false, true) => Fade::Out,
            (true, false) => Fade::In,
            _ => Fade::None,
        };
        // The fade-out block is still rendered
        let mut render_bypassed = bypassed && fade == Fade::None;
        self.was_bypassed_last_callback = bypassed;

        let active = input
            .num_channels()
            .min(output.num_channels())
            .min(self.num_channels);
        for ch in active..output.num_channels() {
            output.channel_mut(ch).fill(0.0);
        }

        if num_samples <= block {
            self.process_chunk(input, output, 0, num_samples, midi, active, fade, render_bypassed);
            return;
        }

        let mut chunk_midi = mem::take(&mut self.chunk_midi_in);
        let mut midi_out = mem::take(&mut self.chunk_midi_out);
        midi_out.clear();

        let mut start = 0;
        while start < num_samples {
            let len = block.min(num_samples - start);

            chunk_midi.clear();
            chunk_midi.add_events(midi, start, Some(len), -(start as isize));
            self.process_chunk(input, output, start, len, &mut chunk_midi, active, fade, render_bypassed);
            midi_out.add_events(&chunk_midi, 0, Some(len), start as isize);

            fade = Fade::None;
            render_bypassed = bypassed;
            start += len;
        }

        midi.swap_with(&mut midi_out);
        midi_out.clear();
        self.chunk_midi_in = chunk_midi;
        self.chunk_midi_out = midi_out;
    }

    /// [`process`](Self::process) with the same block as input and output
    pub fn process_in_place(&mut self, buffer: &mut AudioBlock, midi: &mut MidiBuffer, bypassed: bool) {
        let mut input = mem::take(&mut self.in_place_input);
        input.copy_from(buffer);
        self.process(&input, buffer, midi, bypassed);
        self.in_place_input = input;
    }

    /// Handle at most one internal block worth of host samples
    #[allow(clippy::too_many_arguments)]
    fn process_chunk(
        &mut self,
        input: &AudioBlock,
        output: &mut AudioBlock,
        start: usize,
        len: usize,
        midi: &mut MidiBuffer,
        active: usize,
        fade: Fade,
        bypassed: bool,
    ) {
        let block = self.internal_block_size;
        let nc = self.num_channels;

        for ch in 0..nc {
            if ch < active {
                self.input_fifo
                    .push_samples(&input.channel(ch)[start..start + len], ch);
            } else {
                self.input_fifo.push_samples(&self.silence[..len], ch);
            }
        }
        self.midi_input_fifo.push_events(midi, len);
        midi.clear();

        if self.input_fifo.num_stored_samples() >= block {
            for ch in 0..nc {
                self.input_fifo.pop_samples(self.in_block.channel_mut(ch), ch);
            }
            self.block_midi.clear();
            self.midi_input_fifo.pop_events(&mut self.block_midi, block);

            if bypassed {
                self.renderer.bypass(&self.in_block, &mut self.block_midi);
                for ch in 0..nc {
                    self.output_fifo.push_samples(self.in_block.channel(ch), ch);
                }
            } else {
                self.out_block.clear();
                self.renderer
                    .render(&self.in_block, &mut self.out_block, &mut self.block_midi);
                if self.out_block.num_channels() != nc || self.out_block.num_samples() != block {
                    debug_assert!(false, "renderer reshaped its output block");
                    self.out_block.resize(nc, block);
                }
                for ch in 0..nc {
                    self.output_fifo.push_samples(self.out_block.channel(ch), ch);
                }
            }

            self.midi_output_fifo.push_events(&self.block_midi, block);
        }

        for ch in 0..nc {
            if ch < active {
                self.output_fifo
                    .pop_samples(&mut output.channel_mut(ch)[start..start + len], ch);
            } else {
                self.output_fifo.pop_samples(&mut self.discard[..len], ch);
            }
        }
        self.midi_output_fifo.pop_events(midi, len);

        match fade {
            Fade::In => output.apply_gain_ramp(start, len, 0.0, 1.0),
            Fade::Out => output.apply_gain_ramp(start, len, 1.0, 0.0),
            Fade::None => {}
        }
    }

    /// Empty both sides and queue one block of silence on the output
    fn prime_output(&mut self) {
        let block = self.internal_block_size;

        self.input_fifo.clear();
        self.output_fifo.clear();
        self.midi_input_fifo.clear();
        self.midi_output_fifo.clear();

        for ch in 0..self.num_channels {
            self.output_fifo.push_samples(&self.silence[..block], ch);
        }
        self.block_midi.clear();
        self.midi_output_fifo.push_events(&self.block_midi, block);
    }

    /// Latency in samples (equal to the internal block size)
    pub fn latency(&self) -> usize {
        self.internal_block_size
    }

    pub fn internal_block_size(&self) -> usize {
        self.internal_block_size
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    pub fn has_been_released(&self) -> bool {
        self.resources_released
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }
}
