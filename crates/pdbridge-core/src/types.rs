//! Core types shared by the engine and the IPC layer
//!
//! Audio travels as [`AudioBlock`]: a channel-major buffer whose memory layout
//! matches the shared audio region byte for byte, so a handoff is a single copy.

/// Audio sample type used throughout pdbridge
pub type Sample = f32;

/// Multichannel audio block, stored channel-major
///
/// Channel `c` occupies `data[c * num_samples..(c + 1) * num_samples]`.
/// Reshaping keeps the allocation when capacity allows, so blocks can be
/// reused from the audio thread once they have been sized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBlock {
    data: Vec<Sample>,
    num_channels: usize,
    num_samples: usize,
}

impl AudioBlock {
    /// Create a zeroed block
    pub fn new(num_channels: usize, num_samples: usize) -> Self {
        Self {
            data: vec![0.0; num_channels * num_samples],
            num_channels,
            num_samples,
        }
    }

    /// Build a block from per-channel slices (all slices must be the same length)
    pub fn from_channels(channels: &[&[Sample]]) -> Self {
        let num_samples = channels.first().map_or(0, |c| c.len());
        let mut block = Self::new(channels.len(), num_samples);
        for (ch, samples) in channels.iter().enumerate() {
            debug_assert_eq!(samples.len(), num_samples, "channel length mismatch");
            block.channel_mut(ch).copy_from_slice(samples);
        }
        block
    }

    /// Number of channels
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Number of samples per channel
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// True when the block holds no samples
    pub fn is_empty(&self) -> bool {
        self.num_samples == 0 || self.num_channels == 0
    }

    /// Reshape the block; contents are zeroed when the shape changes
    pub fn resize(&mut self, num_channels: usize, num_samples: usize) {
        if self.num_channels == num_channels && self.num_samples == num_samples {
            return;
        }
        self.num_channels = num_channels;
        self.num_samples = num_samples;
        self.data.clear();
        self.data.resize(num_channels * num_samples, 0.0);
    }

    /// Samples of one channel
    #[inline]
    pub fn channel(&self, channel: usize) -> &[Sample] {
        debug_assert!(channel < self.num_channels, "channel {} out of range", channel);
        let start = channel * self.num_samples;
        &self.data[start..start + self.num_samples]
    }

    /// Mutable samples of one channel
    #[inline]
    pub fn channel_mut(&mut self, channel: usize) -> &mut [Sample] {
        debug_assert!(channel < self.num_channels, "channel {} out of range", channel);
        let start = channel * self.num_samples;
        &mut self.data[start..start + self.num_samples]
    }

    /// All samples, channel-major
    pub fn as_slice(&self) -> &[Sample] {
        &self.data
    }

    /// All samples mutably, channel-major
    pub fn as_mut_slice(&mut self) -> &mut [Sample] {
        &mut self.data
    }

    /// Zero every sample, keeping the shape
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// Reshape to match `other` and copy its samples
    pub fn copy_from(&mut self, other: &AudioBlock) {
        self.resize(other.num_channels, other.num_samples);
        self.data.copy_from_slice(&other.data);
    }

    /// Multiply every sample by `gain`
    pub fn apply_gain(&mut self, gain: Sample) {
        if gain == 1.0 {
            return;
        }
        for s in &mut self.data {
            *s *= gain;
        }
    }

    /// Apply a linear gain ramp over `len` samples starting at `start`, on all channels
    ///
    /// The first sample gets `from`; each following sample moves by
    /// `(to - from) / len`.
    pub fn apply_gain_ramp(&mut self, start: usize, len: usize, from: Sample, to: Sample) {
        if len == 0 {
            return;
        }
        let increment = (to - from) / len as Sample;
        for ch in 0..self.num_channels {
            let samples = &mut self.channel_mut(ch)[start..start + len];
            let mut gain = from;
            for s in samples {
                *s *= gain;
                gain += increment;
            }
        }
    }

    /// Absolute peak across all channels
    pub fn peak(&self) -> Sample {
        self.data.iter().fold(0.0, |peak, s| peak.max(s.abs()))
    }
}

/// A short MIDI message (up to three bytes)
///
/// SysEx is not carried through the block FIFOs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiMessage {
    bytes: [u8; 3],
    len: u8,
}

impl MidiMessage {
    /// Wrap raw bytes; returns `None` for empty input, SysEx, or more than three bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.is_empty() || data.len() > 3 || data[0] == 0xF0 {
            return None;
        }
        let mut bytes = [0u8; 3];
        bytes[..data.len()].copy_from_slice(data);
        Some(Self {
            bytes,
            len: data.len() as u8,
        })
    }

    /// Note On (channel is 0-based)
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            bytes: [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            len: 3,
        }
    }

    /// Note Off (channel is 0-based)
    pub fn note_off(channel: u8, note: u8) -> Self {
        Self {
            bytes: [0x80 | (channel & 0x0F), note & 0x7F, 0],
            len: 3,
        }
    }

    /// Control Change (channel is 0-based)
    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        Self {
            bytes: [0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F],
            len: 3,
        }
    }

    /// Raw message bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Status byte
    pub fn status(&self) -> u8 {
        self.bytes[0]
    }
}

/// A MIDI message stamped with its sample offset inside a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    /// Sample offset relative to the start of the owning buffer
    pub sample_offset: usize,
    /// The message
    pub message: MidiMessage,
}

/// Time-ordered list of MIDI events
///
/// Events with equal offsets keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MidiBuffer {
    events: Vec<MidiEvent>,
}

impl MidiBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }

    /// Make sure at least `capacity` events fit without reallocating
    pub fn ensure_capacity(&mut self, capacity: usize) {
        if self.events.capacity() < capacity {
            self.events.reserve(capacity - self.events.len());
        }
    }

    /// Remove all events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when there are no events
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate events in time order
    pub fn iter(&self) -> impl Iterator<Item = &MidiEvent> {
        self.events.iter()
    }

    /// Insert an event, keeping time order
    pub fn add_event(&mut self, message: MidiMessage, sample_offset: usize) {
        let index = self
            .events
            .partition_point(|e| e.sample_offset <= sample_offset);
        self.events.insert(
            index,
            MidiEvent {
                sample_offset,
                message,
            },
        );
    }

    /// Copy events from `source` whose offset lies in `[start, start + num_samples)`,
    /// shifting each by `delta`
    ///
    /// `num_samples = None` copies every event at or after `start`.
    /// Shifted offsets are floored at zero.
    pub fn add_events(
        &mut self,
        source: &MidiBuffer,
        start: usize,
        num_samples: Option<usize>,
        delta: isize,
    ) {
        let end = num_samples.map(|n| start + n);
        for event in &source.events {
            if event.sample_offset < start {
                continue;
            }
            if let Some(end) = end {
                if event.sample_offset >= end {
                    break;
                }
            }
            let shifted = (event.sample_offset as isize + delta).max(0) as usize;
            self.add_event(event.message, shifted);
        }
    }

    /// Exchange contents with another buffer (no allocation)
    pub fn swap_with(&mut self, other: &mut MidiBuffer) {
        std::mem::swap(&mut self.events, &mut other.events);
    }
}
