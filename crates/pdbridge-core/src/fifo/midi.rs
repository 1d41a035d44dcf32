//! MIDI event FIFO with a running sample clock

use crate::types::MidiBuffer;

/// Time-stamped MIDI FIFO
///
/// `stored_samples` is a time extent, not an event count: pushing a block of
/// `n` samples advances it by `n` even when the block carried no events.
#[derive(Debug, Default)]
pub struct MidiFifo {
    events: MidiBuffer,
    scratch: MidiBuffer,
    stored_samples: usize,
}

impl MidiFifo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preallocate room for `max_events` so push/pop stay allocation-free
    pub fn set_size(&mut self, max_events: usize) {
        self.events.ensure_capacity(max_events);
        self.scratch.ensure_capacity(max_events);
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.scratch.clear();
        self.stored_samples = 0;
    }

    /// Append the events of a `num_samples` block, stamped after what is already stored
    pub fn push_events(&mut self, source: &MidiBuffer, num_samples: usize) {
        self.events
            .add_events(source, 0, Some(num_samples), self.stored_samples as isize);
        self.stored_samples += num_samples;
    }

    /// Move the events of the oldest `num_samples` into `destination`
    ///
    /// The remaining events are re-based so they stay relative to the new
    /// front of the FIFO.
    pub fn pop_events(&mut self, destination: &mut MidiBuffer, num_samples: usize) {
        destination.add_events(&self.events, 0, Some(num_samples), 0);

        self.scratch.clear();
        self.scratch
            .add_events(&self.events, num_samples, None, -(num_samples as isize));
        self.events.swap_with(&mut self.scratch);

        self.stored_samples = self.stored_samples.saturating_sub(num_samples);
    }

    pub fn num_stored_events(&self) -> usize {
        self.events.len()
    }

    pub fn num_stored_samples(&self) -> usize {
        self.stored_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MidiMessage;

    fn offsets(buffer: &MidiBuffer) -> Vec<usize> {
        buffer.iter().map(|e| e.sample_offset).collect()
    }

    #[test]
    fn test_push_stamps_against_time_base() {
        let mut fifo = MidiFifo::new();
        fifo.set_size(16);

        let mut block = MidiBuffer::new();
        block.add_event(MidiMessage::note_on(0, 60, 100), 3);
        fifo.push_events(&block, 10);
        fifo.push_events(&block, 10);

        assert_eq!(fifo.num_stored_samples(), 20);
        assert_eq!(fifo.num_stored_events(), 2);

        let mut out = MidiBuffer::new();
        fifo.pop_events(&mut out, 20);
        assert_eq!(offsets(&out), vec![3, 13]);
    }

    #[test]
    fn test_pop_rebases_remainder() {
        let mut fifo = MidiFifo::new();
        fifo.set_size(16);

        let mut block = MidiBuffer::new();
        block.add_event(MidiMessage::note_on(0, 60, 100), 2);
        block.add_event(MidiMessage::note_off(0, 60), 12);
        fifo.push_events(&block, 16);

        let mut first = MidiBuffer::new();
        fifo.pop_events(&mut first, 8);
        assert_eq!(offsets(&first), vec![2]);
        assert_eq!(fifo.num_stored_samples(), 8);

        let mut second = MidiBuffer::new();
        fifo.pop_events(&mut second, 8);
        assert_eq!(offsets(&second), vec![4]);
    }

    #[test]
    fn test_events_outside_block_are_ignored() {
        let mut fifo = MidiFifo::new();
        let mut block = MidiBuffer::new();
        block.add_event(MidiMessage::note_on(0, 60, 100), 20);
        fifo.push_events(&block, 8);
        assert_eq!(fifo.num_stored_events(), 0);
        assert_eq!(fifo.num_stored_samples(), 8);
    }

    #[test]
    fn test_time_base_floors_at_zero() {
        let mut fifo = MidiFifo::new();
        fifo.push_events(&MidiBuffer::new(), 4);
        let mut out = MidiBuffer::new();
        fifo.pop_events(&mut out, 10);
        assert_eq!(fifo.num_stored_samples(), 0);
    }
}
