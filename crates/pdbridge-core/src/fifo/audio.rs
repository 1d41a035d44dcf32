//! Multichannel audio ring FIFO

use crate::types::Sample;

/// Per-channel circular sample storage with independent cursors
///
/// Reads start at `write_index - stored` (mod capacity) and zero what they
/// consume, so a pop past the stored count yields silence instead of stale
/// audio.
#[derive(Debug, Default)]
pub struct AudioFifo {
    rows: Vec<Vec<Sample>>,
    write_index: Vec<usize>,
    stored: Vec<usize>,
}

impl AudioFifo {
    /// Create an empty, unallocated FIFO
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `num_channels` zeroed rows of `capacity` samples and reset cursors
    pub fn initialize(&mut self, num_channels: usize, capacity: usize) {
        self.rows = vec![vec![0.0; capacity]; num_channels];
        self.write_index = vec![0; num_channels];
        self.stored = vec![0; num_channels];
    }

    /// Resize, keeping existing contents where they still fit
    ///
    /// Stored counts above the new capacity are clamped and write cursors
    /// past the end wrap to zero. This is lossy by nature.
    pub fn change_size(&mut self, num_channels: usize, capacity: usize) {
        if num_channels == self.num_channels() && capacity == self.capacity() {
            return;
        }

        self.rows.resize_with(num_channels, || vec![0.0; capacity]);
        for row in &mut self.rows {
            row.resize(capacity, 0.0);
        }
        self.write_index.resize(num_channels, 0);
        self.stored.resize(num_channels, 0);

        for index in &mut self.write_index {
            if *index >= capacity {
                *index = 0;
            }
        }
        for stored in &mut self.stored {
            *stored = (*stored).min(capacity);
        }
    }

    /// Zero all rows and reset every cursor
    pub fn clear(&mut self) {
        for row in &mut self.rows {
            row.fill(0.0);
        }
        self.write_index.fill(0);
        self.stored.fill(0);
    }

    /// Drop all storage
    pub fn release_resources(&mut self) {
        self.rows = Vec::new();
        self.write_index = Vec::new();
        self.stored = Vec::new();
    }

    /// Number of channel rows
    pub fn num_channels(&self) -> usize {
        self.rows.len()
    }

    /// Samples per row
    pub fn capacity(&self) -> usize {
        self.rows.first().map_or(0, |row| row.len())
    }

    /// Append `source` to one channel
    ///
    /// The caller guarantees the channel has room for `source.len()` more samples.
    pub fn push_samples(&mut self, source: &[Sample], channel: usize) {
        debug_assert!(channel < self.rows.len(), "channel {} out of range", channel);
        let capacity = self.rows[channel].len();
        let count = source.len();
        if count == 0 {
            return;
        }
        debug_assert!(capacity > 0, "push into an unallocated FIFO");
        debug_assert!(
            self.stored[channel] + count <= capacity,
            "FIFO overflow: {} stored + {} pushed > {}",
            self.stored[channel],
            count,
            capacity
        );

        let row = &mut self.rows[channel];
        let mut index = self.write_index[channel];
        let mut done = 0;
        while done < count {
            let run = (count - done).min(capacity - index);
            row[index..index + run].copy_from_slice(&source[done..done + run]);
            done += run;
            index = (index + run) % capacity;
        }

        self.write_index[channel] = index;
        self.stored[channel] = (self.stored[channel] + count).min(capacity);
    }

    /// Take `destination.len()` samples from one channel, oldest first
    ///
    /// The consumed region is zeroed. Popping more than is stored returns the
    /// stored samples followed by silence.
    pub fn pop_samples(&mut self, destination: &mut [Sample], channel: usize) {
        debug_assert!(channel < self.rows.len(), "channel {} out of range", channel);
        let capacity = self.rows[channel].len();
        let count = destination.len();
        if count == 0 {
            return;
        }
        if capacity == 0 {
            destination.fill(0.0);
            return;
        }

        let stored = self.stored[channel];
        let row = &mut self.rows[channel];
        let mut index = (self.write_index[channel] + capacity - stored) % capacity;
        let mut done = 0;
        while done < count {
            let run = (count - done).min(capacity - index);
            destination[done..done + run].copy_from_slice(&row[index..index + run]);
            row[index..index + run].fill(0.0);
            done += run;
            index = (index + run) % capacity;
        }

        self.stored[channel] = stored.saturating_sub(count);
    }

    /// Samples available on every channel (minimum across rows)
    pub fn num_stored_samples(&self) -> usize {
        self.stored.iter().copied().min().unwrap_or(0)
    }

    /// Samples stored in one channel
    pub fn num_stored_samples_in(&self, channel: usize) -> usize {
        debug_assert!(channel < self.stored.len(), "channel {} out of range", channel);
        self.stored[channel]
    }
}
