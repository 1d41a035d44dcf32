//! Output level and MIDI activity for the editor's status bar

use std::time::{Duration, Instant};

use pdbridge_core::ipc::LevelMeterStatus;
use pdbridge_core::{AudioBlock, MidiBuffer, Sample};

/// Per-sample release factor below the current peak
const DECAY_FACTOR: Sample = 0.99992;
/// Levels below this snap to silence
const SILENCE_FLOOR: Sample = 0.001;
/// MIDI activity stays lit this long after the last event
pub const MIDI_HOLD: Duration = Duration::from_millis(700);

/// Peak follower folded onto two channels, plus MIDI activity flags
#[derive(Debug, Default)]
pub struct LevelMeter {
    levels: [Sample; 2],
    last_midi_in: Option<Instant>,
    last_midi_out: Option<Instant>,
}

fn has_real_events(midi: &MidiBuffer) -> bool {
    midi.iter().any(|event| event.message.status() != 0xF0)
}

fn activity(has_events: bool, last: &mut Option<Instant>, now: Instant) -> bool {
    if has_events {
        *last = Some(now);
        return true;
    }
    last.is_some_and(|at| now.saturating_duration_since(at) <= MIDI_HOLD)
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `output` into the meter and report the current status
    ///
    /// Even channels feed the left level, odd channels the right.
    pub fn process(
        &mut self,
        output: &AudioBlock,
        midi_in: &MidiBuffer,
        midi_out: &MidiBuffer,
        now: Instant,
    ) -> LevelMeterStatus {
        for ch in 0..output.num_channels() {
            let mut level = self.levels[ch & 1];
            for &sample in output.channel(ch) {
                let s = sample.abs();
                if s > level {
                    level = s;
                } else if level > SILENCE_FLOOR {
                    level *= DECAY_FACTOR;
                } else {
                    level = 0.0;
                }
            }
            self.levels[ch & 1] = level;
        }

        LevelMeterStatus {
            left: self.levels[0],
            right: self.levels[1],
            midi_in: activity(has_real_events(midi_in), &mut self.last_midi_in, now),
            midi_out: activity(has_real_events(midi_out), &mut self.last_midi_out, now),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
