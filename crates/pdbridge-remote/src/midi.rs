//! MIDI as the patch interpreter sees it
//!
//! Pd addresses MIDI by kind with 0-based channels and signed pitch bend,
//! rather than by raw status bytes. [`PatchMidi`] is that view. Raw bytes
//! emitted by `[midiout]` arrive one at a time and are reassembled by
//! [`MidiByteAssembler`].

use pdbridge_core::{MidiBuffer, MidiMessage};

const PITCH_BEND_CENTER: i32 = 8192;
const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;

/// One MIDI event in the interpreter's terms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchMidi {
    /// Velocity 0 is a note off
    NoteOn { channel: i32, pitch: i32, velocity: i32 },
    ControlChange { channel: i32, controller: i32, value: i32 },
    ProgramChange { channel: i32, value: i32 },
    /// -8192..=8191, centered on 0
    PitchBend { channel: i32, value: i32 },
    Aftertouch { channel: i32, value: i32 },
    PolyAftertouch { channel: i32, pitch: i32, value: i32 },
    /// Single-byte system realtime message (clock, start, stop...)
    Realtime(i32),
    /// One raw byte from `[midiout]`
    Byte { port: i32, byte: i32 },
}

fn is_realtime(status: u8) -> bool {
    matches!(status, 0xF8 | 0xFA | 0xFB | 0xFC | 0xFE | 0xFF)
}

impl PatchMidi {
    /// Classify an incoming message; unsupported system messages give `None`
    pub fn from_message(message: &MidiMessage) -> Option<Self> {
        let bytes = message.as_bytes();
        let status = *bytes.first()?;
        if is_realtime(status) {
            return Some(Self::Realtime(status as i32));
        }

        let channel = (status & 0x0F) as i32;
        let data1 = bytes.get(1).copied().unwrap_or(0) as i32;
        let data2 = bytes.get(2).copied().unwrap_or(0) as i32;
        let event = match status & 0xF0 {
            0x80 => Self::NoteOn { channel, pitch: data1, velocity: 0 },
            0x90 => Self::NoteOn { channel, pitch: data1, velocity: data2 },
            0xA0 => Self::PolyAftertouch { channel, pitch: data1, value: data2 },
            0xB0 => Self::ControlChange { channel, controller: data1, value: data2 },
            0xC0 => Self::ProgramChange { channel, value: data1 },
            0xD0 => Self::Aftertouch { channel, value: data1 },
            0xE0 => Self::PitchBend {
                channel,
                value: ((data2 << 7) | data1) - PITCH_BEND_CENTER,
            },
            _ => return None,
        };
        Some(event)
    }

    /// Convert an interpreter event back to a message
    ///
    /// Pd folds the port into the channel (`port * 16 + channel`); only the
    /// channel nibble survives. Raw bytes need a [`MidiByteAssembler`] and
    /// give `None` here.
    pub fn to_message(self) -> Option<MidiMessage> {
        let nibble = |channel: i32| (channel & 0x0F) as u8;
        let data = |value: i32| value.clamp(0, 127) as u8;
        let bytes = match self {
            Self::NoteOn { channel, pitch, velocity: 0 } => [0x80 | nibble(channel), data(pitch), 0],
            Self::NoteOn { channel, pitch, velocity } => [0x90 | nibble(channel), data(pitch), data(velocity)],
            Self::PolyAftertouch { channel, pitch, value } => [0xA0 | nibble(channel), data(pitch), data(value)],
            Self::ControlChange { channel, controller, value } => {
                [0xB0 | nibble(channel), data(controller), data(value)]
            }
            Self::ProgramChange { channel, value } => {
                return MidiMessage::from_bytes(&[0xC0 | nibble(channel), data(value)])
            }
            Self::Aftertouch { channel, value } => {
                return MidiMessage::from_bytes(&[0xD0 | nibble(channel), data(value)])
            }
            Self::PitchBend { channel, value } => {
                let raw = (value + PITCH_BEND_CENTER).clamp(0, 0x3FFF);
                [0xE0 | nibble(channel), (raw & 0x7F) as u8, (raw >> 7) as u8]
            }
            Self::Realtime(status) => return MidiMessage::from_bytes(&[status as u8]),
            Self::Byte { .. } => return None,
        };
        MidiMessage::from_bytes(&bytes)
    }
}

/// Rebuilds three-byte messages from `[midiout]` bytes
///
/// SysEx has no [`MidiMessage`] form; its bytes are consumed up to the
/// terminating `0xF7` and dropped.
#[derive(Debug, Default)]
pub struct MidiByteAssembler {
    bytes: [u8; 3],
    len: usize,
    in_sysex: bool,
}

impl MidiByteAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte, returning a message once three bytes are collected
    pub fn push(&mut self, byte: u8) -> Option<MidiMessage> {
        if self.in_sysex {
            if byte == SYSEX_END {
                self.in_sysex = false;
                log::trace!("Dropping SysEx from the patch");
            }
            return None;
        }
        if self.len == 0 && byte == SYSEX_START {
            self.in_sysex = true;
            return None;
        }

        self.bytes[self.len] = byte;
        self.len += 1;
        if self.len < self.bytes.len() {
            return None;
        }
        self.len = 0;
        MidiMessage::from_bytes(&self.bytes)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Collects what the patch emitted during one DSP tick
#[derive(Debug, Default)]
pub struct PatchMidiCollector {
    assembler: MidiByteAssembler,
}

impl PatchMidiCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `events` to `midi`, all stamped at `sample_offset`
    pub fn collect(
        &mut self,
        events: impl IntoIterator<Item = PatchMidi>,
        midi: &mut MidiBuffer,
        sample_offset: usize,
    ) {
        for event in events {
            let message = match event {
                PatchMidi::Byte { byte, .. } => self.assembler.push(byte as u8),
                other => other.to_message(),
            };
            if let Some(message) = message {
                midi.add_event(message, sample_offset);
            }
        }
    }

    pub fn reset(&mut self) {
        self.assembler.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_off_becomes_zero_velocity_note_on() {
        let event = PatchMidi::from_message(&MidiMessage::note_off(3, 64)).unwrap();
        assert_eq!(event, PatchMidi::NoteOn { channel: 3, pitch: 64, velocity: 0 });
        assert_eq!(event.to_message(), Some(MidiMessage::note_off(3, 64)));
    }

    #[test]
    fn test_channel_messages_survive_the_interpreter_view() {
        let messages = [
            MidiMessage::note_on(0, 60, 100),
            MidiMessage::control_change(15, 7, 127),
            MidiMessage::from_bytes(&[0xC2, 5]).unwrap(),
            MidiMessage::from_bytes(&[0xD1, 90]).unwrap(),
            MidiMessage::from_bytes(&[0xA4, 60, 33]).unwrap(),
        ];
        for message in messages {
            let event = PatchMidi::from_message(&message).unwrap();
            assert_eq!(event.to_message(), Some(message), "{:?}", event);
        }
    }

    #[test]
    fn test_pitch_bend_is_centered() {
        let center = MidiMessage::from_bytes(&[0xE0, 0x00, 0x40]).unwrap();
        assert_eq!(
            PatchMidi::from_message(&center),
            Some(PatchMidi::PitchBend { channel: 0, value: 0 })
        );

        let lowest = MidiMessage::from_bytes(&[0xE1, 0x00, 0x00]).unwrap();
        assert_eq!(
            PatchMidi::from_message(&lowest),
            Some(PatchMidi::PitchBend { channel: 1, value: -8192 })
        );

        let bend = PatchMidi::PitchBend { channel: 2, value: 8191 };
        assert_eq!(bend.to_message().unwrap().as_bytes(), &[0xE2, 0x7F, 0x7F]);
    }

    #[test]
    fn test_realtime_and_system_messages() {
        let clock = MidiMessage::from_bytes(&[0xF8]).unwrap();
        assert_eq!(PatchMidi::from_message(&clock), Some(PatchMidi::Realtime(0xF8)));

        let song_position = MidiMessage::from_bytes(&[0xF2, 0, 0]).unwrap();
        assert_eq!(PatchMidi::from_message(&song_position), None);
    }

    #[test]
    fn test_port_is_folded_out_of_the_channel() {
        let event = PatchMidi::ControlChange { channel: 16 + 9, controller: 1, value: 2 };
        assert_eq!(event.to_message(), Some(MidiMessage::control_change(9, 1, 2)));
    }

    #[test]
    fn test_assembler_groups_bytes_and_skips_sysex() {
        let mut assembler = MidiByteAssembler::new();
        let mut out = Vec::new();
        for byte in [0xF0, 0x7E, 0x01, 0xF7, 0x90, 60, 100, 0xB0, 7] {
            out.extend(assembler.push(byte));
        }
        assert_eq!(out, vec![MidiMessage::note_on(0, 60, 100)]);

        assembler.reset();
        assert_eq!(assembler.push(0x80), None);
    }

    #[test]
    fn test_collector_stamps_tick_offset() {
        let mut collector = PatchMidiCollector::new();
        let mut midi = MidiBuffer::new();
        collector.collect(
            [
                PatchMidi::NoteOn { channel: 0, pitch: 60, velocity: 1 },
                PatchMidi::Byte { port: 0, byte: 0xB0 },
                PatchMidi::Byte { port: 0, byte: 1 },
            ],
            &mut midi,
            0,
        );
        collector.collect([PatchMidi::Byte { port: 0, byte: 64 }], &mut midi, 64);

        let events: Vec<_> = midi.iter().map(|e| (e.sample_offset, e.message)).collect();
        assert_eq!(
            events,
            vec![
                (0, MidiMessage::note_on(0, 60, 1)),
                (64, MidiMessage::control_change(0, 1, 64)),
            ]
        );
    }
}
