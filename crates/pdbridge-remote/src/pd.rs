//! PdRuntime - renders patches through libpd-rs
//!
//! libpd keeps one global instance per process and `Pd` holds one open patch
//! at a time, so opening a second patch closes the first. Editor state (the
//! object graph shown in the GUI) is tracked by the headless model alongside.
//!
//! MIDI is fed to the patch tick by tick at each event's offset, and whatever
//! the patch emits during a tick is stamped at that tick's first sample.

use std::path::{Path, PathBuf};

use crossbeam::channel::{unbounded, Receiver, Sender};
use libpd_rs::functions::receive::{
    on_midi_after_touch, on_midi_byte, on_midi_control_change, on_midi_note_on, on_midi_pitch_bend,
    on_midi_poly_after_touch, on_midi_program_change, on_print, receive_messages_from_pd,
    receive_midi_messages_from_pd,
};
use libpd_rs::functions::{send, verbose_print_state};
use libpd_rs::{Pd, PdAudioContext};

use pdbridge_core::engine::BlockRenderer;
use pdbridge_core::protocol::{ObjectMessage, PatchMessage, SyncItem};
use pdbridge_core::{AudioBlock, MidiBuffer, MidiMessage};

use crate::error::{RemoteError, RemoteResult};
use crate::midi::{PatchMidi, PatchMidiCollector};
use crate::patches::{HeadlessRuntime, PatchHost};

/// libpd's fixed DSP tick
const PD_BLOCK_SIZE: usize = 64;

/// Patch runtime backed by libpd
pub struct PdRuntime {
    pd: Pd,
    ctx: PdAudioContext,
    channels: usize,
    /// Editor-side graph of every open patch
    graph: HeadlessRuntime,
    /// Graph id of the patch libpd is rendering, with its `$0`
    rendering: Option<(String, i32)>,
    search_paths: Vec<PathBuf>,
    print_rx: Receiver<String>,
    midi_rx: Receiver<PatchMidi>,
    midi_out: PatchMidiCollector,
    /// Input events of the block being rendered
    midi_in: MidiBuffer,
    interleaved_in: Vec<f32>,
    interleaved_out: Vec<f32>,
}

fn forward_patch_midi(midi_tx: Sender<PatchMidi>) {
    let tx = midi_tx.clone();
    on_midi_note_on(move |channel: i32, pitch: i32, velocity: i32| {
        let _ = tx.send(PatchMidi::NoteOn { channel, pitch, velocity });
    });
    let tx = midi_tx.clone();
    on_midi_control_change(move |channel: i32, controller: i32, value: i32| {
        let _ = tx.send(PatchMidi::ControlChange { channel, controller, value });
    });
    let tx = midi_tx.clone();
    on_midi_program_change(move |channel: i32, value: i32| {
        let _ = tx.send(PatchMidi::ProgramChange { channel, value });
    });
    let tx = midi_tx.clone();
    on_midi_pitch_bend(move |channel: i32, value: i32| {
        let _ = tx.send(PatchMidi::PitchBend { channel, value });
    });
    let tx = midi_tx.clone();
    on_midi_after_touch(move |channel: i32, value: i32| {
        let _ = tx.send(PatchMidi::Aftertouch { channel, value });
    });
    let tx = midi_tx.clone();
    on_midi_poly_after_touch(move |channel: i32, pitch: i32, value: i32| {
        let _ = tx.send(PatchMidi::PolyAftertouch { channel, pitch, value });
    });
    on_midi_byte(move |port: i32, byte: i32| {
        let _ = midi_tx.send(PatchMidi::Byte { port, byte });
    });
}

/// Deliver one message to `[notein]`, `[ctlin]`... and to `[midiin]`
fn send_to_patch(message: &MidiMessage) {
    let result = match PatchMidi::from_message(message) {
        Some(PatchMidi::NoteOn { channel, pitch, velocity }) => {
            send::send_note_on(channel, pitch, velocity).map_err(|e| e.to_string())
        }
        Some(PatchMidi::ControlChange { channel, controller, value }) => {
            send::send_control_change(channel, controller, value).map_err(|e| e.to_string())
        }
        Some(PatchMidi::ProgramChange { channel, value }) => {
            send::send_program_change(channel, value).map_err(|e| e.to_string())
        }
        Some(PatchMidi::PitchBend { channel, value }) => {
            send::send_pitch_bend(channel, value).map_err(|e| e.to_string())
        }
        Some(PatchMidi::Aftertouch { channel, value }) => {
            send::send_after_touch(channel, value).map_err(|e| e.to_string())
        }
        Some(PatchMidi::PolyAftertouch { channel, pitch, value }) => {
            send::send_poly_after_touch(channel, pitch, value).map_err(|e| e.to_string())
        }
        Some(PatchMidi::Realtime(byte)) => send::send_sys_realtime(0, byte).map_err(|e| e.to_string()),
        Some(PatchMidi::Byte { .. }) | None => Ok(()),
    };
    if let Err(e) = result {
        log::trace!("libpd rejected {:?}: {}", message, e);
    }

    for &byte in message.as_bytes() {
        if let Err(e) = send::send_midi_byte(0, byte as i32) {
            log::trace!("libpd rejected MIDI byte {:#04x}: {}", byte, e);
        }
    }
}

// SAFETY: after construction the runtime is only touched from the engine
// thread, and libpd calls are made through this single owner.
unsafe impl Send for PdRuntime {}

impl PdRuntime {
    /// Start libpd with `channels` inputs and outputs
    pub fn new(channels: usize, sample_rate: f64) -> RemoteResult<Self> {
        let (print_tx, print_rx) = unbounded();
        verbose_print_state(false);
        on_print(move |msg: &str| {
            let _ = print_tx.send(msg.to_string());
        });
        let (midi_tx, midi_rx) = unbounded();
        forward_patch_midi(midi_tx);

        let pd = Pd::init_and_configure(channels as i32, channels as i32, sample_rate as i32)
            .map_err(|e| RemoteError::InitializationFailed(format!("libpd init failed: {}", e)))?;
        let ctx = pd.audio_context();

        log::info!("libpd started: {} channels @ {}Hz", channels, sample_rate);

        Ok(Self {
            pd,
            ctx,
            channels,
            graph: HeadlessRuntime::new(),
            rendering: None,
            search_paths: Vec::new(),
            print_rx,
            midi_rx,
            midi_out: PatchMidiCollector::new(),
            midi_in: MidiBuffer::with_capacity(crate::remote::MIDI_QUEUE_CAPACITY),
            interleaved_in: Vec::new(),
            interleaved_out: Vec::new(),
        })
    }

    fn close_rendering(&mut self) -> RemoteResult<()> {
        if let Some((id, dollar_zero)) = self.rendering.take() {
            self.pd.close_patch().map_err(|e| RemoteError::CommandFailed {
                command: "ClosePatch",
                reason: e.to_string(),
            })?;
            log::debug!("libpd closed patch '{}' ($0={})", id, dollar_zero);
        }
        Ok(())
    }
}

impl BlockRenderer for PdRuntime {
    fn render(&mut self, input: &AudioBlock, output: &mut AudioBlock, midi: &mut MidiBuffer) {
        let frames = input.num_samples();
        let channels = self.channels.min(input.num_channels());
        let len = frames * self.channels;
        self.interleaved_in.resize(len, 0.0);
        self.interleaved_out.resize(len, 0.0);
        self.interleaved_in.fill(0.0);
        self.interleaved_out.fill(0.0);

        for ch in 0..channels {
            for (frame, &sample) in input.channel(ch).iter().enumerate() {
                self.interleaved_in[frame * self.channels + ch] = sample;
            }
        }

        // midi now holds only what the patch emits
        self.midi_in.clear();
        self.midi_in.swap_with(midi);

        self.pd.set_as_current();
        let ticks = libpd_rs::functions::util::calculate_ticks(self.channels as i32, len as i32) as usize;
        let tick_len = PD_BLOCK_SIZE * self.channels;
        let mut incoming = self.midi_in.iter().peekable();

        for tick in 0..ticks.max(1) {
            let start = tick * PD_BLOCK_SIZE;
            let last = tick + 1 >= ticks;
            while let Some(event) = incoming.next_if(|e| last || e.sample_offset < start + PD_BLOCK_SIZE) {
                send_to_patch(&event.message);
            }

            if tick < ticks {
                let range = tick * tick_len..(tick + 1) * tick_len;
                self.ctx.process_float(
                    1,
                    &self.interleaved_in[range.clone()],
                    &mut self.interleaved_out[range],
                );
            }

            receive_midi_messages_from_pd();
            self.midi_out.collect(self.midi_rx.try_iter(), midi, start);
        }

        for ch in 0..channels.min(output.num_channels()) {
            for (frame, sample) in output.channel_mut(ch).iter_mut().enumerate() {
                *sample = self.interleaved_out[frame * self.channels + ch];
            }
        }
    }

    fn on_reset(&mut self) {
        self.midi_out.reset();
        self.midi_rx.try_iter().for_each(drop);
    }

    fn on_initialize(&mut self, block_size: usize, _sample_rate: f64) {
        if block_size % PD_BLOCK_SIZE != 0 {
            log::warn!(
                "Block size {} is not a multiple of {}; libpd will drop samples",
                block_size,
                PD_BLOCK_SIZE
            );
        }
    }
}

impl PatchHost for PdRuntime {
    fn open_patch(&mut self, path: &Path) -> RemoteResult<String> {
        if !path.is_file() {
            return Err(RemoteError::PatchNotFound(path.to_path_buf()));
        }
        self.close_rendering()?;

        self.pd.open_patch(path).map_err(|e| RemoteError::PatchOpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let dollar_zero = self.pd.dollar_zero().map_err(|e| RemoteError::PatchOpenFailed {
            path: path.to_path_buf(),
            reason: format!("Failed to get $0: {}", e),
        })?;

        let id = self.graph.open_patch(path)?;
        log::info!("libpd opened {} ($0={})", path.display(), dollar_zero);
        self.rendering = Some((id.clone(), dollar_zero));
        Ok(id)
    }

    fn close_patch(&mut self, patch_id: &str) -> RemoteResult<()> {
        if self.rendering.as_ref().is_some_and(|(id, _)| id == patch_id) {
            self.close_rendering()?;
        }
        self.graph.close_patch(patch_id)
    }

    fn set_search_paths(&mut self, paths: &[PathBuf]) -> RemoteResult<()> {
        // libpd can only append search paths
        let added: Vec<PathBuf> = paths
            .iter()
            .filter(|p| !self.search_paths.contains(p))
            .cloned()
            .collect();
        for path in added {
            self.pd
                .add_path_to_search_paths(&path)
                .map_err(|e| RemoteError::CommandFailed {
                    command: "SearchPaths",
                    reason: e.to_string(),
                })?;
            log::debug!("Added search path {}", path.display());
            self.search_paths.push(path);
        }
        self.graph.set_search_paths(paths)
    }

    fn set_dsp(&mut self, on: bool) {
        if let Err(e) = self.pd.activate_audio(on) {
            log::warn!("Failed to switch DSP {}: {}", if on { "on" } else { "off" }, e);
        }
        self.graph.set_dsp(on);
    }

    fn patch_command(&mut self, patch_id: &str, command: &PatchMessage) -> RemoteResult<()> {
        self.graph.patch_command(patch_id, command)
    }

    fn object_command(
        &mut self,
        patch_id: &str,
        object_id: &str,
        command: &ObjectMessage,
    ) -> RemoteResult<()> {
        self.graph.object_command(patch_id, object_id, command)
    }

    fn snapshot(&self, patch_id: &str) -> Option<Vec<SyncItem>> {
        self.graph.snapshot(patch_id)
    }

    fn drain_print(&mut self) -> Vec<String> {
        let mut fragments = self.graph.drain_print();
        receive_messages_from_pd();
        fragments.extend(self.print_rx.try_iter());
        fragments
    }
}

impl Drop for PdRuntime {
    fn drop(&mut self) {
        if let Err(e) = self.close_rendering() {
            log::warn!("Error closing libpd patch: {}", e);
        }
        let _ = self.pd.activate_audio(false);
        log::debug!("PdRuntime dropped");
    }
}
