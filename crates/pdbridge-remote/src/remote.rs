//! The engine process: control messages in, processed audio out
//!
//! One thread drives everything:
//!
//! ```text
//! loop {
//!     receive_messages()     // drain the control queue, answer pings, edit patches
//!     wait_for_next_block()  // bounded wait, process, hand the block back
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use pdbridge_core::config::{BridgeConfig, EngineConfig};
use pdbridge_core::engine::{BlockRenderer, FixedLatencyEngine};
use pdbridge_core::ipc::{AudioChannel, ControlChannel, ShmNamespace, TEST_MODE_ID};
use pdbridge_core::protocol::{GlobalMessage, Message, ObjectMessage, PatchMessage, SyncItem};
use pdbridge_core::{AudioBlock, MidiBuffer, MidiMessage};

use crate::console::ConsoleBuffer;
use crate::error::RemoteResult;
use crate::meter::LevelMeter;
use crate::patches::PatchHost;

/// MIDI messages buffered between the device threads and the engine
pub const MIDI_QUEUE_CAPACITY: usize = 2048;

/// Audio device configuration last reported by the editor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStatus {
    pub inputs: i32,
    pub outputs: i32,
    pub device_state: String,
}

/// Quits the engine when the editor stops pinging
///
/// Armed by the first ping, so a remote started without an editor keeps running.
#[derive(Debug)]
struct Watchdog {
    timeout: Duration,
    last_ping: Option<Instant>,
}

impl Watchdog {
    fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_ping: None,
        }
    }

    fn ping(&mut self, now: Instant) {
        self.last_ping = Some(now);
    }

    fn expired(&self, now: Instant) -> bool {
        self.last_ping
            .is_some_and(|at| now.saturating_duration_since(at) > self.timeout)
    }
}

/// Serves one editor instance
pub struct RemoteEngine<R: BlockRenderer + PatchHost> {
    control: ControlChannel,
    audio: AudioChannel,
    engine: FixedLatencyEngine<R>,
    /// Open patch ids in opening order
    patches: Vec<String>,
    console: ConsoleBuffer,
    meter: LevelMeter,
    watchdog: Watchdog,
    input_timeout: Duration,

    midi_in_rx: rtrb::Consumer<MidiMessage>,
    midi_in_tx: Option<rtrb::Producer<MidiMessage>>,
    midi_out_tx: rtrb::Producer<MidiMessage>,
    midi_out_rx: Option<rtrb::Consumer<MidiMessage>>,

    input: AudioBlock,
    output: AudioBlock,
    midi: MidiBuffer,
    midi_in_seen: MidiBuffer,

    volume: f32,
    dsp: bool,
    quit: bool,
    audio_status: Option<AudioStatus>,
}

impl<R: BlockRenderer + PatchHost> RemoteEngine<R> {
    /// Wrap already-connected channels
    ///
    /// Embedding hosts pass a clone of their in-process [`AudioChannel`].
    pub fn new(control: ControlChannel, audio: AudioChannel, runtime: R, config: &BridgeConfig) -> Self {
        let EngineConfig {
            block_size,
            sample_rate,
            channels,
        } = config.engine;

        let mut engine = FixedLatencyEngine::with_channels(runtime, channels);
        engine.initialize(sample_rate, block_size);

        let (midi_in_tx, midi_in_rx) = rtrb::RingBuffer::new(MIDI_QUEUE_CAPACITY);
        let (midi_out_tx, midi_out_rx) = rtrb::RingBuffer::new(MIDI_QUEUE_CAPACITY);

        log::info!(
            "Remote engine '{}' ready ({:?} audio, block {} @ {}Hz)",
            control.instance_id(),
            audio.mode(),
            block_size,
            sample_rate
        );

        Self {
            control,
            audio,
            engine,
            patches: Vec::new(),
            console: ConsoleBuffer::new(),
            meter: LevelMeter::new(),
            watchdog: Watchdog::new(config.ipc.remote_watchdog()),
            input_timeout: config.ipc.input_timeout(),
            midi_in_rx,
            midi_in_tx: Some(midi_in_tx),
            midi_out_tx,
            midi_out_rx: Some(midi_out_rx),
            input: AudioBlock::default(),
            output: AudioBlock::default(),
            midi: MidiBuffer::with_capacity(MIDI_QUEUE_CAPACITY),
            midi_in_seen: MidiBuffer::with_capacity(MIDI_QUEUE_CAPACITY),
            volume: 1.0,
            dsp: true,
            quit: false,
            audio_status: None,
        }
    }

    /// Attach to the editor's resources for `instance_id`
    ///
    /// [`TEST_MODE_ID`] runs standalone with an in-process audio channel.
    pub fn connect(instance_id: &str, config: &BridgeConfig, runtime: R) -> RemoteResult<Self> {
        let control = ControlChannel::connect_remote(instance_id, &config.ipc)?;
        let audio = if instance_id == TEST_MODE_ID {
            AudioChannel::in_process()
        } else {
            let namespace = ShmNamespace::from_config(&config.ipc);
            AudioChannel::open(&namespace, instance_id, config.ipc.peer_open_timeout())?
        };
        Ok(Self::new(control, audio, runtime, config))
    }

    /// Serve until told to quit
    pub fn run(&mut self) {
        while !self.should_quit() {
            self.receive_messages();
            self.wait_for_next_block();
        }
        log::info!("Remote engine '{}' shutting down", self.control.instance_id());
    }

    /// Handle every waiting control message
    pub fn receive_messages(&mut self) {
        for message in self.control.receive_messages() {
            self.handle_message(message);
        }
        self.forward_console();

        if !self.quit && self.watchdog.expired(Instant::now()) {
            log::warn!("No ping from the editor for {:?}, quitting", self.watchdog.timeout);
            self.quit = true;
        }
    }

    /// Process one block if the editor sent one within the input timeout
    ///
    /// Returns `false` when the cycle was skipped.
    pub fn wait_for_next_block(&mut self) -> bool {
        if !self.audio.wait_for_input(self.input_timeout) {
            return false;
        }
        if let Err(e) = self.audio.receive_audio_buffer(&mut self.input) {
            log::warn!("Dropping input block: {}", e);
            return false;
        }

        self.output.resize(self.input.num_channels(), self.input.num_samples());
        self.midi.clear();
        while let Ok(message) = self.midi_in_rx.pop() {
            self.midi.add_event(message, 0);
        }
        self.midi_in_seen.clone_from(&self.midi);

        self.engine.process(&self.input, &mut self.output, &mut self.midi, false);
        let gain = if self.dsp { self.volume } else { 0.0 };
        self.output.apply_gain(gain);

        for event in self.midi.iter() {
            if self.midi_out_tx.push(event.message).is_err() {
                log::trace!("MIDI output queue full");
                break;
            }
        }

        let status = self
            .meter
            .process(&self.output, &self.midi_in_seen, &self.midi, Instant::now());
        self.control
            .send_level_meter_status(status.left, status.right, status.midi_in, status.midi_out);

        if let Err(e) = self.audio.send_audio_buffer(&self.output) {
            log::warn!("Failed to return processed block: {}", e);
            return false;
        }
        self.audio.notify_output();
        true
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    fn send(&self, message: &Message) {
        if let Err(e) = self.control.send(message) {
            log::warn!("Dropped {:?} message to the editor: {}", message.class(), e);
        }
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Global(global) => self.handle_global(global),
            Message::Patch { patch_id, message } => self.handle_patch(&patch_id, message),
            Message::Object {
                patch_id,
                object_id,
                message,
            } => self.handle_object(&patch_id, &object_id, message),
        }
    }

    fn handle_global(&mut self, message: GlobalMessage) {
        match message {
            GlobalMessage::Ping => {
                self.watchdog.ping(Instant::now());
                self.send(&Message::from(GlobalMessage::Ping));
            }
            GlobalMessage::Quit => {
                log::info!("Editor requested quit");
                self.quit = true;
            }
            GlobalMessage::OpenPatch(path) => self.open_patch(Path::new(&path)),
            GlobalMessage::ClosePatch(patch_id) => self.close_patch(&patch_id),
            GlobalMessage::AudioStatus {
                inputs,
                outputs,
                device_state,
            } => {
                log::debug!("Audio status: {} in, {} out", inputs, outputs);
                self.audio_status = Some(AudioStatus {
                    inputs,
                    outputs,
                    device_state,
                });
            }
            GlobalMessage::Volume(volume) => self.volume = volume,
            GlobalMessage::Dsp(on) => {
                self.dsp = on;
                self.engine.renderer_mut().set_dsp(on);
                self.send(&Message::from(GlobalMessage::Dsp(on)));
            }
            GlobalMessage::SearchPaths(paths) => {
                let paths: Vec<PathBuf> = paths.into_iter().map(PathBuf::from).collect();
                if let Err(e) = self.engine.renderer_mut().set_search_paths(&paths) {
                    log::warn!("Failed to set search paths: {}", e);
                }
            }
            GlobalMessage::Console(_) => log::debug!("Ignoring console message from the editor"),
        }
    }

    fn open_patch(&mut self, path: &Path) {
        match self.engine.renderer_mut().open_patch(path) {
            Ok(patch_id) => {
                log::info!("Opened patch {:?} as '{}'", path, patch_id);
                self.patches.push(patch_id.clone());
                self.sync_patch(&patch_id);
            }
            Err(e) => {
                log::warn!("{}", e);
                self.send(&Message::from(GlobalMessage::Console(format!("error: {}", e))));
            }
        }
    }

    fn close_patch(&mut self, patch_id: &str) {
        if !self.is_open(patch_id) {
            log::warn!("ClosePatch for unknown patch '{}'", patch_id);
            return;
        }
        if let Err(e) = self.engine.renderer_mut().close_patch(patch_id) {
            log::warn!("Failed to close patch '{}': {}", patch_id, e);
        }
        self.patches.retain(|id| id != patch_id);
        log::info!("Closed patch '{}'", patch_id);
    }

    fn handle_patch(&mut self, patch_id: &str, message: PatchMessage) {
        if !self.is_open(patch_id) {
            log::warn!("Message for unknown patch '{}' ignored", patch_id);
            return;
        }

        let resync = match &message {
            PatchMessage::Sync(_) => {
                log::debug!("Ignoring Sync from the editor");
                return;
            }
            PatchMessage::Copy(_) | PatchMessage::Select(_) => false,
            _ => true,
        };

        if let Err(e) = self.engine.renderer_mut().patch_command(patch_id, &message) {
            log::warn!("Patch '{}': {}", patch_id, e);
        }
        if resync {
            self.sync_patch(patch_id);
        }
    }

    fn handle_object(&mut self, patch_id: &str, object_id: &str, message: ObjectMessage) {
        if !self.is_open(patch_id) {
            log::warn!("Object message for unknown patch '{}' ignored", patch_id);
            return;
        }

        if let Err(e) = self
            .engine
            .renderer_mut()
            .object_command(patch_id, object_id, &message)
        {
            log::warn!("Patch '{}': {}", patch_id, e);
            return;
        }

        match message {
            ObjectMessage::RequestSync => self.sync_object(patch_id, object_id),
            ObjectMessage::SetText(_) => self.sync_patch(patch_id),
            ObjectMessage::SetWidth(_) => {}
        }
    }

    /// Send the patch's full state to the editor
    fn sync_patch(&self, patch_id: &str) {
        match self.engine.renderer().snapshot(patch_id) {
            Some(items) => self.send(&Message::patch(patch_id, PatchMessage::Sync(items))),
            None => log::debug!("No snapshot for patch '{}'", patch_id),
        }
    }

    /// Send one object's text to the editor
    fn sync_object(&self, patch_id: &str, object_id: &str) {
        let text = self
            .engine
            .renderer()
            .snapshot(patch_id)
            .into_iter()
            .flatten()
            .find_map(|item| match item {
                SyncItem::Object(object) if object.id == object_id => Some(object.name),
                _ => None,
            });
        if let Some(text) = text {
            self.send(&Message::object(patch_id, object_id, ObjectMessage::SetText(text)));
        }
    }

    /// Join print fragments into lines and send them to the editor's console
    fn forward_console(&mut self) {
        let fragments = self.engine.renderer_mut().drain_print();
        let mut lines = Vec::new();
        for fragment in &fragments {
            self.console.push(fragment, |line| lines.push(line));
        }
        for line in lines {
            log::debug!("[console] {}", line);
            self.send(&Message::from(GlobalMessage::Console(line)));
        }
    }

    fn is_open(&self, patch_id: &str) -> bool {
        self.patches.iter().any(|id| id == patch_id)
    }

    /// Producer for MIDI arriving from input devices; `None` after the first call
    pub fn take_midi_input(&mut self) -> Option<rtrb::Producer<MidiMessage>> {
        self.midi_in_tx.take()
    }

    /// Consumer for MIDI the patches emit; `None` after the first call
    pub fn take_midi_output(&mut self) -> Option<rtrb::Consumer<MidiMessage>> {
        self.midi_out_rx.take()
    }

    pub fn open_patches(&self) -> &[String] {
        &self.patches
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_dsp_on(&self) -> bool {
        self.dsp
    }

    pub fn audio_status(&self) -> Option<&AudioStatus> {
        self.audio_status.as_ref()
    }

    /// Samples between input and output
    pub fn latency(&self) -> usize {
        self.engine.latency()
    }

    pub fn control(&self) -> &ControlChannel {
        &self.control
    }

    pub fn runtime(&self) -> &R {
        self.engine.renderer()
    }

    pub fn runtime_mut(&mut self) -> &mut R {
        self.engine.renderer_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patches::HeadlessRuntime;
    use pdbridge_core::host::{HandoffOutcome, HostBridge};
    use pdbridge_core::ipc::{IpcResult, RemoteLauncher, RemoteProcess};
    use std::thread;

    struct NullProcess;

    impl RemoteProcess for NullProcess {
        fn is_running(&mut self) -> bool {
            false
        }

        fn wait_timeout(&mut self, _timeout: Duration) -> bool {
            true
        }

        fn kill(&mut self) {}
    }

    /// The test itself plays the remote
    struct NullLauncher;

    impl RemoteLauncher for NullLauncher {
        fn launch(&mut self, _instance_id: &str) -> IpcResult<Box<dyn RemoteProcess>> {
            Ok(Box::new(NullProcess))
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        host: ControlChannel,
        audio: AudioChannel,
        remote: RemoteEngine<HeadlessRuntime>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BridgeConfig::default();
        config.ipc.shm_dir = Some(dir.path().to_path_buf());
        config.ipc.ping_interval_ms = 60_000;
        config.ipc.ping_timeout_ms = 60_000;
        config.ipc.input_timeout_ms = 50;

        let host = ControlChannel::connect_host("engine", &config.ipc, Box::new(NullLauncher)).unwrap();
        let control = ControlChannel::connect_remote("engine", &config.ipc).unwrap();
        let audio = AudioChannel::in_process();
        let remote = RemoteEngine::new(control, audio.clone(), HeadlessRuntime::new(), &config);

        let mut fixture = Fixture {
            dir,
            host,
            audio,
            remote,
        };
        // Consume the host's initial ping and its reply
        let deadline = Instant::now() + Duration::from_secs(2);
        while !fixture.exchange().contains(&Message::from(GlobalMessage::Ping)) {
            assert!(Instant::now() < deadline, "initial ping never arrived");
            thread::sleep(Duration::from_millis(1));
        }
        fixture
    }

    impl Fixture {
        fn send(&self, message: Message) {
            self.host.send(&message).unwrap();
        }

        /// Let the remote handle everything queued, return its replies
        fn exchange(&mut self) -> Vec<Message> {
            self.remote.receive_messages();
            self.host.receive_messages()
        }

        fn open_patch(&mut self) -> String {
            let path = self.dir.path().join("main.pd");
            std::fs::write(&path, "#N canvas 0 0 450 300 12;\n").unwrap();
            self.send(GlobalMessage::OpenPatch(path.display().to_string()).into());
            self.exchange();
            self.remote.open_patches()[0].clone()
        }

        /// One host callback against one remote cycle
        fn cycle(&mut self, value: f32) -> (HandoffOutcome, AudioBlock) {
            let audio = self.audio.clone();
            let host = thread::spawn(move || {
                let mut bridge = HostBridge::new(audio, Some(Duration::from_secs(2)));
                let mut block = AudioBlock::from_channels(&[&[value; 64], &[value; 64]]);
                let outcome = bridge.process_block(&mut block);
                (outcome, block)
            });
            let mut processed = false;
            for _ in 0..40 {
                if self.remote.wait_for_next_block() {
                    processed = true;
                    break;
                }
            }
            assert!(processed, "remote never saw the block");
            host.join().unwrap()
        }
    }

    #[test]
    fn test_ping_is_answered() {
        let mut f = fixture();
        f.send(GlobalMessage::Ping.into());
        assert_eq!(f.exchange(), vec![Message::from(GlobalMessage::Ping)]);
        assert!(!f.remote.should_quit());
    }

    #[test]
    fn test_quit_sets_flag() {
        let mut f = fixture();
        f.send(GlobalMessage::Quit.into());
        f.exchange();
        assert!(f.remote.should_quit());
    }

    #[test]
    fn test_dsp_is_echoed() {
        let mut f = fixture();
        f.send(GlobalMessage::Dsp(false).into());
        assert_eq!(f.exchange(), vec![Message::from(GlobalMessage::Dsp(false))]);
        assert!(!f.remote.is_dsp_on());
        assert!(!f.remote.runtime().is_dsp_on());
    }

    #[test]
    fn test_settings_are_recorded() {
        let mut f = fixture();
        f.send(GlobalMessage::Volume(0.25).into());
        f.send(
            GlobalMessage::AudioStatus {
                inputs: 1,
                outputs: 4,
                device_state: "<DEVICESETUP/>".into(),
            }
            .into(),
        );
        f.send(GlobalMessage::SearchPaths(vec!["/a".into(), "/b".into()]).into());
        assert!(f.exchange().is_empty());

        assert_eq!(f.remote.volume(), 0.25);
        assert_eq!(f.remote.audio_status().map(|s| s.outputs), Some(4));
        assert_eq!(
            f.remote.runtime().search_paths(),
            &[PathBuf::from("/a"), PathBuf::from("/b")]
        );
    }

    #[test]
    fn test_open_patch_syncs_and_prints() {
        let mut f = fixture();
        let path = f.dir.path().join("synth.pd");
        std::fs::write(&path, "#N canvas 0 0 450 300 12;\n").unwrap();
        f.send(GlobalMessage::OpenPatch(path.display().to_string()).into());

        let replies = f.exchange();
        let patch_id = f.remote.open_patches()[0].clone();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], Message::patch(patch_id, PatchMessage::Sync(Vec::new())));
        match &replies[1] {
            Message::Global(GlobalMessage::Console(line)) => assert!(line.ends_with("synth.pd")),
            other => panic!("expected console line, got {other:?}"),
        }
    }

    #[test]
    fn test_open_missing_patch_reports_error() {
        let mut f = fixture();
        f.send(GlobalMessage::OpenPatch("/nowhere/x.pd".into()).into());
        let replies = f.exchange();
        assert!(f.remote.open_patches().is_empty());
        match &replies[..] {
            [Message::Global(GlobalMessage::Console(line))] => assert!(line.starts_with("error:")),
            other => panic!("unexpected replies {other:?}"),
        }
    }

    #[test]
    fn test_edits_resync_the_patch() {
        let mut f = fixture();
        let patch_id = f.open_patch();

        f.send(Message::patch(patch_id.clone(), PatchMessage::CreateObject("osc~".into())));
        let replies = f.exchange();
        match &replies[..] {
            [Message::Patch {
                message: PatchMessage::Sync(items),
                ..
            }] => {
                assert_eq!(items.len(), 1);
            }
            other => panic!("unexpected replies {other:?}"),
        }

        // Copy changes nothing visible
        f.send(Message::patch(patch_id.clone(), PatchMessage::Copy(vec!["x".into()])));
        assert!(f.exchange().is_empty());
    }

    #[test]
    fn test_object_request_sync_sends_text() {
        let mut f = fixture();
        let patch_id = f.open_patch();
        f.send(Message::patch(patch_id.clone(), PatchMessage::CreateObject("metro 100".into())));
        let object_id = match &f.exchange()[0] {
            Message::Patch {
                message: PatchMessage::Sync(items),
                ..
            } => match &items[0] {
                SyncItem::Object(object) => object.id.clone(),
                other => panic!("expected object, got {other:?}"),
            },
            other => panic!("expected sync, got {other:?}"),
        };

        f.send(Message::object(patch_id.clone(), object_id.clone(), ObjectMessage::RequestSync));
        assert_eq!(
            f.exchange(),
            vec![Message::object(
                patch_id,
                object_id,
                ObjectMessage::SetText("metro 100".into())
            )]
        );
    }

    #[test]
    fn test_unknown_patch_is_ignored() {
        let mut f = fixture();
        f.send(Message::patch("42", PatchMessage::Undo));
        f.send(Message::object("42", "1", ObjectMessage::RequestSync));
        f.send(GlobalMessage::ClosePatch("42".into()).into());
        assert!(f.exchange().is_empty());
    }

    #[test]
    fn test_close_patch() {
        let mut f = fixture();
        let patch_id = f.open_patch();
        f.send(GlobalMessage::ClosePatch(patch_id).into());
        f.exchange();
        assert!(f.remote.open_patches().is_empty());
        assert_eq!(f.remote.runtime().open_patch_count(), 0);
    }

    #[test]
    fn test_audio_is_delayed_and_scaled() {
        let mut f = fixture();
        assert_eq!(f.remote.latency(), 64);
        f.send(GlobalMessage::Volume(0.5).into());
        f.exchange();

        let (outcome, first) = f.cycle(1.0);
        assert_eq!(outcome, HandoffOutcome::Completed);
        assert_eq!(first.peak(), 0.0, "first block is the primed latency");

        let (_, second) = f.cycle(1.0);
        assert!(second.channel(0).iter().all(|&s| s == 0.5));
        assert!(second.channel(1).iter().all(|&s| s == 0.5));

        let status = f.host.receive_level_meter_status().unwrap();
        assert!(status.left > 0.49 && status.right > 0.49);
    }

    #[test]
    fn test_dsp_off_silences_output() {
        let mut f = fixture();
        f.send(GlobalMessage::Dsp(false).into());
        f.exchange();
        f.cycle(1.0);
        let (_, block) = f.cycle(1.0);
        assert_eq!(block.peak(), 0.0);
    }

    #[test]
    fn test_midi_input_lights_meter() {
        let mut f = fixture();
        let mut midi_in = f.remote.take_midi_input().unwrap();
        assert!(f.remote.take_midi_input().is_none());

        midi_in.push(MidiMessage::note_on(0, 60, 100)).unwrap();
        f.cycle(0.0);
        assert!(f.host.receive_level_meter_status().unwrap().midi_in);
    }

    #[test]
    fn test_midi_without_patch_is_not_echoed() {
        let mut f = fixture();
        assert!(f.remote.open_patches().is_empty());
        let mut midi_in = f.remote.take_midi_input().unwrap();
        let mut midi_out = f.remote.take_midi_output().unwrap();

        midi_in.push(MidiMessage::note_on(0, 60, 100)).unwrap();
        for _ in 0..8 {
            f.cycle(0.0);
        }

        assert!(midi_out.pop().is_err());
        let status = f.host.receive_level_meter_status().unwrap();
        assert!(status.midi_in);
        assert!(!status.midi_out);
    }

    #[test]
    fn test_no_input_skips_cycle() {
        let mut f = fixture();
        assert!(!f.remote.wait_for_next_block());
    }

    #[test]
    fn test_watchdog_arms_on_first_ping() {
        let start = Instant::now();
        let mut watchdog = Watchdog::new(Duration::from_millis(100));
        assert!(!watchdog.expired(start + Duration::from_secs(60)));

        watchdog.ping(start);
        assert!(!watchdog.expired(start + Duration::from_millis(100)));
        assert!(watchdog.expired(start + Duration::from_millis(101)));
    }

    #[test]
    fn test_watchdog_quits_engine() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BridgeConfig::default();
        config.ipc.shm_dir = Some(dir.path().to_path_buf());
        config.ipc.remote_watchdog_ms = 20;

        let mut remote = RemoteEngine::connect(TEST_MODE_ID, &config, HeadlessRuntime::new()).unwrap();
        remote.receive_messages();
        assert!(!remote.should_quit());

        remote.handle_global(GlobalMessage::Ping);
        thread::sleep(Duration::from_millis(50));
        remote.receive_messages();
        assert!(remote.should_quit());
    }
}
