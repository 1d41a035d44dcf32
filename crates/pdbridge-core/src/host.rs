//! Host audio-callback side of the block handoff

use std::time::Duration;

use crate::config::IpcConfig;
use crate::ipc::AudioChannel;
use crate::types::AudioBlock;

/// Result of one [`HostBridge::process_block`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// The remote returned a processed block
    Completed,
    /// No block came back in time; the output was silenced
    Stalled,
}

/// Drives one block per audio callback through the remote
///
/// The callback thread sends its block, wakes the remote, and waits for the
/// processed block for at most `output_timeout` (forever when `None`). A late
/// reply from a stalled cycle is discarded at the start of the next one.
#[derive(Debug)]
pub struct HostBridge {
    channel: AudioChannel,
    output_timeout: Option<Duration>,
    stalls: u64,
    stalled_last: bool,
}

impl HostBridge {
    pub fn new(channel: AudioChannel, output_timeout: Option<Duration>) -> Self {
        Self {
            channel,
            output_timeout,
            stalls: 0,
            stalled_last: false,
        }
    }

    pub fn from_config(channel: AudioChannel, config: &IpcConfig) -> Self {
        Self::new(channel, config.output_timeout())
    }

    /// Round-trip `block` through the remote, in place
    pub fn process_block(&mut self, block: &mut AudioBlock) -> HandoffOutcome {
        if self.stalled_last && self.channel.wait_for_output(Some(Duration::ZERO)) {
            log::debug!("Discarded late block from the remote");
        }

        if let Err(e) = self.channel.send_audio_buffer(block) {
            return self.stall(block, &e.to_string());
        }
        if !self.channel.notify_input() {
            log::trace!("Remote has not consumed the previous input block");
        }
        if !self.channel.wait_for_output(self.output_timeout) {
            return self.stall(block, "timed out waiting for the remote");
        }
        if let Err(e) = self.channel.receive_audio_buffer(block) {
            return self.stall(block, &e.to_string());
        }

        if self.stalled_last {
            log::info!("Remote audio resumed after {} stalled blocks", self.stalls);
        }
        self.stalled_last = false;
        HandoffOutcome::Completed
    }

    fn stall(&mut self, block: &mut AudioBlock, reason: &str) -> HandoffOutcome {
        block.clear();
        self.stalls += 1;
        if !self.stalled_last {
            log::warn!("Audio handoff stalled: {}", reason);
        }
        self.stalled_last = true;
        HandoffOutcome::Stalled
    }

    /// Blocks silenced since creation
    pub fn stalls(&self) -> u64 {
        self.stalls
    }

    pub fn channel(&self) -> &AudioChannel {
        &self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::ShmNamespace;
    use std::thread;

    const TIMEOUT: Option<Duration> = Some(Duration::from_millis(500));

    /// Remote stand-in: `cycles` times, receive, negate, send back
    fn spawn_inverter(channel: AudioChannel, cycles: usize) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let mut block = AudioBlock::default();
            for _ in 0..cycles {
                assert!(channel.wait_for_input(Duration::from_secs(2)));
                channel.receive_audio_buffer(&mut block).unwrap();
                block.apply_gain(-1.0);
                channel.send_audio_buffer(&block).unwrap();
                channel.notify_output();
            }
        })
    }

    #[test]
    fn test_round_trip_in_process() {
        let channel = AudioChannel::in_process();
        let remote = spawn_inverter(channel.clone(), 3);
        let mut bridge = HostBridge::new(channel, TIMEOUT);

        for cycle in 0..3 {
            let mut block = AudioBlock::from_channels(&[&[cycle as f32 + 1.0; 32], &[0.5; 32]]);
            assert_eq!(bridge.process_block(&mut block), HandoffOutcome::Completed);
            assert!(block.channel(0).iter().all(|&s| s == -(cycle as f32 + 1.0)));
            assert!(block.channel(1).iter().all(|&s| s == -0.5));
        }
        remote.join().unwrap();
        assert_eq!(bridge.stalls(), 0);
    }

    #[test]
    fn test_round_trip_cross_process() {
        let dir = tempfile::tempdir().unwrap();
        let ns = ShmNamespace::new(dir.path());
        let host_end = AudioChannel::create(&ns, "bridge").unwrap();
        let remote_end = AudioChannel::open(&ns, "bridge", Duration::from_millis(100)).unwrap();
        let remote = spawn_inverter(remote_end, 1);

        let mut bridge = HostBridge::new(host_end, TIMEOUT);
        let mut block = AudioBlock::from_channels(&[&[0.25; 64]]);
        assert_eq!(bridge.process_block(&mut block), HandoffOutcome::Completed);
        assert_eq!(block.num_samples(), 64);
        assert!(block.channel(0).iter().all(|&s| s == -0.25));
        remote.join().unwrap();
    }

    #[test]
    fn test_missing_remote_silences_output() {
        let mut bridge = HostBridge::new(AudioChannel::in_process(), Some(Duration::from_millis(10)));
        let mut block = AudioBlock::from_channels(&[&[1.0; 16], &[1.0; 16]]);

        assert_eq!(bridge.process_block(&mut block), HandoffOutcome::Stalled);
        assert_eq!(block.peak(), 0.0);
        assert_eq!(block.num_channels(), 2);
        assert_eq!(bridge.process_block(&mut block), HandoffOutcome::Stalled);
        assert_eq!(bridge.stalls(), 2);
    }

    #[test]
    fn test_recovers_after_stall() {
        let channel = AudioChannel::in_process();
        let mut bridge = HostBridge::new(channel.clone(), Some(Duration::from_millis(10)));

        let mut block = AudioBlock::from_channels(&[&[1.0; 8]]);
        assert_eq!(bridge.process_block(&mut block), HandoffOutcome::Stalled);

        // The remote picks up the pending input late and answers it
        let remote = spawn_inverter(channel, 2);
        thread::sleep(Duration::from_millis(50));

        let mut block = AudioBlock::from_channels(&[&[2.0; 8]]);
        assert_eq!(bridge.process_block(&mut block), HandoffOutcome::Completed);
        assert!(block.channel(0).iter().all(|&s| s == -2.0));
        remote.join().unwrap();
        assert_eq!(bridge.stalls(), 1);
    }

    #[test]
    fn test_oversize_block_stalls() {
        let mut bridge = HostBridge::new(AudioChannel::in_process(), TIMEOUT);
        let mut block = AudioBlock::new(crate::ipc::MAX_CHANNELS + 1, 4);
        assert_eq!(bridge.process_block(&mut block), HandoffOutcome::Stalled);
        assert_eq!(bridge.stalls(), 1);
    }
}
