//! Audio block handoff between host and remote
//!
//! One block crosses per direction per cycle:
//!
//! ```text
//! host:   send_audio_buffer → notify_input → wait_for_output → receive_audio_buffer
//! remote: wait_for_input → receive_audio_buffer → (process) → send_audio_buffer → notify_output
//! ```
//!
//! The mailboxes are the only synchronization for the payload: whoever holds
//! the turn owns the buffer.

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::error::{IpcError, IpcResult};
use super::mailbox::{notify_flag, wait_flag, LocalMailbox};
use super::region::{wait_for_ready, RegionHeader, SharedRegion, ShmNamespace};
use super::{resource_name, AUDIO_BUFFER_SUFFIX, SYNC_SUFFIX};
use crate::types::{AudioBlock, Sample};

/// Maximum channels a block may carry
pub const MAX_CHANNELS: usize = 64;
/// Maximum samples per channel a block may carry
pub const MAX_SAMPLES_PER_CHANNEL: usize = 8192;

/// `{num_channels: i32, num_samples: i32}`
const AUDIO_HEADER_BYTES: usize = 8;
/// Fixed size of the `<id>_audiobuffer` region
pub const AUDIO_REGION_BYTES: usize =
    AUDIO_HEADER_BYTES + MAX_CHANNELS * MAX_SAMPLES_PER_CHANNEL * size_of::<Sample>();

const SYNC_MAGIC: u32 = 0x5044_4253; // "PDBS"
const SYNC_VERSION: u32 = 1;

#[repr(C)]
struct SyncHeader {
    magic: AtomicU32,
    version: AtomicU32,
    ready: AtomicU32,
    input_pending: AtomicU32,
    output_pending: AtomicU32,
}

// SAFETY: repr(C), atomics only
unsafe impl RegionHeader for SyncHeader {}

/// Which transport an [`AudioChannel`] uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMode {
    /// Shared-memory regions, host and remote in different processes
    CrossProcess,
    /// Mutex-guarded block, both ends in one process
    InProcess,
}

struct LocalTransport {
    block: Mutex<AudioBlock>,
    input: LocalMailbox,
    output: LocalMailbox,
}

impl LocalTransport {
    fn lock(&self) -> MutexGuard<'_, AudioBlock> {
        match self.block.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

struct SharedTransport {
    audio: SharedRegion,
    sync: SharedRegion,
}

impl SharedTransport {
    fn header(&self) -> &SyncHeader {
        self.sync.header()
    }
}

#[derive(Clone)]
enum Transport {
    Local(Arc<LocalTransport>),
    Shared(Arc<SharedTransport>),
}

/// Bidirectional single-block audio handoff
///
/// Clones share the same transport, so an in-process channel is handed to
/// the engine thread by cloning it.
#[derive(Clone)]
pub struct AudioChannel {
    transport: Transport,
}

fn check_capacity(channels: usize, samples: usize) -> IpcResult<()> {
    if channels > MAX_CHANNELS || samples > MAX_SAMPLES_PER_CHANNEL {
        return Err(IpcError::BlockTooLarge { channels, samples });
    }
    Ok(())
}

impl AudioChannel {
    /// Channel whose both ends live in this process
    pub fn in_process() -> Self {
        Self {
            transport: Transport::Local(Arc::new(LocalTransport {
                block: Mutex::new(AudioBlock::default()),
                input: LocalMailbox::new(),
                output: LocalMailbox::new(),
            })),
        }
    }

    /// Create the shared regions for `instance_id` and publish them (host side)
    pub fn create(namespace: &ShmNamespace, instance_id: &str) -> IpcResult<Self> {
        let audio = SharedRegion::create(
            namespace,
            &resource_name(instance_id, AUDIO_BUFFER_SUFFIX)?,
            AUDIO_REGION_BYTES,
        )?;
        let sync = SharedRegion::create(
            namespace,
            &resource_name(instance_id, SYNC_SUFFIX)?,
            size_of::<SyncHeader>(),
        )?;

        let header: &SyncHeader = sync.header();
        header.ready.store(0, Ordering::Relaxed);
        header.magic.store(SYNC_MAGIC, Ordering::Relaxed);
        header.version.store(SYNC_VERSION, Ordering::Relaxed);
        header.input_pending.store(0, Ordering::Relaxed);
        header.output_pending.store(0, Ordering::Relaxed);
        header.ready.store(1, Ordering::Release);

        log::info!("Audio channel '{}' created", instance_id);
        Ok(Self {
            transport: Transport::Shared(Arc::new(SharedTransport { audio, sync })),
        })
    }

    /// Attach to the regions published by [`create`](Self::create) (remote side)
    pub fn open(namespace: &ShmNamespace, instance_id: &str, timeout: Duration) -> IpcResult<Self> {
        let sync_name = resource_name(instance_id, SYNC_SUFFIX)?;
        let sync = SharedRegion::open(namespace, &sync_name, size_of::<SyncHeader>(), timeout)?;

        let header: &SyncHeader = sync.header();
        if !wait_for_ready(&header.ready, timeout) {
            return Err(IpcError::PeerNotReady(sync_name));
        }
        if header.magic.load(Ordering::Acquire) != SYNC_MAGIC {
            return Err(IpcError::PeerNotReady(sync_name));
        }
        let version = header.version.load(Ordering::Acquire);
        if version != SYNC_VERSION {
            return Err(IpcError::VersionMismatch {
                name: sync_name,
                found: version,
                expected: SYNC_VERSION,
            });
        }

        let audio = SharedRegion::open(
            namespace,
            &resource_name(instance_id, AUDIO_BUFFER_SUFFIX)?,
            AUDIO_REGION_BYTES,
            timeout,
        )?;

        log::info!("Audio channel '{}' opened", instance_id);
        Ok(Self {
            transport: Transport::Shared(Arc::new(SharedTransport { audio, sync })),
        })
    }

    pub fn mode(&self) -> AudioMode {
        match self.transport {
            Transport::Local(_) => AudioMode::InProcess,
            Transport::Shared(_) => AudioMode::CrossProcess,
        }
    }

    /// Publish `block` to the peer
    ///
    /// Call only while holding the turn (before notifying).
    pub fn send_audio_buffer(&self, block: &AudioBlock) -> IpcResult<()> {
        let channels = block.num_channels();
        let samples = block.num_samples();
        check_capacity(channels, samples)?;

        match &self.transport {
            Transport::Local(local) => local.lock().copy_from(block),
            Transport::Shared(shared) => {
                let payload_bytes = channels * samples * size_of::<Sample>();
                // SAFETY: the peer only reads the region after our notify
                let (header, payload) = unsafe {
                    (
                        shared.audio.bytes_mut(0, AUDIO_HEADER_BYTES),
                        shared.audio.bytes_mut(AUDIO_HEADER_BYTES, payload_bytes),
                    )
                };
                header[..4].copy_from_slice(&(channels as i32).to_ne_bytes());
                header[4..].copy_from_slice(&(samples as i32).to_ne_bytes());
                bytemuck::cast_slice_mut::<u8, Sample>(payload).copy_from_slice(block.as_slice());
            }
        }
        Ok(())
    }

    /// Copy the peer's block into `block`, reshaping it to match
    pub fn receive_audio_buffer(&self, block: &mut AudioBlock) -> IpcResult<()> {
        match &self.transport {
            Transport::Local(local) => block.copy_from(&local.lock()),
            Transport::Shared(shared) => {
                // SAFETY: the peer notified and will not write until we notify back
                let header = unsafe { shared.audio.bytes(0, AUDIO_HEADER_BYTES) };
                let channels = i32::from_ne_bytes([header[0], header[1], header[2], header[3]]);
                let samples = i32::from_ne_bytes([header[4], header[5], header[6], header[7]]);
                if channels < 0 || samples < 0 {
                    return Err(IpcError::CorruptHeader { channels, samples });
                }
                let (channels, samples) = (channels as usize, samples as usize);
                check_capacity(channels, samples)?;

                block.resize(channels, samples);
                let payload = unsafe {
                    shared
                        .audio
                        .bytes(AUDIO_HEADER_BYTES, channels * samples * size_of::<Sample>())
                };
                block
                    .as_mut_slice()
                    .copy_from_slice(bytemuck::cast_slice::<u8, Sample>(payload));
            }
        }
        Ok(())
    }

    /// Hand the input block to the remote; `false` if one was already pending
    pub fn notify_input(&self) -> bool {
        match &self.transport {
            Transport::Local(local) => local.input.notify(),
            Transport::Shared(shared) => notify_flag(&shared.header().input_pending),
        }
    }

    /// Wait for the host's next block
    pub fn wait_for_input(&self, timeout: Duration) -> bool {
        match &self.transport {
            Transport::Local(local) => local.input.wait(Some(timeout)),
            Transport::Shared(shared) => wait_flag(&shared.header().input_pending, Some(timeout)),
        }
    }

    /// Hand the processed block back to the host; `false` if one was already pending
    pub fn notify_output(&self) -> bool {
        match &self.transport {
            Transport::Local(local) => local.output.notify(),
            Transport::Shared(shared) => notify_flag(&shared.header().output_pending),
        }
    }

    /// Wait for the processed block; `None` waits forever
    pub fn wait_for_output(&self, timeout: Option<Duration>) -> bool {
        match &self.transport {
            Transport::Local(local) => local.output.wait(timeout),
            Transport::Shared(shared) => wait_flag(&shared.header().output_pending, timeout),
        }
    }
}

impl std::fmt::Debug for AudioChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioChannel").field("mode", &self.mode()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(20);

    fn stereo(len: usize, offset: f32) -> AudioBlock {
        let left: Vec<f32> = (0..len).map(|i| i as f32 + offset).collect();
        let right: Vec<f32> = (0..len).map(|i| -(i as f32) - offset).collect();
        AudioBlock::from_channels(&[&left, &right])
    }

    fn exchange(host: &AudioChannel, remote: &AudioChannel) {
        let sent = stereo(64, 0.5);
        host.send_audio_buffer(&sent).unwrap();
        assert!(host.notify_input());

        assert!(remote.wait_for_input(SHORT));
        let mut received = AudioBlock::default();
        remote.receive_audio_buffer(&mut received).unwrap();
        assert_eq!(received, sent);

        received.apply_gain(2.0);
        remote.send_audio_buffer(&received).unwrap();
        assert!(remote.notify_output());

        assert!(host.wait_for_output(Some(SHORT)));
        let mut back = AudioBlock::default();
        host.receive_audio_buffer(&mut back).unwrap();
        assert_eq!(back.channel(0)[1], 3.0);

        // One in flight: nothing else is pending
        assert!(!remote.wait_for_input(SHORT));
        assert!(!host.wait_for_output(Some(SHORT)));
    }

    #[test]
    fn test_in_process_exchange() {
        let host = AudioChannel::in_process();
        let remote = host.clone();
        assert_eq!(host.mode(), AudioMode::InProcess);
        exchange(&host, &remote);
    }

    #[test]
    fn test_cross_process_exchange() {
        let dir = tempfile::tempdir().unwrap();
        let ns = ShmNamespace::new(dir.path());
        let host = AudioChannel::create(&ns, "unit").unwrap();
        let remote = AudioChannel::open(&ns, "unit", SHORT).unwrap();
        assert_eq!(remote.mode(), AudioMode::CrossProcess);
        exchange(&host, &remote);
    }

    #[test]
    fn test_notify_does_not_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let ns = ShmNamespace::new(dir.path());
        let host = AudioChannel::create(&ns, "overrun").unwrap();
        let remote = AudioChannel::open(&ns, "overrun", SHORT).unwrap();

        assert!(host.notify_input());
        assert!(!host.notify_input());
        assert!(remote.wait_for_input(SHORT));
        assert!(!remote.wait_for_input(SHORT));
    }

    #[test]
    fn test_open_without_owner_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ns = ShmNamespace::new(dir.path());
        let result = AudioChannel::open(&ns, "nobody", SHORT);
        assert!(matches!(result, Err(IpcError::PeerNotReady(_))));
    }

    #[test]
    fn test_unpublished_sync_region_is_not_trusted() {
        let dir = tempfile::tempdir().unwrap();
        let ns = ShmNamespace::new(dir.path());
        // Region exists but nobody published the ready flag
        let _raw = SharedRegion::create(&ns, "early_sync", size_of::<SyncHeader>()).unwrap();
        let result = AudioChannel::open(&ns, "early", SHORT);
        assert!(matches!(result, Err(IpcError::PeerNotReady(_))));
    }

    #[test]
    fn test_instance_id_cannot_escape_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let ns = ShmNamespace::new(dir.path().join("shm"));
        let result = AudioChannel::create(&ns, "../escaped");
        assert!(matches!(result, Err(IpcError::InvalidInstanceId(_))));
        assert!(!dir.path().join("escaped_audiobuffer").exists());
        assert!(!dir.path().join("escaped_sync").exists());
    }

    #[test]
    fn test_oversized_block_rejected() {
        let channel = AudioChannel::in_process();
        let block = AudioBlock::new(MAX_CHANNELS + 1, 4);
        assert!(matches!(
            channel.send_audio_buffer(&block),
            Err(IpcError::BlockTooLarge { .. })
        ));

        let block = AudioBlock::new(1, MAX_SAMPLES_PER_CHANNEL + 1);
        assert!(matches!(
            channel.send_audio_buffer(&block),
            Err(IpcError::BlockTooLarge { .. })
        ));
    }
}
