//! Bounded single-producer/single-consumer message queue over shared memory
//!
//! Layout: a 64-byte atomic header followed by `capacity` fixed slots of
//! `[u32 length][payload]`. `head` and `tail` are monotonically increasing
//! counters; the producer owns `tail`, the consumer owns `head`.

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use super::error::{IpcError, IpcResult};
use super::region::{wait_for_ready, RegionHeader, SharedRegion, ShmNamespace};

const QUEUE_MAGIC: u32 = 0x5044_4251; // "PDBQ"
const QUEUE_VERSION: u32 = 1;
const SLOTS_OFFSET: usize = 64;
const LENGTH_PREFIX: usize = size_of::<u32>();

#[repr(C)]
struct QueueHeader {
    magic: AtomicU32,
    version: AtomicU32,
    ready: AtomicU32,
    capacity: AtomicU32,
    slot_size: AtomicU32,
    _reserved: AtomicU32,
    head: AtomicU64,
    tail: AtomicU64,
}

// SAFETY: repr(C), atomics only
unsafe impl RegionHeader for QueueHeader {}

fn slot_stride(max_message_size: usize) -> usize {
    (LENGTH_PREFIX + max_message_size).next_multiple_of(8)
}

fn region_len(capacity: usize, max_message_size: usize) -> usize {
    SLOTS_OFFSET + capacity * slot_stride(max_message_size)
}

/// One direction of the control channel
///
/// Sends never block: a full queue returns [`IpcError::MessageDropped`].
#[derive(Debug)]
pub struct SharedQueue {
    region: SharedRegion,
    capacity: usize,
    max_message_size: usize,
    stride: usize,
}

impl SharedQueue {
    /// Create an empty queue and publish it
    pub fn create(
        namespace: &ShmNamespace,
        name: &str,
        capacity: usize,
        max_message_size: usize,
    ) -> IpcResult<Self> {
        let capacity = capacity.max(1);
        let region = SharedRegion::create(namespace, name, region_len(capacity, max_message_size))?;

        let header: &QueueHeader = region.header();
        header.magic.store(QUEUE_MAGIC, Ordering::Relaxed);
        header.version.store(QUEUE_VERSION, Ordering::Relaxed);
        header.capacity.store(capacity as u32, Ordering::Relaxed);
        header.slot_size.store(max_message_size as u32, Ordering::Relaxed);
        header.head.store(0, Ordering::Relaxed);
        header.tail.store(0, Ordering::Relaxed);
        header.ready.store(1, Ordering::Release);

        Ok(Self {
            region,
            capacity,
            max_message_size,
            stride: slot_stride(max_message_size),
        })
    }

    /// Attach to a queue created by the peer; geometry comes from its header
    pub fn open(namespace: &ShmNamespace, name: &str, timeout: Duration) -> IpcResult<Self> {
        let region = SharedRegion::open(namespace, name, SLOTS_OFFSET, timeout)?;

        let header: &QueueHeader = region.header();
        if !wait_for_ready(&header.ready, timeout)
            || header.magic.load(Ordering::Acquire) != QUEUE_MAGIC
        {
            return Err(IpcError::PeerNotReady(name.to_string()));
        }
        let version = header.version.load(Ordering::Acquire);
        if version != QUEUE_VERSION {
            return Err(IpcError::VersionMismatch {
                name: name.to_string(),
                found: version,
                expected: QUEUE_VERSION,
            });
        }

        let capacity = header.capacity.load(Ordering::Acquire).max(1) as usize;
        let max_message_size = header.slot_size.load(Ordering::Acquire) as usize;
        region.ensure_len(region_len(capacity, max_message_size))?;

        Ok(Self {
            region,
            capacity,
            max_message_size,
            stride: slot_stride(max_message_size),
        })
    }

    fn header(&self) -> &QueueHeader {
        self.region.header()
    }

    fn slot_offset(&self, counter: u64) -> usize {
        SLOTS_OFFSET + (counter % self.capacity as u64) as usize * self.stride
    }

    /// Enqueue without blocking
    pub fn try_send(&mut self, message: &[u8]) -> IpcResult<()> {
        if message.len() > self.max_message_size {
            return Err(IpcError::MessageTooLarge {
                size: message.len(),
                max: self.max_message_size,
            });
        }

        let header = self.header();
        let tail = header.tail.load(Ordering::Relaxed);
        let head = header.head.load(Ordering::Acquire);
        if tail.wrapping_sub(head) >= self.capacity as u64 {
            return Err(IpcError::MessageDropped(self.region.name().to_string()));
        }

        let offset = self.slot_offset(tail);
        // SAFETY: slot `tail` is outside [head, tail), so the consumer is not reading it
        let slot = unsafe { self.region.bytes_mut(offset, LENGTH_PREFIX + message.len()) };
        slot[..LENGTH_PREFIX].copy_from_slice(&(message.len() as u32).to_ne_bytes());
        slot[LENGTH_PREFIX..].copy_from_slice(message);

        self.header().tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Dequeue the oldest message, if any
    pub fn try_receive(&mut self) -> Option<Vec<u8>> {
        let header = self.header();
        let head = header.head.load(Ordering::Relaxed);
        let tail = header.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }

        let offset = self.slot_offset(head);
        // SAFETY: slot `head` was published by the producer's Release store of `tail`
        let message = unsafe {
            let prefix = self.region.bytes(offset, LENGTH_PREFIX);
            let len = u32::from_ne_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
            self.region
                .bytes(offset + LENGTH_PREFIX, len.min(self.max_message_size))
                .to_vec()
        };

        self.header().head.store(head.wrapping_add(1), Ordering::Release);
        Some(message)
    }

    /// Messages currently queued
    pub fn len(&self) -> usize {
        let header = self.header();
        let tail = header.tail.load(Ordering::Acquire);
        let head = header.head.load(Ordering::Acquire);
        tail.wrapping_sub(head) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    pub fn name(&self) -> &str {
        self.region.name()
    }
}
