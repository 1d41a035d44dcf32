//! Level-meter telemetry shared from remote to host
//!
//! Four `f32` slots stored as atomic bit patterns. Each slot is written
//! atomically but a reader may see a mix of two updates across slots.

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::error::IpcResult;
use super::region::{RegionHeader, SharedRegion, ShmNamespace};
use super::{resource_name, LEVEL_METER_SUFFIX};

#[repr(C)]
struct TelemetrySlots {
    level_left: AtomicU32,
    level_right: AtomicU32,
    midi_in: AtomicU32,
    midi_out: AtomicU32,
}

// SAFETY: repr(C), atomics only
unsafe impl RegionHeader for TelemetrySlots {}

/// One meter reading
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LevelMeterStatus {
    pub left: f32,
    pub right: f32,
    pub midi_in: bool,
    pub midi_out: bool,
}

/// The `<id>_levelmeter` region
#[derive(Debug)]
pub struct TelemetryRegion {
    region: SharedRegion,
}

fn store(slot: &AtomicU32, value: f32) {
    slot.store(value.to_bits(), Ordering::Relaxed);
}

fn load(slot: &AtomicU32) -> f32 {
    f32::from_bits(slot.load(Ordering::Relaxed))
}

impl TelemetryRegion {
    pub fn create(namespace: &ShmNamespace, instance_id: &str) -> IpcResult<Self> {
        let region = SharedRegion::create(
            namespace,
            &resource_name(instance_id, LEVEL_METER_SUFFIX)?,
            size_of::<TelemetrySlots>(),
        )?;
        Ok(Self { region })
    }

    pub fn open(namespace: &ShmNamespace, instance_id: &str, timeout: Duration) -> IpcResult<Self> {
        let region = SharedRegion::open(
            namespace,
            &resource_name(instance_id, LEVEL_METER_SUFFIX)?,
            size_of::<TelemetrySlots>(),
            timeout,
        )?;
        Ok(Self { region })
    }

    fn slots(&self) -> &TelemetrySlots {
        self.region.header()
    }

    pub fn write(&self, status: LevelMeterStatus) {
        let slots = self.slots();
        store(&slots.level_left, status.left);
        store(&slots.level_right, status.right);
        store(&slots.midi_in, if status.midi_in { 1.0 } else { 0.0 });
        store(&slots.midi_out, if status.midi_out { 1.0 } else { 0.0 });
    }

    pub fn read(&self) -> LevelMeterStatus {
        let slots = self.slots();
        LevelMeterStatus {
            left: load(&slots.level_left),
            right: load(&slots.level_right),
            midi_in: load(&slots.midi_in) != 0.0,
            midi_out: load(&slots.midi_out) != 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_visible_to_peer() {
        let dir = tempfile::tempdir().unwrap();
        let ns = ShmNamespace::new(dir.path());
        let host = TelemetryRegion::create(&ns, "meter").unwrap();
        let remote = TelemetryRegion::open(&ns, "meter", Duration::from_millis(20)).unwrap();

        assert_eq!(host.read(), LevelMeterStatus::default());

        let status = LevelMeterStatus {
            left: 0.5,
            right: 0.25,
            midi_in: true,
            midi_out: false,
        };
        remote.write(status);
        assert_eq!(host.read(), status);
    }
}
