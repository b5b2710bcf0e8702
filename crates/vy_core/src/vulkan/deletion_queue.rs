//! Frame-indexed deferred destruction
//!
//! One bucket per frame in flight. Releases scheduled while slot `i` is
//! current stay queued until slot `i` is flushed again, which the renderer
//! does only after the fence guarding slot `i`'s previous submission has
//! signaled.

use super::api::{DeviceApi, PendingRelease};

/// Ring of pending releases indexed by frame slot
#[derive(Debug)]
pub struct DeletionQueue {
    slots: Vec<Vec<PendingRelease>>,
    current: usize,
}

impl DeletionQueue {
    /// Create an empty queue with one bucket per frame in flight
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0, "Deletion queue needs at least one slot");
        Self {
            slots: vec![Vec::new(); frames_in_flight],
            current: 0,
        }
    }

    /// Number of frame slots
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Slot that new releases are appended to
    pub const fn current(&self) -> usize {
        self.current
    }

    /// Make `slot` the target of subsequent [`schedule`](Self::schedule) calls
    pub fn set_current(&mut self, slot: usize) {
        assert!(slot < self.slots.len(), "Frame slot {slot} out of range");
        self.current = slot;
    }

    /// Append a release to the current slot
    pub fn schedule(&mut self, release: PendingRelease) {
        log::trace!("Deferring {} release to frame slot {}", release.kind(), self.current);
        self.slots[self.current].push(release);
    }

    /// Releases waiting in `slot`
    pub fn pending(&self, slot: usize) -> &[PendingRelease] {
        &self.slots[slot]
    }

    /// Releases waiting across all slots
    pub fn pending_total(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    /// Release everything queued in `slot`, in the order it was scheduled
    ///
    /// Must only be called once the GPU has finished the work last submitted
    /// from `slot`. Returns the number of objects released.
    pub fn flush(&mut self, slot: usize, device: &dyn DeviceApi) -> usize {
        let pending = std::mem::take(&mut self.slots[slot]);
        let count = pending.len();
        for release in pending {
            device.destroy(release);
        }
        if count > 0 {
            log::debug!("Flushed {count} deferred releases from frame slot {slot}");
        }
        count
    }

    /// Release everything in every slot regardless of GPU progress
    ///
    /// Only valid once the device is idle.
    pub fn flush_all(&mut self, device: &dyn DeviceApi) -> usize {
        (0..self.slots.len()).map(|slot| self.flush(slot, device)).sum()
    }
}
