//! Pending-reply buffer with the batched drain cursor.

use std::sync::atomic::{AtomicI16, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};

use bytes::Bytes;
use contracts::{wire, VehicleIndex, VehicleUpdate};

use crate::BarrierError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Result of writing a reply into its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Slot was empty; reply stored.
    Stored,
    /// Slot already held an undrained reply; last writer wins.
    Overwrote,
}

/// One batch of drained updates.
#[derive(Debug, Default)]
pub struct DrainOutcome {
    pub updates: Vec<VehicleUpdate>,
    /// The cursor reached the end of the index space and reset to 0.
    pub wrapped: bool,
}

/// Fixed mapping `vehicle index -> serialized reply bytes`.
///
/// An empty slot means "no reply stored since the last drain". Slots are
/// created at registration and reused every tick. Each slot carries its own
/// lock: slot writes race only with the drain walk, and the worst case of
/// that race is a slot re-emptied on the next tick.
#[derive(Debug, Default)]
pub struct PendingReplies {
    slots: RwLock<Vec<Mutex<Bytes>>>,
    cursor: AtomicI16,
}

impl PendingReplies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all slots and rewind the cursor (scenario start).
    pub fn reset(&self) {
        self.slots
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        self.cursor.store(0, Ordering::SeqCst);
    }

    /// Append the empty slot for a newly registered vehicle.
    pub fn add_slot(&self) {
        self.slots
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Mutex::new(Bytes::new()));
    }

    /// Number of registered slots.
    pub fn len(&self) -> VehicleIndex {
        self.read_slots().len() as VehicleIndex
    }

    pub fn is_empty(&self) -> bool {
        self.read_slots().is_empty()
    }

    /// Whether the slot currently holds undrained bytes.
    pub fn is_slot_empty(&self, index: VehicleIndex) -> bool {
        let slots = self.read_slots();
        match slots.get(index as usize) {
            Some(slot) => lock(slot).is_empty(),
            None => true,
        }
    }

    /// Store `bytes` into the slot, overwriting any undrained reply.
    pub fn store(&self, index: VehicleIndex, bytes: Bytes) -> Result<StoreOutcome, BarrierError> {
        let slots = self.read_slots();
        let slot = slots
            .get(index as usize)
            .filter(|_| index >= 0)
            .ok_or(BarrierError::UnknownVehicle {
                index,
                known: slots.len() as i16,
            })?;

        let mut guard = lock(slot);
        let outcome = if guard.is_empty() {
            StoreOutcome::Stored
        } else {
            StoreOutcome::Overwrote
        };
        *guard = bytes;
        Ok(outcome)
    }

    /// Store `bytes` only if the slot is empty; returns whether it stored.
    pub fn store_if_empty(
        &self,
        index: VehicleIndex,
        bytes: Bytes,
    ) -> Result<bool, BarrierError> {
        let slots = self.read_slots();
        let slot = slots
            .get(index as usize)
            .filter(|_| index >= 0)
            .ok_or(BarrierError::UnknownVehicle {
                index,
                known: slots.len() as i16,
            })?;

        let mut guard = lock(slot);
        if guard.is_empty() {
            *guard = bytes;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Drain the next batch of non-empty slots.
    ///
    /// Walks indices from the cursor, emptying each visited slot, and stops
    /// at the end of the index space or at the next batch-window boundary.
    /// Empty slots contribute to the walk but not to the payload. When the
    /// walk reaches `num_cars` the cursor rewinds to 0.
    pub fn drain(
        &self,
        num_cars: VehicleIndex,
        batch_size: u16,
    ) -> Result<DrainOutcome, BarrierError> {
        if num_cars == 0 {
            return Ok(DrainOutcome::default());
        }

        let batch = i16::try_from(batch_size).unwrap_or(i16::MAX).max(1);
        let slots = self.read_slots();
        let mut updates = Vec::new();
        let mut k = self.cursor.load(Ordering::SeqCst);

        loop {
            if let Some(slot) = slots.get(k as usize) {
                let mut guard = lock(slot);
                if !guard.is_empty() {
                    let update: VehicleUpdate = wire::decode(&guard)?;
                    updates.push(update);
                    *guard = Bytes::new();
                }
            }

            k += 1;
            if k >= num_cars || k % batch == 0 {
                break;
            }
        }

        let wrapped = k >= num_cars;
        self.cursor.store(if wrapped { 0 } else { k }, Ordering::SeqCst);

        Ok(DrainOutcome { updates, wrapped })
    }

    fn read_slots(&self) -> std::sync::RwLockReadGuard<'_, Vec<Mutex<Bytes>>> {
        self.slots
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
