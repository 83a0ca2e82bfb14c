//! Edge-mode waypoint relay table.

use bytes::Bytes;
use contracts::{wire, EdgeWaypoints, VehicleIndex, WaypointBuffer};

use crate::BarrierError;

/// Ordered list of `(vehicle index, serialized waypoint plan)`, replaced
/// wholesale on each push from the API host.
///
/// The table is not per-tick-indexed; the API host publishes a fresh table
/// before each tick that needs edge routing.
#[derive(Debug, Default)]
pub struct EdgeWaypointTable {
    buffers: Vec<(VehicleIndex, Bytes)>,
}

impl EdgeWaypointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole table, preserving each plan in serialized form.
    pub fn replace(&mut self, waypoints: &EdgeWaypoints) -> Result<(), BarrierError> {
        let mut buffers = Vec::with_capacity(waypoints.all_waypoint_buffers.len());
        for buffer in &waypoints.all_waypoint_buffers {
            buffers.push((buffer.vehicle_index, wire::encode(buffer)?));
        }
        self.buffers = buffers;
        Ok(())
    }

    /// Fetch the plan for a vehicle.
    ///
    /// Returns the first entry matching the index, parsed into a freshly
    /// allocated buffer; duplicates are ignored. No entry is not an error:
    /// the vehicle gets an empty plan.
    pub fn lookup(&self, index: VehicleIndex) -> Result<WaypointBuffer, BarrierError> {
        for (entry_index, bytes) in &self.buffers {
            if *entry_index == index {
                let buffer: WaypointBuffer = wire::decode(bytes)?;
                return Ok(buffer);
            }
        }
        Ok(WaypointBuffer::empty(index))
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}
