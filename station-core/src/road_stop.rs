//! Road stop occupancy.
//!
//! A bay stop has two parking bays and a single entrance that one vehicle
//! at a time may use. A drive-through stop has no bays; vehicles queue in
//! one of its two lanes, tracked as occupied length per lane.

use crate::map::TileIndex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadStop {
    pub xy: TileIndex,
    pub drive_through: bool,
    /// Bit n set: bay n is free.
    bays_free: u8,
    entrance_busy: bool,
    /// Occupied length of the two drive-through lanes.
    occupied: [u16; 2],
}

impl RoadStop {
    pub fn new(xy: TileIndex, drive_through: bool) -> Self {
        Self {
            xy,
            drive_through,
            bays_free: 0b11,
            entrance_busy: false,
            occupied: [0, 0],
        }
    }

    pub fn is_free_bay(&self, bay: u8) -> bool {
        debug_assert!(bay < 2);
        self.bays_free & (1 << bay) != 0
    }

    pub fn has_free_bay(&self) -> bool {
        self.bays_free != 0
    }

    /// Take the first free bay.
    pub fn allocate_bay(&mut self) -> Option<u8> {
        let bay = (0..2).find(|b| self.is_free_bay(*b))?;
        self.bays_free &= !(1 << bay);
        Some(bay)
    }

    pub fn free_bay(&mut self, bay: u8) {
        debug_assert!(bay < 2);
        self.bays_free |= 1 << bay;
    }

    pub fn is_entrance_busy(&self) -> bool {
        self.entrance_busy
    }

    pub fn set_entrance_busy(&mut self, busy: bool) {
        self.entrance_busy = busy;
    }

    pub fn occupied(&self, lane: usize) -> u16 {
        self.occupied[lane]
    }

    /// A road vehicle of `length` wants to enter. Bay stops hand out a bay
    /// and block the entrance; drive-through stops always admit and count
    /// the vehicle's length against `lane`.
    pub fn enter(&mut self, lane: usize, length: u16) -> Option<u8> {
        if self.drive_through {
            self.occupied[lane] = self.occupied[lane].saturating_add(length);
            return Some(0);
        }
        if !self.has_free_bay() || self.is_entrance_busy() {
            return None;
        }
        self.set_entrance_busy(true);
        self.allocate_bay()
    }

    /// Undo an [`enter`](Self::enter).
    pub fn leave(&mut self, lane: usize, length: u16, bay: u8) {
        if self.drive_through {
            self.occupied[lane] = self.occupied[lane].saturating_sub(length);
        } else {
            self.free_bay(bay);
            self.set_entrance_busy(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bay_stop_admits_two_then_blocks() {
        let mut stop = RoadStop::new(TileIndex::new(1, 1), false);
        assert_eq!(stop.enter(0, 8), Some(0));
        // Entrance still busy with the first vehicle.
        assert_eq!(stop.enter(0, 8), None);
        stop.set_entrance_busy(false);
        assert_eq!(stop.enter(0, 8), Some(1));
        stop.set_entrance_busy(false);
        assert_eq!(stop.enter(0, 8), None);

        stop.leave(0, 8, 0);
        assert!(stop.is_free_bay(0));
        assert!(!stop.is_free_bay(1));
    }

    #[test]
    fn test_drive_through_counts_length() {
        let mut stop = RoadStop::new(TileIndex::new(1, 1), true);
        assert_eq!(stop.enter(1, 6), Some(0));
        assert_eq!(stop.enter(1, 6), Some(0));
        assert_eq!(stop.occupied(1), 12);
        assert_eq!(stop.occupied(0), 0);
        stop.leave(1, 6, 0);
        assert_eq!(stop.occupied(1), 6);
    }
}
