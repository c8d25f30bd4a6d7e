//! Platform reservations of trains standing in rail stations.
//!
//! Rebuilding a station tile wipes the reservation bit stored on it. Any
//! train holding a path over the affected tiles is released first and
//! re-reserved once the tiles are rebuilt.

use crate::map::{DiagDirection, Map, StationPart, TileIndex};
use crate::services::VehicleTracker;
use crate::state::VehicleId;

fn set_part_reservation(part: &mut StationPart, on: bool) {
    match part {
        StationPart::Rail { reserved, .. } | StationPart::Waypoint { reserved, .. } => *reserved = on,
        _ => {}
    }
}

/// Whether `tile` continues the platform that `start` is part of.
pub fn is_compatible_platform_tile(map: &Map, tile: TileIndex, start: TileIndex) -> bool {
    let (Some(a), Some(b)) = (
        map.try_get(tile).and_then(|t| t.station()),
        map.try_get(start).and_then(|t| t.station()),
    ) else {
        return false;
    };
    a.station == b.station
        && a.part.station_type() == b.part.station_type()
        && a.part.rail_axis().is_some()
        && a.part.rail_axis() == b.part.rail_axis()
}

/// Set or clear the reservation of every platform tile from `start` onwards
/// in direction `dir`.
pub fn set_rail_station_platform_reservation(map: &mut Map, start: TileIndex, dir: DiagDirection, on: bool) {
    let Some(axis) = map.get(start).station().and_then(|s| s.part.rail_axis()) else {
        return;
    };
    if axis != dir.axis() {
        return;
    }

    let mut tile = start;
    loop {
        if let Some(st) = map.get_mut(tile).station_mut() {
            set_part_reservation(&mut st.part, on);
        }
        match map.step(tile, dir) {
            Some(next) if is_compatible_platform_tile(map, next, start) => tile = next,
            _ => break,
        }
    }
}

fn is_rail_station_tile(map: &Map, tile: TileIndex) -> bool {
    map.try_get(tile)
        .and_then(|t| t.station())
        .is_some_and(|s| s.part.rail_axis().is_some())
}

/// Release everything `train` has reserved, including the platforms its
/// head and tail stand on.
pub fn free_train_reservation(map: &mut Map, vehicles: &mut dyn VehicleTracker, train: VehicleId) {
    vehicles.free_track_reservation(train);
    let Some(ends) = vehicles.train_ends(train) else {
        return;
    };
    if is_rail_station_tile(map, ends.head) {
        set_rail_station_platform_reservation(map, ends.head, ends.head_exit, false);
    }
    if is_rail_station_tile(map, ends.tail) {
        set_rail_station_platform_reservation(map, ends.tail, ends.tail_exit, false);
    }
}

/// Undo [`free_train_reservation`]. A train that cannot find a new path
/// keeps only its platforms; it will search again when it moves.
pub fn restore_train_reservation(map: &mut Map, vehicles: &mut dyn VehicleTracker, train: VehicleId) {
    let ends = vehicles.train_ends(train);
    if let Some(ends) = ends.filter(|e| is_rail_station_tile(map, e.head)) {
        set_rail_station_platform_reservation(map, ends.head, ends.head_exit, true);
    }
    if !vehicles.try_path_reserve(train) {
        log::trace!("train {:?} found no path after station change", train);
    }
    if let Some(ends) = ends.filter(|e| is_rail_station_tile(map, e.tail)) {
        set_rail_station_platform_reservation(map, ends.tail, ends.tail_exit, true);
    }
}
