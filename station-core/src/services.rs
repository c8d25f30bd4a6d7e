//! Collaborator interfaces.
//!
//! The station subsystem does not model vehicles, town authorities, houses
//! or industries. It asks about them through the traits here, bundled into
//! a [`Services`] value that commands and periodic systems receive
//! explicitly.

use crate::cargo::{CargoArray, CargoType, CargoTypes};
use crate::command::CommandError;
use crate::link_graph::EdgeUpdateModes;
use crate::map::{DiagDirection, Owner, TileIndex};
use crate::station::GoodsEntry;
use crate::state::{Date, StationId, VehicleId, World};

/// Both ends of a train, with the direction each end faces when leaving
/// the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainEnds {
    pub head: TileIndex,
    pub head_exit: DiagDirection,
    pub tail: TileIndex,
    pub tail_exit: DiagDirection,
}

/// One hop a vehicle's orders will travel, reported when its links are
/// refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkRefresh {
    pub from: StationId,
    pub to: StationId,
    pub cargo: CargoType,
    pub capacity: u32,
    pub usage: u32,
    pub travel_time: u32,
    pub modes: EdgeUpdateModes,
}

pub trait VehicleTracker {
    /// Any vehicle standing on `tile`.
    fn vehicle_on_tile(&self, tile: TileIndex) -> Option<VehicleId>;

    /// Train holding a path reservation over `tile`.
    fn train_for_reservation(&self, tile: TileIndex) -> Option<VehicleId>;

    /// Release the train's reserved path ahead of it.
    fn free_track_reservation(&mut self, train: VehicleId);

    /// Try to reserve a fresh path. Failing is fine; the train searches
    /// again when it next moves.
    fn try_path_reserve(&mut self, train: VehicleId) -> bool;

    fn train_ends(&self, train: VehicleId) -> Option<TrainEnds>;

    /// Vehicles whose orders visit `from` and then `to`.
    fn consists_serving(&self, from: StationId, to: StationId) -> Vec<VehicleId>;

    /// Date the vehicle stopped in a depot, if it is stopped in one.
    fn stopped_in_depot_since(&self, vehicle: VehicleId) -> Option<Date>;

    /// Walk the vehicle's orders and report the links it will serve.
    fn refresh_links(&mut self, vehicle: VehicleId) -> Vec<LinkRefresh>;

    /// Cargo loading at `station` had its next hop removed.
    fn reroute_loading_cargo(&mut self, _station: StationId, _cargo: CargoType, _avoid: StationId) {}

    /// Aircraft on the ground or approaching `station`.
    fn aircraft_in_the_way(&self, station: StationId) -> bool;
}

pub trait LocalAuthority {
    /// May `company` build a new station near `tile`?
    fn allows_new_station(&self, world: &World, tile: TileIndex, company: Owner) -> Result<(), CommandError>;
}

/// Houses, industries and headquarters as opaque cargo sources.
pub trait CargoSources {
    /// Add the acceptance of `tile` in 1/8 units. Sources that accept a
    /// cargo regardless of amount also set it in `always_accepted`.
    fn accepted(&self, world: &World, tile: TileIndex, acceptance: &mut CargoArray, always_accepted: &mut CargoTypes);

    fn produced(&self, world: &World, tile: TileIndex, production: &mut CargoArray);
}

pub trait ScriptHooks {
    /// Replacement rating for `cargo` at `station`, or `None` to use the
    /// built-in calculation.
    fn station_rating(&self, station: StationId, cargo: CargoType, goods: &GoodsEntry) -> Option<i32>;
}

/// Everything outside the station subsystem that it talks to.
pub struct Services<'a> {
    pub vehicles: &'a mut dyn VehicleTracker,
    pub authority: &'a dyn LocalAuthority,
    pub cargo: &'a dyn CargoSources,
    pub hooks: &'a dyn ScriptHooks,
}

// ============================================================================
// Null collaborators
// ============================================================================

/// A world without vehicles.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVehicles;

impl VehicleTracker for NoVehicles {
    fn vehicle_on_tile(&self, _tile: TileIndex) -> Option<VehicleId> {
        None
    }

    fn train_for_reservation(&self, _tile: TileIndex) -> Option<VehicleId> {
        None
    }

    fn free_track_reservation(&mut self, _train: VehicleId) {}

    fn try_path_reserve(&mut self, _train: VehicleId) -> bool {
        false
    }

    fn train_ends(&self, _train: VehicleId) -> Option<TrainEnds> {
        None
    }

    fn consists_serving(&self, _from: StationId, _to: StationId) -> Vec<VehicleId> {
        Vec::new()
    }

    fn stopped_in_depot_since(&self, _vehicle: VehicleId) -> Option<Date> {
        None
    }

    fn refresh_links(&mut self, _vehicle: VehicleId) -> Vec<LinkRefresh> {
        Vec::new()
    }

    fn aircraft_in_the_way(&self, _station: StationId) -> bool {
        false
    }
}

/// Authorities that never object.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl LocalAuthority for AllowAll {
    fn allows_new_station(&self, _world: &World, _tile: TileIndex, _company: Owner) -> Result<(), CommandError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ScriptHooks for NoHooks {
    fn station_rating(&self, _station: StationId, _cargo: CargoType, _goods: &GoodsEntry) -> Option<i32> {
        None
    }
}
