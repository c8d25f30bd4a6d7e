//! Ground checks and clearing of tiles that are not station tiles.
//!
//! Station construction asks two things of every tile it covers: can a
//! foundation sit here at the shared height ([`check_buildable_tile`]), and
//! what does it cost to clear whatever stands on it ([`clear_land`]).

use crate::command::{check_ownership, CommandContext, CommandCost, CommandError, CommandResult, ExpenseType};
use crate::map::{DiagDirection, Owner, TileIndex, TileKind, WaterClass};
use crate::services::{Services, VehicleTracker};
use crate::state::{Money, World};

/// Refuse if any vehicle stands on `tile`.
pub fn ensure_no_vehicle_on_ground(vehicles: &dyn VehicleTracker, tile: TileIndex) -> Result<(), CommandError> {
    match vehicles.vehicle_on_tile(tile) {
        Some(v) => {
            log::trace!("vehicle {:?} blocks {}", v, tile);
            Err(CommandError::VehicleInTheWay)
        }
        None => Ok(()),
    }
}

/// Check that a station part may be placed on `tile`.
///
/// `invalid_dirs` are the edges the part is entered from; a sloped tile must
/// be able to carry a foundation facing each of them. All tiles of one
/// command share `allowed_z`: the first tile fixes the height, every later
/// tile must match it.
pub fn check_buildable_tile(
    world: &World,
    vehicles: &dyn VehicleTracker,
    tile: TileIndex,
    invalid_dirs: &[DiagDirection],
    allowed_z: &mut Option<u8>,
    allow_steep: bool,
) -> CommandResult {
    let t = world.map.get(tile);
    if t.bridge_above {
        return Err(CommandError::MustDemolishBridgeFirst);
    }
    ensure_no_vehicle_on_ground(vehicles, tile)?;

    let slope = t.slope;
    if (!allow_steep && slope.is_steep()) || (!world.settings.build_on_slopes && !slope.is_flat()) {
        return Err(CommandError::FlatLandRequired);
    }

    let mut cost = CommandCost::new(ExpenseType::Construction);
    if !slope.is_flat() {
        if invalid_dirs.iter().any(|dir| !slope.supports_entrance(*dir)) {
            return Err(CommandError::FlatLandRequired);
        }
        cost.add_cost(world.prices.build_foundation);
    }

    let flat_z = t.flat_z();
    match *allowed_z {
        None => *allowed_z = Some(flat_z),
        Some(z) if z != flat_z => return Err(CommandError::FlatLandRequired),
        Some(_) => {}
    }
    Ok(cost)
}

/// Demolish whatever stands on `tile`, leaving bare land.
///
/// Station tiles are handed to [`crate::tile_procs::clear_tile`].
pub fn clear_land(world: &mut World, services: &mut Services<'_>, ctx: &CommandContext, tile: TileIndex) -> CommandResult {
    if !world.map.is_valid(tile) {
        return Err(CommandError::Invalid);
    }
    let t = *world.map.get(tile);
    let prices = world.prices.clone();
    let mut cost = CommandCost::new(ExpenseType::Construction);

    match t.kind {
        TileKind::Station(_) => return crate::tile_procs::clear_tile(world, services, ctx, tile),
        TileKind::House(_) => return Err(CommandError::BuildingMustBeDemolished),
        TileKind::Industry(_) => return Err(CommandError::ObjectInTheWay),
        TileKind::Clear => cost.add_cost(prices.clear_grass),
        TileKind::Trees => cost.add_cost(prices.clear_trees),
        TileKind::Water(class) => {
            if ctx.flags.auto() || (class == WaterClass::Sea && t.height == 0) {
                return Err(CommandError::SiteUnsuitable);
            }
            if class == WaterClass::Canal && ctx.company != Owner::Water {
                check_ownership(t.owner, ctx.company)?;
            }
            cost.add_cost(prices.clear_water);
        }
        TileKind::Rail(rail) => {
            if ctx.company != Owner::Water {
                check_ownership(t.owner, ctx.company)?;
            }
            ensure_no_vehicle_on_ground(&*services.vehicles, tile)?;
            cost.add_cost(prices.clear_rail * Money::from(rail.tracks.count()));
            if ctx.exec() {
                if let Some(infra) = world.infrastructure_mut(t.owner) {
                    let pieces = infra.rail_mut(rail.rail_type);
                    *pieces = pieces.saturating_sub(rail.tracks.count());
                }
            }
        }
        TileKind::Road(road) => {
            if ctx.company != Owner::Water {
                for piece in [road.road, road.tram].into_iter().flatten() {
                    if let Owner::Company(_) = piece.owner {
                        check_ownership(piece.owner, ctx.company)?;
                    }
                }
            }
            ensure_no_vehicle_on_ground(&*services.vehicles, tile)?;
            let layers = [road.road, road.tram].into_iter().flatten().count() as Money;
            cost.add_cost(prices.clear_road * Money::from(road.bits.count()) * layers);
            if ctx.exec() {
                for piece in [road.road, road.tram].into_iter().flatten() {
                    if let Some(infra) = world.infrastructure_mut(piece.owner) {
                        let pieces = infra.road_mut(piece.road_type);
                        *pieces = pieces.saturating_sub(road.bits.count());
                    }
                }
            }
        }
    }

    if ctx.exec() {
        let t = world.map.get_mut(tile);
        t.kind = TileKind::Clear;
        t.owner = Owner::None;
    }
    Ok(cost)
}
