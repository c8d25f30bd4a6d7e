//! Procedures the generic tile dispatcher calls for station tiles.
//!
//! Clearing, track status, the periodic tile loop (flooding), ownership
//! transfer, vehicles entering a tile and terraforming underneath a
//! station. Drawing is not handled here.

use crate::command::{airport, dock, rail, road, CommandContext, CommandCost, CommandError, CommandResult, DoCommandFlags, ExpenseType};
use crate::map::{Axis, DiagDirection, Owner, RoadPiece, RoadStopLayout, RoadStopType, Slope, StationPart, StationTile, StationType, TileArea, TileIndex, TileKind, TrackBits, WaterClass};
use crate::reservation::is_compatible_platform_tile;
use crate::services::Services;
use crate::station::VehicleType;
use crate::state::{StationId, World};

/// Error for automatic clearing of a station part.
pub fn demolish_first_error(part: &StationPart) -> CommandError {
    match part.station_type() {
        StationType::Rail => CommandError::MustDemolishRailStationFirst,
        StationType::Waypoint => CommandError::MustDemolishWaypointFirst,
        StationType::Bus => CommandError::MustDemolishBusStationFirst,
        StationType::Truck => CommandError::MustDemolishTruckStationFirst,
        StationType::Airport => CommandError::MustDemolishAirportFirst,
        StationType::Dock => CommandError::MustDemolishDockFirst,
        StationType::Oilrig => CommandError::ObjectInTheWay,
    }
}

/// Road and tram layers under a drive-through stop must belong to the
/// acting company (or to nobody in particular) before the stop goes.
fn can_remove_road_with_stop(road: Option<RoadPiece>, tram: Option<RoadPiece>, ctx: &CommandContext) -> Result<(), CommandError> {
    if ctx.company == Owner::Water {
        return Ok(());
    }
    for piece in [road, tram].into_iter().flatten() {
        if piece.owner.company().is_some() && piece.owner != ctx.company {
            return Err(CommandError::OwnedBy(piece.owner));
        }
    }
    Ok(())
}

/// Demolish the station part on `tile`.
pub fn clear_tile(world: &mut World, services: &mut Services<'_>, ctx: &CommandContext, tile: TileIndex) -> CommandResult {
    let part = match world.map.try_get(tile).and_then(|t| t.station()) {
        Some(st) => st.part,
        None => return Err(CommandError::ThereIsNoStation),
    };
    if ctx.flags.auto() {
        return Err(demolish_first_error(&part));
    }

    match part {
        StationPart::Rail { .. } => rail::remove_rail_station(world, services, ctx, tile),
        StationPart::Waypoint { .. } => rail::remove_rail_waypoint(world, services, ctx, tile),
        StationPart::Airport { .. } => airport::remove_airport(world, services, ctx, tile),
        StationPart::RoadStop { layout, road, tram, .. } => {
            if matches!(layout, RoadStopLayout::DriveThrough(_)) {
                can_remove_road_with_stop(road, tram, ctx)?;
            }
            road::remove_road_stop_tile(world, services, ctx, tile, true)
        }
        StationPart::Dock { .. } => dock::remove_dock(world, services, ctx, tile),
        StationPart::Oilrig => Err(CommandError::Invalid),
    }
}

/// How a vehicle asks for the usable track on a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    Rail,
    Road(RoadStopType),
}

/// Tracks a vehicle of `transport` may use on `tile`.
pub fn track_status(world: &World, tile: TileIndex, transport: TransportType) -> TrackBits {
    let Some(st) = world.map.try_get(tile).and_then(|t| t.station()) else {
        return TrackBits::NONE;
    };
    match (transport, st.part) {
        (TransportType::Rail, StationPart::Rail { axis, .. } | StationPart::Waypoint { axis, .. }) => axis.track(),
        (TransportType::Road(wanted), StationPart::RoadStop { stop_type, layout, .. }) => {
            // Drive-through stops carry through traffic of either kind.
            match layout {
                RoadStopLayout::DriveThrough(axis) => axis.track(),
                RoadStopLayout::Bay(dir) if stop_type == wanted => dir.axis().track(),
                RoadStopLayout::Bay(_) => TrackBits::NONE,
            }
        }
        _ => TrackBits::NONE,
    }
}

fn on_water(part: &StationPart) -> bool {
    matches!(part, StationPart::Dock { land: false, .. } | StationPart::Oilrig)
}

/// Periodic per-tile work. Flat station tiles at sea level next to the
/// sea are flooded: the part is removed as the water owner and the tile
/// becomes sea. Returns whether the tile flooded.
pub fn tile_loop(world: &mut World, services: &mut Services<'_>, tile: TileIndex) -> bool {
    let t = *world.map.get(tile);
    let Some(st) = t.station() else {
        return false;
    };
    if on_water(&st.part) || t.height != 0 || !t.slope.is_flat() {
        return false;
    }
    let next_to_sea = [DiagDirection::NE, DiagDirection::SE, DiagDirection::SW, DiagDirection::NW]
        .into_iter()
        .filter_map(|dir| world.map.step(tile, dir))
        .any(|n| world.map.get(n).kind == TileKind::Water(WaterClass::Sea));
    if !next_to_sea {
        return false;
    }

    let ctx = CommandContext::new(Owner::Water, DoCommandFlags::EXEC);
    match clear_tile(world, services, &ctx, tile) {
        Ok(_) => {
            // Airports and whole stations may have taken more tiles along.
            if world.map.get(tile).station().is_none() {
                let flooded = world.map.get_mut(tile);
                flooded.kind = TileKind::Water(WaterClass::Sea);
                flooded.owner = Owner::Water;
            }
            log::debug!("station tile {} flooded", tile);
            true
        }
        Err(e) => {
            log::trace!("flooding {} held off: {}", tile, e);
            false
        }
    }
}

fn move_road_pieces(world: &mut World, pieces: [&mut Option<RoadPiece>; 2], old: Owner, new: Option<Owner>, count: u32) {
    for piece in pieces.into_iter().flatten() {
        if piece.owner != old {
            continue;
        }
        if let Some(infra) = world.infrastructure_mut(old) {
            let n = infra.road_mut(piece.road_type);
            *n = n.saturating_sub(count);
        }
        if let Some(infra) = new.and_then(|n| world.infrastructure_mut(n)) {
            *infra.road_mut(piece.road_type) += count;
        }
        piece.owner = new.unwrap_or(Owner::None);
    }
}

/// Hand `tile` from `old` to `new`. Without a new owner the station part
/// is demolished; drive-through stops leave their road behind, unowned.
pub fn change_owner(world: &mut World, services: &mut Services<'_>, tile: TileIndex, old: Owner, new: Option<Owner>) {
    let Some(StationTile { part, .. }) = world.map.get(tile).station().copied() else {
        return;
    };

    if let StationPart::RoadStop { mut road, mut tram, .. } = part {
        move_road_pieces(world, [&mut road, &mut tram], old, new, road::ROAD_STOP_TRACKBIT_FACTOR);
        if let Some(StationTile {
            part: StationPart::RoadStop { road: r, tram: t, .. },
            ..
        }) = world.map.get_mut(tile).station_mut()
        {
            *r = road;
            *t = tram;
        }
    }

    if world.map.get(tile).owner != old {
        return;
    }

    if let Some(new_owner) = new {
        let counts_station = !matches!(part, StationPart::Airport { .. });
        for (owner, delta) in [(old, -1i64), (new_owner, 1)] {
            let Some(infra) = world.infrastructure_mut(owner) else {
                continue;
            };
            let adjust = |n: &mut u32| *n = (i64::from(*n) + delta).max(0) as u32;
            match part {
                StationPart::Rail { rail_type, .. } | StationPart::Waypoint { rail_type, .. } => adjust(infra.rail_mut(rail_type)),
                StationPart::Dock {
                    land: false,
                    water: WaterClass::Canal,
                    ..
                } => adjust(&mut infra.water),
                _ => {}
            }
            if counts_station {
                adjust(&mut infra.station);
            }
        }
        world.map.get_mut(tile).owner = new_owner;
        return;
    }

    let ctx = CommandContext::new(old, DoCommandFlags::EXEC.with(DoCommandFlags::BANKRUPT));
    match part {
        StationPart::RoadStop {
            stop_type,
            layout: RoadStopLayout::DriveThrough(_),
            ..
        } => {
            if let Err(e) = road::remove_road_stop(world, services, &ctx, tile, 1, 1, stop_type, false) {
                log::warn!("could not remove road stop {} of bankrupt {:?}: {}", tile, old, e);
                return;
            }
            let t = *world.map.get(tile);
            if let TileKind::Road(mut r) = t.kind {
                move_road_pieces(world, [&mut r.road, &mut r.tram], old, None, r.bits.count());
                let tile_mut = world.map.get_mut(tile);
                tile_mut.kind = TileKind::Road(r);
                if tile_mut.owner == old {
                    tile_mut.owner = Owner::None;
                }
            }
        }
        _ => {
            if let Err(e) = clear_tile(world, services, &ctx, tile) {
                log::warn!("could not clear station tile {} of bankrupt {:?}: {}", tile, old, e);
                return;
            }
            let tile_mut = world.map.get_mut(tile);
            if tile_mut.is_water() && tile_mut.owner == old {
                tile_mut.owner = Owner::None;
            }
        }
    }
}

/// Move every station tile and station of `old` to `new`, or demolish
/// them when there is no new owner.
#[tracing::instrument(skip_all, name = "transfer_station_ownership")]
pub fn transfer_station_ownership(world: &mut World, services: &mut Services<'_>, old: Owner, new: Option<Owner>) {
    let whole = TileArea::new(TileIndex::new(0, 0), world.map.size_x, world.map.size_y);
    for tile in whole.iter() {
        if matches!(world.map.get(tile).kind, TileKind::Station(_)) {
            change_owner(world, services, tile, old, new);
        }
    }

    let mut airports = 0;
    for st in world.stations.iter_mut().filter(|st| st.owner == old) {
        if !st.airport.area.is_empty() {
            airports += 1;
        }
        st.owner = new.unwrap_or(Owner::None);
    }
    if let Some(infra) = world.infrastructure_mut(old) {
        infra.airport = infra.airport.saturating_sub(airports);
    }
    if let Some(infra) = new.and_then(|n| world.infrastructure_mut(n)) {
        infra.airport += airports;
    }
    log::info!("stations of {:?} handed to {:?}", old, new);
}

/// A vehicle moving onto a station tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleEntry {
    /// Train front heading in `direction`, bound for `destination`.
    Train {
        direction: DiagDirection,
        destination: StationId,
    },
    /// Road vehicle of `length` in `lane`.
    Road { lane: usize, length: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterResult {
    /// Keep driving.
    Continue,
    /// Train reached the end of its platform.
    EnteredStation(StationId),
    /// Road vehicle admitted; `bay` is needed to leave again.
    EnteredRoadStop { station: StationId, bay: u8 },
    /// The stop is full.
    CannotEnter,
}

fn road_stop_type_at(world: &World, tile: TileIndex) -> Option<(StationId, RoadStopType)> {
    match world.map.try_get(tile)?.station()? {
        StationTile {
            station,
            part: StationPart::RoadStop { stop_type, .. },
        } => Some((*station, *stop_type)),
        _ => None,
    }
}

pub fn vehicle_enter(world: &mut World, tile: TileIndex, entry: VehicleEntry) -> EnterResult {
    match entry {
        VehicleEntry::Train { direction, destination } => {
            let Some(StationTile {
                station,
                part: StationPart::Rail { axis, .. },
            }) = world.map.try_get(tile).and_then(|t| t.station()).copied()
            else {
                return EnterResult::Continue;
            };
            if station != destination || axis != direction.axis() {
                return EnterResult::Continue;
            }
            let at_end = match world.map.step(tile, direction) {
                Some(next) => !is_compatible_platform_tile(&world.map, next, tile),
                None => true,
            };
            if !at_end {
                return EnterResult::Continue;
            }
            if let Some(st) = world.stations.get_mut(station) {
                st.last_vehicle_type = Some(VehicleType::Train);
            }
            EnterResult::EnteredStation(station)
        }
        VehicleEntry::Road { lane, length } => {
            let Some((station, stop_type)) = road_stop_type_at(world, tile) else {
                return EnterResult::Continue;
            };
            let Some(st) = world.stations.get_mut(station) else {
                return EnterResult::Continue;
            };
            let Some(stop) = st.road_stops_mut(stop_type).iter_mut().find(|rs| rs.xy == tile) else {
                return EnterResult::Continue;
            };
            match stop.enter(lane, length) {
                Some(bay) => {
                    st.last_vehicle_type = Some(VehicleType::Road);
                    EnterResult::EnteredRoadStop { station, bay }
                }
                None => EnterResult::CannotEnter,
            }
        }
    }
}

/// Undo a successful [`VehicleEntry::Road`].
pub fn vehicle_leave_road_stop(world: &mut World, tile: TileIndex, lane: usize, length: u16, bay: u8) {
    let Some((station, stop_type)) = road_stop_type_at(world, tile) else {
        return;
    };
    if let Some(stop) = world
        .stations
        .get_mut(station)
        .and_then(|st| st.road_stops_mut(stop_type).iter_mut().find(|rs| rs.xy == tile))
    {
        stop.leave(lane, length, bay);
    }
}

fn slope_keeps_axis(slope: Slope, axis: Axis) -> bool {
    let dir = axis.diag_dir();
    slope.supports_entrance(dir) && slope.supports_entrance(dir.reverse())
}

/// Change the ground under a station tile. Parts that can stay on a
/// foundation at the same height only pay for the foundation; everything
/// else is demolished first.
pub fn terraform(
    world: &mut World,
    services: &mut Services<'_>,
    ctx: &CommandContext,
    tile: TileIndex,
    new_slope: Slope,
    new_height: u8,
) -> CommandResult {
    let t = *world.map.get(tile);
    let Some(st) = t.station() else {
        return Err(CommandError::ThereIsNoStation);
    };

    let settings = &world.settings;
    if settings.build_on_slopes && settings.autoslope && t.flat_z() == new_height + new_slope.max_z() {
        let keeps = match st.part {
            StationPart::Rail { axis, .. } | StationPart::Waypoint { axis, .. } => !new_slope.is_steep() && slope_keeps_axis(new_slope, axis),
            StationPart::Airport { .. } => true,
            StationPart::RoadStop {
                layout: RoadStopLayout::DriveThrough(axis),
                ..
            } => slope_keeps_axis(new_slope, axis),
            StationPart::RoadStop {
                layout: RoadStopLayout::Bay(dir),
                ..
            } => new_slope.supports_entrance(dir),
            StationPart::Dock { .. } | StationPart::Oilrig => false,
        };
        if keeps {
            if ctx.exec() {
                let tile_mut = world.map.get_mut(tile);
                tile_mut.slope = new_slope;
                tile_mut.height = new_height;
            }
            return Ok(CommandCost::with_cost(ExpenseType::Construction, world.prices.build_foundation));
        }
    }
    clear_tile(world, services, ctx, tile)
}
