//! Bus and truck stops.
//!
//! Bay stops are entered from one side and replace whatever stood on the
//! tile. Drive-through stops are laid over straight road (or bare land) and
//! keep the road and tram owners of the tile, so removing the stop can
//! restore the road underneath.

use super::join::{after_station_tile_set_change, build_station_part, find_joining_station, JoinRequest};
use super::{check_ownership, CommandContext, CommandCost, CommandError, CommandResult, ExpenseType};
use crate::landscape::{check_buildable_tile, clear_land, ensure_no_vehicle_on_ground};
use crate::map::{Axis, DiagDirection, Owner, RoadBits, RoadPiece, RoadStopLayout, RoadStopType, RoadTile, RoadType, StationPart, StationTile, StationType, TileArea, TileIndex, TileKind};
use crate::naming::StationNaming;
use crate::road_stop::RoadStop;
use crate::services::Services;
use crate::station::{Facilities, StationKind};
use crate::station_rect::RectMode;
use crate::state::{StationId, World};

/// Road pieces a stop tile counts for in company infrastructure.
pub const ROAD_STOP_TRACKBIT_FACTOR: u32 = 2;

/// Arguments of [`build_road_stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoadStopParams {
    pub tile: TileIndex,
    pub width: u8,
    pub length: u8,
    pub stop_type: RoadStopType,
    pub drive_through: bool,
    /// Entrance of a bay stop; its axis is the axis of a drive-through stop.
    pub direction: DiagDirection,
    pub road_type: RoadType,
    pub join: StationId,
    pub adjacent: bool,
}

fn station_type_of(stop_type: RoadStopType) -> StationType {
    match stop_type {
        RoadStopType::Bus => StationType::Bus,
        RoadStopType::Truck => StationType::Truck,
    }
}

fn facility_of(stop_type: RoadStopType) -> u8 {
    match stop_type {
        RoadStopType::Bus => Facilities::BUS_STOP,
        RoadStopType::Truck => Facilities::TRUCK_STOP,
    }
}

fn add_road_infrastructure(world: &mut World, piece: Option<RoadPiece>, delta: i64) {
    let Some(piece) = piece else { return };
    if let Some(infra) = world.infrastructure_mut(piece.owner) {
        let count = infra.road_mut(piece.road_type);
        *count = (i64::from(*count) + delta).max(0) as u32;
    }
}

/// Check and clear one tile under a new road stop.
#[allow(clippy::too_many_arguments)]
pub fn check_flat_land_road_stop(
    world: &mut World,
    services: &mut Services<'_>,
    ctx: &CommandContext,
    tile: TileIndex,
    allowed_z: &mut Option<u8>,
    invalid_dirs: &[DiagDirection],
    drive_through: bool,
    station_type: StationType,
    axis: Axis,
    est: &mut StationId,
    road_type: RoadType,
) -> CommandResult {
    let mut cost = check_buildable_tile(world, &*services.vehicles, tile, invalid_dirs, allowed_z, !drive_through)?;
    let t = *world.map.get(tile);

    if let TileKind::Station(st) = t.kind {
        let StationPart::RoadStop { layout, .. } = st.part else {
            return Err(crate::tile_procs::demolish_first_error(&st.part));
        };
        let existing_axis = match layout {
            RoadStopLayout::DriveThrough(a) => Some(a),
            RoadStopLayout::Bay(_) => None,
        };
        if st.part.station_type() != station_type || drive_through != existing_axis.is_some() {
            return Err(crate::tile_procs::demolish_first_error(&st.part));
        }
        if drive_through && existing_axis != Some(axis) {
            return Err(CommandError::DriveThroughDirection);
        }
        if !est.is_valid() {
            *est = st.station;
        } else if *est != st.station {
            return Err(CommandError::AdjoinsMoreThanOne);
        }
        return Ok(cost);
    }

    let road = match t.kind {
        TileKind::Road(road) => Some(road),
        _ => None,
    };
    let Some(road) = road.filter(|_| drive_through) else {
        cost.add(clear_land(world, services, ctx, tile)?);
        cost.add_cost(world.prices.road_build_cost(road_type) * 2);
        return Ok(cost);
    };

    if road.bits.intersects(axis.other().road_bits()) {
        return Err(match road.bits.count() {
            1 => CommandError::DriveThroughDirection,
            2 if road.bits == RoadBits::X || road.bits == RoadBits::Y => CommandError::DriveThroughDirection,
            2 => CommandError::DriveThroughCorner,
            _ => CommandError::DriveThroughJunction,
        });
    }

    let pieces = i64::from(road.bits.count());
    let settings = &world.settings;
    match road.road {
        Some(piece) => {
            match piece.owner {
                Owner::Town if !settings.road_stop_on_town_road => return Err(CommandError::DriveThroughOnTownRoad),
                Owner::Town | Owner::None => {}
                owner if !settings.road_stop_on_competitor_road => check_ownership(owner, ctx.company)?,
                _ => {}
            }
            cost.add_cost(world.prices.road_build_cost(RoadType::Road) * (2 - pieces));
        }
        None if road_type == RoadType::Road => cost.add_cost(world.prices.road_build_cost(road_type) * 2),
        None => {}
    }
    match road.tram {
        Some(piece) => {
            // Trams reverse at the end of a line; keep competitors' line ends.
            if piece.owner.company().is_some() && (!settings.road_stop_on_competitor_road || road.bits.count() == 1) {
                check_ownership(piece.owner, ctx.company)?;
            }
            cost.add_cost(world.prices.road_build_cost(RoadType::Tram) * (2 - pieces));
        }
        None if road_type == RoadType::Tram => cost.add_cost(world.prices.road_build_cost(road_type) * 2),
        None => {}
    }
    Ok(cost)
}

/// Cost of every tile of `area`. Tiles that already hold a road stop are
/// free.
#[allow(clippy::too_many_arguments)]
pub fn calculate_road_stop_cost(
    world: &mut World,
    services: &mut Services<'_>,
    ctx: &CommandContext,
    area: &TileArea,
    drive_through: bool,
    station_type: StationType,
    direction: DiagDirection,
    est: &mut StationId,
    road_type: RoadType,
    unit_cost: i64,
) -> CommandResult {
    let axis = direction.axis();
    let invalid_dirs: Vec<DiagDirection> = if drive_through {
        vec![axis.diag_dir(), axis.diag_dir().reverse()]
    } else {
        vec![direction]
    };

    let mut allowed_z = None;
    let mut cost = CommandCost::new(ExpenseType::Construction);
    for tile in area.iter() {
        let preexisting = is_road_stop_tile(world, tile);
        let ret = check_flat_land_road_stop(
            world,
            services,
            ctx,
            tile,
            &mut allowed_z,
            &invalid_dirs,
            drive_through,
            station_type,
            axis,
            est,
            road_type,
        )?;
        if !preexisting {
            cost.add(ret);
            cost.add_cost(unit_cost);
        }
    }
    Ok(cost)
}

fn is_road_stop_tile(world: &World, tile: TileIndex) -> bool {
    matches!(
        world.map.get(tile).station().map(|s| s.part),
        Some(StationPart::RoadStop { .. })
    )
}

fn total_road_stops(world: &World) -> usize {
    world
        .stations
        .iter()
        .map(|st| st.bus_stops.len() + st.truck_stops.len())
        .sum()
}

#[tracing::instrument(skip_all, name = "build_road_stop")]
pub fn build_road_stop(world: &mut World, services: &mut Services<'_>, ctx: &CommandContext, params: RoadStopParams) -> CommandResult {
    let RoadStopParams {
        tile,
        width,
        length,
        stop_type,
        drive_through,
        direction,
        road_type,
        join,
        adjacent,
    } = params;

    let spread = world.settings.station_spread;
    if u16::from(width) > spread || u16::from(length) > spread {
        return Err(CommandError::StationTooSpreadOut);
    }
    if width == 0 || length == 0 {
        return Err(CommandError::Invalid);
    }
    let area = TileArea::new(tile, u16::from(width), u16::from(length));
    if !world.map.area_is_valid(&area) {
        return Err(CommandError::Invalid);
    }

    let join = JoinRequest::new(world, join, adjacent, StationKind::Station)?;

    if !drive_through && road_type == RoadType::Tram {
        return Err(CommandError::Invalid);
    }
    let axis = direction.axis();
    services.authority.allows_new_station(world, tile, ctx.company)?;

    let unit_cost = match stop_type {
        RoadStopType::Truck => world.prices.build_station_truck,
        RoadStopType::Bus => world.prices.build_station_bus,
    };
    let station_type = station_type_of(stop_type);
    let mut est = StationId::INVALID;
    let cost = calculate_road_stop_cost(world, services, ctx, &area, drive_through, station_type, direction, &mut est, road_type, unit_cost)?;

    let found = find_joining_station(
        world,
        ctx.company,
        StationKind::Station,
        est,
        &join,
        &area,
        &|_| true,
        CommandError::MustRemoveRoadStopFirst,
    )?;

    let new_stops = area.iter().filter(|t| !is_road_stop_tile(world, *t)).count();
    if total_road_stops(world) + new_stops > world.settings.max_road_stops {
        return Err(match stop_type {
            RoadStopType::Truck => CommandError::TooManyTruckStops,
            RoadStopType::Bus => CommandError::TooManyBusStops,
        });
    }

    let station = build_station_part(world, ctx, found, join.reuse, &area, StationKind::Station, StationNaming::Road)?;

    if !ctx.exec() {
        return Ok(cost);
    }
    let id = station.ok_or(CommandError::Invalid)?;
    let facility = facility_of(stop_type);

    for t in area.iter() {
        let existing = *world.map.get(t);
        let (mut road, mut tram) = match existing.kind {
            TileKind::Road(r) => (r.road, r.tram),
            TileKind::Station(StationTile {
                part: StationPart::RoadStop { road, tram, .. },
                ..
            }) => (road, tram),
            _ => (None, None),
        };

        if is_road_stop_tile(world, t) {
            remove_road_stop_tile(world, services, ctx, t, false)?;
        }

        let owner = {
            let st = world.stations.get_mut(id).ok_or(CommandError::Invalid)?;
            st.road_stops_mut(stop_type).push(RoadStop::new(t, drive_through));
            st.road_stop_area_mut(stop_type).add(t);
            st.add_facility(facility, t);
            st.rect.before_add_tile(t, RectMode::Try, spread)?;
            st.owner
        };

        let layout = if drive_through {
            if let TileKind::Road(r) = existing.kind {
                let bits = i64::from(r.bits.count());
                add_road_infrastructure(world, r.road, -bits);
                add_road_infrastructure(world, r.tram, -bits);
            }
            RoadStopLayout::DriveThrough(axis)
        } else {
            RoadStopLayout::Bay(direction)
        };
        let new_piece = RoadPiece {
            road_type,
            owner: ctx.company,
        };
        match road_type {
            RoadType::Road => road = road.or(Some(new_piece)),
            RoadType::Tram => tram = tram.or(Some(new_piece)),
        }

        let tile_mut = world.map.get_mut(t);
        tile_mut.kind = TileKind::Station(StationTile {
            station: id,
            part: StationPart::RoadStop {
                stop_type,
                layout,
                road,
                tram,
            },
        });
        tile_mut.owner = owner;

        add_road_infrastructure(world, road, i64::from(ROAD_STOP_TRACKBIT_FACTOR));
        add_road_infrastructure(world, tram, i64::from(ROAD_STOP_TRACKBIT_FACTOR));
        if let Some(infra) = world.infrastructure_mut(owner) {
            infra.station += 1;
        }
    }

    log::debug!("station {}: {} {:?} stop(s) at {}", id, area.iter().count(), stop_type, tile);
    after_station_tile_set_change(world, services.cargo, id, true);
    Ok(cost)
}

/// Remove the road stop on `tile`, leaving the tile clear. `finalize`
/// recomputes catchment and acceptance; it is off when the stop is about
/// to be rebuilt.
pub(crate) fn remove_road_stop_tile(
    world: &mut World,
    services: &mut Services<'_>,
    ctx: &CommandContext,
    tile: TileIndex,
    finalize: bool,
) -> CommandResult {
    let Some(StationTile {
        station: id,
        part: StationPart::RoadStop {
            stop_type,
            layout,
            road,
            tram,
        },
    }) = world.map.get(tile).station().copied()
    else {
        return Err(CommandError::ThereIsNoStation);
    };
    let owner = world.stations.get(id).map(|st| st.owner).ok_or(CommandError::ThereIsNoStation)?;

    if ctx.company != Owner::Water {
        check_ownership(owner, ctx.company)?;
    }
    let drive_through = matches!(layout, RoadStopLayout::DriveThrough(_));
    if !(drive_through && ctx.flags.bankrupt()) {
        ensure_no_vehicle_on_ground(&*services.vehicles, tile)?;
    }

    let cost = match stop_type {
        RoadStopType::Truck => world.prices.clear_station_truck,
        RoadStopType::Bus => world.prices.clear_station_bus,
    };
    if !ctx.exec() {
        return Ok(CommandCost::with_cost(ExpenseType::Construction, cost));
    }

    if let Some(st) = world.stations.get_mut(id) {
        let stops = st.road_stops_mut(stop_type);
        stops.retain(|rs| rs.xy != tile);
        if stops.is_empty() {
            st.facilities.reset(facility_of(stop_type));
        }
    }
    add_road_infrastructure(world, road, -i64::from(ROAD_STOP_TRACKBIT_FACTOR));
    add_road_infrastructure(world, tram, -i64::from(ROAD_STOP_TRACKBIT_FACTOR));
    if let Some(infra) = world.infrastructure_mut(owner) {
        infra.station = infra.station.saturating_sub(1);
    }

    let t = world.map.get_mut(tile);
    t.kind = TileKind::Clear;
    t.owner = Owner::None;

    if let Some(st) = world.stations.get_mut(id) {
        st.rect.after_remove_tile(&world.map, id, tile);
    }
    if finalize {
        after_station_tile_set_change(world, services.cargo, id, false);
    }
    if let Some(st) = world.stations.get_mut(id) {
        let mut area = TileArea::EMPTY;
        for rs in st.road_stops(stop_type) {
            area.add(rs.xy);
        }
        *st.road_stop_area_mut(stop_type) = area;
    }
    Ok(CommandCost::with_cost(ExpenseType::Construction, cost))
}

/// Remove the stops of `stop_type` in `area`, restoring the road under
/// drive-through stops. Succeeds if any stop was removed.
fn remove_generic_road_stop(
    world: &mut World,
    services: &mut Services<'_>,
    ctx: &CommandContext,
    area: &TileArea,
    stop_type: RoadStopType,
    remove_road: bool,
) -> CommandResult {
    let mut cost = CommandCost::new(ExpenseType::Construction);
    let mut last_error = CommandError::ThereIsNoStation;
    let mut had_success = false;

    for tile in area.iter() {
        let Some(StationPart::RoadStop {
            stop_type: found,
            layout,
            road,
            tram,
        }) = world.map.get(tile).station().map(|s| s.part)
        else {
            continue;
        };
        if found != stop_type {
            continue;
        }

        let (bits, keep) = match layout {
            RoadStopLayout::DriveThrough(axis) => {
                let keep = |piece: Option<RoadPiece>| piece.filter(|p| !(remove_road && p.owner == ctx.company));
                (axis.road_bits(), (keep(road), keep(tram)))
            }
            RoadStopLayout::Bay(_) => (RoadBits::NONE, (None, None)),
        };

        match remove_road_stop_tile(world, services, ctx, tile, true) {
            Ok(ret) => {
                cost.add(ret);
                had_success = true;
            }
            Err(e) => {
                last_error = e;
                continue;
            }
        }

        let (road, tram) = keep;
        if ctx.exec() && (road.is_some() || tram.is_some()) {
            let town = world.closest_town(tile);
            let t = world.map.get_mut(tile);
            t.kind = TileKind::Road(RoadTile { bits, road, tram, town });
            t.owner = road.or(tram).map_or(Owner::None, |p| p.owner);
            let count = i64::from(bits.count());
            add_road_infrastructure(world, road, count);
            add_road_infrastructure(world, tram, count);
        }
    }

    if had_success {
        Ok(cost)
    } else {
        Err(last_error)
    }
}

/// Remove the `stop_type` stops in a `width` x `height` area at `tile`.
#[allow(clippy::too_many_arguments)]
pub fn remove_road_stop(
    world: &mut World,
    services: &mut Services<'_>,
    ctx: &CommandContext,
    tile: TileIndex,
    width: u8,
    height: u8,
    stop_type: RoadStopType,
    remove_road: bool,
) -> CommandResult {
    if width == 0 || height == 0 {
        return Err(CommandError::Invalid);
    }
    let area = TileArea::new(tile, u16::from(width), u16::from(height));
    if !world.map.area_is_valid(&area) {
        return Err(CommandError::Invalid);
    }
    // A bankrupt company's vehicles may still use the road.
    if remove_road && ctx.flags.bankrupt() {
        return Err(CommandError::Invalid);
    }
    remove_generic_road_stop(world, services, ctx, &area, stop_type, remove_road)
}

#[cfg(test)]
#[path = "road_tests.rs"]
mod tests;
