//! Rail stations and rail waypoints.
//!
//! A rail station is built as a rectangle of `numtracks` parallel platforms
//! of `plat_len` tiles. Tiles of the same station may be built over (that
//! is how platforms are rotated, lengthened or converted to another rail
//! type); plain single track along the platform axis is absorbed when the
//! existing rail type can run on the new one.

use super::join::{after_station_tile_set_change, build_station_part, delete_station_if_empty, find_joining_station, make_station_area_smaller, update_station_sign, JoinRequest};
use super::{check_ownership, CommandContext, CommandCost, CommandError, CommandResult, ExpenseType};
use crate::catchment::recompute_catchment;
use crate::landscape::{check_buildable_tile, clear_land, ensure_no_vehicle_on_ground};
use crate::map::{Axis, Map, Owner, RailTile, RailType, StationPart, StationTile, StationType, TileArea, TileIndex, TileKind, TrackBits};
use crate::naming::StationNaming;
use crate::reservation::{free_train_reservation, is_compatible_platform_tile, restore_train_reservation, set_rail_station_platform_reservation};
use crate::services::Services;
use crate::station::{Facilities, StationKind};
use crate::station_rect::RectMode;
use crate::state::{Money, StationId, VehicleId, World};

fn push_unique(affected: &mut Vec<VehicleId>, v: VehicleId) {
    if !affected.contains(&v) {
        affected.push(v);
    }
}

/// Take up the single piece of plain track on `tile`.
fn remove_single_rail(world: &mut World, services: &mut Services<'_>, ctx: &CommandContext, tile: TileIndex, rail: RailTile) -> CommandResult {
    let owner = world.map.get(tile).owner;
    if ctx.company != Owner::Water {
        check_ownership(owner, ctx.company)?;
    }
    ensure_no_vehicle_on_ground(&*services.vehicles, tile)?;
    if ctx.exec() {
        if rail.reserved.intersects(rail.tracks) {
            if let Some(v) = services.vehicles.train_for_reservation(tile) {
                services.vehicles.free_track_reservation(v);
            }
        }
        if let Some(infra) = world.infrastructure_mut(owner) {
            let pieces = infra.rail_mut(rail.rail_type);
            *pieces = pieces.saturating_sub(1);
        }
        let t = world.map.get_mut(tile);
        t.kind = TileKind::Clear;
        t.owner = Owner::None;
    }
    Ok(CommandCost::with_cost(ExpenseType::Construction, world.prices.clear_rail))
}

/// Check and clear one tile under a new rail station.
///
/// `est` collects the station whose tiles are being built over; tiles of a
/// second station are refused.
#[allow(clippy::too_many_arguments)]
pub fn check_flat_land_rail_station(
    world: &mut World,
    services: &mut Services<'_>,
    ctx: &CommandContext,
    tile: TileIndex,
    allowed_z: &mut Option<u8>,
    axis: Axis,
    rail_type: RailType,
    est: &mut StationId,
    affected: &mut Vec<VehicleId>,
) -> CommandResult {
    let invalid_dirs = [axis.diag_dir(), axis.diag_dir().reverse()];
    let mut cost = check_buildable_tile(world, &*services.vehicles, tile, &invalid_dirs, allowed_z, false)?;

    match world.map.get(tile).kind {
        TileKind::Station(st) => {
            if st.part.station_type() != StationType::Rail {
                return Err(crate::tile_procs::demolish_first_error(&st.part));
            }
            if !est.is_valid() {
                *est = st.station;
            } else if *est != st.station {
                return Err(CommandError::AdjoinsMoreThanOne);
            }
        }
        TileKind::Rail(rail) => {
            if rail.signals {
                return Err(CommandError::MustRemoveSignalsFirst);
            }
            if rail.rail_type.has_power_on(rail_type) && rail.tracks == axis.track() {
                if rail.reserved.intersects(rail.tracks) {
                    if let Some(v) = services.vehicles.train_for_reservation(tile) {
                        push_unique(affected, v);
                    }
                }
                cost.add(remove_single_rail(world, services, ctx, tile, rail)?);
                return Ok(cost);
            }
            cost.add(clear_land(world, services, ctx, tile)?);
        }
        _ => cost.add(clear_land(world, services, ctx, tile)?),
    }
    Ok(cost)
}

/// Cost of clearing and building every tile of `area`. Tiles that already
/// are station tiles along `axis` cost nothing; the platform length price is
/// charged once per platform.
#[allow(clippy::too_many_arguments)]
pub fn calculate_rail_station_cost(
    world: &mut World,
    services: &mut Services<'_>,
    ctx: &CommandContext,
    area: &TileArea,
    axis: Axis,
    rail_type: RailType,
    numtracks: u8,
    est: &mut StationId,
    affected: &mut Vec<VehicleId>,
) -> CommandResult {
    let mut cost = CommandCost::new(ExpenseType::Construction);
    let mut length_price_ready = true;
    let mut tracknum = 0u8;
    let mut allowed_z = None;

    for tile in area.iter() {
        let was_same_axis_platform = matches!(
            world.map.get(tile).station().map(|s| s.part),
            Some(StationPart::Rail { axis: a, .. }) if a == axis
        );
        let ret = check_flat_land_rail_station(world, services, ctx, tile, &mut allowed_z, axis, rail_type, est, affected)?;

        if tracknum == numtracks {
            length_price_ready = true;
            tracknum = 0;
        } else {
            tracknum += 1;
        }

        if !was_same_axis_platform {
            cost.add(ret);
            cost.add_cost(world.prices.build_station_rail);
            cost.add_cost(world.prices.rail_build_cost(rail_type));
            if length_price_ready {
                cost.add_cost(world.prices.build_station_rail_length);
                length_price_ready = false;
            }
        }
    }
    Ok(cost)
}

/// Union of the station's current train area with `area`, if it stays
/// within the spread limit.
fn expanded_train_area(current: &TileArea, area: &TileArea, spread: u16) -> Result<TileArea, CommandError> {
    if current.is_empty() {
        return Ok(*area);
    }
    let mut union = *current;
    union.add(area.tile);
    union.add(TileIndex::new(area.right(), area.bottom()));
    if union.w > spread || union.h > spread {
        return Err(CommandError::StationTooSpreadOut);
    }
    Ok(union)
}

/// Reserve whole platforms crossing the first row of a new build when any
/// of their tiles is reserved.
fn extend_platform_reservations(map: &mut Map, origin: TileIndex, axis: Axis, numtracks: u8) {
    let dir = axis.diag_dir();
    let starts = match axis {
        Axis::X => TileArea::new(origin, 1, u16::from(numtracks)),
        Axis::Y => TileArea::new(origin, u16::from(numtracks), 1),
    };
    for start in starts.iter() {
        let mut begin = start;
        while let Some(prev) = map.step(begin, dir.reverse()).filter(|p| is_compatible_platform_tile(map, *p, begin)) {
            begin = prev;
        }

        let mut reserved = false;
        let mut cur = Some(begin);
        while let Some(t) = cur {
            reserved |= matches!(map.get(t).station().map(|s| s.part), Some(StationPart::Rail { reserved: true, .. }));
            cur = map.step(t, dir).filter(|n| is_compatible_platform_tile(map, *n, t));
        }

        if reserved {
            set_rail_station_platform_reservation(map, begin, dir, true);
        }
    }
}

/// Build a rail station of `numtracks` platforms of `plat_len` tiles with
/// its north corner at `tile`.
#[allow(clippy::too_many_arguments)]
pub fn build_rail_station(
    world: &mut World,
    services: &mut Services<'_>,
    ctx: &CommandContext,
    tile: TileIndex,
    rail_type: RailType,
    axis: Axis,
    numtracks: u8,
    plat_len: u8,
    join: StationId,
    adjacent: bool,
) -> CommandResult {
    services.authority.allows_new_station(world, tile, ctx.company)?;

    if plat_len == 0 || numtracks == 0 {
        return Err(CommandError::Invalid);
    }
    let (w, h) = match axis {
        Axis::X => (u16::from(plat_len), u16::from(numtracks)),
        Axis::Y => (u16::from(numtracks), u16::from(plat_len)),
    };

    let join = JoinRequest::new(world, join, adjacent, StationKind::Station)?;

    let spread = world.settings.station_spread;
    if w > spread || h > spread {
        return Err(CommandError::Invalid);
    }
    let area = TileArea::new(tile, w, h);
    if !world.map.area_is_valid(&area) {
        return Err(CommandError::Invalid);
    }

    let mut est = StationId::INVALID;
    let mut affected = Vec::new();
    let cost = calculate_rail_station_cost(world, services, ctx, &area, axis, rail_type, numtracks, &mut est, &mut affected)?;

    let found = find_joining_station(
        world,
        ctx.company,
        StationKind::Station,
        est,
        &join,
        &area,
        &|_| true,
        CommandError::MustRemoveRailStationFirst,
    )?;
    let station = build_station_part(world, ctx, found, join.reuse, &area, StationKind::Station, StationNaming::Rail)?;

    let train_area = match station.and_then(|id| world.stations.get(id)) {
        Some(st) => expanded_train_area(&st.train_station, &area, spread)?,
        None => area,
    };

    if !ctx.exec() {
        return Ok(cost);
    }
    let id = station.ok_or(CommandError::Invalid)?;

    let owner = {
        let st = world.stations.get_mut(id).ok_or(CommandError::Invalid)?;
        st.train_station = train_area;
        st.add_facility(Facilities::TRAIN, train_area.tile);
        st.rect.before_add_rect(&area, RectMode::Try, spread)?;
        st.owner
    };

    for t in area.iter() {
        let old = *world.map.get(t);
        if let Some(StationPart::Rail { rail_type: old_rt, reserved, .. }) = old.station().map(|s| s.part) {
            if reserved {
                if let Some(v) = services.vehicles.train_for_reservation(t) {
                    push_unique(&mut affected, v);
                    free_train_reservation(&mut world.map, &mut *services.vehicles, v);
                }
            }
            if let Some(infra) = world.infrastructure_mut(old.owner) {
                let pieces = infra.rail_mut(old_rt);
                *pieces = pieces.saturating_sub(1);
                infra.station = infra.station.saturating_sub(1);
            }
        }

        let tile_mut = world.map.get_mut(t);
        tile_mut.kind = TileKind::Station(StationTile {
            station: id,
            part: StationPart::Rail {
                axis,
                rail_type,
                reserved: false,
            },
        });
        tile_mut.owner = owner;

        if let Some(infra) = world.infrastructure_mut(owner) {
            *infra.rail_mut(rail_type) += 1;
            infra.station += 1;
        }
    }

    for v in &affected {
        restore_train_reservation(&mut world.map, &mut *services.vehicles, *v);
    }
    extend_platform_reservations(&mut world.map, tile, axis, numtracks);

    log::debug!(
        "station {}: built {}x{} {:?} platforms at {}",
        id,
        numtracks,
        plat_len,
        rail_type,
        tile
    );
    after_station_tile_set_change(world, services.cargo, id, true);
    Ok(cost)
}

fn rail_part_of(map: &Map, tile: TileIndex, kind: StationKind) -> Option<(StationId, Axis, RailType, bool)> {
    match map.try_get(tile)?.station()? {
        StationTile {
            station,
            part: StationPart::Rail { axis, rail_type, reserved },
        } if kind == StationKind::Station => Some((*station, *axis, *rail_type, *reserved)),
        StationTile {
            station,
            part: StationPart::Waypoint { axis, rail_type, reserved },
        } if kind == StationKind::Waypoint => Some((*station, *axis, *rail_type, *reserved)),
        _ => None,
    }
}

/// Remove every rail tile of `kind` inside `area`, collecting the stations
/// that lost tiles in `affected`.
///
/// The first failing tile stops the sweep; tiles already handled still
/// count. Only when nothing was removed is the failure returned.
#[allow(clippy::too_many_arguments)]
fn remove_from_rail_base_station(
    world: &mut World,
    services: &mut Services<'_>,
    ctx: &CommandContext,
    area: &TileArea,
    kind: StationKind,
    removal_cost: Money,
    keep_rail: bool,
    affected: &mut Vec<StationId>,
) -> CommandResult {
    let mut quantity: Money = 0;
    let mut total = CommandCost::new(ExpenseType::Construction);
    let mut error = None;

    for tile in area.iter() {
        let Some((id, axis, rail_type, reserved)) = rail_part_of(&world.map, tile, kind) else {
            continue;
        };
        if let Err(e) = ensure_no_vehicle_on_ground(&*services.vehicles, tile) {
            error = Some(e);
            break;
        }
        let Some(owner) = world.stations.get(id).map(|st| st.owner) else {
            continue;
        };
        if ctx.company != Owner::Water {
            if let Err(e) = check_ownership(owner, ctx.company) {
                error = Some(e);
                break;
            }
        }

        quantity += 1;
        if keep_rail {
            total.add_cost(-world.prices.clear_rail);
        }
        if !ctx.exec() {
            continue;
        }

        let tile_owner = world.map.get(tile).owner;
        let train = if reserved { services.vehicles.train_for_reservation(tile) } else { None };
        if let Some(v) = train {
            free_train_reservation(&mut world.map, &mut *services.vehicles, v);
        }

        if let Some(infra) = world.infrastructure_mut(tile_owner) {
            if !keep_rail {
                let pieces = infra.rail_mut(rail_type);
                *pieces = pieces.saturating_sub(1);
            }
            infra.station = infra.station.saturating_sub(1);
        }

        let t = world.map.get_mut(tile);
        if keep_rail {
            t.kind = TileKind::Rail(RailTile {
                rail_type,
                tracks: axis.track(),
                reserved: TrackBits::NONE,
                signals: false,
            });
        } else {
            t.kind = TileKind::Clear;
            t.owner = Owner::None;
        }

        if let Some(st) = world.stations.get_mut(id) {
            st.rect.after_remove_tile(&world.map, id, tile);
        }
        if !affected.contains(&id) {
            affected.push(id);
        }
        if let Some(v) = train {
            restore_train_reservation(&mut world.map, &mut *services.vehicles, v);
        }
    }

    if quantity == 0 {
        return Err(error.unwrap_or(CommandError::ThereIsNoStation));
    }

    for &id in affected.iter() {
        let Some(current) = world.stations.get(id).map(|st| st.train_station) else {
            continue;
        };
        let shrunk = make_station_area_smaller(&world.map, current, |map, t| {
            rail_part_of(map, t, kind).is_some_and(|(s, ..)| s == id)
        });
        let emptied = match world.stations.get_mut(id) {
            Some(st) => {
                st.train_station = shrunk;
                if shrunk.is_empty() {
                    st.facilities.reset(Facilities::TRAIN);
                }
                shrunk.is_empty()
            }
            None => false,
        };
        update_station_sign(world, id);
        if emptied {
            log::debug!("station {} lost its last platform", id);
            delete_station_if_empty(world, id);
        }
    }

    total.add_cost(quantity * removal_cost);
    Ok(total)
}

/// Remove the rail station tiles between `start` and `end`.
pub fn remove_from_rail_station(
    world: &mut World,
    services: &mut Services<'_>,
    ctx: &CommandContext,
    start: TileIndex,
    end: TileIndex,
    keep_rail: bool,
) -> CommandResult {
    if !world.map.is_valid(start) || !world.map.is_valid(end) {
        return Err(CommandError::Invalid);
    }
    let area = TileArea::from_corners(start, end);
    let mut affected = Vec::new();
    let removal_cost = world.prices.clear_station_rail;
    let cost = remove_from_rail_base_station(world, services, ctx, &area, StationKind::Station, removal_cost, keep_rail, &mut affected)?;

    if ctx.exec() {
        for id in affected {
            recompute_catchment(world, id);
        }
    }
    Ok(cost)
}

/// Remove the waypoint tiles between `start` and `end`.
pub fn remove_from_rail_waypoint(
    world: &mut World,
    services: &mut Services<'_>,
    ctx: &CommandContext,
    start: TileIndex,
    end: TileIndex,
    keep_rail: bool,
) -> CommandResult {
    if !world.map.is_valid(start) || !world.map.is_valid(end) {
        return Err(CommandError::Invalid);
    }
    let area = TileArea::from_corners(start, end);
    let mut affected = Vec::new();
    let removal_cost = world.prices.clear_waypoint_rail;
    remove_from_rail_base_station(world, services, ctx, &area, StationKind::Waypoint, removal_cost, keep_rail, &mut affected)
}

/// Remove all rail tiles of the station or waypoint of `kind` owning `tile`.
fn remove_whole(
    world: &mut World,
    services: &mut Services<'_>,
    ctx: &CommandContext,
    tile: TileIndex,
    kind: StationKind,
) -> CommandResult {
    // Flooding takes platforms one tile at a time.
    if ctx.company == Owner::Water {
        return match kind {
            StationKind::Station => remove_from_rail_station(world, services, ctx, tile, tile, false),
            StationKind::Waypoint => remove_from_rail_waypoint(world, services, ctx, tile, tile, false),
        };
    }

    let (id, _, _, _) = rail_part_of(&world.map, tile, kind).ok_or(CommandError::ThereIsNoStation)?;
    let st = world.stations.get(id).ok_or(CommandError::ThereIsNoStation)?;
    check_ownership(st.owner, ctx.company)?;
    let area = st.train_station;
    debug_assert!(!area.is_empty());

    let removal_cost = match kind {
        StationKind::Station => world.prices.clear_station_rail,
        StationKind::Waypoint => world.prices.clear_waypoint_rail,
    };
    let mut cost = CommandCost::new(ExpenseType::Construction);
    for t in area.iter() {
        if !rail_part_of(&world.map, t, kind).is_some_and(|(s, ..)| s == id) {
            continue;
        }
        let mut affected = Vec::new();
        let single = TileArea::new(t, 1, 1);
        cost.add(remove_from_rail_base_station(world, services, ctx, &single, kind, removal_cost, false, &mut affected)?);
    }

    if ctx.exec() && kind == StationKind::Station {
        recompute_catchment(world, id);
    }
    Ok(cost)
}

/// Remove the whole rail part of the station at `tile`.
pub fn remove_rail_station(world: &mut World, services: &mut Services<'_>, ctx: &CommandContext, tile: TileIndex) -> CommandResult {
    remove_whole(world, services, ctx, tile, StationKind::Station)
}

/// Remove the whole waypoint at `tile`.
pub fn remove_rail_waypoint(world: &mut World, services: &mut Services<'_>, ctx: &CommandContext, tile: TileIndex) -> CommandResult {
    remove_whole(world, services, ctx, tile, StationKind::Waypoint)
}

/// Turn a piece of plain straight track into a waypoint.
#[allow(clippy::too_many_arguments)]
pub fn build_rail_waypoint(
    world: &mut World,
    services: &mut Services<'_>,
    ctx: &CommandContext,
    tile: TileIndex,
    axis: Axis,
    join: StationId,
    adjacent: bool,
) -> CommandResult {
    if !world.map.is_valid(tile) {
        return Err(CommandError::Invalid);
    }
    let join = JoinRequest::new(world, join, adjacent, StationKind::Waypoint)?;

    let t = *world.map.get(tile);
    let rail = match t.kind {
        TileKind::Station(StationTile {
            part: StationPart::Waypoint { axis: a, .. },
            ..
        }) if a == axis => return Err(CommandError::AlreadyBuilt),
        TileKind::Rail(rail) if rail.tracks == axis.track() && !rail.signals => rail,
        _ => return Err(CommandError::NeedsPlainRail),
    };
    check_ownership(t.owner, ctx.company)?;

    let invalid_dirs = [axis.diag_dir(), axis.diag_dir().reverse()];
    let mut allowed_z = None;
    let mut cost = check_buildable_tile(world, &*services.vehicles, tile, &invalid_dirs, &mut allowed_z, false)?;
    cost.add_cost(world.prices.build_waypoint_rail);

    let area = TileArea::new(tile, 1, 1);
    let found = find_joining_station(
        world,
        ctx.company,
        StationKind::Waypoint,
        StationId::INVALID,
        &join,
        &area,
        &|_| true,
        CommandError::MustDemolishWaypointFirst,
    )?;
    let station = build_station_part(world, ctx, found, join.reuse, &area, StationKind::Waypoint, StationNaming::Rail)?;

    let spread = world.settings.station_spread;
    let train_area = match station.and_then(|id| world.stations.get(id)) {
        Some(st) => expanded_train_area(&st.train_station, &area, spread)?,
        None => area,
    };

    if !ctx.exec() {
        return Ok(cost);
    }
    let id = station.ok_or(CommandError::Invalid)?;

    let train = if rail.reserved.intersects(rail.tracks) {
        services.vehicles.train_for_reservation(tile)
    } else {
        None
    };
    if let Some(v) = train {
        services.vehicles.free_track_reservation(v);
    }

    let owner = {
        let st = world.stations.get_mut(id).ok_or(CommandError::Invalid)?;
        st.train_station = train_area;
        st.facilities.set(Facilities::WAYPOINT);
        st.add_facility(Facilities::TRAIN, tile);
        st.rect.before_add_rect(&area, RectMode::Try, spread)?;
        st.owner
    };
    let tile_mut = world.map.get_mut(tile);
    tile_mut.kind = TileKind::Station(StationTile {
        station: id,
        part: StationPart::Waypoint {
            axis,
            rail_type: rail.rail_type,
            reserved: train.is_some(),
        },
    });
    tile_mut.owner = owner;
    if let Some(infra) = world.infrastructure_mut(owner) {
        infra.station += 1;
    }
    if let Some(v) = train {
        restore_train_reservation(&mut world.map, &mut *services.vehicles, v);
    }

    after_station_tile_set_change(world, services.cargo, id, true);
    Ok(cost)
}

#[cfg(test)]
#[path = "rail_tests.rs"]
mod tests;
