//! Docks and oil rigs.
//!
//! A dock covers two tiles: an inclined land tile and the flat water tile
//! it faces. Ships dock on the water tiles around the water half, which the
//! station keeps as its docking area. Oil rigs are neutral stations owned by
//! their industry; they are placed and removed by the industry, not by a
//! company command.

use super::join::{after_station_tile_set_change, build_station_part, find_joining_station, make_station_area_smaller, JoinRequest};
use super::{check_ownership, CommandContext, CommandCost, CommandError, CommandResult, ExpenseType};
use crate::airport::{AirportType, Rotation};
use crate::catchment::{recompute_catchment, update_station_acceptance};
use crate::landscape::{clear_land, ensure_no_vehicle_on_ground};
use crate::map::{DiagDirection, Map, Owner, StationPart, StationTile, TileArea, TileIndex, TileKind, WaterClass};
use crate::naming::{generate_station_name, StationNaming};
use crate::services::{CargoSources, Services, VehicleTracker};
use crate::station::{Facilities, Station, StationKind};
use crate::station_rect::RectMode;
use crate::state::{StationId, World};

fn is_dock_of(map: &Map, tile: TileIndex, id: StationId) -> bool {
    matches!(
        map.try_get(tile).and_then(|t| t.station()),
        Some(StationTile { station, part: StationPart::Dock { .. } }) if *station == id
    )
}

/// Recompute the water tiles ships can dock at.
pub fn update_station_docking_tiles(world: &mut World, id: StationId) {
    let Some(st) = world.stations.get(id) else {
        return;
    };
    let mut docking = TileArea::EMPTY;
    for t in st.ship_station.iter() {
        let serves_ships = match world.map.get(t).station() {
            Some(StationTile {
                station,
                part: StationPart::Dock { land: false, .. } | StationPart::Oilrig,
            }) => *station == id,
            _ => false,
        };
        if !serves_ships {
            continue;
        }
        for dir in DiagDirection::ALL {
            if let Some(n) = world.map.step(t, dir) {
                let tile = world.map.get(n);
                if tile.is_water() && tile.slope.is_flat() {
                    docking.add(n);
                }
            }
        }
    }
    if let Some(st) = world.stations.get_mut(id) {
        st.docking_station = docking;
    }
}

pub fn build_dock(
    world: &mut World,
    services: &mut Services<'_>,
    ctx: &CommandContext,
    tile: TileIndex,
    join: StationId,
    adjacent: bool,
) -> CommandResult {
    let join = JoinRequest::new(world, join, adjacent, StationKind::Station)?;
    if !world.map.is_valid(tile) {
        return Err(CommandError::Invalid);
    }

    let land = *world.map.get(tile);
    let direction = land
        .slope
        .inclined_direction()
        .ok_or(CommandError::SiteUnsuitable)?
        .reverse();
    if land.is_water() {
        return Err(CommandError::SiteUnsuitable);
    }
    services.authority.allows_new_station(world, tile, ctx.company)?;
    if land.bridge_above {
        return Err(CommandError::MustDemolishBridgeFirst);
    }

    let mut cost = CommandCost::with_cost(ExpenseType::Construction, world.prices.build_station_dock);
    cost.add(clear_land(world, services, ctx, tile)?);

    let water_tile = world.map.step(tile, direction).ok_or(CommandError::SiteUnsuitable)?;
    let water = *world.map.get(water_tile);
    let TileKind::Water(water_class) = water.kind else {
        return Err(CommandError::SiteUnsuitable);
    };
    if !water.slope.is_flat() {
        return Err(CommandError::SiteUnsuitable);
    }
    if water.bridge_above {
        return Err(CommandError::MustDemolishBridgeFirst);
    }
    ensure_no_vehicle_on_ground(&*services.vehicles, water_tile)?;
    if water_class == WaterClass::Canal && water.owner.company().is_some() {
        check_ownership(water.owner, ctx.company)?;
    }

    let beyond = world.map.step(water_tile, direction).ok_or(CommandError::SiteUnsuitable)?;
    let beyond = world.map.get(beyond);
    if !matches!(beyond.kind, TileKind::Water(_)) || !beyond.slope.is_flat() {
        return Err(CommandError::SiteUnsuitable);
    }

    let area = TileArea::from_corners(tile, water_tile);
    let found = find_joining_station(
        world,
        ctx.company,
        StationKind::Station,
        StationId::INVALID,
        &join,
        &area,
        &|_| true,
        CommandError::MustDemolishDockFirst,
    )?;
    let station = build_station_part(world, ctx, found, join.reuse, &area, StationKind::Station, StationNaming::Dock)?;

    if !ctx.exec() {
        return Ok(cost);
    }
    let id = station.ok_or(CommandError::Invalid)?;
    let spread = world.settings.station_spread;

    let owner = {
        let st = world.stations.get_mut(id).ok_or(CommandError::Invalid)?;
        st.ship_station.add(tile);
        st.ship_station.add(water_tile);
        st.add_facility(Facilities::DOCK, tile);
        st.rect.before_add_rect(&area, RectMode::Try, spread)?;
        st.owner
    };
    if let Some(infra) = world.infrastructure_mut(owner) {
        infra.station += 2;
    }
    for (t, is_land) in [(tile, true), (water_tile, false)] {
        let tile_mut = world.map.get_mut(t);
        tile_mut.kind = TileKind::Station(StationTile {
            station: id,
            part: StationPart::Dock {
                direction,
                land: is_land,
                water: water_class,
            },
        });
        tile_mut.owner = owner;
    }

    update_station_docking_tiles(world, id);
    log::debug!("station {}: dock at {} facing {:?}", id, tile, direction);
    after_station_tile_set_change(world, services.cargo, id, true);
    Ok(cost)
}

/// The land half of the dock covering `tile`.
fn dock_land_part(map: &Map, tile: TileIndex) -> Option<(TileIndex, DiagDirection, WaterClass)> {
    match map.try_get(tile)?.station()?.part {
        StationPart::Dock {
            direction,
            land: true,
            water,
        } => return Some((tile, direction, water)),
        StationPart::Dock { land: false, .. } => {}
        _ => return None,
    }
    DiagDirection::ALL.into_iter().find_map(|dir| {
        let n = map.step(tile, dir)?;
        match map.get(n).station()?.part {
            StationPart::Dock {
                direction,
                land: true,
                water,
            } if map.step(n, direction) == Some(tile) => Some((n, direction, water)),
            _ => None,
        }
    })
}

pub fn remove_dock(world: &mut World, services: &mut Services<'_>, ctx: &CommandContext, tile: TileIndex) -> CommandResult {
    let id = world
        .map
        .try_get(tile)
        .and_then(|t| t.station_id())
        .ok_or(CommandError::ThereIsNoStation)?;
    let owner = world.stations.get(id).map(|st| st.owner).ok_or(CommandError::ThereIsNoStation)?;
    check_ownership(owner, ctx.company)?;

    let (land_tile, direction, water_class) = dock_land_part(&world.map, tile).ok_or(CommandError::Invalid)?;
    let water_tile = world.map.step(land_tile, direction).ok_or(CommandError::Invalid)?;
    ensure_no_vehicle_on_ground(&*services.vehicles, land_tile)?;
    ensure_no_vehicle_on_ground(&*services.vehicles, water_tile)?;

    let cost = CommandCost::with_cost(ExpenseType::Construction, world.prices.clear_station_dock);
    if !ctx.exec() {
        return Ok(cost);
    }

    {
        let t = world.map.get_mut(land_tile);
        t.kind = TileKind::Clear;
        t.owner = Owner::None;
    }
    {
        let t = world.map.get_mut(water_tile);
        t.kind = TileKind::Water(water_class);
        t.owner = if water_class == WaterClass::Canal { owner } else { Owner::Water };
    }

    let ship_station = match world.stations.get_mut(id) {
        Some(st) => {
            st.rect.after_remove_tile(&world.map, id, land_tile);
            st.rect.after_remove_tile(&world.map, id, water_tile);
            st.ship_station
        }
        None => return Ok(cost),
    };
    let shrunk = make_station_area_smaller(&world.map, ship_station, |map, t| is_dock_of(map, t, id));
    if let Some(st) = world.stations.get_mut(id) {
        st.ship_station = shrunk;
        if shrunk.is_empty() {
            st.docking_station = TileArea::EMPTY;
            st.facilities.reset(Facilities::DOCK);
        }
    }
    if let Some(infra) = world.infrastructure_mut(owner) {
        infra.station = infra.station.saturating_sub(2);
    }

    log::debug!("station {}: dock at {} removed", id, land_tile);
    after_station_tile_set_change(world, services.cargo, id, false);
    update_station_docking_tiles(world, id);
    Ok(cost)
}

/// Turn the industry tile at `tile` into an oil rig station. Returns `None`
/// when the station pool is full; the rig then stays a plain industry.
pub fn build_oil_rig(world: &mut World, cargo: &dyn CargoSources, tile: TileIndex) -> Option<StationId> {
    let TileKind::Industry(industry) = world.map.get(tile).kind else {
        debug_assert!(false, "oil rig at {tile} is not an industry tile");
        return None;
    };
    if !world.stations.can_allocate(world.settings.max_stations) {
        log::warn!("can't allocate station for oil rig at {}, keeping the rig only", tile);
        return None;
    }
    let town = world.closest_town(tile)?;
    let date = world.date;

    let id = world
        .stations
        .allocate(|id| Station::new(id, StationKind::Station, Owner::None, town, tile, date));
    let name = world
        .stations
        .get(id)
        .map(|st| generate_station_name(world, st, tile, StationNaming::Oilrig));
    if let Some(st) = world.stations.get_mut(id) {
        if let Some((string_id, indtype)) = name {
            st.string_id = string_id;
            st.indtype = indtype;
        }
        st.industry = Some(industry);
        st.airport.airport_type = Some(AirportType::Oilrig);
        st.airport.rotation = Rotation::N;
        st.airport.area = TileArea::new(tile, 1, 1);
        st.ship_station = TileArea::new(tile, 1, 1);
        st.facilities = Facilities(Facilities::AIRPORT | Facilities::DOCK);
        // Forced: the rig may sit anywhere.
        let _ = st.rect.before_add_tile(tile, RectMode::Force, u16::MAX);
    }
    if let Some(ind) = world.industries.get_mut(&industry) {
        ind.neutral_station = Some(id);
    }
    let t = world.map.get_mut(tile);
    t.kind = TileKind::Station(StationTile {
        station: id,
        part: StationPart::Oilrig,
    });
    t.owner = Owner::None;

    update_station_docking_tiles(world, id);
    super::join::announce_new_station(world, id);
    for other in world.stations.ids() {
        recompute_catchment(world, other);
    }
    update_station_acceptance(world, cargo, id, false);
    Some(id)
}

/// Remove the oil rig station at `tile` together with its station.
pub fn delete_oil_rig(world: &mut World, vehicles: &mut dyn VehicleTracker, tile: TileIndex) {
    let Some(StationTile {
        station: id,
        part: StationPart::Oilrig,
    }) = world.map.get(tile).station().copied()
    else {
        return;
    };
    let t = world.map.get_mut(tile);
    t.kind = TileKind::Water(WaterClass::Sea);
    t.owner = Owner::None;

    if let Some(industry) = world.stations.get(id).and_then(|st| st.industry) {
        if let Some(ind) = world.industries.get_mut(&industry) {
            if ind.neutral_station == Some(id) {
                ind.neutral_station = None;
            }
        }
    }
    crate::systems::deletion::delete_station(world, vehicles, id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::NEW_STATION;
    use crate::input::Command;
    use crate::map::Slope;
    use crate::state::{CompanyId, IndustryId};
    use crate::testing::{Harness, WorldBuilder};

    const ME: Owner = Owner::Company(CompanyId(0));

    /// Coast running north-south: land at x < 20, sea from x = 21.
    fn coast() -> Harness {
        let world = WorldBuilder::new()
            .with_water(TileArea::new(TileIndex::new(21, 0), 20, 64), WaterClass::Sea)
            .with_slope(TileIndex::new(20, 10), Slope::NE, 1)
            .build();
        Harness::from_world(world)
    }

    #[test]
    fn test_build_dock_on_coast() {
        let mut h = coast();
        let tile = TileIndex::new(20, 10);
        h.run(ME, &Command::BuildDock { tile, join: NEW_STATION, adjacent: false }).unwrap();

        let id = h.world.map.get(tile).station_id().unwrap();
        let st = h.world.stations.get(id).unwrap();
        assert!(st.facilities.has(Facilities::DOCK));
        assert_eq!(st.ship_station, TileArea::new(tile, 2, 1));
        assert!(st.docking_station.contains(TileIndex::new(22, 10)));
        assert!(!st.docking_station.contains(tile));
        assert_eq!(h.world.infrastructure_mut(ME).unwrap().station, 2);

        h.run(ME, &Command::RemoveDock { tile: TileIndex::new(21, 10) }).unwrap();
        assert_eq!(h.world.map.get(tile).kind, TileKind::Clear);
        assert_eq!(h.world.map.get(TileIndex::new(21, 10)).kind, TileKind::Water(WaterClass::Sea));
        let st = h.world.stations.get(id).unwrap();
        assert!(!st.facilities.has(Facilities::DOCK));
        assert!(st.docking_station.is_empty());
    }

    #[test]
    fn test_dock_needs_slope_facing_water() {
        let mut h = coast();
        let flat = TileIndex::new(19, 12);
        assert_eq!(
            h.run(ME, &Command::BuildDock { tile: flat, join: NEW_STATION, adjacent: false }),
            Err(CommandError::SiteUnsuitable)
        );
        // Slope facing inland.
        h.world.map.get_mut(flat).slope = Slope::SW;
        assert_eq!(
            h.run(ME, &Command::BuildDock { tile: flat, join: NEW_STATION, adjacent: false }),
            Err(CommandError::SiteUnsuitable)
        );
    }

    #[test]
    fn test_oil_rig_is_neutral_station() {
        let rig = TileIndex::new(30, 30);
        let mut world = WorldBuilder::new()
            .with_water(TileArea::new(TileIndex::new(25, 25), 10, 10), WaterClass::Sea)
            .with_industry(IndustryId(3), TileArea::new(rig, 1, 1), Vec::new())
            .build();
        let cargo = crate::testing::TableCargoSources::default();
        let id = build_oil_rig(&mut world, &cargo, rig).unwrap();

        let st = world.stations.get(id).unwrap();
        assert_eq!(st.owner, Owner::None);
        assert!(st.facilities.has(Facilities::AIRPORT) && st.facilities.has(Facilities::DOCK));
        assert_eq!(st.industry, Some(IndustryId(3)));
        assert!(!st.docking_station.is_empty());
        assert_eq!(world.industries[&IndustryId(3)].neutral_station, Some(id));

        let mut vehicles = crate::services::NoVehicles;
        delete_oil_rig(&mut world, &mut vehicles, rig);
        assert!(world.stations.get(id).is_none());
        assert_eq!(world.map.get(rig).kind, TileKind::Water(WaterClass::Sea));
        assert_eq!(world.industries[&IndustryId(3)].neutral_station, None);
    }
}
