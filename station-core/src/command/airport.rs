//! Airports and heliports.

use super::join::{after_station_tile_set_change, build_station_part, find_joining_station, JoinRequest};
use super::{check_ownership, CommandContext, CommandCost, CommandError, CommandResult, ExpenseType};
use crate::airport::{nearest_town, noise_level_for_distance, Airport, AirportType};
use crate::landscape::{check_buildable_tile, clear_land, ensure_no_vehicle_on_ground};
use crate::map::{Owner, StationPart, StationTile, TileArea, TileIndex, TileKind};
use crate::naming::StationNaming;
use crate::services::Services;
use crate::station::{Facilities, StationKind};
use crate::station_rect::RectMode;
use crate::state::{StationId, World};

/// Council tolerance at which towns accept any number of airports.
const TOWN_COUNCIL_PERMISSIVE: u8 = 3;

/// Most airports one town puts up with when noise is not modelled.
const MAX_AIRPORTS_PER_TOWN: usize = 2;

#[allow(clippy::too_many_arguments)]
pub fn build_airport(
    world: &mut World,
    services: &mut Services<'_>,
    ctx: &CommandContext,
    tile: TileIndex,
    airport_type: AirportType,
    layout: u8,
    join: StationId,
    adjacent: bool,
) -> CommandResult {
    let join = JoinRequest::new(world, join, adjacent, StationKind::Station)?;
    services.authority.allows_new_station(world, tile, ctx.company)?;

    let spec = airport_type.spec();
    let rotation = *spec.layouts.get(usize::from(layout)).ok_or(CommandError::Invalid)?;
    if !spec.buildable {
        return Err(CommandError::Invalid);
    }
    let (w, h) = spec.rotated_size(rotation);
    let area = TileArea::new(tile, w, h);
    if !world.map.area_is_valid(&area) {
        return Err(CommandError::Invalid);
    }
    let spread = world.settings.station_spread;
    if w > spread || h > spread {
        return Err(CommandError::StationTooSpreadOut);
    }

    let mut cost = CommandCost::new(ExpenseType::Construction);
    let mut allowed_z = None;
    for t in area.iter() {
        cost.add(check_buildable_tile(world, &*services.vehicles, t, &[], &mut allowed_z, true)?);
        cost.add(clear_land(world, services, ctx, t)?);
    }

    let (town, distance) = nearest_town(world, &area).ok_or(CommandError::SiteUnsuitable)?;
    let noise = noise_level_for_distance(&spec, distance, world.settings.town_council_tolerance);
    if world.settings.station_noise_level {
        let t = world.town(town).ok_or(CommandError::SiteUnsuitable)?;
        if t.noise_reached + u16::from(noise) > t.max_noise {
            log::debug!("{} refuses airport: noise {} + {} over {}", t.name, t.noise_reached, noise, t.max_noise);
            return Err(CommandError::LocalAuthorityRefusesNoise);
        }
    } else if world.settings.town_council_tolerance != TOWN_COUNCIL_PERMISSIVE {
        let closest = world.closest_town(tile);
        let airports = world
            .stations
            .iter()
            .filter(|st| {
                Some(st.town) == closest
                    && st.facilities.has(Facilities::AIRPORT)
                    && st.airport.airport_type != Some(AirportType::Oilrig)
            })
            .count();
        if airports >= MAX_AIRPORTS_PER_TOWN {
            return Err(CommandError::LocalAuthorityRefusesAirport);
        }
    }

    let found = find_joining_station(
        world,
        ctx.company,
        StationKind::Station,
        StationId::INVALID,
        &join,
        &area,
        &|_| true,
        CommandError::MustDemolishAirportFirst,
    )?;
    let naming = if spec.airplanes { StationNaming::Airport } else { StationNaming::Heliport };
    let station = build_station_part(world, ctx, found, join.reuse, &area, StationKind::Station, naming)?;

    if let Some(st) = station.and_then(|id| world.stations.get(id)) {
        if !st.airport.area.is_empty() {
            return Err(CommandError::TooCloseToAnotherAirport);
        }
    }

    cost.add_cost(world.prices.build_station_airport * area.iter().count() as i64);

    if !ctx.exec() {
        return Ok(cost);
    }
    let id = station.ok_or(CommandError::Invalid)?;

    // Noise is always tracked so toggling the setting needs no recount.
    if let Some(t) = world.towns.get_mut(usize::from(town.0)) {
        t.noise_reached += u16::from(noise);
    }

    let owner = {
        let st = world.stations.get_mut(id).ok_or(CommandError::Invalid)?;
        st.add_facility(Facilities::AIRPORT, tile);
        st.airport = Airport {
            area,
            airport_type: Some(airport_type),
            layout,
            rotation,
            closed: false,
        };
        st.rect.before_add_rect(&area, RectMode::Try, spread)?;
        st.owner
    };

    let hangar = spec.hangar_tile(tile, rotation);
    for t in area.iter() {
        let tile_mut = world.map.get_mut(t);
        tile_mut.kind = TileKind::Station(StationTile {
            station: id,
            part: StationPart::Airport { hangar: Some(t) == hangar },
        });
        tile_mut.owner = owner;
    }
    if let Some(infra) = world.infrastructure_mut(owner) {
        infra.airport += 1;
    }

    log::debug!("station {}: {:?} airport at {}, noise {}", id, airport_type, tile, noise);
    after_station_tile_set_change(world, services.cargo, id, true);
    Ok(cost)
}

pub fn remove_airport(world: &mut World, services: &mut Services<'_>, ctx: &CommandContext, tile: TileIndex) -> CommandResult {
    let id = match world.map.try_get(tile).and_then(|t| t.station()) {
        Some(StationTile {
            station,
            part: StationPart::Airport { .. },
        }) => *station,
        _ => return Err(CommandError::ThereIsNoStation),
    };
    let st = world.stations.get(id).ok_or(CommandError::ThereIsNoStation)?;
    if ctx.company != Owner::Water {
        check_ownership(st.owner, ctx.company)?;
    }
    if services.vehicles.aircraft_in_the_way(id) {
        return Err(CommandError::AircraftInTheWay);
    }

    let area = st.airport.area;
    let spec = st.airport.spec();
    let owner = st.owner;
    let belongs = |world: &World, t: TileIndex| {
        matches!(
            world.map.get(t).station(),
            Some(StationTile { station, part: StationPart::Airport { .. } }) if *station == id
        )
    };

    let mut cost = CommandCost::new(ExpenseType::Construction);
    for t in area.iter().filter(|t| belongs(world, *t)) {
        ensure_no_vehicle_on_ground(&*services.vehicles, t)?;
        cost.add_cost(world.prices.clear_station_airport);
    }
    if !ctx.exec() {
        return Ok(cost);
    }

    if let (Some(spec), Some((town, distance))) = (spec, nearest_town(world, &area)) {
        let noise = noise_level_for_distance(&spec, distance, world.settings.town_council_tolerance);
        if let Some(t) = world.towns.get_mut(usize::from(town.0)) {
            t.noise_reached = t.noise_reached.saturating_sub(u16::from(noise));
        }
    }

    for t in area.iter() {
        if belongs(world, t) {
            let tile_mut = world.map.get_mut(t);
            tile_mut.kind = TileKind::Clear;
            tile_mut.owner = Owner::None;
        }
    }

    if let Some(st) = world.stations.get_mut(id) {
        st.rect.after_remove_rect(&world.map, id, &area);
        st.airport.clear();
        st.facilities.reset(Facilities::AIRPORT);
    }
    if let Some(infra) = world.infrastructure_mut(owner) {
        infra.airport = infra.airport.saturating_sub(1);
    }

    log::debug!("station {}: airport removed", id);
    after_station_tile_set_change(world, services.cargo, id, false);
    Ok(cost)
}

/// Toggle whether aircraft may land at the station's airport.
pub fn open_close_airport(world: &mut World, ctx: &CommandContext, station: StationId) -> CommandResult {
    let st = world.stations.get_mut(station).ok_or(CommandError::Invalid)?;
    if !st.facilities.has(Facilities::AIRPORT) || st.owner == Owner::None {
        return Err(CommandError::Invalid);
    }
    check_ownership(st.owner, ctx.company)?;
    if ctx.exec() {
        st.airport.closed = !st.airport.closed;
        log::debug!("station {}: airport {}", station, if st.airport.closed { "closed" } else { "opened" });
    }
    Ok(CommandCost::new(ExpenseType::Construction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::NEW_STATION;
    use crate::input::Command;
    use crate::map::Owner;
    use crate::state::CompanyId;
    use crate::testing::Harness;

    const ME: Owner = Owner::Company(CompanyId(0));

    fn build(h: &mut Harness, tile: TileIndex, airport_type: AirportType) -> CommandResult {
        h.run(
            ME,
            &Command::BuildAirport {
                tile,
                airport_type,
                layout: 0,
                join: NEW_STATION,
                adjacent: false,
            },
        )
    }

    #[test]
    fn test_build_and_remove_small_airport() {
        let mut h = Harness::new();
        let tile = TileIndex::new(40, 40);
        let cost = build(&mut h, tile, AirportType::Small).unwrap();
        assert!(cost.cost >= h.world.prices.build_station_airport * 12);

        let id = h.world.map.get(tile).station_id().unwrap();
        let st = h.world.stations.get(id).unwrap();
        assert!(st.facilities.has(Facilities::AIRPORT));
        assert_eq!(st.airport.area, TileArea::new(tile, 4, 3));
        assert!(matches!(
            h.world.map.get(TileIndex::new(43, 40)).station().map(|s| s.part),
            Some(StationPart::Airport { hangar: true })
        ));
        assert!(h.world.towns[0].noise_reached > 0);
        assert_eq!(h.world.infrastructure_mut(ME).unwrap().airport, 1);

        h.run(ME, &Command::RemoveAirport { tile: TileIndex::new(41, 41) }).unwrap();
        assert_eq!(h.world.map.get(tile).kind, TileKind::Clear);
        assert_eq!(h.world.towns[0].noise_reached, 0);
        let st = h.world.stations.get(id).unwrap();
        assert!(!st.is_in_use());
        assert!(st.rect.is_empty());
    }

    #[test]
    fn test_noise_recount_matches_build() {
        let mut h = Harness::new();
        build(&mut h, TileIndex::new(40, 40), AirportType::Large).unwrap();
        let reached = h.world.towns[0].noise_reached;

        h.world.towns[0].noise_reached = 99;
        crate::airport::update_airports_noise(&mut h.world);
        assert_eq!(h.world.towns[0].noise_reached, reached);

        h.world.settings.town_council_tolerance = 2;
        crate::airport::update_airports_noise(&mut h.world);
        assert!(h.world.towns[0].noise_reached > reached);
    }

    #[test]
    fn test_noise_budget_refuses() {
        let mut h = Harness::new();
        h.world.settings.station_noise_level = true;
        h.world.towns[0].max_noise = 2;
        let res = build(&mut h, TileIndex::new(34, 34), AirportType::Large);
        assert_eq!(res, Err(CommandError::LocalAuthorityRefusesNoise));
        assert!(h.world.stations.is_empty());
    }

    #[test]
    fn test_second_airport_on_station_refused() {
        let mut h = Harness::new();
        build(&mut h, TileIndex::new(40, 40), AirportType::Heliport).unwrap();
        let id = h.world.map.get(TileIndex::new(40, 40)).station_id().unwrap();
        let res = h.run(
            ME,
            &Command::BuildAirport {
                tile: TileIndex::new(41, 40),
                airport_type: AirportType::Heliport,
                layout: 0,
                join: id,
                adjacent: false,
            },
        );
        assert_eq!(res, Err(CommandError::TooCloseToAnotherAirport));
    }

    #[test]
    fn test_oilrig_not_buildable_and_open_close() {
        let mut h = Harness::new();
        assert_eq!(build(&mut h, TileIndex::new(5, 5), AirportType::Oilrig), Err(CommandError::Invalid));

        build(&mut h, TileIndex::new(40, 40), AirportType::Heliport).unwrap();
        let id = h.world.map.get(TileIndex::new(40, 40)).station_id().unwrap();
        h.run(ME, &Command::OpenCloseAirport { station: id }).unwrap();
        assert!(h.world.stations.get(id).unwrap().airport.closed);

        let res = h.run(Owner::Company(CompanyId(1)), &Command::OpenCloseAirport { station: id });
        assert_eq!(res, Err(CommandError::OwnedBy(ME)));
    }
}
