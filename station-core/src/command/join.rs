//! Deciding which station a newly built part belongs to.
//!
//! A build command names a station to join, or [`NEW_STATION`]. When it
//! names none, the new tiles attach to the single company station adjoining
//! them, or failing that to a recently emptied station nearby. Two
//! different adjoining stations are an error.

use super::{CommandContext, CommandError};
use crate::catchment::{recompute_catchment, update_station_acceptance};
use crate::map::{Map, Owner, TileArea, TileIndex};
use crate::naming::{generate_station_name, station_name, DefaultName, StationNaming};
use crate::news::{date_string, StationEvent};
use crate::services::CargoSources;
use crate::station::{Station, StationKind};
use crate::station_rect::RectMode;
use crate::state::{StationId, World};

/// Join target meaning "build a new station, never reuse a deleted one".
pub const NEW_STATION: StationId = StationId(0xFFFE);

/// Radius within which an emptied station is reused.
pub const DELETED_STATION_REUSE_RADIUS: u32 = 8;

/// The join parameters of a build command, validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinRequest {
    /// Explicitly requested station, or `INVALID`.
    pub to_join: StationId,
    /// Reuse a deleted station nearby when nothing else is joined.
    pub reuse: bool,
    pub adjacent: bool,
}

impl JoinRequest {
    /// Validate `join` for a part of a station of `kind`. Joining a distant
    /// station needs the setting and an existing station of the same kind.
    pub fn new(world: &World, join: StationId, adjacent: bool, kind: StationKind) -> Result<Self, CommandError> {
        let reuse = join != NEW_STATION;
        let to_join = if reuse { join } else { StationId::INVALID };
        if to_join.is_valid() {
            let exists = world.stations.get(to_join).is_some_and(|st| st.kind == kind);
            if !world.settings.distant_join_stations || !exists {
                return Err(CommandError::Invalid);
            }
        }
        Ok(Self {
            to_join,
            reuse,
            adjacent,
        })
    }
}

/// Look for a company station of `kind` in the ring around `area`.
///
/// `closest` seeds the search with a station already found; any second,
/// different station makes the placement ambiguous.
pub fn get_station_around(
    world: &World,
    area: &TileArea,
    closest: StationId,
    company: Owner,
    kind: StationKind,
    filter: &dyn Fn(&Station) -> bool,
) -> Result<Option<StationId>, CommandError> {
    let mut closest = closest;
    for tile in area.expand(1, &world.map).iter() {
        let Some(id) = world.map.get(tile).station_id() else {
            continue;
        };
        let Some(st) = world.stations.get(id) else {
            continue;
        };
        if st.kind != kind || st.owner != company || !filter(st) {
            continue;
        }
        if !closest.is_valid() {
            closest = id;
        } else if closest != id {
            return Err(CommandError::AdjoinsMoreThanOne);
        }
    }
    Ok(closest.is_valid().then_some(closest))
}

/// Pick the station new tiles in `area` join.
///
/// `existing` is the station whose tiles are being built over, if any;
/// `err` is returned when an adjacent build would overwrite another
/// station's tiles.
#[allow(clippy::too_many_arguments)]
pub fn find_joining_station(
    world: &World,
    company: Owner,
    kind: StationKind,
    existing: StationId,
    join: &JoinRequest,
    area: &TileArea,
    filter: &dyn Fn(&Station) -> bool,
    err: CommandError,
) -> Result<Option<StationId>, CommandError> {
    let mut found = None;
    let mut check_surrounding = true;

    if existing.is_valid() {
        if join.adjacent && existing != join.to_join {
            return Err(err);
        }
        found = world
            .stations
            .get(existing)
            .filter(|st| st.kind == kind && filter(st))
            .map(|st| st.id);
        check_surrounding = found.is_none();
    } else if join.adjacent {
        check_surrounding = false;
    }

    if check_surrounding {
        found = get_station_around(world, area, existing, company, kind, filter)?;
    }

    if found.is_none() && join.to_join.is_valid() {
        found = world.stations.get(join.to_join).map(|st| st.id);
    }
    Ok(found)
}

/// Closest emptied station of `company` near `tile`. Ties go to the lower id.
pub fn get_closest_deleted_station(world: &World, tile: TileIndex, company: Owner, kind: StationKind) -> Option<StationId> {
    let mut threshold = DELETED_STATION_REUSE_RADIUS;
    let mut best: Option<StationId> = None;
    for st in world.stations.iter() {
        if st.is_in_use() || st.owner != company || st.kind != kind {
            continue;
        }
        let dist = tile.distance_manhattan(st.xy);
        if dist < threshold {
            threshold = dist;
            best = Some(st.id);
        } else if dist == threshold && best.is_some_and(|b| st.id < b) {
            best = Some(st.id);
        }
    }
    best
}

/// Make sure there is a station for the new part in `area`.
///
/// An existing station is only checked against the spread limit. A new one
/// is allocated in the execute phase only; the dry run just checks the pool
/// has room, so it returns `None` for a station yet to be made.
pub fn build_station_part(
    world: &mut World,
    ctx: &CommandContext,
    station: Option<StationId>,
    reuse: bool,
    area: &TileArea,
    kind: StationKind,
    naming: StationNaming,
) -> Result<Option<StationId>, CommandError> {
    let mut station = station;
    if station.is_none() && reuse {
        station = get_closest_deleted_station(world, area.tile, ctx.company, kind);
    }

    if let Some(id) = station {
        let spread = world.settings.station_spread;
        let st = world.stations.get_mut(id).ok_or(CommandError::Invalid)?;
        if st.owner != ctx.company {
            return Err(CommandError::Invalid);
        }
        st.rect.before_add_rect(area, RectMode::Test, spread)?;
        return Ok(Some(id));
    }

    if !world.stations.can_allocate(world.settings.max_stations) {
        return Err(CommandError::TooManyStations);
    }
    let town = world.closest_town(area.tile).ok_or(CommandError::SiteUnsuitable)?;
    if !ctx.exec() {
        return Ok(None);
    }

    let date = world.date;
    let id = world
        .stations
        .allocate(|id| Station::new(id, kind, ctx.company, town, area.tile, date));

    let (string_id, indtype) = match (kind, world.stations.get(id)) {
        (StationKind::Waypoint, _) => (DefaultName::Waypoint, None),
        (StationKind::Station, Some(st)) => generate_station_name(world, st, area.tile, naming),
        (StationKind::Station, None) => (DefaultName::Fallback, None),
    };
    if let Some(st) = world.stations.get_mut(id) {
        st.string_id = string_id;
        st.indtype = indtype;
    }
    announce_new_station(world, id);
    Ok(Some(id))
}

/// Log and report a freshly allocated station.
pub(crate) fn announce_new_station(world: &mut World, id: StationId) {
    let Some(st) = world.stations.get(id) else {
        return;
    };
    let name = station_name(world, st);
    log::info!("station {} '{}' created by {:?} at {}", id, name, st.owner, st.xy);
    world.news.push(StationEvent::StationCreated {
        date: date_string(world.date),
        station: id,
        name,
    });
}

/// Keep the sign inside the footprint, moving link graph nodes with it.
pub fn update_station_sign(world: &mut World, id: StationId) {
    let Some(st) = world.stations.get_mut(id) else {
        return;
    };
    let old = st.xy;
    st.clamp_sign();
    if st.xy == old {
        return;
    }
    let xy = st.xy;
    let handles: Vec<_> = st
        .goods
        .iter()
        .filter_map(|ge| ge.link_graph.map(|lg| (lg, ge.node)))
        .collect();
    for (lg, node) in handles {
        if let Some(graph) = world.link_graphs.get_mut(lg) {
            graph.node_mut(node).update_location(xy);
        }
    }
}

/// Start the deletion countdown of a station that lost its last facility.
pub fn delete_station_if_empty(world: &mut World, id: StationId) {
    if let Some(st) = world.stations.get_mut(id) {
        if !st.is_in_use() {
            st.delete_ctr = 0;
            log::debug!("station {} is empty, deletion pending", id);
        }
    }
    update_station_sign(world, id);
}

/// Bookkeeping after tiles of station `id` were added or removed.
pub fn after_station_tile_set_change(world: &mut World, cargo: &dyn CargoSources, id: StationId, adding: bool) {
    if adding {
        recompute_catchment(world, id);
        update_station_acceptance(world, cargo, id, false);
    } else {
        delete_station_if_empty(world, id);
        recompute_catchment(world, id);
    }
}

/// Shrink `area` from its edges until every edge row and column holds a
/// tile for which `belongs` is true. A fully emptied area is cleared.
pub fn make_station_area_smaller(map: &Map, area: TileArea, belongs: impl Fn(&Map, TileIndex) -> bool) -> TileArea {
    let mut ta = area;
    loop {
        if ta.is_empty() {
            return TileArea::EMPTY;
        }
        let (x0, y0, x1, y1) = (ta.tile.x, ta.tile.y, ta.right(), ta.bottom());

        if !(y0..=y1).any(|y| belongs(map, TileIndex::new(x0, y))) {
            ta.tile.x += 1;
            ta.w -= 1;
            continue;
        }
        if !(y0..=y1).any(|y| belongs(map, TileIndex::new(x1, y))) {
            ta.w -= 1;
            continue;
        }
        if !(x0..=x1).any(|x| belongs(map, TileIndex::new(x, y0))) {
            ta.tile.y += 1;
            ta.h -= 1;
            continue;
        }
        if !(x0..=x1).any(|x| belongs(map, TileIndex::new(x, y1))) {
            ta.h -= 1;
            continue;
        }
        return ta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::DoCommandFlags;
    use crate::map::{Axis, RailType, StationPart, StationTile, TileKind};
    use crate::state::CompanyId;
    use crate::testing::WorldBuilder;

    const ME: Owner = Owner::Company(CompanyId(0));
    const THEM: Owner = Owner::Company(CompanyId(1));

    fn station_at(world: &mut World, owner: Owner, xy: TileIndex) -> StationId {
        let date = world.date;
        let id = world
            .stations
            .allocate(|id| Station::new(id, StationKind::Station, owner, crate::state::TownId(0), xy, date));
        world.map.get_mut(xy).kind = TileKind::Station(StationTile {
            station: id,
            part: StationPart::Rail {
                axis: Axis::X,
                rail_type: RailType::Rail,
                reserved: false,
            },
        });
        if let Some(st) = world.stations.get_mut(id) {
            st.facilities.set(crate::station::Facilities::TRAIN);
        }
        id
    }

    fn any(_: &Station) -> bool {
        true
    }

    #[test]
    fn test_join_request_validation() {
        let mut world = WorldBuilder::new().build();
        let id = station_at(&mut world, ME, TileIndex::new(3, 3));
        let req = JoinRequest::new(&world, NEW_STATION, false, StationKind::Station).unwrap();
        assert!(!req.reuse);
        assert!(!req.to_join.is_valid());
        assert!(JoinRequest::new(&world, id, false, StationKind::Station).is_ok());
        assert_eq!(
            JoinRequest::new(&world, id, false, StationKind::Waypoint),
            Err(CommandError::Invalid)
        );
        world.settings.distant_join_stations = false;
        assert_eq!(
            JoinRequest::new(&world, id, false, StationKind::Station),
            Err(CommandError::Invalid)
        );
    }

    #[test]
    fn test_adjoining_station_found_and_ambiguity() {
        let mut world = WorldBuilder::new().build();
        let a = station_at(&mut world, ME, TileIndex::new(4, 4));
        let area = TileArea::new(TileIndex::new(5, 4), 1, 1);
        let found = get_station_around(&world, &area, StationId::INVALID, ME, StationKind::Station, &any);
        assert_eq!(found, Ok(Some(a)));

        // Competitor stations are ignored.
        station_at(&mut world, THEM, TileIndex::new(6, 4));
        let found = get_station_around(&world, &area, StationId::INVALID, ME, StationKind::Station, &any);
        assert_eq!(found, Ok(Some(a)));

        station_at(&mut world, ME, TileIndex::new(5, 5));
        let found = get_station_around(&world, &area, StationId::INVALID, ME, StationKind::Station, &any);
        assert_eq!(found, Err(CommandError::AdjoinsMoreThanOne));
    }

    #[test]
    fn test_adjacent_build_over_other_station_refused() {
        let mut world = WorldBuilder::new().build();
        let a = station_at(&mut world, ME, TileIndex::new(4, 4));
        let join = JoinRequest::new(&world, NEW_STATION, true, StationKind::Station).unwrap();
        let area = TileArea::new(TileIndex::new(4, 4), 1, 1);
        let res = find_joining_station(
            &world,
            ME,
            StationKind::Station,
            a,
            &join,
            &area,
            &any,
            CommandError::MustRemoveRailStationFirst,
        );
        assert_eq!(res, Err(CommandError::MustRemoveRailStationFirst));

        // Adjacent builds next to a station stay separate.
        let area = TileArea::new(TileIndex::new(5, 4), 1, 1);
        let res = find_joining_station(
            &world,
            ME,
            StationKind::Station,
            StationId::INVALID,
            &join,
            &area,
            &any,
            CommandError::MustRemoveRailStationFirst,
        );
        assert_eq!(res, Ok(None));
    }

    #[test]
    fn test_closest_deleted_station_ties_to_lowest_id() {
        let mut world = WorldBuilder::new().build();
        let a = station_at(&mut world, ME, TileIndex::new(10, 10));
        let b = station_at(&mut world, ME, TileIndex::new(14, 10));
        for id in [a, b] {
            world.stations.get_mut(id).unwrap().facilities = Default::default();
        }
        assert_eq!(
            get_closest_deleted_station(&world, TileIndex::new(12, 10), ME, StationKind::Station),
            Some(a)
        );
        assert_eq!(
            get_closest_deleted_station(&world, TileIndex::new(13, 10), ME, StationKind::Station),
            Some(b)
        );
        // Eight tiles away is too far.
        assert_eq!(
            get_closest_deleted_station(&world, TileIndex::new(22, 10), ME, StationKind::Station),
            None
        );
        assert_eq!(
            get_closest_deleted_station(&world, TileIndex::new(12, 10), THEM, StationKind::Station),
            None
        );
    }

    #[test]
    fn test_new_station_allocated_only_on_exec() {
        let mut world = WorldBuilder::new().build();
        let area = TileArea::new(TileIndex::new(8, 8), 2, 1);
        let test = CommandContext::new(ME, DoCommandFlags::NONE);
        let res = build_station_part(&mut world, &test, None, true, &area, StationKind::Station, StationNaming::Rail);
        assert_eq!(res, Ok(None));
        assert!(world.stations.is_empty());

        let exec = CommandContext::new(ME, DoCommandFlags::EXEC);
        let id = build_station_part(&mut world, &exec, None, true, &area, StationKind::Station, StationNaming::Rail)
            .unwrap()
            .unwrap();
        let st = world.stations.get(id).unwrap();
        assert_eq!(st.owner, ME);
        assert_eq!(st.xy, TileIndex::new(8, 8));
        assert!(matches!(world.news.events().last(), Some(StationEvent::StationCreated { .. })));

        world.settings.max_stations = 1;
        assert_eq!(
            build_station_part(&mut world, &test, None, false, &area, StationKind::Station, StationNaming::Rail),
            Err(CommandError::TooManyStations)
        );
    }

    #[test]
    fn test_area_shrinks_to_remaining_tiles() {
        let mut world = WorldBuilder::new().build();
        let a = station_at(&mut world, ME, TileIndex::new(5, 6));
        let area = TileArea::new(TileIndex::new(3, 4), 5, 4);
        let belongs = |map: &Map, t: TileIndex| map.get(t).station_id() == Some(a);
        let shrunk = make_station_area_smaller(&world.map, area, belongs);
        assert_eq!(shrunk, TileArea::new(TileIndex::new(5, 6), 1, 1));

        let none = |_: &Map, _: TileIndex| false;
        assert!(make_station_area_smaller(&world.map, area, none).is_empty());
    }
}
