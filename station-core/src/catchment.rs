//! Catchment areas and cargo acceptance.
//!
//! Each station keeps a bitmap of the tiles it serves. The bitmap is
//! rebuilt from per-tile radii whenever the station's tile set changes, and
//! acceptance is then re-accumulated over it through the [`CargoSources`]
//! collaborator.
//!
//! A cargo counts as accepted when the accumulated amount reaches 8 (one
//! full unit in 1/8ths) and the station has a facility that can handle the
//! cargo's class.

use crate::cargo::{CargoArray, CargoSpec, CargoType, CargoTypes, NUM_CARGO};
use crate::config::StationSettings;
use crate::map::{Map, StationPart, TileArea, TileIndex, TileKind};
use crate::news::{date_string, StationEvent};
use crate::services::CargoSources;
use crate::station::{Facilities, GoodsStatus, Station};
use crate::state::{IndustryId, StationId, World};
use serde::{Deserialize, Serialize};

pub const CA_NONE: u16 = 0;
pub const CA_BUS: u16 = 3;
pub const CA_TRUCK: u16 = 3;
pub const CA_TRAIN: u16 = 4;
pub const CA_DOCK: u16 = 5;
/// Radius of every facility when modified catchment is off.
pub const CA_UNMODIFIED: u16 = 4;

/// Acceptance needed, in 1/8 units, for a cargo to count as accepted.
pub const ACCEPTANCE_THRESHOLD: u32 = 8;

/// Set of tiles within a bounding area.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchmentTiles {
    area: TileArea,
    bits: Vec<u64>,
}

impl CatchmentTiles {
    /// Clear and resize to cover `area`.
    pub fn initialize(&mut self, area: TileArea) {
        self.area = area;
        let tiles = usize::from(area.w) * usize::from(area.h);
        self.bits = vec![0; tiles.div_ceil(64)];
    }

    pub fn reset(&mut self) {
        self.area = TileArea::EMPTY;
        self.bits.clear();
    }

    pub fn area(&self) -> TileArea {
        self.area
    }

    fn index(&self, tile: TileIndex) -> Option<usize> {
        if !self.area.contains(tile) {
            return None;
        }
        let dx = usize::from(tile.x - self.area.tile.x);
        let dy = usize::from(tile.y - self.area.tile.y);
        Some(dy * usize::from(self.area.w) + dx)
    }

    /// Tiles outside the area are ignored.
    pub fn set(&mut self, tile: TileIndex) {
        if let Some(i) = self.index(tile) {
            self.bits[i / 64] |= 1 << (i % 64);
        }
    }

    pub fn has(&self, tile: TileIndex) -> bool {
        self.index(tile)
            .is_some_and(|i| self.bits[i / 64] & (1 << (i % 64)) != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|w| *w == 0)
    }

    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = TileIndex> + '_ {
        self.area.iter().filter(move |t| self.has(*t))
    }
}

/// Radius served by one station tile.
pub fn tile_catchment_radius(part: &StationPart, st: &Station, settings: &StationSettings) -> u16 {
    if !settings.modified_catchment {
        return match part {
            StationPart::Waypoint { .. } => CA_NONE,
            _ => CA_UNMODIFIED,
        };
    }
    match part {
        StationPart::Rail { .. } => CA_TRAIN,
        StationPart::Oilrig => CA_UNMODIFIED,
        StationPart::Airport { .. } => st.airport.spec().map_or(CA_NONE, |s| s.catchment),
        StationPart::RoadStop { stop_type, .. } => match stop_type {
            crate::map::RoadStopType::Bus => CA_BUS,
            crate::map::RoadStopType::Truck => CA_TRUCK,
        },
        StationPart::Dock { .. } => CA_DOCK,
        StationPart::Waypoint { .. } => CA_NONE,
    }
}

/// Largest radius of any facility the station has.
pub fn catchment_radius(st: &Station, settings: &StationSettings) -> u16 {
    let has_bus = !st.bus_stops.is_empty();
    let has_truck = !st.truck_stops.is_empty();
    let has_train = !st.train_station.is_empty();
    let has_dock = !st.ship_station.is_empty();
    let has_airport = !st.airport.area.is_empty();

    if !settings.modified_catchment {
        return if has_bus || has_truck || has_train || has_dock || has_airport {
            CA_UNMODIFIED
        } else {
            CA_NONE
        };
    }

    let mut radius = CA_NONE;
    if has_bus {
        radius = radius.max(CA_BUS);
    }
    if has_truck {
        radius = radius.max(CA_TRUCK);
    }
    if has_train {
        radius = radius.max(CA_TRAIN);
    }
    if has_dock {
        radius = radius.max(CA_DOCK);
    }
    if let Some(spec) = st.airport.spec().filter(|_| has_airport) {
        radius = radius.max(spec.catchment);
    }
    radius
}

/// Footprint grown by the catchment radius, clamped to the map.
pub fn catchment_rect(st: &Station, map: &Map, settings: &StationSettings) -> TileArea {
    st.rect.to_area().expand(catchment_radius(st, settings), map)
}

/// Whether `tile` belongs to an industry another station may not serve.
fn is_reserved_industry_tile(world: &World, tile: TileIndex, station: StationId) -> bool {
    if world.settings.serve_neutral_industries {
        return false;
    }
    match world.map.get(tile).kind {
        TileKind::Industry(id) => world
            .industries
            .get(&id)
            .and_then(|ind| ind.neutral_station)
            .is_some_and(|ns| ns != station),
        _ => false,
    }
}

/// Rebuild the catchment bitmap of station `id`.
pub fn recompute_catchment(world: &mut World, id: StationId) {
    let Some(st) = world.stations.get(id) else {
        return;
    };
    let mut tiles = CatchmentTiles::default();

    if st.rect.is_empty() {
        if let Some(st) = world.stations.get_mut(id) {
            st.catchment.reset();
        }
        return;
    }

    let linked_industry = st
        .industry
        .filter(|_| !world.settings.serve_neutral_industries)
        .and_then(|i| world.industries.get(&i));

    if let Some(ind) = linked_industry {
        // Stations belonging to an industry serve only that industry.
        tiles.initialize(ind.location);
        for tile in ind.location.iter() {
            if world.map.get(tile).kind == TileKind::Industry(ind.id) {
                tiles.set(tile);
            }
        }
    } else {
        tiles.initialize(catchment_rect(st, &world.map, &world.settings));
        for tile in st.rect.to_area().iter() {
            let Some(part) = world.map.get(tile).station().filter(|s| s.station == id).map(|s| s.part) else {
                continue;
            };
            let radius = tile_catchment_radius(&part, st, &world.settings);
            if radius == CA_NONE {
                continue;
            }
            for near in TileArea::new(tile, 1, 1).expand(radius, &world.map).iter() {
                if !is_reserved_industry_tile(world, near, id) {
                    tiles.set(near);
                }
            }
        }
    }

    log::trace!("station {} catchment covers {} tiles", id, tiles.len());
    if let Some(st) = world.stations.get_mut(id) {
        st.catchment = tiles;
    }
}

/// Whether the station has a facility able to handle `spec`.
pub fn can_handle_cargo(facilities: Facilities, spec: &CargoSpec) -> bool {
    let needed = if spec.is_passengers() {
        Facilities::TRAIN | Facilities::BUS_STOP | Facilities::AIRPORT | Facilities::DOCK
    } else {
        Facilities::TRAIN | Facilities::TRUCK_STOP | Facilities::AIRPORT | Facilities::DOCK
    };
    facilities.has(needed)
}

/// Accepted cargo of all catchment tiles, plus the always-accepted mask.
pub fn acceptance_around_station(world: &World, cargo: &dyn CargoSources, st: &Station) -> (CargoArray, CargoTypes) {
    let mut acceptance = CargoArray::default();
    let mut always = CargoTypes::default();
    for tile in st.catchment.iter() {
        cargo.accepted(world, tile, &mut acceptance, &mut always);
    }
    (acceptance, always)
}

/// Acceptance of an area grown by `radius`, for previewing a build.
pub fn acceptance_around_tiles(
    world: &World,
    cargo: &dyn CargoSources,
    area: &TileArea,
    radius: u16,
) -> (CargoArray, CargoTypes) {
    let mut acceptance = CargoArray::default();
    let mut always = CargoTypes::default();
    for tile in area.expand(radius, &world.map).iter() {
        if is_reserved_industry_tile(world, tile, StationId::INVALID) {
            continue;
        }
        cargo.accepted(world, tile, &mut acceptance, &mut always);
    }
    (acceptance, always)
}

/// Production of an area grown by `radius`. Every industry seen counts once
/// per cargo it produces.
pub fn production_around_tiles(world: &World, cargo: &dyn CargoSources, area: &TileArea, radius: u16) -> CargoArray {
    let mut produced = CargoArray::default();
    let mut industries: Vec<IndustryId> = Vec::new();
    for tile in area.expand(radius, &world.map).iter() {
        if let TileKind::Industry(id) = world.map.get(tile).kind {
            if !industries.contains(&id) {
                industries.push(id);
            }
        }
        cargo.produced(world, tile, &mut produced);
    }
    for id in industries {
        let Some(ind) = world.industries.get(&id) else {
            continue;
        };
        if ind.neutral_station.is_some() && !world.settings.serve_neutral_industries {
            continue;
        }
        for c in &ind.produced {
            produced.add(*c, 1);
        }
    }
    produced
}

pub fn acceptance_mask(st: &Station) -> CargoTypes {
    let mut mask = CargoTypes::default();
    for (i, ge) in st.goods.iter().enumerate() {
        if ge.is_accepted() {
            mask.set(CargoType(i as u8));
        }
    }
    mask
}

/// Re-accumulate the acceptance of station `id`, update link graph demand
/// and, if `show_msg`, report changes to the local company.
#[tracing::instrument(skip_all, name = "acceptance")]
pub fn update_station_acceptance(world: &mut World, cargo: &dyn CargoSources, id: StationId, show_msg: bool) {
    let Some(st) = world.stations.get(id) else {
        return;
    };
    let old_mask = acceptance_mask(st);

    let (acceptance, always) = if st.rect.is_empty() {
        (CargoArray::default(), st.always_accepted)
    } else {
        acceptance_around_station(world, cargo, st)
    };

    let facilities = st.facilities;
    let handles: Vec<bool> = (0..NUM_CARGO)
        .map(|c| world.cargos.get(c).is_some_and(|spec| can_handle_cargo(facilities, spec)))
        .collect();

    let Some(st) = world.stations.get_mut(id) else {
        return;
    };
    st.always_accepted = always;
    for (c, ge) in st.goods.iter_mut().enumerate() {
        let amount = if handles[c] { acceptance.0[c] } else { 0 };
        ge.status.set_to(GoodsStatus::ACCEPTANCE, amount >= ACCEPTANCE_THRESHOLD);
        if let Some(graph) = ge.link_graph.and_then(|lg| world.link_graphs.get_mut(lg)) {
            graph.node_mut(ge.node).set_demand(amount / ACCEPTANCE_THRESHOLD);
        }
    }

    let new_mask = acceptance_mask(st);
    if old_mask == new_mask {
        return;
    }
    log::debug!("station {} acceptance {:#x} -> {:#x}", id, old_mask.0, new_mask.0);

    let in_use = st.is_in_use();
    let owner = st.owner;
    if !(show_msg && world.is_local(owner) && in_use) {
        return;
    }
    let accepts: Vec<CargoType> = new_mask.iter().filter(|c| !old_mask.has(*c)).collect();
    let rejects: Vec<CargoType> = old_mask.iter().filter(|c| !new_mask.has(*c)).collect();
    let date = date_string(world.date);
    if !accepts.is_empty() {
        world.news.push(StationEvent::AcceptsCargo {
            date: date.clone(),
            station: id,
            cargos: accepts,
        });
    }
    if !rejects.is_empty() {
        world.news.push(StationEvent::RejectsCargo {
            date,
            station: id,
            cargos: rejects,
        });
    }
}
