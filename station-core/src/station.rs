//! Stations, their per-cargo goods entries, and the station pool.

use crate::airport::Airport;
use crate::cargo::{CargoTypes, StationCargoList, NUM_CARGO};
use crate::catchment::CatchmentTiles;
use crate::flow_stat::FlowStatMap;
use crate::link_graph::{LinkGraphId, NodeId};
use crate::map::{Owner, RoadStopType, TileArea, TileIndex};
use crate::naming::DefaultName;
use crate::road_stop::RoadStop;
use crate::station_rect::StationRect;
use crate::state::{Date, IndustryId, IndustryTypeId, StationId, TownId};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const INITIAL_STATION_RATING: u8 = 175;
pub const MAX_STATION_RATING: u8 = 255;

/// Facility bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Facilities(pub u8);

impl Facilities {
    pub const TRAIN: u8 = 1 << 0;
    pub const BUS_STOP: u8 = 1 << 1;
    pub const TRUCK_STOP: u8 = 1 << 2;
    pub const AIRPORT: u8 = 1 << 3;
    pub const DOCK: u8 = 1 << 4;
    pub const WAYPOINT: u8 = 1 << 5;

    pub fn has(self, f: u8) -> bool {
        self.0 & f != 0
    }

    pub fn set(&mut self, f: u8) {
        self.0 |= f;
    }

    pub fn reset(&mut self, f: u8) {
        self.0 &= !f;
    }

    /// Any facility apart from the waypoint marker.
    pub fn in_use(self) -> bool {
        self.0 & !Self::WAYPOINT != 0
    }
}

/// Status flags of a goods entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GoodsStatus(pub u8);

impl GoodsStatus {
    /// Accepted at the station right now.
    pub const ACCEPTANCE: u8 = 1 << 0;
    /// A vehicle tried to load this cargo, so it has a rating.
    pub const RATING: u8 = 1 << 1;
    pub const EVER_ACCEPTED: u8 = 1 << 2;
    pub const LAST_MONTH: u8 = 1 << 3;
    pub const CURRENT_MONTH: u8 = 1 << 4;
    pub const ACCEPTED_BIGTICK: u8 = 1 << 5;

    pub fn has(self, f: u8) -> bool {
        self.0 & f != 0
    }

    pub fn set_to(&mut self, f: u8, on: bool) {
        if on {
            self.0 |= f;
        } else {
            self.0 &= !f;
        }
    }

    pub fn any(self) -> bool {
        self.0 != 0
    }
}

/// Kind of the vehicle that last loaded at a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleType {
    Train,
    Road,
    Ship,
    Aircraft,
}

/// Per-station, per-cargo state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodsEntry {
    pub status: GoodsStatus,
    pub rating: u8,
    /// Rating ticks since a vehicle last picked this cargo up. Saturates.
    pub time_since_pickup: u8,
    /// Max speed of the last vehicle that loaded; 0 if none ever tried.
    pub last_speed: u8,
    /// Age in years of the last vehicle that loaded.
    pub last_age: u8,
    /// Sub-unit production carried over to the next delivery.
    pub amount_fract: u8,
    pub max_waiting_cargo: u32,
    pub link_graph: Option<LinkGraphId>,
    pub node: NodeId,
    pub cargo: StationCargoList,
    pub flows: FlowStatMap,
}

impl Default for GoodsEntry {
    fn default() -> Self {
        Self {
            status: GoodsStatus::default(),
            rating: INITIAL_STATION_RATING,
            time_since_pickup: 255,
            last_speed: 0,
            last_age: 255,
            amount_fract: 0,
            max_waiting_cargo: 0,
            link_graph: None,
            node: 0,
            cargo: StationCargoList::default(),
            flows: FlowStatMap::default(),
        }
    }
}

impl GoodsEntry {
    pub fn has_rating(&self) -> bool {
        self.status.has(GoodsStatus::RATING)
    }

    pub fn has_vehicle_ever_tried_loading(&self) -> bool {
        self.last_speed != 0
    }

    pub fn is_accepted(&self) -> bool {
        self.status.has(GoodsStatus::ACCEPTANCE)
    }

    /// Next hop for new cargo entering the network at `source`.
    pub fn get_via(&self, source: StationId, rng: &mut impl Rng) -> StationId {
        self.flows.get_via_any(source, rng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StationKind {
    #[default]
    Station,
    Waypoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub kind: StationKind,
    pub owner: Owner,
    pub town: TownId,
    /// Sign tile.
    pub xy: TileIndex,
    /// Custom name; `None` uses the generated default.
    pub name: Option<String>,
    pub string_id: DefaultName,
    /// Industry type that named the station.
    pub indtype: Option<IndustryTypeId>,
    pub build_date: Date,
    pub facilities: Facilities,
    pub rect: StationRect,

    pub train_station: TileArea,
    pub bus_station: TileArea,
    pub truck_station: TileArea,
    pub ship_station: TileArea,
    /// Water tiles where ships can dock.
    pub docking_station: TileArea,
    pub airport: Airport,
    pub bus_stops: Vec<RoadStop>,
    pub truck_stops: Vec<RoadStop>,

    pub goods: Vec<GoodsEntry>,
    pub catchment: CatchmentTiles,
    /// Cargo accepted by houses regardless of amount.
    pub always_accepted: CargoTypes,
    /// Industry this station belongs to (oil rigs).
    pub industry: Option<IndustryId>,

    /// Big ticks spent without any facility.
    pub delete_ctr: u8,
    pub time_since_load: u8,
    pub time_since_unload: u8,
    pub last_vehicle_type: Option<VehicleType>,
}

impl Station {
    pub fn new(id: StationId, kind: StationKind, owner: Owner, town: TownId, xy: TileIndex, date: Date) -> Self {
        Self {
            id,
            kind,
            owner,
            town,
            xy,
            name: None,
            string_id: DefaultName::Fallback,
            indtype: None,
            build_date: date,
            facilities: Facilities::default(),
            rect: StationRect::default(),
            train_station: TileArea::EMPTY,
            bus_station: TileArea::EMPTY,
            truck_station: TileArea::EMPTY,
            ship_station: TileArea::EMPTY,
            docking_station: TileArea::EMPTY,
            airport: Airport::default(),
            bus_stops: Vec::new(),
            truck_stops: Vec::new(),
            goods: vec![GoodsEntry::default(); NUM_CARGO],
            catchment: CatchmentTiles::default(),
            always_accepted: CargoTypes::default(),
            industry: None,
            delete_ctr: 0,
            time_since_load: 255,
            time_since_unload: 255,
            last_vehicle_type: None,
        }
    }

    pub fn is_in_use(&self) -> bool {
        self.facilities.in_use()
    }

    pub fn is_waypoint(&self) -> bool {
        self.kind == StationKind::Waypoint
    }

    /// Add a facility, moving the sign to `xy` if nothing else was built yet.
    pub fn add_facility(&mut self, facility: u8, xy: TileIndex) {
        self.facilities.set(facility);
        if !self.is_in_use_except(facility) {
            self.xy = xy;
        }
    }

    fn is_in_use_except(&self, facility: u8) -> bool {
        self.facilities.0 & !(facility | Facilities::WAYPOINT) != 0
    }

    pub fn road_stops(&self, stop_type: RoadStopType) -> &Vec<RoadStop> {
        match stop_type {
            RoadStopType::Bus => &self.bus_stops,
            RoadStopType::Truck => &self.truck_stops,
        }
    }

    pub fn road_stops_mut(&mut self, stop_type: RoadStopType) -> &mut Vec<RoadStop> {
        match stop_type {
            RoadStopType::Bus => &mut self.bus_stops,
            RoadStopType::Truck => &mut self.truck_stops,
        }
    }

    pub fn road_stop_area_mut(&mut self, stop_type: RoadStopType) -> &mut TileArea {
        match stop_type {
            RoadStopType::Bus => &mut self.bus_station,
            RoadStopType::Truck => &mut self.truck_station,
        }
    }

    /// Clamp the sign into the footprint.
    pub fn clamp_sign(&mut self) {
        if self.rect.is_empty() {
            return;
        }
        let x = i32::from(self.xy.x).clamp(self.rect.left, self.rect.right);
        let y = i32::from(self.xy.y).clamp(self.rect.top, self.rect.bottom);
        self.xy = TileIndex::new(x as u16, y as u16);
    }
}

/// Station arena. Ids are slot indices; freed slots are reused lowest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationPool {
    slots: Vec<Option<Station>>,
}

impl StationPool {
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn can_allocate(&self, max: usize) -> bool {
        self.len() < max
    }

    fn next_free(&self) -> usize {
        self.slots
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.slots.len())
    }

    /// Id the next allocation will get.
    pub fn peek_id(&self) -> StationId {
        StationId(self.next_free() as u16)
    }

    /// Insert a station built by `make` for the allocated id.
    pub fn allocate(&mut self, make: impl FnOnce(StationId) -> Station) -> StationId {
        let slot = self.next_free();
        let id = StationId(slot as u16);
        let station = make(id);
        debug_assert_eq!(station.id, id);
        if slot == self.slots.len() {
            self.slots.push(Some(station));
        } else {
            self.slots[slot] = Some(station);
        }
        id
    }

    pub fn get(&self, id: StationId) -> Option<&Station> {
        self.slots.get(usize::from(id.0)).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: StationId) -> Option<&mut Station> {
        self.slots.get_mut(usize::from(id.0)).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: StationId) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&mut self, id: StationId) -> Option<Station> {
        let removed = self.slots.get_mut(usize::from(id.0)).and_then(Option::take);
        while matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Station> {
        self.slots.iter_mut().flatten()
    }

    pub fn ids(&self) -> Vec<StationId> {
        self.iter().map(|s| s.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Owner;

    fn make(id: StationId) -> Station {
        Station::new(
            id,
            StationKind::Station,
            Owner::None,
            TownId(0),
            TileIndex::new(0, 0),
            Date::default(),
        )
    }

    #[test]
    fn test_pool_reuses_lowest_id() {
        let mut pool = StationPool::default();
        let a = pool.allocate(make);
        let b = pool.allocate(make);
        let c = pool.allocate(make);
        assert_eq!((a, b, c), (StationId(0), StationId(1), StationId(2)));

        pool.remove(b);
        assert_eq!(pool.peek_id(), StationId(1));
        assert_eq!(pool.allocate(make), StationId(1));
        assert_eq!(pool.len(), 3);
        assert!(!pool.can_allocate(3));
    }

    #[test]
    fn test_facilities_in_use_ignores_waypoint_flag() {
        let mut f = Facilities::default();
        f.set(Facilities::WAYPOINT);
        assert!(!f.in_use());
        f.set(Facilities::TRAIN);
        assert!(f.in_use());
        f.reset(Facilities::TRAIN);
        assert!(!f.in_use());
    }

    #[test]
    fn test_new_goods_entry_defaults() {
        let ge = GoodsEntry::default();
        assert_eq!(ge.rating, INITIAL_STATION_RATING);
        assert!(!ge.has_rating());
        assert!(!ge.has_vehicle_ever_tried_loading());
        assert!(ge.link_graph.is_none());
    }
}
