use crate::map::{RailType, RoadType};
use crate::state::{Climate, Money};
use serde::{Deserialize, Serialize};

/// Game settings consulted by station construction and the periodic systems.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationSettings {
    /// Maximum width/height of a station's bounding rectangle.
    pub station_spread: u16,
    /// Allow joining a station that does not touch the new tiles.
    pub distant_join_stations: bool,
    /// Allow building a new station directly adjacent to an existing one.
    pub adjacent_stations: bool,
    /// Use per-facility catchment radii instead of the uniform default.
    pub modified_catchment: bool,
    /// Let company stations serve industries that own a neutral station.
    pub serve_neutral_industries: bool,
    pub build_on_slopes: bool,
    pub autoslope: bool,
    /// Ratings decay away for cargo that no vehicle ever tried to load.
    pub selectgoods: bool,
    pub road_stop_on_town_road: bool,
    pub road_stop_on_competitor_road: bool,
    /// Towns limit airports by the noise they generate.
    pub station_noise_level: bool,
    /// 0 = permissive, 1 = tolerant, 2 = hostile.
    pub town_council_tolerance: u8,
    /// Cheat: every rated cargo sits at the maximum rating.
    pub cheat_max_rating: bool,
    pub climate: Climate,
    /// Upper bound on simultaneously allocated stations.
    pub max_stations: usize,
    pub max_road_stops: usize,
    pub max_link_graphs: usize,
}

impl Default for StationSettings {
    fn default() -> Self {
        Self {
            station_spread: 12,
            distant_join_stations: true,
            adjacent_stations: true,
            modified_catchment: true,
            serve_neutral_industries: true,
            build_on_slopes: true,
            autoslope: true,
            selectgoods: true,
            road_stop_on_town_road: true,
            road_stop_on_competitor_road: true,
            station_noise_level: false,
            town_council_tolerance: 0,
            cheat_max_rating: false,
            climate: Climate::Temperate,
            max_stations: 64000,
            max_road_stops: 64000,
            max_link_graphs: 64000,
        }
    }
}

/// Base construction and clearing prices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceTable {
    pub build_station_rail: Money,
    pub build_station_rail_length: Money,
    pub build_station_airport: Money,
    pub build_station_bus: Money,
    pub build_station_truck: Money,
    pub build_station_dock: Money,
    pub build_foundation: Money,
    pub build_rail: Money,
    pub build_road: Money,
    pub clear_grass: Money,
    pub clear_trees: Money,
    pub clear_rail: Money,
    pub clear_road: Money,
    pub clear_water: Money,
    pub clear_station_rail: Money,
    pub clear_station_airport: Money,
    pub clear_station_bus: Money,
    pub clear_station_truck: Money,
    pub clear_station_dock: Money,
    pub clear_waypoint_rail: Money,
    pub build_waypoint_rail: Money,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            build_station_rail: 609,
            build_station_rail_length: 7812,
            build_station_airport: 614,
            build_station_bus: 2109,
            build_station_truck: 3515,
            build_station_dock: 1890,
            build_foundation: 234,
            build_rail: 384,
            build_road: 500,
            clear_grass: 20,
            clear_trees: 1093,
            clear_rail: 60,
            clear_road: 380,
            clear_water: 4000,
            clear_station_rail: 546,
            clear_station_airport: 703,
            clear_station_bus: 250,
            clear_station_truck: 375,
            clear_station_dock: 1000,
            clear_waypoint_rail: 546,
            build_waypoint_rail: 781,
        }
    }
}

impl PriceTable {
    /// Price of one piece of track of the given type.
    pub fn rail_build_cost(&self, rt: RailType) -> Money {
        let multiplier = match rt {
            RailType::Rail => 8,
            RailType::Electric => 12,
            RailType::Monorail => 16,
            RailType::Maglev => 24,
        };
        self.build_rail * multiplier / 8
    }

    pub fn road_build_cost(&self, rt: RoadType) -> Money {
        match rt {
            RoadType::Road => self.build_road,
            RoadType::Tram => self.build_road * 3 / 2,
        }
    }
}
