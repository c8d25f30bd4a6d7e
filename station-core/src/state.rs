use crate::cargo::{CargoSpec, CargoType};
use crate::config::{PriceTable, StationSettings};
use crate::link_graph::{LinkGraphPool, LinkGraphSchedule};
use crate::map::{Map, Owner, RailType, RoadType, TileArea, TileIndex};
use crate::news::EventLog;
use crate::station::StationPool;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Economy date, counted in days.
///
/// Uses a simplified calendar of 12 months with 30 days each; the date
/// arithmetic that matters (timeouts, compression) only looks at day counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Date(pub i32);

impl Date {
    pub const DAYS_PER_MONTH: i32 = 30;
    pub const DAYS_PER_YEAR: i32 = 360;

    pub fn from_ymd(year: i32, month: u8, day: u8) -> Self {
        Date(
            year * Self::DAYS_PER_YEAR
                + (i32::from(month) - 1) * Self::DAYS_PER_MONTH
                + (i32::from(day) - 1),
        )
    }

    pub fn year(self) -> i32 {
        self.0.div_euclid(Self::DAYS_PER_YEAR)
    }

    pub fn month(self) -> u8 {
        (self.0.rem_euclid(Self::DAYS_PER_YEAR) / Self::DAYS_PER_MONTH + 1) as u8
    }

    pub fn day(self) -> u8 {
        (self.0.rem_euclid(Self::DAYS_PER_MONTH) + 1) as u8
    }

    pub fn add_days(self, days: i32) -> Self {
        Date(self.0 + days)
    }

    /// Days elapsed since `earlier`.
    pub fn since(self, earlier: Date) -> i32 {
        self.0 - earlier.0
    }
}

impl std::fmt::Display for Date {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.year(), self.month(), self.day())
    }
}

/// Station identifier. `INVALID` doubles as the "any/local" next hop in flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StationId(pub u16);

impl StationId {
    pub const INVALID: StationId = StationId(u16::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl std::fmt::Display for StationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "#{}", self.0)
        } else {
            f.write_str("#invalid")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompanyId(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TownId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndustryId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndustryTypeId(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VehicleId(pub u32);

pub type Money = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Climate {
    #[default]
    Temperate,
    SubArctic,
    SubTropic,
    Toyland,
}

// ============================================================================
// Companies, Towns, Industries
// ============================================================================

/// Per-company infrastructure tallies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Infrastructure {
    pub rail: [u32; 4],
    pub road: [u32; 2],
    pub station: u32,
    pub airport: u32,
    pub water: u32,
}

impl Infrastructure {
    pub fn rail_mut(&mut self, rt: RailType) -> &mut u32 {
        &mut self.rail[rt as usize]
    }

    pub fn road_mut(&mut self, rt: RoadType) -> &mut u32 {
        &mut self.road[rt as usize]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub infrastructure: Infrastructure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Town {
    pub id: TownId,
    pub name: String,
    pub xy: TileIndex,
    /// Companies with a statue in this town.
    pub statues: BTreeSet<CompanyId>,
    pub exclusivity: Option<CompanyId>,
    pub exclusive_counter: u8,
    /// Noise currently generated by airports near the town.
    pub noise_reached: u16,
    pub max_noise: u16,
}

impl Town {
    pub fn new(id: TownId, name: impl Into<String>, xy: TileIndex) -> Self {
        Self {
            id,
            name: name.into(),
            xy,
            statues: BTreeSet::new(),
            exclusivity: None,
            exclusive_counter: 0,
            noise_reached: 0,
            max_noise: 8,
        }
    }
}

/// How an industry type names stations built next to it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IndustryStationName {
    /// Does not name stations.
    #[default]
    Undefined,
    /// Only blocks the oilfield and mines defaults.
    BlockOnly,
    Named(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndustrySpec {
    pub name: String,
    pub station_name: IndustryStationName,
    pub extractive: bool,
    /// Cuts trees; counts towards "Woods" names.
    pub forest: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Industry {
    pub id: IndustryId,
    pub industry_type: IndustryTypeId,
    pub location: TileArea,
    pub town: TownId,
    pub produced: Vec<CargoType>,
    /// Station owned by the industry itself (oil rigs).
    pub neutral_station: Option<StationId>,
}

// ============================================================================
// World
// ============================================================================

/// All state owned by the station subsystem plus the consulted neighbours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    pub date: Date,
    /// Ticks into the current day.
    pub date_fract: u16,
    pub tick_counter: u64,
    pub rng: ChaCha8Rng,
    pub settings: StationSettings,
    pub prices: PriceTable,
    pub map: Map,
    pub cargos: Vec<CargoSpec>,
    pub industry_specs: Vec<IndustrySpec>,
    pub companies: BTreeMap<CompanyId, Company>,
    pub towns: Vec<Town>,
    pub industries: BTreeMap<IndustryId, Industry>,
    pub stations: StationPool,
    pub link_graphs: LinkGraphPool,
    pub schedule: LinkGraphSchedule,
    /// Company whose player receives notifications.
    pub local_company: Option<CompanyId>,
    pub news: EventLog,
}

impl World {
    pub fn new(map: Map, seed: u64) -> Self {
        Self {
            date: Date::from_ymd(1950, 1, 1),
            date_fract: 0,
            tick_counter: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            settings: StationSettings::default(),
            prices: PriceTable::default(),
            map,
            cargos: crate::cargo::default_cargos(),
            industry_specs: Vec::new(),
            companies: BTreeMap::new(),
            towns: Vec::new(),
            industries: BTreeMap::new(),
            stations: StationPool::default(),
            link_graphs: LinkGraphPool::default(),
            schedule: LinkGraphSchedule::default(),
            local_company: None,
            news: EventLog::default(),
        }
    }

    pub fn cargo(&self, cargo: CargoType) -> Option<&CargoSpec> {
        self.cargos.get(usize::from(cargo.0))
    }

    pub fn town(&self, id: TownId) -> Option<&Town> {
        self.towns.get(usize::from(id.0))
    }

    pub fn industry_spec(&self, id: IndustryTypeId) -> Option<&IndustrySpec> {
        self.industry_specs.get(usize::from(id.0))
    }

    /// Closest town by Manhattan distance; ties go to the lower id.
    pub fn closest_town(&self, tile: TileIndex) -> Option<TownId> {
        self.towns
            .iter()
            .min_by_key(|t| (tile.distance_manhattan(t.xy), t.id))
            .map(|t| t.id)
    }

    pub fn infrastructure_mut(&mut self, owner: Owner) -> Option<&mut Infrastructure> {
        let id = owner.company()?;
        self.companies.get_mut(&id).map(|c| &mut c.infrastructure)
    }

    /// Owner as a notification target: only the local company sees news.
    pub fn is_local(&self, owner: Owner) -> bool {
        matches!((owner, self.local_company), (Owner::Company(a), Some(b)) if a == b)
    }
}
