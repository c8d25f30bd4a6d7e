//! Scenario files: a map, towns, companies and a timeline of commands.
//!
//! ```json
//! {
//!   "seed": 7,
//!   "map": { "width": 64, "height": 64 },
//!   "towns": [{ "name": "Sunnyvale", "x": 32, "y": 32 }],
//!   "companies": [{ "id": 0, "name": "Red Rail" }],
//!   "schedule": [{ "tick": 0, "inputs": [{ "company": 0, "commands": [] }] }]
//! }
//! ```

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use station_core::cargo::CargoType;
use station_core::config::{PriceTable, StationSettings};
use station_core::input::CompanyInputs;
use station_core::map::{Owner, RoadBits, Slope, TileArea, TileIndex, TrackBits, WaterClass};
use station_core::station::VehicleType;
use station_core::state::{CompanyId, IndustryId, StationId, World};
use station_core::testing::{TableCargoSources, WorldBuilder};
use std::path::Path;

fn default_seed() -> u64 {
    12345
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MapSize {
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StartDate {
    pub year: i32,
    pub month: u8,
    pub day: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TownDef {
    pub name: String,
    pub x: u16,
    pub y: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompanyDef {
    pub id: u8,
    pub name: String,
}

/// Terrain painted onto the blank map, in file order.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerrainPatch {
    Water { area: TileArea, class: WaterClass },
    Rail { area: TileArea, tracks: TrackBits, owner: Owner },
    Road { area: TileArea, bits: RoadBits, owner: Owner },
    Slope { tile: TileIndex, slope: Slope, height: u8 },
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndustryDef {
    pub id: u16,
    pub area: TileArea,
    #[serde(default)]
    pub produces: Vec<CargoType>,
}

/// Acceptance or production of one tile, in 1/8 units.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CargoTile {
    pub tile: TileIndex,
    pub cargo: CargoType,
    pub amount: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledInputs {
    pub tick: u64,
    pub inputs: Vec<CompanyInputs>,
}

/// Stand-ins for the vehicles and industries that drive the station
/// systems in a full game. Each runs every `every` ticks.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Traffic {
    /// Cargo produced around `area`, shared among the stations serving it.
    Produce {
        every: u64,
        area: TileArea,
        cargo: CargoType,
        amount: u32,
    },
    /// A vehicle loading at `station`.
    Pickup {
        every: u64,
        station: StationId,
        cargo: CargoType,
        vehicle: VehicleType,
        speed: u32,
        age: u32,
    },
    /// A vehicle travelling from `from` to `to`.
    Link {
        every: u64,
        from: StationId,
        to: StationId,
        cargo: CargoType,
        capacity: u32,
        usage: u32,
        travel_time: u32,
    },
}

impl Traffic {
    pub fn every(&self) -> u64 {
        match self {
            Traffic::Produce { every, .. } | Traffic::Pickup { every, .. } | Traffic::Link { every, .. } => *every,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub map: MapSize,
    #[serde(default)]
    pub start: Option<StartDate>,
    #[serde(default)]
    pub settings: StationSettings,
    #[serde(default)]
    pub prices: PriceTable,
    #[serde(default)]
    pub towns: Vec<TownDef>,
    #[serde(default)]
    pub companies: Vec<CompanyDef>,
    /// Company whose player receives news; defaults to the first company.
    #[serde(default)]
    pub local_company: Option<u8>,
    #[serde(default)]
    pub terrain: Vec<TerrainPatch>,
    #[serde(default)]
    pub industries: Vec<IndustryDef>,
    #[serde(default)]
    pub acceptance: Vec<CargoTile>,
    #[serde(default)]
    pub production: Vec<CargoTile>,
    #[serde(default)]
    pub schedule: Vec<ScheduledInputs>,
    #[serde(default)]
    pub traffic: Vec<Traffic>,
    /// Ticks to run when the command line does not say.
    #[serde(default)]
    pub ticks: Option<u32>,
}

pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read scenario {}", path.display()))?;
    let scenario: Scenario =
        serde_json::from_str(&text).with_context(|| format!("Failed to parse scenario {}", path.display()))?;
    log::info!(
        "Loaded scenario {}: {}x{} map, {} towns, {} companies",
        path.display(),
        scenario.map.width,
        scenario.map.height,
        scenario.towns.len(),
        scenario.companies.len()
    );
    Ok(scenario)
}

impl Scenario {
    fn check_area(&self, area: &TileArea, what: &str) -> Result<()> {
        let inside = !area.is_empty() && area.right() < self.map.width && area.bottom() < self.map.height;
        ensure!(inside, "{} at {} ({}x{}) lies outside the map", what, area.tile, area.w, area.h);
        Ok(())
    }

    fn check_tile(&self, tile: TileIndex, what: &str) -> Result<()> {
        self.check_area(&TileArea::new(tile, 1, 1), what)
    }

    /// Build the initial world.
    pub fn build_world(&self) -> Result<World> {
        ensure!(self.map.width > 0 && self.map.height > 0, "map must not be empty");

        let mut builder = WorldBuilder::blank(self.map.width, self.map.height)
            .with_seed(self.seed)
            .with_settings(self.settings.clone());
        if let Some(start) = self.start {
            builder = builder.with_date(start.year, start.month, start.day);
        }
        for town in &self.towns {
            let xy = TileIndex::new(town.x, town.y);
            self.check_tile(xy, &format!("town {}", town.name))?;
            builder = builder.with_town(&town.name, xy);
        }
        for company in &self.companies {
            builder = builder.with_company(CompanyId(company.id), &company.name);
        }
        let local = self
            .local_company
            .or_else(|| self.companies.first().map(|c| c.id))
            .map(CompanyId);
        builder = builder.with_local_company(local);

        for patch in &self.terrain {
            builder = match *patch {
                TerrainPatch::Water { area, class } => {
                    self.check_area(&area, "water")?;
                    builder.with_water(area, class)
                }
                TerrainPatch::Rail { area, tracks, owner } => {
                    self.check_area(&area, "rail")?;
                    builder.with_rail(area, tracks, owner)
                }
                TerrainPatch::Road { area, bits, owner } => {
                    self.check_area(&area, "road")?;
                    builder.with_road(area, bits, owner)
                }
                TerrainPatch::Slope { tile, slope, height } => {
                    self.check_tile(tile, "slope")?;
                    builder.with_slope(tile, slope, height)
                }
            };
        }
        for industry in &self.industries {
            self.check_area(&industry.area, &format!("industry {}", industry.id))?;
            builder = builder.with_industry(IndustryId(industry.id), industry.area, industry.produces.clone());
        }

        let mut world = builder.build();
        world.prices = self.prices.clone();
        Ok(world)
    }

    /// Per-tile acceptance and production tables.
    pub fn cargo_sources(&self) -> Result<TableCargoSources> {
        let mut sources = TableCargoSources::default();
        for entry in &self.acceptance {
            self.check_tile(entry.tile, "acceptance")?;
            sources = sources.with_acceptance(entry.tile, entry.cargo, entry.amount);
        }
        for entry in &self.production {
            self.check_tile(entry.tile, "production")?;
            sources = sources.with_production(entry.tile, entry.cargo, entry.amount);
        }
        Ok(sources)
    }

    /// Inputs scheduled for `tick`, in file order.
    pub fn inputs_at(&self, tick: u64) -> Vec<CompanyInputs> {
        self.schedule
            .iter()
            .filter(|s| s.tick == tick)
            .flat_map(|s| s.inputs.iter().cloned())
            .collect()
    }
}
