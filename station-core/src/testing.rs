//! Builders and collaborator doubles for tests and scenarios.

use crate::cargo::{CargoArray, CargoType, CargoTypes};
use crate::command::{estimate_command, execute_command, CommandResult};
use crate::config::StationSettings;
use crate::input::Command;
use crate::map::{Map, Owner, RailTile, RailType, RoadBits, RoadPiece, RoadTile, RoadType, Slope, TileArea, TileIndex, TileKind, TrackBits, WaterClass};
use crate::services::{AllowAll, CargoSources, LinkRefresh, NoHooks, Services, TrainEnds, VehicleTracker};
use crate::state::{Company, CompanyId, Date, Industry, IndustryId, IndustryTypeId, StationId, Town, TownId, VehicleId, World};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

pub struct WorldBuilder {
    world: World,
}

impl WorldBuilder {
    /// A flat 64x64 map with one town, "Sunnyvale", in the middle and two
    /// companies.
    pub fn new() -> Self {
        let mut world = World::new(Map::new(64, 64), 0);
        world.towns.push(Town::new(TownId(0), "Sunnyvale", TileIndex::new(32, 32)));
        for id in [CompanyId(0), CompanyId(1)] {
            world.companies.insert(
                id,
                Company {
                    id,
                    name: format!("Company {}", id.0 + 1),
                    infrastructure: Default::default(),
                },
            );
        }
        world.local_company = Some(CompanyId(0));
        Self { world }
    }

    /// A flat map without towns or companies.
    pub fn blank(size_x: u16, size_y: u16) -> Self {
        Self {
            world: World::new(Map::new(size_x, size_y), 0),
        }
    }

    pub fn with_company(mut self, id: CompanyId, name: &str) -> Self {
        self.world.companies.insert(
            id,
            Company {
                id,
                name: name.to_string(),
                infrastructure: Default::default(),
            },
        );
        self
    }

    pub fn with_local_company(mut self, id: Option<CompanyId>) -> Self {
        self.world.local_company = id;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        use rand::SeedableRng;
        self.world.rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
        self
    }

    pub fn with_settings(mut self, settings: StationSettings) -> Self {
        self.world.settings = settings;
        self
    }

    pub fn with_date(mut self, year: i32, month: u8, day: u8) -> Self {
        self.world.date = Date::from_ymd(year, month, day);
        self
    }

    pub fn with_town(mut self, name: &str, xy: TileIndex) -> Self {
        let id = TownId(self.world.towns.len() as u16);
        self.world.towns.push(Town::new(id, name, xy));
        self
    }

    /// Sea and river tiles belong to nobody; canals too, until built on.
    pub fn with_water(mut self, area: TileArea, class: WaterClass) -> Self {
        for t in area.iter() {
            let tile = self.world.map.get_mut(t);
            tile.kind = TileKind::Water(class);
            tile.owner = Owner::Water;
            tile.height = 0;
            tile.slope = Slope::FLAT;
        }
        self
    }

    pub fn with_slope(mut self, tile: TileIndex, slope: Slope, height: u8) -> Self {
        let t = self.world.map.get_mut(tile);
        t.slope = slope;
        t.height = height;
        self
    }

    pub fn with_rail(mut self, area: TileArea, tracks: TrackBits, owner: Owner) -> Self {
        for t in area.iter() {
            let tile = self.world.map.get_mut(t);
            tile.kind = TileKind::Rail(RailTile {
                rail_type: RailType::Rail,
                tracks,
                reserved: TrackBits::NONE,
                signals: false,
            });
            tile.owner = owner;
        }
        if let Some(infra) = self.world.infrastructure_mut(owner) {
            *infra.rail_mut(RailType::Rail) += tracks.count() * area.iter().count() as u32;
        }
        self
    }

    /// Plain road owned by `owner`. Town roads are tagged with the town
    /// closest to them.
    pub fn with_road(mut self, area: TileArea, bits: RoadBits, owner: Owner) -> Self {
        for t in area.iter() {
            let town = (owner == Owner::Town).then(|| self.world.closest_town(t)).flatten();
            let tile = self.world.map.get_mut(t);
            tile.kind = TileKind::Road(RoadTile {
                bits,
                road: Some(RoadPiece {
                    road_type: RoadType::Road,
                    owner,
                }),
                tram: None,
                town,
            });
            tile.owner = owner;
        }
        if let Some(infra) = self.world.infrastructure_mut(owner) {
            *infra.road_mut(RoadType::Road) += bits.count() * area.iter().count() as u32;
        }
        self
    }

    pub fn with_industry(mut self, id: IndustryId, location: TileArea, produced: Vec<CargoType>) -> Self {
        for t in location.iter() {
            self.world.map.get_mut(t).kind = TileKind::Industry(id);
        }
        let town = self.world.closest_town(location.tile).unwrap_or(TownId(0));
        self.world.industries.insert(
            id,
            Industry {
                id,
                industry_type: IndustryTypeId(0),
                location,
                town,
                produced,
                neutral_station: None,
            },
        );
        self
    }

    pub fn build(self) -> World {
        self.world
    }
}

impl Default for WorldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Collaborator doubles
// ============================================================================

/// Vehicles described up front. Records what the station code asked of
/// them.
#[derive(Debug, Default)]
pub struct ScriptedVehicles {
    trains: FxHashMap<VehicleId, TrainEnds>,
    reservations: FxHashMap<TileIndex, VehicleId>,
    on_tile: FxHashMap<TileIndex, VehicleId>,
    serving: Vec<(StationId, StationId, VehicleId)>,
    refreshes: FxHashMap<VehicleId, Vec<LinkRefresh>>,
    parked_since: Option<Date>,
    aircraft: BTreeSet<StationId>,
    next_id: u32,
    /// Trains whose reservation was freed, in order.
    pub freed: Vec<VehicleId>,
    /// Trains asked to find a new path, in order.
    pub path_requests: Vec<VehicleId>,
    /// `(station, cargo, avoided hop)` for every loading-cargo reroute.
    pub rerouted: Vec<(StationId, CargoType, StationId)>,
}

impl ScriptedVehicles {
    fn fresh_id(&mut self) -> VehicleId {
        self.next_id += 1;
        VehicleId(1000 + self.next_id)
    }

    /// A train whose ends sit at `ends`, holding the reservation under both.
    pub fn with_train(mut self, train: VehicleId, ends: TrainEnds) -> Self {
        self.trains.insert(train, ends);
        self.reservations.insert(ends.head, train);
        self.reservations.insert(ends.tail, train);
        self
    }

    pub fn with_reservation(mut self, tile: TileIndex, train: VehicleId) -> Self {
        self.reservations.insert(tile, train);
        self
    }

    pub fn with_vehicle_on(mut self, tile: TileIndex, vehicle: VehicleId) -> Self {
        self.on_tile.insert(tile, vehicle);
        self
    }

    /// A consist serving `from` then `to` that reports `refresh` when its
    /// links are refreshed.
    pub fn with_link_refresh(mut self, from: StationId, to: StationId, refresh: LinkRefresh) -> Self {
        let v = self.fresh_id();
        self.serving.push((from, to, v));
        self.refreshes.entry(v).or_default().push(refresh);
        self
    }

    /// Every scripted consist stands stopped in a depot since `since`.
    pub fn with_parked_vehicles(mut self, since: Date) -> Self {
        self.parked_since = Some(since);
        self
    }

    pub fn with_aircraft_at(mut self, station: StationId) -> Self {
        self.aircraft.insert(station);
        self
    }
}

impl VehicleTracker for ScriptedVehicles {
    fn vehicle_on_tile(&self, tile: TileIndex) -> Option<VehicleId> {
        self.on_tile.get(&tile).copied()
    }

    fn train_for_reservation(&self, tile: TileIndex) -> Option<VehicleId> {
        self.reservations.get(&tile).copied()
    }

    fn free_track_reservation(&mut self, train: VehicleId) {
        self.freed.push(train);
    }

    fn try_path_reserve(&mut self, train: VehicleId) -> bool {
        self.path_requests.push(train);
        true
    }

    fn train_ends(&self, train: VehicleId) -> Option<TrainEnds> {
        self.trains.get(&train).copied()
    }

    fn consists_serving(&self, from: StationId, to: StationId) -> Vec<VehicleId> {
        self.serving
            .iter()
            .filter(|(f, t, _)| *f == from && *t == to)
            .map(|(_, _, v)| *v)
            .collect()
    }

    fn stopped_in_depot_since(&self, vehicle: VehicleId) -> Option<Date> {
        self.parked_since.filter(|_| self.refreshes.contains_key(&vehicle))
    }

    fn refresh_links(&mut self, vehicle: VehicleId) -> Vec<LinkRefresh> {
        self.refreshes.get(&vehicle).cloned().unwrap_or_default()
    }

    fn reroute_loading_cargo(&mut self, station: StationId, cargo: CargoType, avoid: StationId) {
        self.rerouted.push((station, cargo, avoid));
    }

    fn aircraft_in_the_way(&self, station: StationId) -> bool {
        self.aircraft.contains(&station)
    }
}

/// Acceptance and production per tile, in 1/8 units.
#[derive(Debug, Clone, Default)]
pub struct TableCargoSources {
    acceptance: FxHashMap<TileIndex, Vec<(CargoType, u32)>>,
    production: FxHashMap<TileIndex, Vec<(CargoType, u32)>>,
    /// Tiles that accept a cargo regardless of amount.
    always: FxHashMap<TileIndex, Vec<CargoType>>,
}

impl TableCargoSources {
    pub fn with_acceptance(mut self, tile: TileIndex, cargo: CargoType, amount: u32) -> Self {
        self.acceptance.entry(tile).or_default().push((cargo, amount));
        self
    }

    pub fn with_production(mut self, tile: TileIndex, cargo: CargoType, amount: u32) -> Self {
        self.production.entry(tile).or_default().push((cargo, amount));
        self
    }

    pub fn with_always_accepted(mut self, tile: TileIndex, cargo: CargoType) -> Self {
        self.always.entry(tile).or_default().push(cargo);
        self
    }
}

impl CargoSources for TableCargoSources {
    fn accepted(&self, _world: &World, tile: TileIndex, acceptance: &mut CargoArray, always_accepted: &mut CargoTypes) {
        for (cargo, amount) in self.acceptance.get(&tile).into_iter().flatten() {
            acceptance.add(*cargo, *amount);
        }
        for cargo in self.always.get(&tile).into_iter().flatten() {
            always_accepted.set(*cargo);
        }
    }

    fn produced(&self, _world: &World, tile: TileIndex, production: &mut CargoArray) {
        for (cargo, amount) in self.production.get(&tile).into_iter().flatten() {
            production.add(*cargo, *amount);
        }
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A world plus collaborators, for driving commands the way the game does.
pub struct Harness {
    pub world: World,
    pub vehicles: ScriptedVehicles,
    pub cargo: TableCargoSources,
}

impl Harness {
    pub fn new() -> Self {
        Self::from_world(WorldBuilder::new().build())
    }

    pub fn from_world(world: World) -> Self {
        Self {
            world,
            vehicles: ScriptedVehicles::default(),
            cargo: TableCargoSources::default(),
        }
    }

    pub fn with_vehicles(mut self, vehicles: ScriptedVehicles) -> Self {
        self.vehicles = vehicles;
        self
    }

    pub fn with_cargo(mut self, cargo: TableCargoSources) -> Self {
        self.cargo = cargo;
        self
    }

    /// Call `f` with the world and a services bundle over the harness
    /// collaborators.
    pub fn call<R>(&mut self, f: impl FnOnce(&mut World, &mut Services<'_>) -> R) -> R {
        let mut services = Services {
            vehicles: &mut self.vehicles,
            authority: &AllowAll,
            cargo: &self.cargo,
            hooks: &NoHooks,
        };
        f(&mut self.world, &mut services)
    }

    /// Dry run and execute `cmd` for `company`.
    pub fn run(&mut self, company: Owner, cmd: &Command) -> CommandResult {
        self.call(|world, services| execute_command(world, services, company, cmd))
    }

    pub fn estimate(&mut self, company: Owner, cmd: &Command) -> CommandResult {
        self.call(|world, services| estimate_command(world, services, company, cmd))
    }

    /// Run `n` simulation ticks without commands.
    pub fn tick(&mut self, n: u32) {
        for _ in 0..n {
            self.call(crate::step::on_tick);
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_methods() {
        let world = WorldBuilder::default()
            .with_water(TileArea::new(TileIndex::new(0, 0), 4, 1), WaterClass::Sea)
            .with_road(TileArea::new(TileIndex::new(0, 5), 3, 1), RoadBits::X, Owner::Town)
            .with_town("Lakeside", TileIndex::new(2, 2))
            .build();

        assert!(world.map.get(TileIndex::new(3, 0)).is_water());
        assert_eq!(world.map.get(TileIndex::new(3, 0)).owner, Owner::Water);
        assert_eq!(world.towns.len(), 2);
        assert!(matches!(
            world.map.get(TileIndex::new(1, 5)).kind,
            TileKind::Road(RoadTile { town: Some(TownId(0)), .. })
        ));
        assert_eq!(world.companies.len(), 2);
    }

    #[test]
    fn test_table_sources() {
        let tile = TileIndex::new(3, 3);
        let sources = TableCargoSources::default()
            .with_acceptance(tile, CargoType(0), 5)
            .with_acceptance(tile, CargoType(0), 4)
            .with_always_accepted(tile, CargoType(5));
        let world = WorldBuilder::new().build();
        let mut acceptance = CargoArray::default();
        let mut always = CargoTypes::default();
        sources.accepted(&world, tile, &mut acceptance, &mut always);
        assert_eq!(acceptance.get(CargoType(0)), 9);
        assert!(always.has(CargoType(5)));
    }
}
