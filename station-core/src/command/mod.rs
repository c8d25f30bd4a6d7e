//! Station construction and demolition commands.
//!
//! Every command runs in two phases. [`execute_command`] first runs it
//! without [`DoCommandFlags::EXEC`], which validates and prices the whole
//! operation without touching the world, and only runs the execute phase
//! after that succeeded. Command bodies must therefore never mutate state
//! unless `flags.exec()` is set.
//!
//! # Modules
//!
//! - [`join`]: choosing the station a new part attaches to
//! - [`rail`]: rail stations and waypoints
//! - [`road`]: bus and truck stops
//! - [`airport`]: airports, noise and open/close
//! - [`dock`]: docks and oil rigs
//! - [`rename`]: custom station names

pub mod airport;
pub mod dock;
pub mod join;
pub mod rail;
pub mod rename;
pub mod road;

use crate::input::Command;
use crate::map::Owner;
use crate::services::Services;
use crate::state::{Money, World};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use join::NEW_STATION;

/// Reasons a command can fail. The messages are what the player sees.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid command parameters")]
    Invalid,
    #[error("local authority refuses to allow another station here")]
    AuthorityRefuses,
    #[error("station too spread out")]
    StationTooSpreadOut,
    #[error("adjoins more than one existing station/loading area")]
    AdjoinsMoreThanOne,
    #[error("too many stations/loading areas")]
    TooManyStations,
    #[error("too many bus stations")]
    TooManyBusStops,
    #[error("too many truck stations")]
    TooManyTruckStops,
    #[error("flat land required")]
    FlatLandRequired,
    #[error("site unsuitable")]
    SiteUnsuitable,
    #[error("must demolish bridge first")]
    MustDemolishBridgeFirst,
    #[error("vehicle in the way")]
    VehicleInTheWay,
    #[error("aircraft in the way")]
    AircraftInTheWay,
    #[error("must remove signals first")]
    MustRemoveSignalsFirst,
    #[error("must remove railway station first")]
    MustRemoveRailStationFirst,
    #[error("must remove road stop first")]
    MustRemoveRoadStopFirst,
    #[error("must demolish railway station first")]
    MustDemolishRailStationFirst,
    #[error("must demolish airport first")]
    MustDemolishAirportFirst,
    #[error("must demolish bus station first")]
    MustDemolishBusStationFirst,
    #[error("must demolish truck station first")]
    MustDemolishTruckStationFirst,
    #[error("must demolish dock first")]
    MustDemolishDockFirst,
    #[error("must demolish waypoint first")]
    MustDemolishWaypointFirst,
    #[error("building must be demolished first")]
    BuildingMustBeDemolished,
    #[error("object in the way")]
    ObjectInTheWay,
    #[error("already built")]
    AlreadyBuilt,
    #[error("owned by {0:?}")]
    OwnedBy(Owner),
    #[error("there is no station here")]
    ThereIsNoStation,
    #[error("there is no road here")]
    ThereIsNoRoad,
    #[error("must be built on plain railway track")]
    NeedsPlainRail,
    #[error("road stop faces the wrong direction")]
    DriveThroughDirection,
    #[error("drive through stops can't be built on road corners")]
    DriveThroughCorner,
    #[error("drive through stops can't be built on junctions")]
    DriveThroughJunction,
    #[error("drive through stops can't be built on town owned roads")]
    DriveThroughOnTownRoad,
    #[error("local authority refuses to allow another airport here (noise)")]
    LocalAuthorityRefusesNoise,
    #[error("local authority refuses to allow another airport in this town")]
    LocalAuthorityRefusesAirport,
    #[error("too close to another airport")]
    TooCloseToAnotherAirport,
    #[error("name must be unique")]
    NameMustBeUnique,
    #[error("name is too long")]
    NameTooLong,
}

pub type CommandResult = Result<CommandCost, CommandError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExpenseType {
    #[default]
    Construction,
    Property,
}

/// Money a command costs (negative for refunds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandCost {
    pub cost: Money,
    pub expense: ExpenseType,
}

impl CommandCost {
    pub fn new(expense: ExpenseType) -> Self {
        Self { cost: 0, expense }
    }

    pub fn with_cost(expense: ExpenseType, cost: Money) -> Self {
        Self { cost, expense }
    }

    pub fn add_cost(&mut self, cost: Money) {
        self.cost += cost;
    }

    pub fn add(&mut self, other: CommandCost) {
        self.cost += other.cost;
    }
}

/// Command flags. Only [`DoCommandFlags::EXEC`] lets a command mutate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DoCommandFlags(pub u8);

impl DoCommandFlags {
    pub const NONE: DoCommandFlags = DoCommandFlags(0);
    pub const EXEC: DoCommandFlags = DoCommandFlags(1 << 0);
    /// Automatic clearing: refuse to demolish anything non-trivial.
    pub const AUTO: DoCommandFlags = DoCommandFlags(1 << 1);
    /// The acting company is going bankrupt; skip vehicle checks.
    pub const BANKRUPT: DoCommandFlags = DoCommandFlags(1 << 2);

    pub fn exec(self) -> bool {
        self.0 & Self::EXEC.0 != 0
    }

    pub fn auto(self) -> bool {
        self.0 & Self::AUTO.0 != 0
    }

    pub fn bankrupt(self) -> bool {
        self.0 & Self::BANKRUPT.0 != 0
    }

    pub fn with(self, other: DoCommandFlags) -> DoCommandFlags {
        DoCommandFlags(self.0 | other.0)
    }

    pub fn without(self, other: DoCommandFlags) -> DoCommandFlags {
        DoCommandFlags(self.0 & !other.0)
    }
}

/// Who runs a command and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandContext {
    pub company: Owner,
    pub flags: DoCommandFlags,
}

impl CommandContext {
    pub fn new(company: Owner, flags: DoCommandFlags) -> Self {
        Self { company, flags }
    }

    pub fn exec(&self) -> bool {
        self.flags.exec()
    }

    /// Same company, different flags.
    pub fn with_flags(&self, flags: DoCommandFlags) -> Self {
        Self {
            company: self.company,
            flags,
        }
    }
}

/// The acting company must own the object.
pub fn check_ownership(owner: Owner, company: Owner) -> Result<(), CommandError> {
    if owner == company {
        return Ok(());
    }
    Err(CommandError::OwnedBy(owner))
}

fn run(world: &mut World, services: &mut Services<'_>, ctx: &CommandContext, cmd: &Command) -> CommandResult {
    match *cmd {
        Command::BuildRailStation {
            tile,
            rail_type,
            axis,
            numtracks,
            plat_len,
            join,
            adjacent,
        } => rail::build_rail_station(
            world, services, ctx, tile, rail_type, axis, numtracks, plat_len, join, adjacent,
        ),
        Command::RemoveFromRailStation {
            start,
            end,
            keep_rail,
        } => rail::remove_from_rail_station(world, services, ctx, start, end, keep_rail),
        Command::RemoveRailStation { tile } => rail::remove_rail_station(world, services, ctx, tile),
        Command::BuildRailWaypoint {
            tile,
            axis,
            join,
            adjacent,
        } => rail::build_rail_waypoint(world, services, ctx, tile, axis, join, adjacent),
        Command::RemoveFromRailWaypoint {
            start,
            end,
            keep_rail,
        } => rail::remove_from_rail_waypoint(world, services, ctx, start, end, keep_rail),
        Command::BuildRoadStop {
            tile,
            width,
            length,
            stop_type,
            drive_through,
            direction,
            road_type,
            join,
            adjacent,
        } => road::build_road_stop(
            world,
            services,
            ctx,
            road::RoadStopParams {
                tile,
                width,
                length,
                stop_type,
                drive_through,
                direction,
                road_type,
                join,
                adjacent,
            },
        ),
        Command::RemoveRoadStop {
            tile,
            width,
            height,
            stop_type,
            remove_road,
        } => road::remove_road_stop(world, services, ctx, tile, width, height, stop_type, remove_road),
        Command::BuildAirport {
            tile,
            airport_type,
            layout,
            join,
            adjacent,
        } => airport::build_airport(world, services, ctx, tile, airport_type, layout, join, adjacent),
        Command::RemoveAirport { tile } => airport::remove_airport(world, services, ctx, tile),
        Command::OpenCloseAirport { station } => airport::open_close_airport(world, ctx, station),
        Command::BuildDock {
            tile,
            join,
            adjacent,
        } => dock::build_dock(world, services, ctx, tile, join, adjacent),
        Command::RemoveDock { tile } => dock::remove_dock(world, services, ctx, tile),
        Command::RenameStation { station, ref name } => {
            rename::rename_station(world, ctx, station, name)
        }
        Command::ClearTile { tile } => crate::tile_procs::clear_tile(world, services, ctx, tile),
    }
}

/// Run `cmd` for `company`: a full dry run, then the execute phase if the
/// dry run succeeded. Returns the cost of the execute phase, which can be
/// lower than the estimate when clearing a tile also removed its neighbours.
pub fn execute_command(
    world: &mut World,
    services: &mut Services<'_>,
    company: Owner,
    cmd: &Command,
) -> CommandResult {
    let test = CommandContext::new(company, DoCommandFlags::NONE);
    let estimate = run(world, services, &test, cmd)?;

    let exec = CommandContext::new(company, DoCommandFlags::EXEC);
    match run(world, services, &exec, cmd) {
        Ok(cost) => {
            if cost.cost != estimate.cost {
                log::debug!(
                    "{:?}: dry run estimated {} but execution cost {}",
                    cmd,
                    estimate.cost,
                    cost.cost
                );
            }
            log::trace!("{:?} by {:?} cost {}", cmd, company, cost.cost);
            Ok(cost)
        }
        Err(e) => {
            // The dry run succeeded, so this is a mismatch between the phases.
            log::error!("{:?} failed during execution after a successful dry run: {}", cmd, e);
            Err(e)
        }
    }
}

/// Validate and price `cmd` without executing it.
pub fn estimate_command(
    world: &mut World,
    services: &mut Services<'_>,
    company: Owner,
    cmd: &Command,
) -> CommandResult {
    let test = CommandContext::new(company, DoCommandFlags::NONE);
    run(world, services, &test, cmd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CompanyId;

    #[test]
    fn test_flags() {
        let flags = DoCommandFlags::EXEC.with(DoCommandFlags::AUTO);
        assert!(flags.exec());
        assert!(flags.auto());
        assert!(!flags.bankrupt());
        assert!(!flags.without(DoCommandFlags::EXEC).exec());
    }

    #[test]
    fn test_cost_accumulates() {
        let mut cost = CommandCost::new(ExpenseType::Construction);
        cost.add_cost(100);
        cost.add(CommandCost::with_cost(ExpenseType::Construction, -30));
        assert_eq!(cost.cost, 70);
    }

    #[test]
    fn test_execute_returns_execution_cost() {
        use crate::airport::AirportType;
        use crate::map::{Axis, RailType, TileIndex};
        use crate::testing::Harness;

        let me = Owner::Company(CompanyId(0));
        let mut h = Harness::new();
        let rail = Command::BuildRailStation {
            tile: TileIndex::new(41, 41),
            rail_type: RailType::Rail,
            axis: Axis::X,
            numtracks: 1,
            plat_len: 2,
            join: NEW_STATION,
            adjacent: false,
        };
        h.run(me, &rail).unwrap();

        let airport = Command::BuildAirport {
            tile: TileIndex::new(40, 40),
            airport_type: AirportType::Small,
            layout: 0,
            join: NEW_STATION,
            adjacent: false,
        };
        let mut copy = Harness::from_world(h.world.clone());
        let exec = CommandContext::new(me, DoCommandFlags::EXEC);
        let direct = copy.call(|world, services| run(world, services, &exec, &airport)).unwrap();

        let returned = h.run(me, &airport).unwrap();
        assert_eq!(returned.cost, direct.cost);
    }

    #[test]
    fn test_ownership() {
        let me = Owner::Company(CompanyId(0));
        let them = Owner::Company(CompanyId(1));
        assert!(check_ownership(me, me).is_ok());
        assert_eq!(check_ownership(them, me), Err(CommandError::OwnedBy(them)));
        assert!(check_ownership(Owner::None, me).is_err());
        assert!(check_ownership(Owner::Town, me).is_err());
    }
}
