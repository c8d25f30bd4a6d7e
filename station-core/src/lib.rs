//! # Station Simulation Core
//!
//! Deterministic station subsystem for a tile-based transport simulation.
//!
//! This crate implements the station side of the game loop: companies
//! issue commands that build and remove station parts, and the periodic
//! tick keeps ratings, waiting cargo, acceptance and the cargo link graphs
//! up to date.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────┐     ┌─────────────┐
//! │  Companies   │────▶│ CompanyInputs │────▶│ step_world  │
//! │  (commands)  │     │ (dry run+exec)│     │ (&mut World)│
//! └──────────────┘     └───────────────┘     └──────┬──────┘
//!                                                   │
//!                      ┌───────────────┐     ┌──────▼──────┐
//!                      │   Services    │◀───▶│   on_tick   │
//!                      │ (vehicles,    │     │ (ratings,   │
//!                      │  towns, cargo)│     │  link graph)│
//!                      └───────────────┘     └──────┬──────┘
//!                                                   │
//!                                            ┌──────▼──────┐
//!                                            │  EventLog   │
//!                                            │   (news)    │
//!                                            └─────────────┘
//! ```
//!
//! ## Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`World`] | Complete subsystem state (map, stations, link graphs) |
//! | [`Command`] | Company actions (BuildRailStation, RemoveRoadStop, etc.) |
//! | [`execute_command`] | Dry run, then execute: `(world, company, cmd) -> cost` |
//! | [`step_world`] | Apply inputs and advance one tick |
//! | [`Services`] | Collaborators owned elsewhere (vehicles, towns, cargo sources) |
//! | [`StationEvent`] | News about stations, recorded in the [`EventLog`] |
//!
//! ## Collaborators
//!
//! Vehicles, towns and industries live outside this crate. The station code
//! reaches them through the traits in [`services`]:
//! - [`VehicleTracker`]: occupancy, train reservations, link refreshes
//! - [`LocalAuthority`]: town permission for new stations
//! - [`CargoSources`]: per-tile acceptance and production
//! - [`ScriptHooks`]: rating overrides supplied by content scripts

pub mod airport;
pub mod cargo;
pub mod catchment;
pub mod command;
pub mod config;
pub mod flow_stat;
pub mod input;
pub mod landscape;
pub mod link_graph;
pub mod map;
pub mod naming;
pub mod news;
pub mod reservation;
pub mod road_stop;
pub mod services;
pub mod state;
pub mod station;
pub mod station_rect;
pub mod step;
pub mod systems;
pub mod testing;
pub mod tile_procs;

pub use cargo::{CargoType, StationCargoList};
pub use command::{estimate_command, execute_command, CommandCost, CommandError, CommandResult, NEW_STATION};
pub use config::{PriceTable, StationSettings};
pub use input::{Command, CompanyInputs};
pub use link_graph::{LinkGraph, LinkGraphId};
pub use map::{Map, Owner, TileArea, TileIndex};
pub use news::{EventLog, StationEvent};
pub use services::{AllowAll, CargoSources, LocalAuthority, NoHooks, NoVehicles, ScriptHooks, Services, VehicleTracker};
pub use state::{CompanyId, Date, StationId, World};
pub use station::{GoodsEntry, Station};
pub use step::{on_tick, step_world, CommandOutcome};
