use anyhow::{Context, Result};
use clap::Parser;
use station_core::link_graph::EdgeUpdateModes;
use station_core::naming::station_name;
use station_core::station::{Facilities, Station};
use station_core::systems::{increase_stats, move_goods_to_station, record_pickup, stations_near};
use station_core::{step_world, AllowAll, NoHooks, NoVehicles, Services, World};
use std::path::PathBuf;

mod loader;

use loader::{Scenario, Traffic};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a station scenario and report the result", long_about = None)]
struct Args {
    /// Scenario file (JSON)
    scenario: PathBuf,

    /// Number of ticks to run; defaults to the scenario's own count
    #[arg(short, long)]
    ticks: Option<u32>,

    /// Write the final world state to this file as JSON
    #[arg(long)]
    save: Option<PathBuf>,

    /// Print the news events recorded during the run
    #[arg(long)]
    events: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Drive the station systems the way vehicles and industries would.
fn apply_traffic(world: &mut World, traffic: &[Traffic], tick: u64) {
    for t in traffic {
        if t.every() == 0 || tick % t.every() != 0 {
            continue;
        }
        match *t {
            Traffic::Produce { area, cargo, amount, .. } => {
                let stations = stations_near(world, &area);
                let moved = move_goods_to_station(world, cargo, amount, &stations, None);
                log::trace!("produced {} of cargo {:?} near {}, {} moved", amount, cargo, area.tile, moved);
            }
            Traffic::Pickup {
                station,
                cargo,
                vehicle,
                speed,
                age,
                ..
            } => record_pickup(world, station, cargo, vehicle, speed, age),
            Traffic::Link {
                from,
                to,
                cargo,
                capacity,
                usage,
                travel_time,
                ..
            } => {
                let modes = EdgeUpdateModes(EdgeUpdateModes::INCREASE | EdgeUpdateModes::UNRESTRICTED);
                increase_stats(world, from, to, cargo, capacity, usage, travel_time, modes);
            }
        }
    }
}

fn facility_names(st: &Station) -> String {
    const NAMES: [(u8, &str); 6] = [
        (Facilities::TRAIN, "train"),
        (Facilities::BUS_STOP, "bus"),
        (Facilities::TRUCK_STOP, "truck"),
        (Facilities::AIRPORT, "airport"),
        (Facilities::DOCK, "dock"),
        (Facilities::WAYPOINT, "waypoint"),
    ];
    let names: Vec<_> = NAMES
        .iter()
        .filter(|(f, _)| st.facilities.has(*f))
        .map(|(_, name)| *name)
        .collect();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(",")
    }
}

fn print_report(world: &World) {
    println!("Date: {} (tick {})", world.date, world.tick_counter);
    println!("Stations: {}", world.stations.len());
    for st in world.stations.iter() {
        println!(
            "Station {} '{}' owner {:?} facilities {}",
            st.id,
            station_name(world, st),
            st.owner,
            facility_names(st)
        );
        for (c, ge) in st.goods.iter().enumerate() {
            if !ge.has_rating() && ge.cargo.total_count() == 0 {
                continue;
            }
            let label = world.cargos.get(c).map_or("?", |spec| spec.label.as_str());
            println!(
                "  {}: waiting {}, rating {}%",
                label,
                ge.cargo.total_count(),
                u32::from(ge.rating) * 100 / 255
            );
        }
    }
    println!("Link graphs: {}", world.link_graphs.len());
    println!("Events: {}", world.news.events().len());
}

fn run(scenario: &Scenario, ticks: u32) -> Result<World> {
    let mut world = scenario.build_world().context("Failed to build world")?;
    let cargo = scenario.cargo_sources()?;
    let mut vehicles = NoVehicles;
    let mut services = Services {
        vehicles: &mut vehicles,
        authority: &AllowAll,
        cargo: &cargo,
        hooks: &NoHooks,
    };

    log::info!("Initial date: {}", world.date);
    for tick in 0..u64::from(ticks) {
        apply_traffic(&mut world, &scenario.traffic, tick);
        let inputs = scenario.inputs_at(tick);
        for outcome in step_world(&mut world, &mut services, &inputs) {
            match &outcome.result {
                Ok(cost) => log::info!(
                    "Tick {}: company {} {:?} cost {}",
                    tick,
                    outcome.company.0,
                    outcome.command,
                    cost.cost
                ),
                Err(e) => println!("Tick {}: company {} command failed: {}", tick, outcome.company.0, e),
            }
        }
    }
    log::info!("Simulation finished at {}", world.date);
    Ok(world)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = std::str::FromStr::from_str(&args.log_level).unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .init();

    log::info!("Starting stationsim...");

    let scenario = loader::load_scenario(&args.scenario)?;
    let ticks = args.ticks.or(scenario.ticks).unwrap_or(0);
    let world = run(&scenario, ticks)?;

    print_report(&world);
    if args.events {
        for event in world.news.events() {
            println!("{}", serde_json::to_string(event)?);
        }
    }
    if let Some(path) = &args.save {
        let json = serde_json::to_string_pretty(&world)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Saved world to {}", path.display());
    }
    Ok(())
}
