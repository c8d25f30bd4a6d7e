//! The simulation tick.
//!
//! [`step_world`] applies the companies' commands and then runs [`on_tick`],
//! which drives every periodic station system:
//!
//! | Cadence | Work |
//! |---|---|
//! | every [`STATION_RATING_TICKS`] per station | rating update |
//! | every [`STATION_LINKGRAPH_TICKS`] per station | stale link removal |
//! | every [`STATION_ACCEPTANCE_TICKS`] per station | deletion countdown, acceptance, flooding |
//! | every [`DAY_TICKS`] | link graph job |
//! | first day of a month | goods status rollover |
//!
//! Per-station cadences are staggered by station id so that stations do
//! not all update on the same tick.

use crate::command::{execute_command, CommandResult};
use crate::input::{Command, CompanyInputs};
use crate::map::Owner;
use crate::services::Services;
use crate::station::GoodsStatus;
use crate::state::{CompanyId, StationId, World};
use crate::systems::{delete_stale_links, run_link_graph_job, update_station_rating, STATION_RATING_TICKS};
use crate::tile_procs::tile_loop;

pub const DAY_TICKS: u16 = 74;
pub const STATION_ACCEPTANCE_TICKS: u64 = 250;
pub const STATION_LINKGRAPH_TICKS: u64 = 504;
/// Big ticks an unused station survives before it is deleted.
pub const DELETE_COUNTDOWN: u8 = 8;

/// Result of one command issued during a step.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub company: CompanyId,
    pub command: Command,
    pub result: CommandResult,
}

/// Advance the world by one tick.
pub fn step_world(world: &mut World, services: &mut Services<'_>, inputs: &[CompanyInputs]) -> Vec<CommandOutcome> {
    let mut outcomes = Vec::new();
    for input in inputs {
        for cmd in &input.commands {
            let result = execute_command(world, services, Owner::Company(input.company), cmd);
            if let Err(e) = &result {
                log::warn!("Failed to execute command for company {}: {}", input.company.0, e);
            }
            outcomes.push(CommandOutcome {
                company: input.company,
                command: cmd.clone(),
                result,
            });
        }
    }

    on_tick(world, services);
    outcomes
}

/// Big tick of station `id`: count down unused stations, refresh
/// acceptance and let water flood the station's tiles.
fn station_big_tick(world: &mut World, services: &mut Services<'_>, id: StationId) {
    let Some(st) = world.stations.get_mut(id) else {
        return;
    };
    if !st.is_in_use() {
        st.delete_ctr = st.delete_ctr.saturating_add(1);
        if st.delete_ctr >= DELETE_COUNTDOWN {
            crate::systems::delete_station(world, &mut *services.vehicles, id);
        }
        return;
    }

    if !st.is_waypoint() {
        for ge in &mut st.goods {
            ge.status.set_to(GoodsStatus::ACCEPTED_BIGTICK, false);
        }
        crate::catchment::update_station_acceptance(world, services.cargo, id, false);
    }

    let tiles: Vec<_> = match world.stations.get(id) {
        Some(st) => st
            .rect
            .to_area()
            .iter()
            .filter(|t| world.map.get(*t).station_id() == Some(id))
            .collect(),
        None => return,
    };
    for t in tiles {
        tile_loop(world, services, t);
    }
}

/// Month rollover: this month's delivery flags become last month's.
fn on_new_month(world: &mut World) {
    for st in world.stations.iter_mut() {
        for ge in &mut st.goods {
            let current = ge.status.has(GoodsStatus::CURRENT_MONTH);
            ge.status.set_to(GoodsStatus::LAST_MONTH, current);
            ge.status.set_to(GoodsStatus::CURRENT_MONTH, false);
        }
    }
}

/// Run the periodic station systems for one tick.
#[tracing::instrument(skip_all, name = "on_tick")]
pub fn on_tick(world: &mut World, services: &mut Services<'_>) {
    world.tick_counter += 1;
    let tick = world.tick_counter;

    for id in world.stations.ids() {
        let Some(st) = world.stations.get(id) else {
            continue;
        };
        let (in_use, waypoint) = (st.is_in_use(), st.is_waypoint());
        let stagger = tick + u64::from(id.0);

        if in_use && !waypoint && stagger % STATION_RATING_TICKS == 0 {
            update_station_rating(world, services.hooks, id);
        }
        if !waypoint && stagger % STATION_LINKGRAPH_TICKS == 0 {
            delete_stale_links(world, &mut *services.vehicles, id);
        }
        if stagger % STATION_ACCEPTANCE_TICKS == 0 {
            station_big_tick(world, services, id);
        }
    }

    world.date_fract += 1;
    if world.date_fract >= DAY_TICKS {
        world.date_fract = 0;
        world.date = world.date.add_days(1);
        run_link_graph_job(world);
        if world.date.day() == 1 {
            on_new_month(world);
            log::debug!("new month {}", world.date);
        }
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
