//! Link statistics: how vehicles feed the link graphs, and how links that
//! nobody serves any more disappear again.

use crate::cargo::{CargoType, NUM_CARGO};
use crate::link_graph::{
    EdgeUpdateModes, LinkGraphId, NodeId, COMPRESSION_INTERVAL, MIN_TIMEOUT_DISTANCE, STALE_LINK_DEPOT_TIMEOUT,
};
use crate::news::{date_string, StationEvent};
use crate::services::{LinkRefresh, VehicleTracker};
use crate::state::{Date, StationId, World};

/// One wagon or compartment of a consist leaving a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wagon {
    pub cargo: CargoType,
    pub capacity: u32,
    /// Cargo currently on board.
    pub stored: u32,
}

/// Node of `station` in the graph `lg`, adding one if the station has none.
fn ensure_node(world: &mut World, lg: LinkGraphId, station: StationId, cargo: CargoType) -> Option<NodeId> {
    let c = cargo.index();
    let st = world.stations.get(station)?;
    if st.goods[c].link_graph == Some(lg) {
        return Some(st.goods[c].node);
    }
    let (xy, accepting) = (st.xy, st.goods[c].is_accepted());
    let node = world.link_graphs.get_mut(lg)?.add_node(station, xy, accepting);
    let ge = &mut world.stations.get_mut(station)?.goods[c];
    ge.link_graph = Some(lg);
    ge.node = node;
    Some(node)
}

/// Merge two graphs of the same cargo, the smaller into the larger.
/// Returns the survivor.
fn merge_graphs(world: &mut World, a: LinkGraphId, b: LinkGraphId) -> Option<LinkGraphId> {
    let size_a = world.link_graphs.get(a)?.size();
    let size_b = world.link_graphs.get(b)?.size();
    let (survivor, absorbed) = if size_a < size_b { (b, a) } else { (a, b) };

    world.schedule.unqueue(absorbed);
    let other = world.link_graphs.remove(absorbed)?;
    let cargo = other.cargo;
    let date = world.date;
    let moved = world.link_graphs.get_mut(survivor)?.merge(other, date);
    for (station, node) in moved {
        if let Some(st) = world.stations.get_mut(station) {
            let ge = &mut st.goods[cargo.index()];
            ge.link_graph = Some(survivor);
            ge.node = node;
        }
    }

    log::debug!("link graph {} merged into {} for cargo {}", absorbed, survivor, cargo.0);
    world.news.push(StationEvent::GraphsMerged {
        date: date_string(date),
        cargo,
        survivor,
        merged: absorbed,
    });
    Some(survivor)
}

/// Record that a consist moving `cargo` from `from` to `to` offered
/// `capacity` and used `usage` of it, taking `time` ticks.
///
/// Both stations join a common graph first: a fresh one if neither has a
/// graph, the existing one if only one does, and the merge of both
/// otherwise.
#[allow(clippy::too_many_arguments)]
pub fn increase_stats(
    world: &mut World,
    from: StationId,
    to: StationId,
    cargo: CargoType,
    capacity: u32,
    usage: u32,
    time: u32,
    modes: EdgeUpdateModes,
) {
    if capacity == 0 || from == to {
        return;
    }
    let c = cargo.index();
    let (Some(lg1), Some(lg2)) = (
        world.stations.get(from).map(|st| st.goods[c].link_graph),
        world.stations.get(to).map(|st| st.goods[c].link_graph),
    ) else {
        return;
    };

    let lg = match (lg1, lg2) {
        (None, None) => {
            if !world.link_graphs.can_allocate(world.settings.max_link_graphs) {
                log::warn!("can't allocate link graph for cargo {}", cargo.0);
                return;
            }
            let lg = world.link_graphs.allocate(cargo, world.date);
            world.schedule.queue(lg);
            lg
        }
        (Some(lg), None) | (None, Some(lg)) => lg,
        (Some(a), Some(b)) if a == b => a,
        (Some(a), Some(b)) => match merge_graphs(world, a, b) {
            Some(lg) => lg,
            None => return,
        },
    };

    // The destination joins first, matching the order nodes appear in.
    let (Some(to_node), Some(from_node)) = (ensure_node(world, lg, to, cargo), ensure_node(world, lg, from, cargo))
    else {
        return;
    };
    let date = world.date;
    if let Some(graph) = world.link_graphs.get_mut(lg) {
        graph
            .node_mut(from_node)
            .update_edge(to_node, capacity, usage.min(capacity), time, modes, date);
    }
}

/// Record a consist leaving `from` for `to`. Every wagon with capacity
/// counts as an increase of its cargo's link.
pub fn increase_stats_for_consist(world: &mut World, from: StationId, to: StationId, wagons: &[Wagon], time: u32) {
    let modes = EdgeUpdateModes(EdgeUpdateModes::INCREASE);
    for w in wagons.iter().filter(|w| w.capacity > 0) {
        increase_stats(world, from, to, w.cargo, w.capacity, w.stored.min(w.capacity), time, modes);
    }
}

/// Give the cargo at `station` planned via `avoid` a new next hop that is
/// neither `avoid` nor `avoid2`, and ask vehicles loading there to do the
/// same with what they already hold.
pub fn reroute_cargo(
    world: &mut World,
    vehicles: &mut dyn VehicleTracker,
    station: StationId,
    cargo: CargoType,
    avoid: StationId,
    avoid2: StationId,
) {
    let World { stations, rng, .. } = world;
    if let Some(st) = stations.get_mut(station) {
        let ge = &mut st.goods[cargo.index()];
        let moved = ge.cargo.reroute(avoid, avoid2, &ge.flows, rng);
        if moved > 0 {
            log::trace!("station {}: rerouted {} of cargo {} away from {}", station, moved, cargo.0, avoid);
        }
    }
    vehicles.reroute_loading_cargo(station, cargo, avoid);
}

/// Apply a refresh only when both ends already share `lg`. Refreshing
/// never merges graphs here, so the graph being inspected stays valid.
fn apply_refresh_within(world: &mut World, lg: LinkGraphId, refresh: &LinkRefresh) {
    let c = refresh.cargo.index();
    let node_of = |id: StationId| {
        world
            .stations
            .get(id)
            .filter(|st| st.goods[c].link_graph == Some(lg))
            .map(|st| st.goods[c].node)
    };
    let (Some(from), Some(to)) = (node_of(refresh.from), node_of(refresh.to)) else {
        return;
    };
    if refresh.capacity == 0 || from == to {
        return;
    }
    let date = world.date;
    if let Some(graph) = world.link_graphs.get_mut(lg) {
        graph.node_mut(from).update_edge(
            to,
            refresh.capacity,
            refresh.usage.min(refresh.capacity),
            refresh.travel_time,
            refresh.modes,
            date,
        );
    }
}

/// Look at every outgoing link of station `id` and deal with the ones that
/// timed out.
///
/// A link times out after `32 + distance / 8` days without an update. The
/// vehicles serving it get a chance to refresh it first; what stays dead is
/// removed and its cargo rerouted. Links only missing unrestricted traffic
/// are restricted, links only missing restricted traffic are released.
#[tracing::instrument(skip_all, name = "delete_stale_links")]
pub fn delete_stale_links(world: &mut World, vehicles: &mut dyn VehicleTracker, id: StationId) {
    for c in 0..NUM_CARGO {
        let cargo = CargoType(c as u8);
        let Some((lg, node, from_xy)) = world
            .stations
            .get(id)
            .and_then(|st| st.goods[c].link_graph.map(|lg| (lg, st.goods[c].node, st.xy)))
        else {
            continue;
        };
        let Some(graph) = world.link_graphs.get(lg) else {
            continue;
        };
        let dests: Vec<(NodeId, StationId)> = graph
            .node(node)
            .edges()
            .iter()
            .map(|e| (e.dest, graph.node(e.dest).station))
            .collect();

        let mut to_remove = Vec::new();
        for (dest, to) in dests {
            let Some(to_xy) = world.stations.get(to).map(|st| st.xy) else {
                continue;
            };
            let timeout = MIN_TIMEOUT_DISTANCE + (from_xy.distance_manhattan(to_xy) >> 3) as i32;
            let today = world.date;
            let Some(edge) = world.link_graphs.get(lg).and_then(|g| g.node(node).edge(dest)).cloned() else {
                continue;
            };
            let stale = |d: Option<Date>| d.is_some_and(|d| today.since(d) > timeout);

            if edge.last_update().map_or(true, |d| today.since(d) > timeout) {
                let mut updated = false;
                for v in vehicles.consists_serving(id, to) {
                    let parked_long = vehicles
                        .stopped_in_depot_since(v)
                        .is_some_and(|since| today.since(since) > STALE_LINK_DEPOT_TIMEOUT);
                    if !parked_long {
                        for refresh in vehicles.refresh_links(v) {
                            apply_refresh_within(world, lg, &refresh);
                        }
                    }
                    let last = world
                        .link_graphs
                        .get(lg)
                        .and_then(|g| g.node(node).edge(dest))
                        .and_then(|e| e.last_update());
                    if last == Some(today) {
                        updated = true;
                        break;
                    }
                }

                if !updated {
                    to_remove.push(dest);
                    if let Some(st) = world.stations.get_mut(id) {
                        st.goods[c].flows.delete_flows(to);
                    }
                    reroute_cargo(world, vehicles, id, cargo, to, id);
                    log::debug!("station {}: stale link to {} removed for cargo {}", id, to, c);
                    world.news.push(StationEvent::LinkRemoved {
                        date: date_string(today),
                        cargo,
                        from: id,
                        to,
                    });
                }
            } else if stale(edge.last_unrestricted_update) {
                if let Some(e) = world.link_graphs.get_mut(lg).and_then(|g| g.node_mut(node).edge_mut(dest)) {
                    e.restrict();
                }
                if let Some(st) = world.stations.get_mut(id) {
                    st.goods[c].flows.restrict_flows(to);
                }
                reroute_cargo(world, vehicles, id, cargo, to, id);
            } else if stale(edge.last_restricted_update) {
                if let Some(e) = world.link_graphs.get_mut(lg).and_then(|g| g.node_mut(node).edge_mut(dest)) {
                    e.release();
                }
            }
        }

        let today = world.date;
        if let Some(graph) = world.link_graphs.get_mut(lg) {
            for dest in to_remove {
                graph.node_mut(node).remove_edge(dest);
            }
            if today.since(graph.last_compression) > COMPRESSION_INTERVAL {
                graph.compress(today);
                log::trace!("link graph {} compressed", lg);
            }
        }
    }
}

/// Daily flow assignment for the next graph in the schedule.
///
/// Each node's supply is spread over its outgoing links in proportion to
/// link capacity times the demand at the far end. The resulting flows
/// replace the planned flows of every station in the graph.
#[tracing::instrument(skip_all, name = "link_graph_job")]
pub fn run_link_graph_job(world: &mut World) {
    let Some(lg) = world.schedule.rotate() else {
        return;
    };
    let Some(graph) = world.link_graphs.get(lg) else {
        world.schedule.unqueue(lg);
        return;
    };
    let c = graph.cargo.index();

    let mut assigned: Vec<(StationId, StationId, u32)> = Vec::new();
    for node in graph.nodes() {
        let weights: Vec<(StationId, u64)> = node
            .edges()
            .iter()
            .map(|e| {
                let dest = graph.node(e.dest);
                (dest.station, u64::from(e.capacity) * u64::from(dest.demand.max(1)))
            })
            .collect();
        let total: u64 = weights.iter().map(|(_, w)| w).sum();
        if total == 0 || node.supply == 0 {
            continue;
        }
        for (dest, w) in weights {
            let flow = (u64::from(node.supply) * w / total) as u32;
            if flow > 0 {
                assigned.push((node.station, dest, flow));
            }
        }
    }
    let members: Vec<StationId> = graph.nodes().iter().map(|n| n.station).collect();

    for id in &members {
        if let Some(st) = world.stations.get_mut(*id) {
            st.goods[c].flows = Default::default();
        }
    }
    for (origin, via, flow) in assigned {
        if let Some(st) = world.stations.get_mut(origin) {
            st.goods[c].flows.add_flow(origin, via, flow);
        }
        if let Some(st) = world.stations.get_mut(via) {
            st.goods[c].flows.add_flow(origin, via, flow);
        }
    }
    log::trace!("link graph {}: flows assigned for {} stations", lg, members.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cargo::CargoPacket;
    use crate::map::{Owner, TileIndex};
    use crate::services::NoVehicles;
    use crate::station::{Station, StationKind};
    use crate::state::{CompanyId, TownId};
    use crate::testing::{ScriptedVehicles, WorldBuilder};

    const PASS: CargoType = CargoType(0);

    fn add(world: &mut World, x: u16, y: u16) -> StationId {
        let date = world.date;
        world.stations.allocate(|id| {
            Station::new(id, StationKind::Station, Owner::Company(CompanyId(0)), TownId(0), TileIndex::new(x, y), date)
        })
    }

    fn increase() -> EdgeUpdateModes {
        EdgeUpdateModes(EdgeUpdateModes::INCREASE | EdgeUpdateModes::UNRESTRICTED)
    }

    fn handle(world: &World, id: StationId) -> (Option<LinkGraphId>, NodeId) {
        let ge = &world.stations.get(id).unwrap().goods[PASS.index()];
        (ge.link_graph, ge.node)
    }

    #[test]
    fn test_first_link_creates_queued_graph() {
        let mut world = WorldBuilder::new().build();
        let a = add(&mut world, 5, 5);
        let b = add(&mut world, 20, 5);
        increase_stats(&mut world, a, b, PASS, 40, 10, 100, increase());

        let (lg, na) = handle(&world, a);
        let (lg_b, nb) = handle(&world, b);
        let lg = lg.unwrap();
        assert_eq!(Some(lg), lg_b);
        assert!(world.schedule.contains(lg));
        let edge = world.link_graphs.get(lg).unwrap().node(na).edge(nb).unwrap().clone();
        assert_eq!(edge.capacity, 40);
        assert_eq!(edge.usage, 10);
        assert_eq!(edge.last_unrestricted_update, Some(world.date));
    }

    #[test]
    fn test_linking_two_graphs_merges_smaller_into_larger() {
        let mut world = WorldBuilder::new().build();
        let ids: Vec<_> = (0..5).map(|i| add(&mut world, 5 + i * 5, 5)).collect();
        increase_stats(&mut world, ids[0], ids[1], PASS, 10, 0, 50, increase());
        increase_stats(&mut world, ids[1], ids[2], PASS, 10, 0, 50, increase());
        increase_stats(&mut world, ids[3], ids[4], PASS, 10, 0, 50, increase());
        let big = handle(&world, ids[0]).0.unwrap();
        let small = handle(&world, ids[3]).0.unwrap();
        assert_ne!(big, small);

        increase_stats(&mut world, ids[4], ids[0], PASS, 10, 0, 50, increase());
        assert_eq!(world.link_graphs.len(), 1);
        assert!(!world.schedule.contains(small));
        let graph = world.link_graphs.get(big).unwrap();
        assert_eq!(graph.size(), 5);
        for id in &ids {
            let (lg, node) = handle(&world, *id);
            assert_eq!(lg, Some(big));
            assert_eq!(graph.node(node).station, *id);
        }
        let (_, n3) = handle(&world, ids[3]);
        let (_, n4) = handle(&world, ids[4]);
        assert!(graph.node(n3).has_edge_to(n4));
        assert!(matches!(world.news.events().last(), Some(StationEvent::GraphsMerged { survivor, merged, .. }) if *survivor == big && *merged == small));
    }

    #[test]
    fn test_consist_skips_empty_wagons_and_caps_usage() {
        let mut world = WorldBuilder::new().build();
        let a = add(&mut world, 5, 5);
        let b = add(&mut world, 20, 5);
        let mail = CargoType(2);
        let wagons = [
            Wagon { cargo: PASS, capacity: 30, stored: 45 },
            Wagon { cargo: PASS, capacity: 20, stored: 5 },
            Wagon { cargo: mail, capacity: 0, stored: 0 },
        ];
        increase_stats_for_consist(&mut world, a, b, &wagons, 80);

        let (lg, na) = handle(&world, a);
        let (_, nb) = handle(&world, b);
        let edge = world.link_graphs.get(lg.unwrap()).unwrap().node(na).edge(nb).unwrap().clone();
        assert_eq!(edge.capacity, 50);
        assert_eq!(edge.usage, 35);
        assert!(world.stations.get(a).unwrap().goods[mail.index()].link_graph.is_none());
    }

    #[test]
    fn test_graph_allocation_limit_is_soft() {
        let mut world = WorldBuilder::new().build();
        world.settings.max_link_graphs = 0;
        let a = add(&mut world, 5, 5);
        let b = add(&mut world, 20, 5);
        increase_stats(&mut world, a, b, PASS, 40, 10, 100, increase());
        assert!(world.link_graphs.is_empty());
        assert_eq!(handle(&world, a).0, None);
    }

    fn stale_setup() -> (World, StationId, StationId) {
        let mut world = WorldBuilder::new().build();
        let a = add(&mut world, 5, 5);
        let b = add(&mut world, 21, 5);
        let c = add(&mut world, 5, 30);
        increase_stats(&mut world, a, b, PASS, 40, 10, 100, increase());
        increase_stats(&mut world, a, c, PASS, 40, 10, 100, increase());
        let ge = &mut world.stations.get_mut(a).unwrap().goods[PASS.index()];
        ge.flows.add_flow(a, b, 20);
        ge.flows.add_flow(a, c, 20);
        ge.cargo.append(CargoPacket { source: a, count: 60 }, b);
        (world, a, b)
    }

    #[test]
    fn test_fresh_links_survive() {
        let (mut world, a, _) = stale_setup();
        world.date = world.date.add_days(MIN_TIMEOUT_DISTANCE);
        delete_stale_links(&mut world, &mut NoVehicles, a);
        let (lg, na) = handle(&world, a);
        assert_eq!(world.link_graphs.get(lg.unwrap()).unwrap().node(na).edges().len(), 2);
    }

    #[test]
    fn test_dead_link_removed_and_cargo_rerouted() {
        let (mut world, a, b) = stale_setup();
        // Distance 16 adds two days to the timeout.
        world.date = world.date.add_days(MIN_TIMEOUT_DISTANCE + 3);
        world.news.drain();
        delete_stale_links(&mut world, &mut NoVehicles, a);

        let (lg, na) = handle(&world, a);
        let (_, nb) = handle(&world, b);
        let graph = world.link_graphs.get(lg.unwrap()).unwrap();
        assert!(!graph.node(na).has_edge_to(nb));
        let ge = &world.stations.get(a).unwrap().goods[PASS.index()];
        assert_eq!(ge.flows.get_flow_via(b), 0);
        assert_eq!(ge.cargo.count_for(b), 0);
        assert_eq!(ge.cargo.total_count(), 60);
        assert!(world
            .news
            .events()
            .iter()
            .any(|e| matches!(e, StationEvent::LinkRemoved { from, to, .. } if *from == a && *to == b)));
    }

    #[test]
    fn test_serving_vehicle_refreshes_link() {
        let (mut world, a, b) = stale_setup();
        world.date = world.date.add_days(MIN_TIMEOUT_DISTANCE + 3);
        let mut vehicles = ScriptedVehicles::default().with_link_refresh(
            a,
            b,
            LinkRefresh {
                from: a,
                to: b,
                cargo: PASS,
                capacity: 40,
                usage: 0,
                travel_time: 100,
                modes: EdgeUpdateModes(EdgeUpdateModes::REFRESH | EdgeUpdateModes::UNRESTRICTED),
            },
        );
        delete_stale_links(&mut world, &mut vehicles, a);

        let (lg, na) = handle(&world, a);
        let (_, nb) = handle(&world, b);
        let edge = world.link_graphs.get(lg.unwrap()).unwrap().node(na).edge(nb).unwrap().clone();
        assert_eq!(edge.last_update(), Some(world.date));
        assert_eq!(world.stations.get(a).unwrap().goods[PASS.index()].cargo.count_for(b), 60);
    }

    #[test]
    fn test_vehicle_parked_in_depot_does_not_refresh() {
        let (mut world, a, b) = stale_setup();
        world.date = world.date.add_days(STALE_LINK_DEPOT_TIMEOUT + 10);
        let parked_since = world.date.add_days(-(STALE_LINK_DEPOT_TIMEOUT + 1));
        let mut vehicles = ScriptedVehicles::default()
            .with_link_refresh(
                a,
                b,
                LinkRefresh {
                    from: a,
                    to: b,
                    cargo: PASS,
                    capacity: 40,
                    usage: 0,
                    travel_time: 100,
                    modes: EdgeUpdateModes(EdgeUpdateModes::REFRESH | EdgeUpdateModes::UNRESTRICTED),
                },
            )
            .with_parked_vehicles(parked_since);
        delete_stale_links(&mut world, &mut vehicles, a);

        let (lg, na) = handle(&world, a);
        let (_, nb) = handle(&world, b);
        assert!(!world.link_graphs.get(lg.unwrap()).unwrap().node(na).has_edge_to(nb));
    }

    #[test]
    fn test_unrestricted_timeout_restricts() {
        let mut world = WorldBuilder::new().build();
        let a = add(&mut world, 5, 5);
        let b = add(&mut world, 21, 5);
        increase_stats(&mut world, a, b, PASS, 40, 10, 100, increase());
        let restricted = EdgeUpdateModes(EdgeUpdateModes::INCREASE | EdgeUpdateModes::RESTRICTED);
        world.date = world.date.add_days(MIN_TIMEOUT_DISTANCE + 3);
        increase_stats(&mut world, a, b, PASS, 10, 0, 100, restricted);
        delete_stale_links(&mut world, &mut NoVehicles, a);

        let (lg, na) = handle(&world, a);
        let (_, nb) = handle(&world, b);
        let edge = world.link_graphs.get(lg.unwrap()).unwrap().node(na).edge(nb).unwrap().clone();
        assert_eq!(edge.last_unrestricted_update, None);
        assert_eq!(edge.last_restricted_update, Some(world.date));
    }

    #[test]
    fn test_old_graph_is_compressed() {
        let (mut world, a, _) = stale_setup();
        let lg = handle(&world, a).0.unwrap();
        world.link_graphs.get_mut(lg).unwrap().last_compression = world.date.add_days(-(COMPRESSION_INTERVAL + 1));
        delete_stale_links(&mut world, &mut NoVehicles, a);
        let (_, na) = handle(&world, a);
        let graph = world.link_graphs.get(lg).unwrap();
        assert!(graph.node(na).edges().iter().all(|e| e.capacity == 20));
    }

    #[test]
    fn test_job_assigns_flows_by_capacity() {
        let mut world = WorldBuilder::new().build();
        let a = add(&mut world, 5, 5);
        let b = add(&mut world, 20, 5);
        let c = add(&mut world, 5, 20);
        increase_stats(&mut world, a, b, PASS, 30, 0, 100, increase());
        increase_stats(&mut world, a, c, PASS, 10, 0, 100, increase());
        let (lg, na) = handle(&world, a);
        let date = world.date;
        world.link_graphs.get_mut(lg.unwrap()).unwrap().node_mut(na).update_supply(100, date);

        run_link_graph_job(&mut world);
        let flows = &world.stations.get(a).unwrap().goods[PASS.index()].flows;
        assert_eq!(flows.get_flow_from_via(a, b), 75);
        assert_eq!(flows.get_flow_from_via(a, c), 25);
        let at_b = &world.stations.get(b).unwrap().goods[PASS.index()].flows;
        assert_eq!(at_b.get_flow_from(a), 75);
    }
}
