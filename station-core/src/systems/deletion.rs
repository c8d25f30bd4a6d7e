//! Final removal of a station from the pool.

use crate::cargo::CargoType;
use crate::news::{date_string, StationEvent};
use crate::services::VehicleTracker;
use crate::state::{StationId, World};
use crate::systems::link_stats::reroute_cargo;

/// Delete station `id`: drop its link graph nodes, stop every other
/// station from routing cargo through it, and free its slot.
///
/// Graphs left without nodes are deleted and unscheduled.
#[tracing::instrument(skip_all, name = "delete_station")]
pub fn delete_station(world: &mut World, vehicles: &mut dyn VehicleTracker, id: StationId) {
    let Some(handles) = world.stations.get(id).map(|st| {
        st.goods
            .iter()
            .enumerate()
            .filter_map(|(c, ge)| ge.link_graph.map(|lg| (c, lg, ge.node)))
            .collect::<Vec<_>>()
    }) else {
        return;
    };

    for (c, lg_id, node) in handles {
        let cargo = CargoType(c as u8);
        let Some(graph) = world.link_graphs.get(lg_id) else {
            continue;
        };
        let members: Vec<(StationId, bool)> = graph
            .nodes()
            .iter()
            .map(|n| (n.station, n.has_edge_to(node)))
            .filter(|(s, _)| *s != id)
            .collect();

        for (other, links_here) in members {
            if let Some(st) = world.stations.get_mut(other) {
                st.goods[c].flows.erase_origin(id);
                if links_here {
                    st.goods[c].flows.delete_flows(id);
                }
            }
            if links_here {
                reroute_cargo(world, vehicles, other, cargo, id, other);
            }
        }

        let Some(graph) = world.link_graphs.get_mut(lg_id) else {
            continue;
        };
        if let Some(moved) = graph.remove_node(node) {
            if let Some(st) = world.stations.get_mut(moved) {
                st.goods[c].node = node;
            }
        }
        if graph.is_empty() {
            world.schedule.unqueue(lg_id);
            world.link_graphs.remove(lg_id);
            log::debug!("link graph {} emptied and deleted", lg_id);
        }
    }

    for ind in world.industries.values_mut() {
        if ind.neutral_station == Some(id) {
            ind.neutral_station = None;
        }
    }

    world.stations.remove(id);
    log::info!("station {} deleted", id);
    world.news.push(StationEvent::StationDeleted {
        date: date_string(world.date),
        station: id,
    });
}
