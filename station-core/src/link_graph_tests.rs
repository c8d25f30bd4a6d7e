//! Unit tests for link graph maintenance.

use super::*;

const PASS: CargoType = CargoType(0);

fn modes(bits: u8) -> EdgeUpdateModes {
    EdgeUpdateModes(bits)
}

fn graph_with(n: u16) -> LinkGraph {
    let mut lg = LinkGraph::new(LinkGraphId(0), PASS, Date(100));
    for i in 0..n {
        lg.add_node(StationId(i), TileIndex::new(i * 10, 0), i % 2 == 0);
    }
    lg
}

#[test]
fn test_add_node_demand_follows_acceptance() {
    let lg = graph_with(2);
    assert_eq!(lg.node(0).demand, 1);
    assert_eq!(lg.node(1).demand, 0);
}

#[test]
fn test_new_edge_weights_travel_time_by_capacity() {
    let mut lg = graph_with(2);
    let unrestricted = modes(EdgeUpdateModes::INCREASE | EdgeUpdateModes::UNRESTRICTED);
    lg.node_mut(0).update_edge(1, 40, 10, 100, unrestricted, Date(100));
    let edge = lg.node(0).edge(1).unwrap();
    assert_eq!(edge.capacity, 40);
    assert_eq!(edge.usage, 10);
    assert_eq!(edge.travel_time_sum, 4000);
    assert_eq!(edge.travel_time(), 100);
    assert_eq!(edge.last_unrestricted_update, Some(Date(100)));
    assert_eq!(edge.last_restricted_update, None);
}

#[test]
fn test_increase_saturates_busy_link() {
    let mut lg = graph_with(2);
    let inc = modes(EdgeUpdateModes::INCREASE | EdgeUpdateModes::UNRESTRICTED);
    let half = u32::MAX / 2 + 1;
    lg.node_mut(0).update_edge(1, half, half, 1, inc, Date(100));
    lg.node_mut(0).update_edge(1, half, half, 1, inc, Date(101));
    let edge = lg.node(0).edge(1).unwrap();
    assert_eq!(edge.capacity, u32::MAX);
    assert_eq!(edge.usage, u32::MAX);
    assert_eq!(edge.travel_time_sum, 2 * u64::from(half));

    lg.node_mut(0).update_supply(u32::MAX, Date(101));
    lg.node_mut(0).update_supply(10, Date(102));
    assert_eq!(lg.node(0).supply, u32::MAX);
}

#[test]
fn test_increase_adds_and_refresh_raises() {
    let mut lg = graph_with(2);
    let inc = modes(EdgeUpdateModes::INCREASE | EdgeUpdateModes::UNRESTRICTED);
    lg.node_mut(0).update_edge(1, 40, 10, 100, inc, Date(100));
    lg.node_mut(0).update_edge(1, 20, 5, 40, inc, Date(101));
    {
        let edge = lg.node(0).edge(1).unwrap();
        assert_eq!(edge.capacity, 60);
        assert_eq!(edge.usage, 15);
        assert_eq!(edge.travel_time_sum, 4000 + 800);
    }

    let refresh = modes(EdgeUpdateModes::REFRESH | EdgeUpdateModes::RESTRICTED);
    lg.node_mut(0).update_edge(1, 30, 30, 0, refresh, Date(102));
    let edge = lg.node(0).edge(1).unwrap();
    // Refresh never lowers capacity.
    assert_eq!(edge.capacity, 60);
    assert_eq!(edge.usage, 30);
    assert_eq!(edge.last_restricted_update, Some(Date(102)));
    assert_eq!(edge.last_update(), Some(Date(102)));
}

#[test]
fn test_restrict_and_release_clear_timestamps() {
    let mut lg = graph_with(2);
    let both = modes(
        EdgeUpdateModes::INCREASE | EdgeUpdateModes::UNRESTRICTED | EdgeUpdateModes::RESTRICTED,
    );
    lg.node_mut(0).update_edge(1, 10, 0, 5, both, Date(100));
    let edge = lg.node_mut(0).edge_mut(1).unwrap();
    edge.restrict();
    assert_eq!(edge.last_unrestricted_update, None);
    assert_eq!(edge.last_update(), Some(Date(100)));
    edge.release();
    assert_eq!(edge.last_update(), None);
}

#[test]
fn test_remove_node_renumbers_last() {
    let mut lg = graph_with(3);
    let inc = modes(EdgeUpdateModes::INCREASE | EdgeUpdateModes::UNRESTRICTED);
    lg.node_mut(0).update_edge(1, 10, 0, 5, inc, Date(100));
    lg.node_mut(0).update_edge(2, 20, 0, 5, inc, Date(100));
    lg.node_mut(2).update_edge(1, 30, 0, 5, inc, Date(100));

    let moved = lg.remove_node(1);
    assert_eq!(moved, Some(StationId(2)));
    assert_eq!(lg.size(), 2);
    assert_eq!(lg.node(1).station, StationId(2));
    // Edge 0 -> 1 is gone; edge 0 -> 2 is now 0 -> 1.
    let dests: Vec<_> = lg.node(0).edges().iter().map(|e| (e.dest, e.capacity)).collect();
    assert_eq!(dests, vec![(1, 20)]);
    // Node 2's edge to the removed node is gone.
    assert!(lg.node(1).edges().is_empty());
}

#[test]
fn test_remove_last_node_moves_nothing() {
    let mut lg = graph_with(2);
    assert_eq!(lg.remove_node(1), None);
    assert_eq!(lg.size(), 1);
}

#[test]
fn test_compress_halves() {
    let mut lg = graph_with(2);
    let inc = modes(EdgeUpdateModes::INCREASE | EdgeUpdateModes::UNRESTRICTED);
    lg.node_mut(0).update_supply(41, Date(100));
    lg.node_mut(0).update_edge(1, 40, 11, 100, inc, Date(100));
    lg.node_mut(1).update_edge(0, 1, 1, 100, inc, Date(100));

    lg.compress(Date(300));
    assert_eq!(lg.last_compression, Date(200));
    assert_eq!(lg.node(0).supply, 20);
    let edge = lg.node(0).edge(1).unwrap();
    assert_eq!(edge.capacity, 20);
    assert_eq!(edge.usage, 5);
    assert_eq!(edge.travel_time(), 100);
    // Capacity never drops to zero.
    assert_eq!(lg.node(1).edge(0).unwrap().capacity, 1);
}

#[test]
fn test_merge_offsets_and_scales() {
    let mut big = graph_with(2);
    big.last_compression = Date(0);
    let mut small = LinkGraph::new(LinkGraphId(1), PASS, Date(0));
    small.last_compression = Date(50);
    let a = small.add_node(StationId(10), TileIndex::new(1, 1), true);
    let b = small.add_node(StationId(11), TileIndex::new(2, 2), false);
    let inc = modes(EdgeUpdateModes::INCREASE | EdgeUpdateModes::UNRESTRICTED);
    small.node_mut(a).update_supply(10, Date(99));
    small.node_mut(a).update_edge(b, 10, 2, 7, inc, Date(99));

    let moved = big.merge(small, Date(99));
    assert_eq!(moved, vec![(StationId(10), 2), (StationId(11), 3)]);
    assert_eq!(big.size(), 4);
    // Ages: 100 days for the survivor, 50 for the merged graph.
    assert_eq!(big.node(2).supply, 20);
    let edge = big.node(2).edge(3).unwrap();
    assert_eq!(edge.capacity, 20);
    assert_eq!(edge.usage, 4);
    assert_eq!(edge.last_unrestricted_update, Some(Date(99)));
}

#[test]
fn test_pool_and_schedule() {
    let mut pool = LinkGraphPool::default();
    let a = pool.allocate(PASS, Date(0));
    let b = pool.allocate(PASS, Date(0));
    assert_eq!((a, b), (LinkGraphId(0), LinkGraphId(1)));
    assert!(pool.remove(a).is_some());
    assert_eq!(pool.allocate(PASS, Date(0)), LinkGraphId(0));
    assert!(!pool.can_allocate(2));

    let mut schedule = LinkGraphSchedule::default();
    schedule.queue(a);
    schedule.queue(b);
    schedule.queue(a);
    assert_eq!(schedule.len(), 2);
    assert_eq!(schedule.rotate(), Some(a));
    assert_eq!(schedule.rotate(), Some(b));
    schedule.unqueue(a);
    assert_eq!(schedule.rotate(), Some(b));
    assert!(!schedule.contains(a));
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_edges_stay_sorted_after_removals(
            n in 2u16..8,
            edges in prop::collection::vec((0usize..8, 0usize..8, 1u32..100), 0..30),
            victim in 0usize..8,
        ) {
            let mut lg = graph_with(n);
            let size = usize::from(n);
            let inc = modes(EdgeUpdateModes::INCREASE | EdgeUpdateModes::UNRESTRICTED);
            for (from, to, cap) in edges {
                let (from, to) = (from % size, to % size);
                if from != to {
                    lg.node_mut(from).update_edge(to, cap, 0, 1, inc, Date(100));
                }
            }
            lg.remove_node(victim % size);
            for node in lg.nodes() {
                let dests: Vec<_> = node.edges().iter().map(|e| e.dest).collect();
                let mut sorted = dests.clone();
                sorted.sort_unstable();
                sorted.dedup();
                prop_assert_eq!(&dests, &sorted);
                prop_assert!(dests.iter().all(|d| *d < lg.size()));
            }
        }
    }
}
