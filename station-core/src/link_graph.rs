//! Per-cargo link graphs.
//!
//! Each connected set of stations moving one cargo shares a [`LinkGraph`].
//! Nodes stand for a station's goods entry and carry supply and demand;
//! edges carry capacity, usage and travel time statistics gathered from
//! vehicles. Goods entries refer to their node through a
//! `(LinkGraphId, NodeId)` handle, so every structural change here returns
//! the handles that moved and the caller rewrites the goods entries.
//!
//! # Timestamps
//!
//! Edges record the last unrestricted and the last restricted update
//! separately. An edge that only sees restricted traffic is used as a
//! fallback; [`Edge::last_update`] is the later of the two.

use crate::cargo::CargoType;
use crate::map::TileIndex;
use crate::state::{Date, StationId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Days between two compressions of a graph.
pub const COMPRESSION_INTERVAL: i32 = 256;
/// Minimum number of days before an edge counts as stale.
pub const MIN_TIMEOUT_DISTANCE: i32 = 32;
/// Vehicles parked in a depot for longer than this many days do not keep
/// links alive.
pub const STALE_LINK_DEPOT_TIMEOUT: i32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkGraphId(pub u16);

impl std::fmt::Display for LinkGraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lg{}", self.0)
    }
}

/// Index of a node within its graph.
pub type NodeId = usize;

/// How [`Node::update_edge`] treats the new statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EdgeUpdateModes(pub u8);

impl EdgeUpdateModes {
    /// Add capacity and usage to the existing values.
    pub const INCREASE: u8 = 1 << 0;
    /// Raise capacity and usage to at least the given values.
    pub const REFRESH: u8 = 1 << 1;
    pub const RESTRICTED: u8 = 1 << 2;
    pub const UNRESTRICTED: u8 = 1 << 3;

    pub fn has(self, mode: u8) -> bool {
        self.0 & mode != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub dest: NodeId,
    pub capacity: u32,
    pub usage: u32,
    /// Travel time weighted by capacity.
    pub travel_time_sum: u64,
    pub last_unrestricted_update: Option<Date>,
    pub last_restricted_update: Option<Date>,
}

impl Edge {
    fn new(dest: NodeId) -> Self {
        Self {
            dest,
            capacity: 0,
            usage: 0,
            travel_time_sum: 0,
            last_unrestricted_update: None,
            last_restricted_update: None,
        }
    }

    pub fn last_update(&self) -> Option<Date> {
        self.last_unrestricted_update.max(self.last_restricted_update)
    }

    /// Average travel time in ticks.
    pub fn travel_time(&self) -> u64 {
        if self.capacity == 0 {
            0
        } else {
            self.travel_time_sum / u64::from(self.capacity)
        }
    }

    /// Only restricted traffic uses this link from now on.
    pub fn restrict(&mut self) {
        self.last_unrestricted_update = None;
    }

    /// Restricted traffic no longer uses this link.
    pub fn release(&mut self) {
        self.last_restricted_update = None;
    }

    fn stamp(&mut self, modes: EdgeUpdateModes, date: Date) {
        if modes.has(EdgeUpdateModes::UNRESTRICTED) {
            self.last_unrestricted_update = Some(date);
        }
        if modes.has(EdgeUpdateModes::RESTRICTED) {
            self.last_restricted_update = Some(date);
        }
    }

    fn update(&mut self, capacity: u32, usage: u32, travel_time: u32, modes: EdgeUpdateModes, date: Date) {
        debug_assert!(self.capacity > 0);
        debug_assert!(capacity >= usage);
        let travel_time = u64::from(travel_time);

        if modes.has(EdgeUpdateModes::INCREASE) {
            if self.travel_time_sum == 0 {
                self.travel_time_sum = (u64::from(self.capacity) + u64::from(capacity)).saturating_mul(travel_time);
            } else if travel_time == 0 {
                self.travel_time_sum = self
                    .travel_time_sum
                    .saturating_add(self.travel_time_sum / u64::from(self.capacity) * u64::from(capacity));
            } else {
                self.travel_time_sum = self.travel_time_sum.saturating_add(travel_time * u64::from(capacity));
            }
            self.capacity = self.capacity.saturating_add(capacity);
            self.usage = self.usage.saturating_add(usage);
        } else if modes.has(EdgeUpdateModes::REFRESH) {
            if self.travel_time_sum == 0 {
                self.capacity = self.capacity.max(capacity);
                self.travel_time_sum = travel_time * u64::from(self.capacity);
            } else if capacity > self.capacity {
                self.travel_time_sum =
                    self.travel_time_sum / u64::from(self.capacity) * u64::from(capacity);
                self.capacity = capacity;
            }
            self.usage = self.usage.max(usage);
        }
        self.stamp(modes, date);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub station: StationId,
    pub xy: TileIndex,
    pub supply: u32,
    pub demand: u32,
    pub last_update: Option<Date>,
    /// Outgoing edges, sorted by destination.
    edges: Vec<Edge>,
}

impl Node {
    fn new(station: StationId, xy: TileIndex, demand: u32) -> Self {
        Self {
            station,
            xy,
            supply: 0,
            demand,
            last_update: None,
            edges: Vec::new(),
        }
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edges_mut(&mut self) -> &mut [Edge] {
        &mut self.edges
    }

    fn position(&self, to: NodeId) -> Result<usize, usize> {
        self.edges.binary_search_by_key(&to, |e| e.dest)
    }

    pub fn has_edge_to(&self, to: NodeId) -> bool {
        self.position(to).is_ok()
    }

    pub fn edge(&self, to: NodeId) -> Option<&Edge> {
        self.position(to).ok().map(|i| &self.edges[i])
    }

    pub fn edge_mut(&mut self, to: NodeId) -> Option<&mut Edge> {
        self.position(to).ok().map(move |i| &mut self.edges[i])
    }

    pub fn update_supply(&mut self, amount: u32, date: Date) {
        self.supply = self.supply.saturating_add(amount);
        self.last_update = Some(date);
    }

    pub fn set_demand(&mut self, demand: u32) {
        self.demand = demand;
    }

    pub fn update_location(&mut self, xy: TileIndex) {
        self.xy = xy;
    }

    /// Create or update the edge to `to`.
    pub fn update_edge(
        &mut self,
        to: NodeId,
        capacity: u32,
        usage: u32,
        travel_time: u32,
        modes: EdgeUpdateModes,
        date: Date,
    ) {
        assert!(capacity > 0, "edge updates need capacity");
        debug_assert!(usage <= capacity);
        match self.position(to) {
            Ok(i) => self.edges[i].update(capacity, usage, travel_time, modes, date),
            Err(i) => {
                let mut edge = Edge::new(to);
                edge.capacity = capacity;
                edge.usage = usage;
                edge.travel_time_sum = u64::from(travel_time) * u64::from(capacity);
                edge.stamp(modes, date);
                self.edges.insert(i, edge);
            }
        }
    }

    pub fn remove_edge(&mut self, to: NodeId) {
        if let Ok(i) = self.position(to) {
            self.edges.remove(i);
        }
    }
}

/// Scale a statistic gathered over `orig_age` days to `target_age` days.
/// Nonzero values never scale down to zero.
fn scale(val: u64, target_age: i32, orig_age: i32) -> u64 {
    if val == 0 {
        return 0;
    }
    (val * target_age.max(1) as u64 / orig_age.max(1) as u64).max(1)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkGraph {
    pub id: LinkGraphId,
    pub cargo: CargoType,
    pub last_compression: Date,
    nodes: Vec<Node>,
}

impl LinkGraph {
    pub fn new(id: LinkGraphId, cargo: CargoType, date: Date) -> Self {
        Self {
            id,
            cargo,
            last_compression: date,
            nodes: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Append a node. `accepting` stations start with a demand of one.
    pub fn add_node(&mut self, station: StationId, xy: TileIndex, accepting: bool) -> NodeId {
        self.nodes
            .push(Node::new(station, xy, u32::from(accepting)));
        self.nodes.len() - 1
    }

    /// Remove node `id` by moving the last node into its slot. Returns the
    /// station whose node now lives at `id`, if a node moved.
    pub fn remove_node(&mut self, id: NodeId) -> Option<StationId> {
        assert!(id < self.nodes.len());
        let last = self.nodes.len() - 1;
        self.nodes.swap_remove(id);
        for node in &mut self.nodes {
            node.remove_edge(id);
            if id != last {
                if let Ok(i) = node.position(last) {
                    let mut edge = node.edges.remove(i);
                    edge.dest = id;
                    let at = node.position(id).unwrap_or_else(|at| at);
                    node.edges.insert(at, edge);
                }
            }
        }
        (id != last).then(|| self.nodes[id].station)
    }

    /// Halve all statistics so that recent traffic outweighs old traffic.
    /// The compression date moves halfway towards `date`.
    pub fn compress(&mut self, date: Date) {
        self.last_compression = Date((date.0 + self.last_compression.0) / 2);
        for node in &mut self.nodes {
            node.supply /= 2;
            for edge in &mut node.edges {
                if edge.capacity == 0 {
                    continue;
                }
                let new_capacity = (edge.capacity / 2).max(1);
                if edge.capacity < (1 << 16) {
                    edge.travel_time_sum =
                        edge.travel_time_sum * u64::from(new_capacity) / u64::from(edge.capacity);
                } else if edge.travel_time_sum != 0 {
                    edge.travel_time_sum = (edge.travel_time_sum / 2).max(1);
                }
                edge.capacity = new_capacity;
                edge.usage /= 2;
            }
        }
    }

    /// Move all nodes and edges of `other` into this graph, rescaling its
    /// statistics to this graph's age. Returns the new node id of every
    /// station that came from `other`.
    pub fn merge(&mut self, other: LinkGraph, date: Date) -> Vec<(StationId, NodeId)> {
        debug_assert_eq!(self.cargo, other.cargo);
        let age = date.since(self.last_compression) + 1;
        let other_age = date.since(other.last_compression) + 1;
        let first = self.nodes.len();
        let mut moved = Vec::with_capacity(other.nodes.len());

        for node in other.nodes {
            let new_id = self.nodes.len();
            let mut merged = Node::new(node.station, node.xy, node.demand);
            merged.supply = scale(u64::from(node.supply), age, other_age) as u32;
            merged.last_update = node.last_update;
            merged.edges = node
                .edges
                .into_iter()
                .map(|e| Edge {
                    dest: first + e.dest,
                    capacity: scale(u64::from(e.capacity), age, other_age) as u32,
                    usage: scale(u64::from(e.usage), age, other_age) as u32,
                    travel_time_sum: scale(e.travel_time_sum, age, other_age),
                    last_unrestricted_update: e.last_unrestricted_update,
                    last_restricted_update: e.last_restricted_update,
                })
                .collect();
            moved.push((node.station, new_id));
            self.nodes.push(merged);
        }
        moved
    }
}

/// Arena of link graphs. Freed ids are reused lowest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkGraphPool {
    slots: Vec<Option<LinkGraph>>,
}

impl LinkGraphPool {
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn can_allocate(&self, max: usize) -> bool {
        self.len() < max
    }

    pub fn allocate(&mut self, cargo: CargoType, date: Date) -> LinkGraphId {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.slots.len());
        let id = LinkGraphId(slot as u16);
        let graph = LinkGraph::new(id, cargo, date);
        if slot == self.slots.len() {
            self.slots.push(Some(graph));
        } else {
            self.slots[slot] = Some(graph);
        }
        id
    }

    pub fn get(&self, id: LinkGraphId) -> Option<&LinkGraph> {
        self.slots.get(usize::from(id.0)).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: LinkGraphId) -> Option<&mut LinkGraph> {
        self.slots.get_mut(usize::from(id.0)).and_then(Option::as_mut)
    }

    pub fn remove(&mut self, id: LinkGraphId) -> Option<LinkGraph> {
        let removed = self.slots.get_mut(usize::from(id.0)).and_then(Option::take);
        while matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &LinkGraph> {
        self.slots.iter().flatten()
    }
}

/// Round-robin queue of graphs waiting for their next flow assignment job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkGraphSchedule {
    queue: VecDeque<LinkGraphId>,
}

impl LinkGraphSchedule {
    pub fn queue(&mut self, id: LinkGraphId) {
        if !self.queue.contains(&id) {
            self.queue.push_back(id);
        }
    }

    pub fn unqueue(&mut self, id: LinkGraphId) {
        self.queue.retain(|q| *q != id);
    }

    pub fn contains(&self, id: LinkGraphId) -> bool {
        self.queue.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take the next graph and put it back at the end of the queue.
    pub fn rotate(&mut self) -> Option<LinkGraphId> {
        let id = self.queue.pop_front()?;
        self.queue.push_back(id);
        Some(id)
    }
}

#[cfg(test)]
#[path = "link_graph_tests.rs"]
mod tests;
