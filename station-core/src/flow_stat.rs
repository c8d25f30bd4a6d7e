//! Share-based next-hop routing.
//!
//! A [`FlowStat`] holds, for one origin station and cargo, a sorted map from
//! cumulative share boundary to next-hop station. Shares below the
//! `unrestricted` boundary are chosen freely; shares above it are only used
//! as a fallback. A [`FlowStatMap`] keys flow stats by origin station.

use crate::state::StationId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Passing this to [`FlowStat::change_share`] removes the whole share.
pub const REMOVE_SHARE: i32 = i32::MIN;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStat {
    shares: BTreeMap<u32, StationId>,
    unrestricted: u32,
}

impl FlowStat {
    /// A flow stat with a single share of `flow` via `st`.
    pub fn new(st: StationId, flow: u32, restricted: bool) -> Self {
        assert!(flow > 0, "flow stats start with a positive share");
        let mut shares = BTreeMap::new();
        shares.insert(flow, st);
        Self {
            shares,
            unrestricted: if restricted { 0 } else { flow },
        }
    }

    /// Add a share at the end of the map.
    pub fn append_share(&mut self, st: StationId, flow: u32, restricted: bool) {
        if flow == 0 {
            return;
        }
        let last = self.total();
        self.shares.insert(last + flow, st);
        if !restricted {
            self.unrestricted += flow;
        }
    }

    pub fn shares(&self) -> &BTreeMap<u32, StationId> {
        &self.shares
    }

    pub fn unrestricted(&self) -> u32 {
        self.unrestricted
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    /// Final boundary, i.e. the sum of all shares.
    pub fn total(&self) -> u32 {
        self.shares.keys().next_back().copied().unwrap_or(0)
    }

    /// Size of the share via `st`, 0 if there is none.
    pub fn get_share(&self, st: StationId) -> u32 {
        let mut prev = 0;
        for (&boundary, &via) in &self.shares {
            if via == st {
                return boundary - prev;
            }
            prev = boundary;
        }
        0
    }

    /// First share whose boundary lies strictly above `x`.
    fn upper_bound(&self, x: u32) -> Option<(u32, StationId)> {
        use std::ops::Bound::{Excluded, Unbounded};
        self.shares
            .range((Excluded(x), Unbounded))
            .next()
            .map(|(b, s)| (*b, *s))
    }

    /// Boundary of the share preceding the one ending at `end`, or 0.
    fn boundary_before(&self, end: u32) -> u32 {
        self.shares
            .range(..end)
            .next_back()
            .map(|(b, _)| *b)
            .unwrap_or(0)
    }

    /// Random unrestricted next hop, or `INVALID` if there is none.
    pub fn get_via_any(&self, rng: &mut impl Rng) -> StationId {
        if self.unrestricted == 0 {
            return StationId::INVALID;
        }
        self.upper_bound(rng.gen_range(0..self.unrestricted))
            .map_or(StationId::INVALID, |(_, via)| via)
    }

    /// Random unrestricted next hop other than the two excluded stations.
    ///
    /// Hitting an excluded share redraws from the remaining mass with the
    /// excluded interval cut out; a second hit cuts out both intervals, the
    /// lower one first.
    pub fn get_via(&self, excluded: StationId, excluded2: StationId, rng: &mut impl Rng) -> StationId {
        if self.unrestricted == 0 {
            return StationId::INVALID;
        }
        debug_assert!(!self.shares.is_empty());
        let Some((end, via)) = self.upper_bound(rng.gen_range(0..self.unrestricted)) else {
            return StationId::INVALID;
        };
        debug_assert!(end <= self.unrestricted);
        if via != excluded && via != excluded2 {
            return via;
        }

        let mut begin = self.boundary_before(end);
        let mut interval = end - begin;
        if interval >= self.unrestricted {
            return StationId::INVALID;
        }
        let mut new_max = self.unrestricted - interval;
        let draw = rng.gen_range(0..new_max);
        let key = if draw < begin { draw } else { draw + interval };
        let Some((end2, via2)) = self.upper_bound(key) else {
            return StationId::INVALID;
        };
        debug_assert!(end2 <= self.unrestricted);
        if via2 != excluded && via2 != excluded2 {
            return via2;
        }

        let mut begin2 = self.boundary_before(end2);
        let mut interval2 = end2 - begin2;
        if interval2 >= new_max {
            return StationId::INVALID;
        }
        new_max -= interval2;
        if begin > begin2 {
            std::mem::swap(&mut begin, &mut begin2);
            std::mem::swap(&mut interval, &mut interval2);
        }
        let draw = rng.gen_range(0..new_max);
        let key = if draw < begin {
            draw
        } else if draw < begin2 - interval {
            draw + interval
        } else {
            draw + interval + interval2
        };
        match self.upper_bound(key) {
            Some((b, via3)) => {
                debug_assert!(b <= self.unrestricted);
                via3
            }
            None => StationId::INVALID,
        }
    }

    /// Flatten every share to size 1, keeping the unrestricted split.
    pub fn invalidate(&mut self) {
        debug_assert!(!self.shares.is_empty());
        let mut new_shares = BTreeMap::new();
        let mut unrestricted = self.unrestricted;
        for (i, (&boundary, &via)) in self.shares.iter().enumerate() {
            let i = i as u32 + 1;
            new_shares.insert(i, via);
            if boundary == self.unrestricted {
                unrestricted = i;
            }
        }
        self.shares = new_shares;
        self.unrestricted = unrestricted;
    }

    /// Add or remove `flow` units of share via `st`. [`REMOVE_SHARE`] erases
    /// the share; newly added destinations are unrestricted.
    pub fn change_share(&mut self, st: StationId, flow: i32) {
        debug_assert!(!self.shares.is_empty());
        let remove_all = flow == REMOVE_SHARE;
        let mut flow = i64::from(flow);
        let mut unrestricted = i64::from(self.unrestricted);
        let mut removed: i64 = 0;
        let mut added: i64 = 0;
        let mut last_share: u32 = 0;
        let mut new_shares = BTreeMap::new();

        for (&boundary, &via) in &self.shares {
            if via == st {
                if flow < 0 {
                    let share = i64::from(boundary - last_share);
                    if remove_all || -flow >= share {
                        removed += share;
                        if i64::from(boundary) <= unrestricted {
                            unrestricted -= share;
                        }
                        if !remove_all {
                            flow += share;
                        }
                        last_share = boundary;
                        continue;
                    }
                    removed += -flow;
                } else {
                    added += flow;
                }
                if i64::from(boundary) <= unrestricted {
                    unrestricted += flow;
                }
                flow = 0;
            }
            new_shares.insert((i64::from(boundary) + added - removed) as u32, via);
            last_share = boundary;
        }

        self.shares = new_shares;
        if flow > 0 && !remove_all {
            self.shares.insert(last_share + flow as u32, st);
            if unrestricted < i64::from(last_share) {
                self.unrestricted = unrestricted.max(0) as u32;
                self.release_share(st);
                return;
            }
            unrestricted += flow;
        }
        self.unrestricted = unrestricted.max(0) as u32;
    }

    /// Move the share via `st` behind all others and out of the unrestricted zone.
    pub fn restrict_share(&mut self, st: StationId) {
        debug_assert!(!self.shares.is_empty());
        let mut flow = 0;
        let mut last_share = 0;
        let mut new_shares = BTreeMap::new();
        for (&boundary, &via) in &self.shares {
            if flow == 0 {
                if boundary > self.unrestricted {
                    // Not present or already restricted.
                    return;
                }
                if via == st {
                    flow = boundary - last_share;
                } else {
                    new_shares.insert(boundary, via);
                }
            } else {
                new_shares.insert(boundary - flow, via);
            }
            last_share = boundary;
        }
        if flow == 0 {
            return;
        }
        new_shares.insert(last_share, st);
        self.unrestricted -= flow;
        self.shares = new_shares;
    }

    /// Move a restricted share via `st` to the front of the unrestricted zone.
    pub fn release_share(&mut self, st: StationId) {
        debug_assert!(!self.shares.is_empty());
        let mut flow = 0;
        let mut next_share = 0;
        let mut found = false;
        for (&boundary, &via) in self.shares.iter().rev() {
            // Not <= as the share may hit the limit.
            if boundary < self.unrestricted {
                return;
            }
            if found {
                flow = next_share - boundary;
                break;
            }
            if boundary == self.unrestricted {
                // Limit reached without finding the share.
                return;
            }
            if via == st {
                found = true;
            }
            next_share = boundary;
        }
        if found && flow == 0 && self.unrestricted == 0 {
            // The share starts at the very beginning of the map.
            flow = next_share;
        }
        if flow == 0 {
            return;
        }
        self.unrestricted += flow;

        let mut new_shares = BTreeMap::new();
        new_shares.insert(flow, st);
        let mut shift = flow;
        for (&boundary, &via) in &self.shares {
            if via != st {
                new_shares.insert(shift + boundary, via);
            } else {
                shift = 0;
            }
        }
        self.shares = new_shares;
    }

    /// Rescale cumulative shares from `runtime` days to a 30 day month.
    /// Boundaries stay strictly increasing.
    pub fn scale_to_monthly(&mut self, runtime: u32) {
        assert!(runtime > 0, "runtime must be positive");
        let mut new_shares = BTreeMap::new();
        let mut share: u32 = 0;
        let mut unrestricted = self.unrestricted;
        for (&boundary, &via) in &self.shares {
            let scaled = (u64::from(boundary) * 30 / u64::from(runtime)) as u32;
            share = (share + 1).max(scaled);
            new_shares.insert(share, via);
            if self.unrestricted == boundary {
                unrestricted = share;
            }
        }
        self.shares = new_shares;
        self.unrestricted = unrestricted;
    }
}

/// Flow stats of one station and cargo, keyed by origin station.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStatMap {
    flows: BTreeMap<StationId, FlowStat>,
}

impl FlowStatMap {
    pub fn get(&self, origin: StationId) -> Option<&FlowStat> {
        self.flows.get(&origin)
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StationId, &FlowStat)> {
        self.flows.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&StationId, &mut FlowStat)> {
        self.flows.iter_mut()
    }

    /// Drop the flow stat for cargo originating at `origin`.
    pub fn erase_origin(&mut self, origin: StationId) {
        self.flows.remove(&origin);
    }

    /// Next hop for cargo from `origin`, or `INVALID` without a flow stat.
    pub fn get_via_any(&self, origin: StationId, rng: &mut impl Rng) -> StationId {
        self.flows
            .get(&origin)
            .map_or(StationId::INVALID, |fs| fs.get_via_any(rng))
    }

    pub fn get_via(
        &self,
        origin: StationId,
        excluded: StationId,
        excluded2: StationId,
        rng: &mut impl Rng,
    ) -> StationId {
        self.flows
            .get(&origin)
            .map_or(StationId::INVALID, |fs| fs.get_via(excluded, excluded2, rng))
    }

    /// Add `flow` from `origin` going via `via`.
    pub fn add_flow(&mut self, origin: StationId, via: StationId, flow: u32) {
        if flow == 0 {
            return;
        }
        match self.flows.get_mut(&origin) {
            None => {
                self.flows.insert(origin, FlowStat::new(via, flow, false));
            }
            Some(fs) => {
                fs.change_share(via, clamp_flow(flow));
                debug_assert!(!fs.is_empty());
            }
        }
    }

    /// Pass on `flow` via `via`, remembering it under the local pseudo
    /// destination so it can later be netted against local consumption.
    pub fn pass_on_flow(&mut self, origin: StationId, via: StationId, flow: u32) {
        if flow == 0 {
            return;
        }
        match self.flows.get_mut(&origin) {
            None => {
                let mut fs = FlowStat::new(via, flow, false);
                fs.append_share(StationId::INVALID, flow, false);
                self.flows.insert(origin, fs);
            }
            Some(fs) => {
                fs.change_share(via, clamp_flow(flow));
                fs.change_share(StationId::INVALID, clamp_flow(flow));
                debug_assert!(!fs.is_empty());
            }
        }
    }

    /// Subtract passed-on flow from the locally consumed share of `self_id`.
    pub fn finalize_local_consumption(&mut self, self_id: StationId) {
        for fs in self.flows.values_mut() {
            let mut local = fs.get_share(StationId::INVALID);
            if local > i32::MAX as u32 {
                fs.change_share(self_id, -i32::MAX);
                fs.change_share(StationId::INVALID, -i32::MAX);
                local -= i32::MAX as u32;
            }
            fs.change_share(self_id, -(local as i32));
            fs.change_share(StationId::INVALID, -(local as i32));
            debug_assert!(!fs.is_empty(), "local share consumed without remote share");
        }
    }

    /// Delete all shares via `via`. Returns the origins whose whole flow
    /// stat went away.
    pub fn delete_flows(&mut self, via: StationId) -> Vec<StationId> {
        let mut erased = Vec::new();
        self.flows.retain(|origin, fs| {
            fs.change_share(via, REMOVE_SHARE);
            if fs.is_empty() {
                erased.push(*origin);
                false
            } else {
                true
            }
        });
        erased
    }

    pub fn restrict_flows(&mut self, via: StationId) {
        for fs in self.flows.values_mut() {
            fs.restrict_share(via);
        }
    }

    pub fn release_flows(&mut self, via: StationId) {
        for fs in self.flows.values_mut() {
            fs.release_share(via);
        }
    }

    /// Sum of all flows.
    pub fn get_flow(&self) -> u32 {
        self.flows.values().map(FlowStat::total).sum()
    }

    pub fn get_flow_via(&self, via: StationId) -> u32 {
        self.flows.values().map(|fs| fs.get_share(via)).sum()
    }

    pub fn get_flow_from(&self, from: StationId) -> u32 {
        self.flows.get(&from).map_or(0, FlowStat::total)
    }

    pub fn get_flow_from_via(&self, from: StationId, via: StationId) -> u32 {
        self.flows.get(&from).map_or(0, |fs| fs.get_share(via))
    }
}

fn clamp_flow(flow: u32) -> i32 {
    flow.min(i32::MAX as u32) as i32
}

#[cfg(test)]
#[path = "flow_stat_tests.rs"]
mod tests;
