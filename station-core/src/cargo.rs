//! Cargo types and waiting cargo storage.

use crate::flow_stat::FlowStatMap;
use crate::state::StationId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of cargo slots per station.
pub const NUM_CARGO: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CargoType(pub u8);

impl CargoType {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// Coarse cargo classification used for facility compatibility and naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CargoClasses(pub u16);

impl CargoClasses {
    pub const PASSENGERS: u16 = 1 << 0;
    pub const MAIL: u16 = 1 << 1;
    pub const EXPRESS: u16 = 1 << 2;
    pub const ARMOURED: u16 = 1 << 3;
    pub const BULK: u16 = 1 << 4;
    pub const PIECE_GOODS: u16 = 1 << 5;
    pub const LIQUID: u16 = 1 << 6;

    pub fn has(self, class: u16) -> bool {
        self.0 & class != 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CargoSpec {
    pub label: String,
    pub name: String,
    pub classes: CargoClasses,
    /// A scripted hook computes the station rating for this cargo.
    #[serde(default)]
    pub rating_hook: bool,
}

impl CargoSpec {
    fn new(label: &str, name: &str, classes: u16) -> Self {
        Self {
            label: label.to_string(),
            name: name.to_string(),
            classes: CargoClasses(classes),
            rating_hook: false,
        }
    }

    pub fn is_passengers(&self) -> bool {
        self.classes.has(CargoClasses::PASSENGERS)
    }
}

/// The temperate cargo set.
pub fn default_cargos() -> Vec<CargoSpec> {
    vec![
        CargoSpec::new("PASS", "Passengers", CargoClasses::PASSENGERS),
        CargoSpec::new("COAL", "Coal", CargoClasses::BULK),
        CargoSpec::new("MAIL", "Mail", CargoClasses::MAIL),
        CargoSpec::new("OIL_", "Oil", CargoClasses::LIQUID),
        CargoSpec::new("LVST", "Livestock", CargoClasses::PIECE_GOODS),
        CargoSpec::new("GOOD", "Goods", CargoClasses::EXPRESS),
        CargoSpec::new("GRAI", "Grain", CargoClasses::BULK),
        CargoSpec::new("WOOD", "Wood", CargoClasses::PIECE_GOODS),
        CargoSpec::new("IORE", "Iron Ore", CargoClasses::BULK),
        CargoSpec::new("STEL", "Steel", CargoClasses::PIECE_GOODS),
        CargoSpec::new("VALU", "Valuables", CargoClasses::ARMOURED),
    ]
}

/// Bitmask of cargo types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CargoTypes(pub u64);

impl CargoTypes {
    pub fn has(self, cargo: CargoType) -> bool {
        self.0 & (1 << cargo.0) != 0
    }

    pub fn set(&mut self, cargo: CargoType) {
        self.0 |= 1 << cargo.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = CargoType> {
        (0..NUM_CARGO as u8)
            .map(CargoType)
            .filter(move |c| self.has(*c))
    }
}

/// Per-cargo amounts, as accumulated by acceptance and production scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CargoArray(pub [u32; NUM_CARGO]);

impl Default for CargoArray {
    fn default() -> Self {
        Self([0; NUM_CARGO])
    }
}

impl CargoArray {
    pub fn get(&self, cargo: CargoType) -> u32 {
        self.0[cargo.index()]
    }

    pub fn add(&mut self, cargo: CargoType, amount: u32) {
        self.0[cargo.index()] += amount;
    }
}

// ============================================================================
// Waiting Cargo
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CargoPacket {
    /// Station the cargo first entered the network at.
    pub source: StationId,
    pub count: u32,
}

/// Cargo waiting at a station, grouped by planned next hop.
///
/// The `StationId::INVALID` bucket holds cargo that may board any vehicle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationCargoList {
    packets: BTreeMap<StationId, Vec<CargoPacket>>,
    count: u32,
}

/// Cargo remaining per source station after a truncation.
pub type CargoPerSource = BTreeMap<StationId, u32>;

impl StationCargoList {
    pub fn total_count(&self) -> u32 {
        self.count
    }

    pub fn available_count(&self) -> u32 {
        self.count
    }

    /// Number of distinct next hops with cargo.
    pub fn next_hop_count(&self) -> usize {
        self.packets.len()
    }

    pub fn count_for(&self, next: StationId) -> u32 {
        self.packets
            .get(&next)
            .map(|ps| ps.iter().map(|p| p.count).sum())
            .unwrap_or(0)
    }

    pub fn append(&mut self, packet: CargoPacket, next: StationId) {
        if packet.count == 0 {
            return;
        }
        self.count += packet.count;
        let bucket = self.packets.entry(next).or_default();
        match bucket.last_mut() {
            Some(last) if last.source == packet.source => last.count += packet.count,
            _ => bucket.push(packet),
        }
    }

    /// Drop up to `max_move` units, preferring random packets when only part
    /// of the cargo goes. Returns the amount removed. When `per_source` is
    /// given it receives the cargo left behind per source station.
    pub fn truncate(
        &mut self,
        max_move: u32,
        mut per_source: Option<&mut CargoPerSource>,
        rng: &mut impl Rng,
    ) -> u32 {
        let max_move = max_move.min(self.available_count());
        let prev_count = self.count;
        let mut moved = 0;
        let mut pass = 0;

        while max_move > moved {
            let hops: Vec<StationId> = self.packets.keys().copied().collect();
            for hop in hops {
                let Some(bucket) = self.packets.get_mut(&hop) else {
                    continue;
                };
                let mut i = 0;
                while i < bucket.len() {
                    let source = bucket[i].source;
                    if prev_count > max_move && rng.gen_range(0..prev_count) < prev_count - max_move {
                        if pass == 0 {
                            if let Some(map) = per_source.as_deref_mut() {
                                *map.entry(source).or_default() += bucket[i].count;
                            }
                        }
                        i += 1;
                        continue;
                    }
                    let diff = max_move - moved;
                    if bucket[i].count > diff {
                        bucket[i].count -= diff;
                        self.count -= diff;
                        moved += diff;
                        if pass > 0 {
                            if let Some(map) = per_source.as_deref_mut() {
                                let left = map.entry(source).or_default();
                                *left = left.saturating_sub(diff);
                            }
                            self.packets.retain(|_, b| !b.is_empty());
                            return moved;
                        }
                        if let Some(map) = per_source.as_deref_mut() {
                            *map.entry(source).or_default() += bucket[i].count;
                        }
                        i += 1;
                    } else {
                        let packet = bucket.remove(i);
                        if pass > 0 {
                            if let Some(map) = per_source.as_deref_mut() {
                                let left = map.entry(source).or_default();
                                *left = left.saturating_sub(packet.count);
                            }
                        }
                        moved += packet.count;
                        self.count -= packet.count;
                    }
                }
            }
            self.packets.retain(|_, b| !b.is_empty());
            pass += 1;
        }
        moved
    }

    /// Move all cargo planned via `avoid` onto a new next hop that is neither
    /// `avoid` nor `avoid2`. Returns the amount rerouted.
    pub fn reroute(
        &mut self,
        avoid: StationId,
        avoid2: StationId,
        flows: &FlowStatMap,
        rng: &mut impl Rng,
    ) -> u32 {
        let Some(bucket) = self.packets.remove(&avoid) else {
            return 0;
        };
        let mut moved = 0;
        for packet in bucket {
            let next = flows.get_via(packet.source, avoid, avoid2, rng);
            debug_assert!(next != avoid || !next.is_valid());
            moved += packet.count;
            self.count -= packet.count;
            self.append(packet, next);
        }
        moved
    }

    pub fn iter(&self) -> impl Iterator<Item = (StationId, &CargoPacket)> {
        self.packets
            .iter()
            .flat_map(|(hop, ps)| ps.iter().map(move |p| (*hop, p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn packet(source: u16, count: u32) -> CargoPacket {
        CargoPacket {
            source: StationId(source),
            count,
        }
    }

    #[test]
    fn test_append_merges_same_source() {
        let mut list = StationCargoList::default();
        list.append(packet(1, 10), StationId::INVALID);
        list.append(packet(1, 5), StationId::INVALID);
        list.append(packet(2, 5), StationId(7));
        assert_eq!(list.total_count(), 20);
        assert_eq!(list.next_hop_count(), 2);
        assert_eq!(list.iter().count(), 2);
    }

    #[test]
    fn test_truncate_everything() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut list = StationCargoList::default();
        list.append(packet(1, 10), StationId::INVALID);
        list.append(packet(2, 30), StationId(4));
        let mut left = CargoPerSource::new();
        let moved = list.truncate(u32::MAX, Some(&mut left), &mut rng);
        assert_eq!(moved, 40);
        assert_eq!(list.total_count(), 0);
        assert_eq!(list.next_hop_count(), 0);
        assert!(left.values().all(|v| *v == 0));
    }

    #[test]
    fn test_truncate_partial_removes_exact_amount() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let mut list = StationCargoList::default();
        for s in 0..10 {
            list.append(packet(s, 50), StationId(s % 3));
        }
        let moved = list.truncate(123, None, &mut rng);
        assert_eq!(moved, 123);
        assert_eq!(list.total_count(), 500 - 123);
        let summed: u32 = list.iter().map(|(_, p)| p.count).sum();
        assert_eq!(summed, list.total_count());
    }

    #[test]
    fn test_reroute_without_flows_goes_anywhere() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut list = StationCargoList::default();
        list.append(packet(1, 10), StationId(5));
        let moved = list.reroute(StationId(5), StationId(1), &FlowStatMap::default(), &mut rng);
        assert_eq!(moved, 10);
        assert_eq!(list.count_for(StationId(5)), 0);
        assert_eq!(list.count_for(StationId::INVALID), 10);
        assert_eq!(list.total_count(), 10);
    }

    #[test]
    fn test_cargo_types_iter() {
        let mut mask = CargoTypes::default();
        mask.set(CargoType(0));
        mask.set(CargoType(5));
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![CargoType(0), CargoType(5)]);
    }
}
