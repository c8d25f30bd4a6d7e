//! Cargo entering and leaving stations.
//!
//! Producers hand their monthly output to [`move_goods_to_station`], which
//! splits it among the stations whose catchment covers the producer. The
//! vehicle side reports pickups and deliveries through [`record_pickup`]
//! and [`record_delivery`].

use crate::cargo::{CargoPacket, CargoType};
use crate::map::{Owner, TileArea, TileIndex};
use crate::station::{Facilities, GoodsStatus, Station, VehicleType};
use crate::state::{StationId, World};
use std::collections::BTreeMap;

/// Stations whose catchment reaches any tile of `area`.
pub fn stations_near(world: &World, area: &TileArea) -> Vec<StationId> {
    world
        .stations
        .iter()
        .filter(|st| !st.is_waypoint() && st.catchment.area().intersects(area))
        .filter(|st| area.iter().any(|t| st.catchment.has(t)))
        .map(|st| st.id)
        .collect()
}

fn can_move_goods_to_station(world: &World, st: &Station, cargo: CargoType) -> bool {
    let ge = &st.goods[cargo.index()];
    if let Owner::Company(owner) = st.owner {
        if let Some(town) = world.town(st.town) {
            if town.exclusive_counter > 0 && town.exclusivity != Some(owner) {
                return false;
            }
        }
    }
    if ge.rating == 0 {
        return false;
    }
    if world.settings.selectgoods && !ge.has_vehicle_ever_tried_loading() {
        return false;
    }
    let passengers = world.cargo(cargo).is_some_and(|cs| cs.is_passengers());
    let only = if passengers { Facilities::TRUCK_STOP } else { Facilities::BUS_STOP };
    st.facilities.0 != only
}

/// Add `amount` (in 1/256 units) of `cargo` produced at station `id`
/// itself. Returns the whole units that became waiting cargo.
///
/// Fractions carry over to the next call. New cargo is planned along the
/// station's flows; the station joins a link graph if it has none.
pub fn update_station_waiting(world: &mut World, id: StationId, cargo: CargoType, amount: u32) -> u32 {
    let c = cargo.index();
    let World { stations, rng, .. } = &mut *world;
    let Some(st) = stations.get_mut(id) else {
        return 0;
    };
    let ge = &mut st.goods[c];
    let amount = amount.saturating_add(u32::from(ge.amount_fract));
    ge.amount_fract = (amount & 0xFF) as u8;
    let amount = amount >> 8;
    if amount == 0 {
        return 0;
    }

    let next = ge.get_via(id, rng);
    ge.cargo.append(CargoPacket { source: id, count: amount }, next);
    if !ge.has_rating() {
        ge.status.set_to(GoodsStatus::RATING, true);
    }
    let (handle, xy, accepting) = (ge.link_graph.map(|lg| (lg, ge.node)), st.xy, ge.is_accepted());

    let date = world.date;
    match handle {
        Some((lg, node)) => {
            if let Some(graph) = world.link_graphs.get_mut(lg) {
                graph.node_mut(node).update_supply(amount, date);
            }
        }
        None if world.link_graphs.can_allocate(world.settings.max_link_graphs) => {
            let lg = world.link_graphs.allocate(cargo, date);
            world.schedule.queue(lg);
            if let Some(graph) = world.link_graphs.get_mut(lg) {
                let node = graph.add_node(id, xy, accepting);
                graph.node_mut(node).update_supply(amount, date);
                if let Some(st) = world.stations.get_mut(id) {
                    st.goods[c].link_graph = Some(lg);
                    st.goods[c].node = node;
                }
            }
        }
        None => log::warn!("can't allocate link graph for cargo {}", cargo.0),
    }
    amount
}

/// Split `amount` units of produced `cargo` among `candidates`.
///
/// Each company gets a share proportional to its best rating there, split
/// among its stations by rating. What rounding leaves over goes to the
/// best rated stations. With `exclusivity` set only that owner's stations
/// take part. Returns the amount that became waiting cargo.
pub fn move_goods_to_station(
    world: &mut World,
    cargo: CargoType,
    amount: u32,
    candidates: &[StationId],
    exclusivity: Option<Owner>,
) -> u32 {
    if amount == 0 || candidates.is_empty() {
        return 0;
    }
    let c = cargo.index();
    let used: Vec<(StationId, Owner, u32)> = candidates
        .iter()
        .filter_map(|id| world.stations.get(*id))
        .filter(|st| exclusivity.map_or(true, |o| o == st.owner))
        .filter(|st| can_move_goods_to_station(world, st, cargo))
        .map(|st| (st.id, st.owner, u32::from(st.goods[c].rating)))
        .collect();

    match used.as_slice() {
        [] => 0,
        [(id, _, rating)] => {
            let amount = u64::from(amount) * u64::from(rating + 1);
            update_station_waiting(world, *id, cargo, u32::try_from(amount).unwrap_or(u32::MAX))
        }
        _ => {
            let mut company_best: BTreeMap<Owner, u32> = BTreeMap::new();
            let mut company_sum: BTreeMap<Owner, u32> = BTreeMap::new();
            for (_, owner, rating) in &used {
                let best = company_best.entry(*owner).or_default();
                *best = (*best).max(*rating);
                *company_sum.entry(*owner).or_default() += rating;
            }
            let best_rating = company_best.values().copied().max().unwrap_or(0);
            let best_sum: u64 = company_best.values().map(|r| u64::from(*r)).sum();
            let amount = u64::from(amount) * u64::from(best_rating + 1);

            let mut shares: Vec<(StationId, u32, u64)> = used
                .iter()
                .map(|(id, owner, rating)| {
                    let share = amount * u64::from(company_best[owner]) * u64::from(*rating)
                        / best_sum
                        / u64::from(company_sum[owner]);
                    (*id, *rating, share)
                })
                .collect();
            let moving: u64 = shares.iter().map(|(_, _, s)| s).sum();
            if amount > moving {
                shares.sort_by(|a, b| b.1.cmp(&a.1));
                let leftover = (amount - moving) as usize;
                debug_assert!(leftover <= shares.len());
                for share in shares.iter_mut().take(leftover) {
                    share.2 += 1;
                }
            }

            shares
                .into_iter()
                .map(|(id, _, share)| update_station_waiting(world, id, cargo, u32::try_from(share).unwrap_or(u32::MAX)))
                .sum()
        }
    }
}

/// A vehicle of type `vehicle_type` tried to load `cargo` at station `id`.
/// `speed` is its max speed, `age` its age in years.
pub fn record_pickup(
    world: &mut World,
    id: StationId,
    cargo: CargoType,
    vehicle_type: VehicleType,
    speed: u32,
    age: u32,
) {
    let Some(st) = world.stations.get_mut(id) else {
        return;
    };
    st.last_vehicle_type = Some(vehicle_type);
    st.time_since_load = 0;
    let ge = &mut st.goods[cargo.index()];
    ge.last_speed = speed.min(255) as u8;
    ge.last_age = age.min(255) as u8;
    ge.time_since_pickup = 0;
    ge.status.set_to(GoodsStatus::RATING, true);
}

/// A vehicle delivered `cargo` to station `id`.
pub fn record_delivery(world: &mut World, id: StationId, cargo: CargoType) {
    let Some(st) = world.stations.get_mut(id) else {
        return;
    };
    st.time_since_unload = 0;
    let status = &mut st.goods[cargo.index()].status;
    for flag in [GoodsStatus::EVER_ACCEPTED, GoodsStatus::CURRENT_MONTH, GoodsStatus::ACCEPTED_BIGTICK] {
        status.set_to(flag, true);
    }
}

/// Add `amount` to the rating of every cargo that has any status at the
/// stations of `owner` within `radius` tiles of `tile`.
pub fn modify_station_rating_around(world: &mut World, tile: TileIndex, owner: Owner, amount: i32, radius: u32) {
    for st in world
        .stations
        .iter_mut()
        .filter(|st| st.owner == owner && st.xy.distance_manhattan(tile) <= radius)
    {
        for ge in st.goods.iter_mut().filter(|ge| ge.status.any()) {
            ge.rating = (i32::from(ge.rating) + amount).clamp(0, 255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CompanyId, TownId};
    use crate::testing::WorldBuilder;

    const ME: Owner = Owner::Company(CompanyId(0));
    const THEM: Owner = Owner::Company(CompanyId(1));
    const PASS: CargoType = CargoType(0);
    const COAL: CargoType = CargoType(1);

    fn station(world: &mut World, owner: Owner, x: u16, rating: u8) -> StationId {
        let date = world.date;
        let id = world.stations.allocate(|id| {
            let mut st = Station::new(id, crate::station::StationKind::Station, owner, TownId(0), TileIndex::new(x, 10), date);
            st.facilities.set(Facilities::TRAIN);
            st
        });
        let st = world.stations.get_mut(id).unwrap();
        for ge in &mut st.goods {
            ge.rating = rating;
            ge.last_speed = 100;
        }
        id
    }

    fn waiting(world: &World, id: StationId, cargo: CargoType) -> u32 {
        world.stations.get(id).unwrap().goods[cargo.index()].cargo.total_count()
    }

    #[test]
    fn test_single_station_gets_rated_share() {
        let mut world = WorldBuilder::new().build();
        let a = station(&mut world, ME, 5, 127);
        let moved = move_goods_to_station(&mut world, PASS, 10, &[a], None);
        // 10 * 128 / 256
        assert_eq!(moved, 5);
        assert_eq!(waiting(&world, a, PASS), 5);
        let ge = &world.stations.get(a).unwrap().goods[PASS.index()];
        assert!(ge.has_rating());
        assert!(ge.link_graph.is_some());
        let lg = world.link_graphs.get(ge.link_graph.unwrap()).unwrap();
        assert_eq!(lg.node(ge.node).supply, 5);
    }

    #[test]
    fn test_huge_production_clamps() {
        let mut world = WorldBuilder::new().build();
        let a = station(&mut world, ME, 5, 255);
        let moved = move_goods_to_station(&mut world, PASS, u32::MAX / 16, &[a], None);
        assert_eq!(moved, u32::MAX >> 8);
        assert_eq!(waiting(&world, a, PASS), u32::MAX >> 8);
    }

    #[test]
    fn test_fractions_carry_over() {
        let mut world = WorldBuilder::new().build();
        let a = station(&mut world, ME, 5, 100);
        assert_eq!(update_station_waiting(&mut world, a, PASS, 200), 0);
        assert_eq!(update_station_waiting(&mut world, a, PASS, 200), 1);
        assert_eq!(world.stations.get(a).unwrap().goods[PASS.index()].amount_fract, 144);
    }

    #[test]
    fn test_split_between_companies_and_stations() {
        let mut world = WorldBuilder::new().build();
        let a = station(&mut world, ME, 5, 200);
        let b = station(&mut world, ME, 9, 100);
        let c = station(&mut world, THEM, 13, 100);
        let moved = move_goods_to_station(&mut world, COAL, 100, &[a, b, c], None);

        let (wa, wb, wc) = (waiting(&world, a, COAL), waiting(&world, b, COAL), waiting(&world, c, COAL));
        assert_eq!(moved, wa + wb + wc);
        // Company shares follow the best rating: 2:1.
        assert!(wa + wb > wc);
        assert!(wa > wb);
        assert!(moved <= 100 * 201 / 256 + 1);
    }

    #[test]
    fn test_exclusivity_and_filters() {
        let mut world = WorldBuilder::new().build();
        let a = station(&mut world, ME, 5, 200);
        let b = station(&mut world, THEM, 9, 200);
        move_goods_to_station(&mut world, COAL, 100, &[a, b], Some(THEM));
        assert_eq!(waiting(&world, a, COAL), 0);
        assert!(waiting(&world, b, COAL) > 0);

        // Town exclusivity keeps other companies out.
        world.towns[0].exclusivity = Some(CompanyId(0));
        world.towns[0].exclusive_counter = 12;
        let before = waiting(&world, b, COAL);
        move_goods_to_station(&mut world, COAL, 100, &[a, b], None);
        assert_eq!(waiting(&world, b, COAL), before);
        assert!(waiting(&world, a, COAL) > 0);
    }

    #[test]
    fn test_bus_stop_takes_no_freight_and_selectgoods() {
        let mut world = WorldBuilder::new().build();
        let a = station(&mut world, ME, 5, 200);
        world.stations.get_mut(a).unwrap().facilities = Facilities(Facilities::BUS_STOP);
        assert_eq!(move_goods_to_station(&mut world, COAL, 100, &[a], None), 0);
        assert!(move_goods_to_station(&mut world, PASS, 100, &[a], None) > 0);

        let b = station(&mut world, ME, 9, 200);
        world.stations.get_mut(b).unwrap().goods[COAL.index()].last_speed = 0;
        assert_eq!(move_goods_to_station(&mut world, COAL, 100, &[b], None), 0);
        world.settings.selectgoods = false;
        assert!(move_goods_to_station(&mut world, COAL, 100, &[b], None) > 0);
    }

    #[test]
    fn test_pickup_and_delivery_flags() {
        let mut world = WorldBuilder::new().build();
        let a = station(&mut world, ME, 5, 100);
        record_pickup(&mut world, a, COAL, VehicleType::Ship, 400, 3);
        let st = world.stations.get(a).unwrap();
        assert_eq!(st.last_vehicle_type, Some(VehicleType::Ship));
        let ge = &st.goods[COAL.index()];
        assert_eq!((ge.last_speed, ge.last_age, ge.time_since_pickup), (255, 3, 0));
        assert!(ge.has_rating());

        record_delivery(&mut world, a, PASS);
        let status = world.stations.get(a).unwrap().goods[PASS.index()].status;
        assert!(status.has(GoodsStatus::EVER_ACCEPTED));
        assert!(status.has(GoodsStatus::CURRENT_MONTH));
        assert!(status.has(GoodsStatus::ACCEPTED_BIGTICK));
    }

    #[test]
    fn test_modify_rating_around() {
        let mut world = WorldBuilder::new().build();
        let near = station(&mut world, ME, 5, 250);
        let far = station(&mut world, ME, 40, 100);
        let theirs = station(&mut world, THEM, 6, 100);
        for id in [near, far, theirs] {
            world.stations.get_mut(id).unwrap().goods[PASS.index()]
                .status
                .set_to(GoodsStatus::RATING, true);
        }
        modify_station_rating_around(&mut world, TileIndex::new(5, 12), ME, 20, 10);
        let rating = |w: &World, id: StationId, c: CargoType| w.stations.get(id).unwrap().goods[c.index()].rating;
        assert_eq!(rating(&world, near, PASS), 255);
        // Cargo without status is untouched.
        assert_eq!(rating(&world, near, COAL), 250);
        assert_eq!(rating(&world, far, PASS), 100);
        assert_eq!(rating(&world, theirs, PASS), 100);
    }
}
