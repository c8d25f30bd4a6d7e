//! Station ratings.
//!
//! Every [`STATION_RATING_TICKS`] ticks each station re-rates the cargos it
//! moves. The target rating rewards fast vehicles, frequent pickups, little
//! waiting cargo, young vehicles and a company statue in town. The stored
//! rating moves at most two points towards the target per update. Poorly
//! rated stations lose some of their waiting cargo.

use crate::cargo::{CargoPerSource, CargoType};
use crate::map::Owner;
use crate::services::ScriptHooks;
use crate::station::{GoodsEntry, GoodsStatus, VehicleType, INITIAL_STATION_RATING, MAX_STATION_RATING};
use crate::state::{StationId, World};
use rand::Rng;

pub const STATION_RATING_TICKS: u64 = 185;

/// Waiting cargo above this is cut back by [`WAITING_CARGO_CUT_FACTOR`].
pub const WAITING_CARGO_THRESHOLD: u32 = 1 << 12;
pub const WAITING_CARGO_CUT_FACTOR: u32 = 1 << 6;
pub const MAX_WAITING_CARGO: u32 = 1 << 15;

/// Truncate waiting cargo and note how much stayed behind per source.
fn truncate_cargo(
    ge: &mut GoodsEntry,
    amount: u32,
    rng: &mut impl Rng,
    feedback: &mut Vec<(usize, CargoPerSource)>,
    c: usize,
) {
    let mut per_source = CargoPerSource::new();
    ge.cargo.truncate(amount, Some(&mut per_source), rng);
    feedback.push((c, per_source));
}

/// Rating target from vehicle speed, pickup frequency and backlog.
fn service_rating(ge: &GoodsEntry, last_vehicle: Option<VehicleType>) -> i32 {
    let mut rating = 0;
    let b = i32::from(ge.last_speed) - 85;
    if b >= 0 {
        rating += b >> 2;
    }

    let mut waittime = ge.time_since_pickup;
    if last_vehicle == Some(VehicleType::Ship) {
        waittime >>= 2;
    }
    if waittime <= 21 {
        rating += 25;
    }
    if waittime <= 12 {
        rating += 25;
    }
    if waittime <= 6 {
        rating += 45;
    }
    if waittime <= 3 {
        rating += 35;
    }

    rating -= 90;
    let backlog = ge.max_waiting_cargo;
    if backlog <= 1500 {
        rating += 55;
    }
    if backlog <= 1000 {
        rating += 35;
    }
    if backlog <= 600 {
        rating += 10;
    }
    if backlog <= 300 {
        rating += 20;
    }
    if backlog <= 100 {
        rating += 10;
    }
    rating
}

fn age_rating(last_age: u8) -> i32 {
    let mut rating = 0;
    if last_age < 3 {
        rating += 10;
    }
    if last_age < 2 {
        rating += 10;
    }
    if last_age < 1 {
        rating += 13;
    }
    rating
}

/// Re-rate every cargo at station `id`.
#[tracing::instrument(skip_all, name = "station_rating")]
pub fn update_station_rating(world: &mut World, hooks: &dyn ScriptHooks, id: StationId) {
    let World {
        stations,
        rng,
        cargos,
        settings,
        towns,
        ..
    } = world;
    let Some(st) = stations.get_mut(id) else {
        return;
    };

    st.time_since_load = st.time_since_load.saturating_add(1);
    st.time_since_unload = st.time_since_unload.saturating_add(1);

    let statue = match st.owner {
        Owner::Company(company) => towns
            .get(usize::from(st.town.0))
            .is_some_and(|t| t.statues.contains(&company)),
        _ => false,
    };
    let last_vehicle = st.last_vehicle_type;
    let mut feedback = Vec::new();

    for (c, spec) in cargos.iter().enumerate() {
        let cargo = CargoType(c as u8);
        let ge = &mut st.goods[c];
        if !ge.has_rating() {
            if ge.rating < INITIAL_STATION_RATING {
                ge.rating += 1;
            }
            continue;
        }

        ge.time_since_pickup = ge.time_since_pickup.saturating_add(1);
        if ge.time_since_pickup == u8::MAX && settings.selectgoods {
            ge.status.set_to(GoodsStatus::RATING, false);
            ge.last_speed = 0;
            truncate_cargo(ge, u32::MAX, rng, &mut feedback, c);
            log::trace!("station {}: cargo {} abandoned", id, c);
            continue;
        }

        let mut waiting = ge.cargo.available_count();
        let num_dests = ge.cargo.next_hop_count() as u32;
        let waiting_avg = waiting / (num_dests + 1);

        let mut rating = if settings.cheat_max_rating {
            ge.rating = MAX_STATION_RATING;
            i32::from(MAX_STATION_RATING)
        } else if let Some(r) = spec.rating_hook.then(|| hooks.station_rating(id, cargo, ge)).flatten() {
            r
        } else {
            service_rating(ge, last_vehicle)
        };
        if statue {
            rating += 26;
        }
        rating += age_rating(ge.last_age);

        let old = i32::from(ge.rating);
        let rating = (old + (rating - old).clamp(-2, 2)).clamp(0, i32::from(MAX_STATION_RATING));
        ge.rating = rating as u8;

        let mut waiting_changed = false;
        if rating <= 64 && waiting_avg >= 100 {
            let mut dec = rng.gen::<u32>() & 0x1F;
            if waiting_avg < 200 {
                dec &= 7;
            }
            waiting = waiting.saturating_sub((dec + 1) * num_dests);
            waiting_changed = true;
        }

        if rating <= 127 && waiting != 0 {
            let r = rng.gen::<u32>();
            if rating <= (r & 0x7F) as i32 {
                let cut = ((r >> 8) & 0x3) as i32 - 1;
                waiting = (waiting as i32 - cut * num_dests as i32).max(0) as u32;
                waiting_changed = true;
            }
        }

        if waiting > WAITING_CARGO_THRESHOLD {
            let difference = waiting - WAITING_CARGO_THRESHOLD;
            waiting -= difference / WAITING_CARGO_CUT_FACTOR;
            waiting = waiting.min(MAX_WAITING_CARGO);
            waiting_changed = true;
        }

        let available = ge.cargo.available_count();
        if waiting_changed && waiting < available {
            ge.max_waiting_cargo = 0;
            truncate_cargo(ge, available - waiting, rng, &mut feedback, c);
        } else {
            ge.max_waiting_cargo = waiting_avg;
        }
    }

    // Sources of truncated cargo see the backlog they caused.
    for (c, per_source) in feedback {
        for (source, left) in per_source {
            if let Some(src) = stations.get_mut(source) {
                let ge = &mut src.goods[c];
                ge.max_waiting_cargo = ge.max_waiting_cargo.max(left);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cargo::CargoPacket;
    use crate::map::TileIndex;
    use crate::services::NoHooks;
    use crate::station::{Station, StationKind};
    use crate::state::{CompanyId, TownId};
    use crate::testing::WorldBuilder;
    use proptest::prelude::*;

    const ME: Owner = Owner::Company(CompanyId(0));
    const PASS: usize = 0;

    fn setup() -> (World, StationId) {
        let mut world = WorldBuilder::new().build();
        let date = world.date;
        let id = world
            .stations
            .allocate(|id| Station::new(id, StationKind::Station, ME, TownId(0), TileIndex::new(10, 10), date));
        (world, id)
    }

    fn goods(world: &mut World, id: StationId) -> &mut GoodsEntry {
        &mut world.stations.get_mut(id).unwrap().goods[PASS]
    }

    struct FixedRating(i32);

    impl ScriptHooks for FixedRating {
        fn station_rating(&self, _station: StationId, _cargo: CargoType, _goods: &GoodsEntry) -> Option<i32> {
            Some(self.0)
        }
    }

    #[test]
    fn test_unrated_cargo_recovers_towards_initial() {
        let (mut world, id) = setup();
        goods(&mut world, id).rating = 100;
        update_station_rating(&mut world, &NoHooks, id);
        assert_eq!(goods(&mut world, id).rating, 101);

        goods(&mut world, id).rating = INITIAL_STATION_RATING;
        update_station_rating(&mut world, &NoHooks, id);
        assert_eq!(goods(&mut world, id).rating, INITIAL_STATION_RATING);
    }

    #[test]
    fn test_good_service_rises_two_points() {
        let (mut world, id) = setup();
        let ge = goods(&mut world, id);
        ge.status.set_to(GoodsStatus::RATING, true);
        ge.time_since_pickup = 0;
        ge.last_speed = 255;
        ge.last_age = 0;
        update_station_rating(&mut world, &NoHooks, id);
        let ge = goods(&mut world, id);
        assert_eq!(ge.rating, INITIAL_STATION_RATING + 2);
        assert_eq!(ge.time_since_pickup, 1);
    }

    #[test]
    fn test_neglected_cargo_drops_and_selectgoods_abandons() {
        let (mut world, id) = setup();
        let ge = goods(&mut world, id);
        ge.status.set_to(GoodsStatus::RATING, true);
        ge.time_since_pickup = 200;
        ge.cargo.append(CargoPacket { source: id, count: 40 }, StationId::INVALID);
        update_station_rating(&mut world, &NoHooks, id);
        assert_eq!(goods(&mut world, id).rating, INITIAL_STATION_RATING - 2);

        goods(&mut world, id).time_since_pickup = 254;
        update_station_rating(&mut world, &NoHooks, id);
        let ge = goods(&mut world, id);
        assert!(!ge.has_rating());
        assert_eq!(ge.cargo.total_count(), 0);
    }

    #[test]
    fn test_statue_and_cheat() {
        let (mut world, id) = setup();
        world.towns[0].statues.insert(CompanyId(0));
        let ge = goods(&mut world, id);
        ge.status.set_to(GoodsStatus::RATING, true);
        ge.rating = 0;
        ge.time_since_pickup = 200;
        update_station_rating(&mut world, &NoHooks, id);
        // 26 for the statue against -90 base plus backlog bonus 130.
        assert_eq!(goods(&mut world, id).rating, 2);

        world.settings.cheat_max_rating = true;
        update_station_rating(&mut world, &NoHooks, id);
        assert_eq!(goods(&mut world, id).rating, MAX_STATION_RATING);
    }

    #[test]
    fn test_hook_replaces_service_rating() {
        let (mut world, id) = setup();
        world.cargos[PASS].rating_hook = true;
        let ge = goods(&mut world, id);
        ge.status.set_to(GoodsStatus::RATING, true);
        ge.rating = 50;
        ge.time_since_pickup = 0;
        ge.last_speed = 255;
        update_station_rating(&mut world, &FixedRating(0), id);
        assert_eq!(goods(&mut world, id).rating, 48);
    }

    #[test]
    fn test_backlog_is_capped() {
        let (mut world, id) = setup();
        let ge = goods(&mut world, id);
        ge.status.set_to(GoodsStatus::RATING, true);
        ge.rating = 255;
        ge.time_since_pickup = 0;
        ge.last_speed = 255;
        ge.last_age = 0;
        ge.cargo.append(CargoPacket { source: id, count: 10_000 }, StationId::INVALID);
        update_station_rating(&mut world, &NoHooks, id);

        let ge = goods(&mut world, id);
        let expected = 10_000 - (10_000 - WAITING_CARGO_THRESHOLD) / WAITING_CARGO_CUT_FACTOR;
        assert_eq!(ge.cargo.total_count(), expected);
        // Own truncated cargo feeds back into the backlog figure.
        assert_eq!(ge.max_waiting_cargo, expected);
    }

    proptest! {
        #[test]
        fn prop_rating_moves_at_most_two(
            rating in 0u8..=255,
            speed in 0u8..=255,
            pickup in 0u8..=253,
            age in 0u8..=255,
            backlog in 0u32..5000,
            waiting in 0u32..20_000,
            seed in 0u64..1000,
        ) {
            let mut world = WorldBuilder::new().with_seed(seed).build();
            let date = world.date;
            let id = world
                .stations
                .allocate(|id| Station::new(id, StationKind::Station, ME, TownId(0), TileIndex::new(10, 10), date));
            let ge = goods(&mut world, id);
            ge.status.set_to(GoodsStatus::RATING, true);
            ge.rating = rating;
            ge.last_speed = speed;
            ge.time_since_pickup = pickup;
            ge.last_age = age;
            ge.max_waiting_cargo = backlog;
            ge.cargo.append(CargoPacket { source: id, count: waiting }, StationId::INVALID);

            update_station_rating(&mut world, &NoHooks, id);
            let ge = goods(&mut world, id);
            prop_assert!((i32::from(ge.rating) - i32::from(rating)).abs() <= 2);
            prop_assert!(ge.cargo.total_count() <= waiting);
            prop_assert!(ge.cargo.total_count() <= MAX_WAITING_CARGO);
        }
    }
}
