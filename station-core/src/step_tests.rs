//! Unit tests for step.rs simulation stepping.
use super::*;
use crate::cargo::CargoType;
use crate::command::{CommandError, NEW_STATION};
use crate::map::{Axis, RailType, TileIndex};
use crate::news::StationEvent;
use crate::station::{Facilities, Station, StationKind};
use crate::state::TownId;
use crate::testing::{Harness, WorldBuilder};

const ME: CompanyId = CompanyId(0);

fn rail_station(tile: TileIndex) -> Command {
    Command::BuildRailStation {
        tile,
        rail_type: RailType::Rail,
        axis: Axis::X,
        numtracks: 1,
        plat_len: 3,
        join: NEW_STATION,
        adjacent: false,
    }
}

#[test]
fn test_step_world_advances_date() {
    let mut h = Harness::new();
    let start = h.world.date;
    for _ in 0..DAY_TICKS {
        let outcomes = h.call(|world, services| step_world(world, services, &[]));
        assert!(outcomes.is_empty());
    }
    assert_eq!(h.world.date, start.add_days(1));
    assert_eq!(h.world.date_fract, 0);
    assert_eq!(h.world.tick_counter, u64::from(DAY_TICKS));
}

#[test]
fn test_step_world_command_execution() {
    let mut h = Harness::new();
    let inputs = vec![CompanyInputs {
        company: ME,
        commands: vec![
            rail_station(TileIndex::new(10, 10)),
            Command::BuildRailStation {
                tile: TileIndex::new(20, 20),
                rail_type: RailType::Rail,
                axis: Axis::X,
                numtracks: 0,
                plat_len: 3,
                join: NEW_STATION,
                adjacent: false,
            },
        ],
    }];

    let outcomes = h.call(|world, services| step_world(world, services, &inputs));
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].result.is_ok());
    assert_eq!(outcomes[1].result, Err(CommandError::Invalid));
    assert_eq!(h.world.stations.len(), 1);
}

#[test]
fn test_unused_station_is_deleted_after_countdown() {
    let mut h = Harness::new();
    let date = h.world.date;
    let id = h
        .world
        .stations
        .allocate(|id| Station::new(id, StationKind::Station, Owner::Company(ME), TownId(0), TileIndex::new(5, 5), date));

    h.tick((STATION_ACCEPTANCE_TICKS * u64::from(DELETE_COUNTDOWN - 1)) as u32);
    assert!(h.world.stations.contains(id));
    h.tick(STATION_ACCEPTANCE_TICKS as u32);
    assert!(!h.world.stations.contains(id));
    assert!(h
        .world
        .news
        .events()
        .iter()
        .any(|e| matches!(e, StationEvent::StationDeleted { station, .. } if *station == id)));
}

#[test]
fn test_station_in_use_survives_and_gets_rated() {
    let mut h = Harness::new();
    h.run(Owner::Company(ME), &rail_station(TileIndex::new(10, 10))).unwrap();
    let id = h.world.map.get(TileIndex::new(10, 10)).station_id().unwrap();
    let pass = CargoType(0);
    {
        let ge = &mut h.world.stations.get_mut(id).unwrap().goods[pass.index()];
        ge.status.set_to(GoodsStatus::RATING, true);
        ge.time_since_pickup = 0;
    }

    h.tick(STATION_ACCEPTANCE_TICKS as u32 * u32::from(DELETE_COUNTDOWN) + 1);
    let st = h.world.stations.get(id).unwrap();
    assert!(st.goods[pass.index()].time_since_pickup > 0);
    assert_eq!(st.delete_ctr, 0);
}

#[test]
fn test_monthly_rollover() {
    let mut world = WorldBuilder::new().with_date(1950, 1, 30).build();
    let date = world.date;
    let id = world
        .stations
        .allocate(|id| Station::new(id, StationKind::Station, Owner::Company(ME), TownId(0), TileIndex::new(5, 5), date));
    let st = world.stations.get_mut(id).unwrap();
    st.facilities.set(Facilities::BUS_STOP);
    st.goods[0].status.set_to(GoodsStatus::CURRENT_MONTH, true);
    let mut h = Harness::from_world(world);

    h.tick(u32::from(DAY_TICKS));
    let status = h.world.stations.get(id).unwrap().goods[0].status;
    assert_eq!(h.world.date.day(), 1);
    assert!(status.has(GoodsStatus::LAST_MONTH));
    assert!(!status.has(GoodsStatus::CURRENT_MONTH));

    h.tick(u32::from(DAY_TICKS) * 30);
    let status = h.world.stations.get(id).unwrap().goods[0].status;
    assert!(!status.has(GoodsStatus::LAST_MONTH));
}

#[test]
fn test_determinism() {
    let build = || {
        let mut h = Harness::new();
        h.run(Owner::Company(ME), &rail_station(TileIndex::new(10, 10))).unwrap();
        h
    };
    let mut a = build();
    let mut b = build();
    a.tick(2000);
    b.tick(2000);

    let json_a = serde_json::to_string(&a.world).unwrap();
    let json_b = serde_json::to_string(&b.world).unwrap();
    assert_eq!(json_a, json_b);
}

#[test]
fn test_failed_command_reports_error() {
    let mut h = Harness::new();
    let inputs = vec![CompanyInputs {
        company: ME,
        commands: vec![Command::RenameStation {
            station: StationId(40),
            name: "Nowhere".to_string(),
        }],
    }];
    let outcomes = h.call(|world, services| step_world(world, services, &inputs));
    assert_eq!(outcomes[0].result, Err(CommandError::Invalid));
}
