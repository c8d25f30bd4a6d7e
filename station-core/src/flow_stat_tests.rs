//! Unit tests for flow_stat.rs share arithmetic.
use super::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn st(id: u16) -> StationId {
    StationId(id)
}

fn layout(fs: &FlowStat) -> Vec<(u32, StationId)> {
    fs.shares().iter().map(|(b, s)| (*b, *s)).collect()
}

/// Shares of 10 via 1, 20 via 2, 30 via 3; all unrestricted.
fn three_way() -> FlowStat {
    let mut fs = FlowStat::new(st(1), 10, false);
    fs.append_share(st(2), 20, false);
    fs.append_share(st(3), 30, false);
    fs
}

#[test]
fn test_get_share_reads_intervals() {
    let fs = three_way();
    assert_eq!(fs.get_share(st(1)), 10);
    assert_eq!(fs.get_share(st(2)), 20);
    assert_eq!(fs.get_share(st(3)), 30);
    assert_eq!(fs.get_share(st(9)), 0);
    assert_eq!(fs.total(), 60);
    assert_eq!(fs.unrestricted(), 60);
}

#[test]
fn test_change_share_grows_in_place() {
    let mut fs = three_way();
    fs.change_share(st(2), 5);
    assert_eq!(layout(&fs), vec![(10, st(1)), (35, st(2)), (65, st(3))]);
    assert_eq!(fs.unrestricted(), 65);
}

#[test]
fn test_change_share_partial_and_full_removal() {
    let mut fs = three_way();
    fs.change_share(st(2), -5);
    assert_eq!(layout(&fs), vec![(10, st(1)), (25, st(2)), (55, st(3))]);
    assert_eq!(fs.unrestricted(), 55);

    fs.change_share(st(2), -100);
    assert_eq!(layout(&fs), vec![(10, st(1)), (40, st(3))]);
    assert_eq!(fs.unrestricted(), 40);

    fs.change_share(st(1), REMOVE_SHARE);
    assert_eq!(layout(&fs), vec![(30, st(3))]);
    assert_eq!(fs.get_share(st(1)), 0);
}

#[test]
fn test_change_share_appends_new_destination() {
    let mut fs = three_way();
    fs.change_share(st(4), 7);
    assert_eq!(fs.get_share(st(4)), 7);
    assert_eq!(fs.total(), 67);
    assert_eq!(fs.unrestricted(), 67);
}

#[test]
fn test_new_destination_is_unrestricted_behind_restricted_shares() {
    let mut fs = three_way();
    fs.restrict_share(st(3));
    assert_eq!(fs.unrestricted(), 30);

    fs.change_share(st(4), 5);
    // The new share sits in front, ahead of the restricted one.
    assert_eq!(fs.unrestricted(), 35);
    assert_eq!(fs.get_share(st(4)), 5);
    assert_eq!(fs.shares().iter().next(), Some((&5, &st(4))));
    assert_eq!(fs.total(), 65);
}

#[test]
fn test_restrict_moves_share_to_end() {
    let mut fs = three_way();
    fs.restrict_share(st(1));
    assert_eq!(layout(&fs), vec![(20, st(2)), (50, st(3)), (60, st(1))]);
    assert_eq!(fs.unrestricted(), 50);

    // Already restricted: no-op.
    let before = fs.clone();
    fs.restrict_share(st(1));
    assert_eq!(fs, before);
}

#[test]
fn test_release_moves_share_to_front() {
    let mut fs = three_way();
    fs.restrict_share(st(2));
    fs.restrict_share(st(3));
    assert_eq!(fs.unrestricted(), 10);

    fs.release_share(st(3));
    assert_eq!(fs.get_share(st(3)), 30);
    assert_eq!(fs.unrestricted(), 40);
    assert_eq!(fs.shares().iter().next(), Some((&30, &st(3))));
    assert_eq!(fs.total(), 60);
}

#[test]
fn test_restrict_release_round_trip_single_unrestricted() {
    let mut fs = FlowStat::new(st(7), 12, false);
    fs.append_share(st(8), 4, true);
    let original = fs.clone();

    fs.restrict_share(st(7));
    assert_eq!(fs.unrestricted(), 0);
    fs.release_share(st(7));
    assert_eq!(fs, original);
}

#[test]
fn test_restrict_release_round_trip_lone_share() {
    let mut fs = FlowStat::new(st(7), 12, false);
    let original = fs.clone();
    fs.restrict_share(st(7));
    assert_eq!(fs.unrestricted(), 0);
    assert_eq!(fs.get_share(st(7)), 12);
    fs.release_share(st(7));
    assert_eq!(fs, original);
}

#[test]
fn test_invalidate_flattens_shares() {
    let mut fs = three_way();
    fs.restrict_share(st(3));
    fs.invalidate();
    assert_eq!(layout(&fs), vec![(1, st(1)), (2, st(2)), (3, st(3))]);
    assert_eq!(fs.unrestricted(), 2);
}

#[test]
fn test_scale_to_monthly_keeps_split() {
    let mut fs = three_way();
    fs.restrict_share(st(3));
    fs.scale_to_monthly(60);
    assert_eq!(layout(&fs), vec![(5, st(1)), (15, st(2)), (30, st(3))]);
    assert_eq!(fs.unrestricted(), 15);

    let mut tiny = FlowStat::new(st(1), 1, false);
    tiny.append_share(st(2), 1, false);
    tiny.scale_to_monthly(300);
    assert_eq!(layout(&tiny), vec![(1, st(1)), (2, st(2))]);
}

#[test]
fn test_get_via_excluding_only_destination_is_invalid() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let fs = FlowStat::new(st(1), 10, false);
    assert_eq!(fs.get_via(st(1), StationId::INVALID, &mut rng), StationId::INVALID);
    assert_eq!(fs.get_via_any(&mut rng), st(1));
}

#[test]
fn test_get_via_never_picks_restricted() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut fs = three_way();
    fs.restrict_share(st(2));
    for _ in 0..200 {
        assert_ne!(fs.get_via_any(&mut rng), st(2));
    }
}

#[test]
fn test_map_add_and_pass_on_flow() {
    let mut map = FlowStatMap::default();
    map.add_flow(st(1), st(2), 10);
    map.add_flow(st(1), st(3), 5);
    map.pass_on_flow(st(4), st(2), 6);
    assert_eq!(map.get_flow(), 15 + 12);
    assert_eq!(map.get_flow_via(st(2)), 16);
    assert_eq!(map.get_flow_from(st(1)), 15);
    assert_eq!(map.get_flow_from_via(st(4), StationId::INVALID), 6);
    assert_eq!(map.get_flow_from_via(st(9), st(2)), 0);
}

#[test]
fn test_finalize_local_consumption_nets_out() {
    let mut map = FlowStatMap::default();
    let me = st(5);
    // 8 consumed locally, 6 of which was passed on.
    map.add_flow(st(1), me, 8);
    map.add_flow(st(1), st(2), 4);
    map.pass_on_flow(st(1), st(2), 6);
    map.finalize_local_consumption(me);

    let fs = map.get(st(1)).unwrap();
    assert_eq!(fs.get_share(StationId::INVALID), 0);
    assert_eq!(fs.get_share(me), 2);
    assert_eq!(fs.get_share(st(2)), 10);
}

#[test]
fn test_delete_flows_reports_erased_origins() {
    let mut map = FlowStatMap::default();
    map.add_flow(st(1), st(9), 10);
    map.add_flow(st(2), st(9), 10);
    map.add_flow(st(2), st(3), 10);
    let erased = map.delete_flows(st(9));
    assert_eq!(erased, vec![st(1)]);
    assert!(map.get(st(1)).is_none());
    assert_eq!(map.get_flow_via(st(9)), 0);
    assert_eq!(map.get_flow_from(st(2)), 10);
}

#[test]
fn test_restrict_and_release_flows() {
    let mut map = FlowStatMap::default();
    map.add_flow(st(1), st(2), 10);
    map.add_flow(st(1), st(3), 10);
    map.restrict_flows(st(2));
    assert_eq!(map.get(st(1)).unwrap().unrestricted(), 10);
    map.release_flows(st(2));
    assert_eq!(map.get(st(1)).unwrap().unrestricted(), 20);
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Distinct destinations with positive share sizes, split at `restricted_from`.
    fn build(sizes: &[u32], restricted_from: usize) -> FlowStat {
        let mut fs = FlowStat::new(st(0), sizes[0], restricted_from == 0);
        for (i, size) in sizes.iter().enumerate().skip(1) {
            fs.append_share(st(i as u16), *size, i >= restricted_from);
        }
        fs
    }

    fn assert_well_formed(fs: &FlowStat) -> Result<(), TestCaseError> {
        let mut prev = 0;
        let mut sum = 0;
        let mut split_found = fs.unrestricted() == 0;
        for (&b, _) in fs.shares() {
            prop_assert!(b > prev, "boundaries must increase");
            sum += b - prev;
            if b == fs.unrestricted() {
                split_found = true;
            }
            prev = b;
        }
        prop_assert_eq!(sum, fs.total());
        prop_assert!(split_found, "unrestricted must sit on a boundary");
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_change_share_conserves(
            sizes in prop::collection::vec(1u32..50, 1..8),
            target in 0u16..10,
            delta in -60i32..60,
        ) {
            let mut fs = build(&sizes, sizes.len());
            let before = fs.total() as i64;
            let had = fs.get_share(st(target)) as i64;
            fs.change_share(st(target), delta);
            if fs.is_empty() {
                return Ok(());
            }
            assert_well_formed(&fs)?;
            let expected = if delta >= 0 { had + i64::from(delta) } else { (had + i64::from(delta)).max(0) };
            let expected = if had == 0 && delta < 0 { 0 } else { expected };
            prop_assert_eq!(fs.get_share(st(target)) as i64, expected);
            prop_assert_eq!(fs.total() as i64, before - had + expected);
        }

        #[test]
        fn prop_remove_share_erases_destination(
            sizes in prop::collection::vec(1u32..50, 2..8),
            target in 0usize..8,
        ) {
            let mut fs = build(&sizes, sizes.len());
            let target = st((target % sizes.len()) as u16);
            fs.change_share(target, REMOVE_SHARE);
            prop_assert!(fs.shares().values().all(|s| *s != target));
            assert_well_formed(&fs)?;
        }

        #[test]
        fn prop_get_via_respects_exclusions(
            sizes in prop::collection::vec(1u32..40, 1..7),
            restricted_from in 1usize..8,
            a in 0u16..8,
            b in 0u16..8,
            seed in any::<u64>(),
        ) {
            let fs = build(&sizes, restricted_from.min(sizes.len()));
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let other_mass: u32 = fs
                .shares()
                .iter()
                .filter(|(bound, via)| **bound <= fs.unrestricted() && **via != st(a) && **via != st(b))
                .map(|(_, via)| fs.get_share(*via))
                .sum();
            for _ in 0..20 {
                let via = fs.get_via(st(a), st(b), &mut rng);
                if other_mass > 0 {
                    prop_assert!(via != st(a) && via != st(b));
                    prop_assert!(via.is_valid());
                } else {
                    prop_assert_eq!(via, StationId::INVALID);
                }
            }
        }

        #[test]
        fn prop_restrict_release_round_trip(
            sizes in prop::collection::vec(1u32..40, 1..7),
            target in 0usize..7,
        ) {
            let mut fs = build(&sizes, sizes.len());
            // Only the first share may be released back to the same slot.
            let target = st((target % sizes.len()) as u16);
            fs.restrict_share(target);
            assert_well_formed(&fs)?;
            prop_assert_eq!(fs.unrestricted(), fs.total() - fs.get_share(target));
            fs.release_share(target);
            assert_well_formed(&fs)?;
            prop_assert_eq!(fs.unrestricted(), fs.total());
            prop_assert_eq!(fs.shares().iter().next().map(|(_, s)| *s), Some(target));
        }

        #[test]
        fn prop_scale_to_monthly_strictly_increasing(
            sizes in prop::collection::vec(1u32..1000, 1..8),
            restricted_from in 0usize..8,
            runtime in 1u32..400,
        ) {
            let mut fs = build(&sizes, restricted_from.min(sizes.len()));
            let count = fs.shares().len();
            fs.scale_to_monthly(runtime);
            prop_assert_eq!(fs.shares().len(), count);
            assert_well_formed(&fs)?;
        }
    }
}
