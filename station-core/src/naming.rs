//! Default station names.
//!
//! A new station is named after its town plus a suffix. The suffix is the
//! first candidate, in a fixed priority order, that no other station of the
//! same town already uses. An industry close by may instead lend its own
//! station name, recorded as the station's `indtype`.

use crate::cargo::CargoClasses;
use crate::map::{TileIndex, TileKind};
use crate::station::Station;
use crate::state::{Climate, IndustryStationName, IndustryTypeId, StationId, World};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default name suffixes, in slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultName {
    Plain,
    Central,
    Transfer,
    Halt,
    Valley,
    Heights,
    Woods,
    Lakeside,
    Exchange,
    Airport,
    Oilfield,
    Mines,
    Docks,
    North,
    South,
    East,
    West,
    Annexe,
    Sidings,
    Branch,
    Upper,
    Lower,
    Heliport,
    Forest,
    /// Every suffix is taken, or an industry named the station.
    Fallback,
    Waypoint,
}

impl DefaultName {
    fn suffix(self) -> Option<&'static str> {
        Some(match self {
            DefaultName::Plain => return None,
            DefaultName::Central => "Central",
            DefaultName::Transfer => "Transfer",
            DefaultName::Halt => "Halt",
            DefaultName::Valley => "Valley",
            DefaultName::Heights => "Heights",
            DefaultName::Woods => "Woods",
            DefaultName::Lakeside => "Lakeside",
            DefaultName::Exchange => "Exchange",
            DefaultName::Airport => "Airport",
            DefaultName::Oilfield => "Oilfield",
            DefaultName::Mines => "Mines",
            DefaultName::Docks => "Docks",
            DefaultName::North => "North",
            DefaultName::South => "South",
            DefaultName::East => "East",
            DefaultName::West => "West",
            DefaultName::Annexe => "Annexe",
            DefaultName::Sidings => "Sidings",
            DefaultName::Branch => "Branch",
            DefaultName::Upper => "Upper",
            DefaultName::Lower => "Lower",
            DefaultName::Heliport => "Heliport",
            DefaultName::Forest => "Forest",
            DefaultName::Fallback => "Station",
            DefaultName::Waypoint => "Waypoint",
        })
    }
}

/// What kind of facility the name is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationNaming {
    Rail,
    Road,
    Airport,
    Oilrig,
    Dock,
    Heliport,
}

const FALLBACK_NAMES: [DefaultName; 12] = [
    DefaultName::North,
    DefaultName::South,
    DefaultName::East,
    DefaultName::West,
    DefaultName::Transfer,
    DefaultName::Halt,
    DefaultName::Exchange,
    DefaultName::Annexe,
    DefaultName::Sidings,
    DefaultName::Branch,
    DefaultName::Upper,
    DefaultName::Lower,
];

#[derive(Debug, Default)]
struct UsedNames {
    names: BTreeSet<DefaultName>,
    indtypes: BTreeSet<IndustryTypeId>,
}

impl UsedNames {
    fn is_available(&self, name: DefaultName) -> bool {
        !self.names.contains(&name)
    }

    fn set_used(&mut self, name: DefaultName) {
        self.names.insert(name);
    }
}

/// Number of tiles in the 7×7 square around `tile` matching `pred`.
fn count_map_square_around(world: &World, tile: TileIndex, pred: impl Fn(&World, TileIndex) -> bool) -> u32 {
    let mut num = 0;
    for dy in -3..=3 {
        for dx in -3..=3 {
            if let Some(t) = world.map.offset(tile, dx, dy) {
                if pred(world, t) {
                    num += 1;
                }
            }
        }
    }
    num
}

/// Tile of an extractive industry producing something other than liquids,
/// passengers or mail.
fn is_mine_tile(world: &World, tile: TileIndex) -> bool {
    let TileKind::Industry(id) = world.map.get(tile).kind else {
        return false;
    };
    let Some(ind) = world.industries.get(&id) else {
        return false;
    };
    if !world.industry_spec(ind.industry_type).is_some_and(|s| s.extractive) {
        return false;
    }
    ind.produced.iter().any(|c| {
        world.cargo(*c).is_some_and(|spec| {
            !spec.classes.has(CargoClasses::LIQUID | CargoClasses::PASSENGERS | CargoClasses::MAIL)
        })
    })
}

fn is_water_tile(world: &World, tile: TileIndex) -> bool {
    world.map.get(tile).is_water()
}

fn is_tree_tile(world: &World, tile: TileIndex) -> bool {
    world.map.get(tile).kind == TileKind::Trees
}

fn is_forest_industry_tile(world: &World, tile: TileIndex) -> bool {
    let TileKind::Industry(id) = world.map.get(tile).kind else {
        return false;
    };
    world
        .industries
        .get(&id)
        .and_then(|ind| world.industry_spec(ind.industry_type))
        .is_some_and(|spec| spec.forest)
}

/// Pick a default name for `st`, built at `tile`. Returns the name and the
/// industry type that lent its name, if any.
pub fn generate_station_name(
    world: &World,
    st: &Station,
    tile: TileIndex,
    class: StationNaming,
) -> (DefaultName, Option<IndustryTypeId>) {
    let Some(town) = world.town(st.town) else {
        return (DefaultName::Fallback, None);
    };
    let mut used = UsedNames::default();

    for other in world.stations.iter() {
        if other.id == st.id || other.town != st.town {
            continue;
        }
        if let Some(indtype) = other.indtype {
            used.indtypes.insert(indtype);
            let name = world.industry_spec(indtype).map(|s| &s.station_name);
            if let Some(name) = name.filter(|n| **n != IndustryStationName::Undefined) {
                // Other industry types sharing the name count as used too.
                for (i, spec) in world.industry_specs.iter().enumerate() {
                    if spec.station_name == *name {
                        used.indtypes.insert(IndustryTypeId(i as u8));
                    }
                }
            }
            continue;
        }
        let name = match other.string_id {
            DefaultName::Forest => DefaultName::Woods,
            DefaultName::Fallback | DefaultName::Waypoint => continue,
            n => n,
        };
        used.set_used(name);
    }

    for near in world.map.spiral(tile, 7) {
        let TileKind::Industry(id) = world.map.get(near).kind else {
            continue;
        };
        let Some(ind) = world.industries.get(&id) else {
            continue;
        };
        let indtype = ind.industry_type;
        let Some(spec) = world.industry_spec(indtype) else {
            continue;
        };
        if spec.station_name == IndustryStationName::Undefined {
            continue;
        }
        used.set_used(DefaultName::Oilfield);
        used.set_used(DefaultName::Mines);
        if used.indtypes.contains(&indtype) {
            continue;
        }
        if let IndustryStationName::Named(_) = spec.station_name {
            return (DefaultName::Fallback, Some(indtype));
        }
        break;
    }

    let class_default = match class {
        StationNaming::Airport => Some(DefaultName::Airport),
        StationNaming::Oilrig => Some(DefaultName::Oilfield),
        StationNaming::Dock => Some(DefaultName::Docks),
        StationNaming::Heliport => Some(DefaultName::Heliport),
        StationNaming::Rail | StationNaming::Road => None,
    };
    if let Some(name) = class_default.filter(|n| used.is_available(*n)) {
        return (name, None);
    }

    if used.is_available(DefaultName::Mines) && count_map_square_around(world, tile, is_mine_tile) >= 2 {
        return (DefaultName::Mines, None);
    }

    if tile.distance_max(town.xy) < 8 {
        if used.is_available(DefaultName::Plain) {
            return (DefaultName::Plain, None);
        }
        if used.is_available(DefaultName::Central) {
            return (DefaultName::Central, None);
        }
    }

    if used.is_available(DefaultName::Lakeside)
        && world.map.distance_from_edge(tile) < 20
        && count_map_square_around(world, tile, is_water_tile) >= 5
    {
        return (DefaultName::Lakeside, None);
    }

    if used.is_available(DefaultName::Woods)
        && (count_map_square_around(world, tile, is_tree_tile) >= 8
            || count_map_square_around(world, tile, is_forest_industry_tile) >= 2)
    {
        let name = if world.settings.climate == Climate::SubTropic {
            DefaultName::Forest
        } else {
            DefaultName::Woods
        };
        return (name, None);
    }

    let z = world.map.get(tile).height;
    let town_z = world.map.get(town.xy).height;
    if z < town_z {
        if used.is_available(DefaultName::Valley) {
            return (DefaultName::Valley, None);
        }
    } else if z > town_z && used.is_available(DefaultName::Heights) {
        return (DefaultName::Heights, None);
    }

    // Rule out the directions pointing back towards the town.
    if tile.x < town.xy.x {
        used.set_used(DefaultName::South);
        used.set_used(DefaultName::West);
    } else {
        used.set_used(DefaultName::North);
        used.set_used(DefaultName::East);
    }
    if tile.y < town.xy.y {
        used.set_used(DefaultName::South);
        used.set_used(DefaultName::East);
    } else {
        used.set_used(DefaultName::North);
        used.set_used(DefaultName::West);
    }

    let name = FALLBACK_NAMES
        .iter()
        .copied()
        .find(|n| used.is_available(*n))
        .unwrap_or(DefaultName::Fallback);
    (name, None)
}

/// Display name of a station.
pub fn station_name(world: &World, st: &Station) -> String {
    if let Some(name) = &st.name {
        return name.clone();
    }
    let town = world.town(st.town).map_or("", |t| t.name.as_str());
    if let Some(IndustryStationName::Named(suffix)) =
        st.indtype.and_then(|i| world.industry_spec(i)).map(|s| &s.station_name)
    {
        return format!("{town} {suffix}");
    }
    match (st.string_id, st.string_id.suffix()) {
        (DefaultName::Fallback | DefaultName::Waypoint, Some(suffix)) => {
            format!("{town} {suffix} #{}", st.id.0)
        }
        (_, Some(suffix)) => format!("{town} {suffix}"),
        (_, None) => town.to_string(),
    }
}

/// Whether any other station already displays `name`.
pub fn is_unique_station_name(world: &World, name: &str, except: StationId) -> bool {
    world
        .stations
        .iter()
        .filter(|s| s.id != except)
        .all(|s| s.name.as_deref() != Some(name))
}
