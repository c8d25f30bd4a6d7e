//! Airport specifications and town noise.

use crate::map::{TileArea, TileIndex};
use crate::state::{TownId, World};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AirportType {
    Small,
    Large,
    Heliport,
    Oilrig,
}

/// Compass rotation of an airport layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    N,
    E,
    S,
    W,
}

impl Rotation {
    /// East and west rotations swap the footprint's width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::E | Rotation::W)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AirportSpec {
    pub size_x: u16,
    pub size_y: u16,
    pub noise_level: u8,
    pub catchment: u16,
    /// Aeroplanes can land; otherwise helicopters only.
    pub airplanes: bool,
    /// Hangar offset within the unrotated layout.
    pub hangar: Option<(u16, u16)>,
    /// Rotation of each selectable layout.
    pub layouts: &'static [Rotation],
    /// Players may build it.
    pub buildable: bool,
}

const ALL_ROTATIONS: &[Rotation] = &[Rotation::N, Rotation::E, Rotation::S, Rotation::W];

impl AirportType {
    pub fn spec(self) -> AirportSpec {
        match self {
            AirportType::Small => AirportSpec {
                size_x: 4,
                size_y: 3,
                noise_level: 3,
                catchment: 4,
                airplanes: true,
                hangar: Some((3, 0)),
                layouts: ALL_ROTATIONS,
                buildable: true,
            },
            AirportType::Large => AirportSpec {
                size_x: 6,
                size_y: 6,
                noise_level: 5,
                catchment: 5,
                airplanes: true,
                hangar: Some((5, 0)),
                layouts: ALL_ROTATIONS,
                buildable: true,
            },
            AirportType::Heliport => AirportSpec {
                size_x: 1,
                size_y: 1,
                noise_level: 1,
                catchment: 4,
                airplanes: false,
                hangar: None,
                layouts: &[Rotation::N],
                buildable: true,
            },
            AirportType::Oilrig => AirportSpec {
                size_x: 1,
                size_y: 1,
                noise_level: 0,
                catchment: 4,
                airplanes: false,
                hangar: None,
                layouts: &[Rotation::N],
                buildable: false,
            },
        }
    }
}

impl AirportSpec {
    /// Footprint size after rotation.
    pub fn rotated_size(&self, rotation: Rotation) -> (u16, u16) {
        if rotation.swaps_axes() {
            (self.size_y, self.size_x)
        } else {
            (self.size_x, self.size_y)
        }
    }

    /// Hangar tile of a layout placed at `origin`.
    pub fn hangar_tile(&self, origin: TileIndex, rotation: Rotation) -> Option<TileIndex> {
        let (hx, hy) = self.hangar?;
        let (w, h) = (self.size_x, self.size_y);
        let (dx, dy) = match rotation {
            Rotation::N => (hx, hy),
            Rotation::E => (hy, w - 1 - hx),
            Rotation::S => (w - 1 - hx, h - 1 - hy),
            Rotation::W => (h - 1 - hy, hx),
        };
        origin.offset(i32::from(dx), i32::from(dy))
    }
}

/// Per-station airport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Airport {
    pub area: TileArea,
    pub airport_type: Option<AirportType>,
    pub layout: u8,
    pub rotation: Rotation,
    /// Closed to incoming aircraft.
    pub closed: bool,
}

impl Airport {
    pub fn spec(&self) -> Option<AirportSpec> {
        self.airport_type.map(AirportType::spec)
    }

    pub fn clear(&mut self) {
        *self = Airport::default();
    }
}

/// Noise an airport makes in the nearest town. Noise falls by one step for
/// every `8 + 4 * tolerance` tiles of distance, but never below one.
pub fn noise_level_for_distance(spec: &AirportSpec, distance: u32, tolerance: u8) -> u8 {
    if spec.noise_level < 2 {
        return spec.noise_level;
    }
    let tolerance_distance = 8 + u32::from(tolerance) * 4;
    let reduction = distance / tolerance_distance;
    if reduction >= u32::from(spec.noise_level) {
        1
    } else {
        spec.noise_level - reduction as u8
    }
}

/// Town closest to any perimeter tile of `area`, with that distance. Ties go
/// to the lower town id.
pub fn nearest_town(world: &World, area: &TileArea) -> Option<(TownId, u32)> {
    let mut best: Option<(TownId, u32)> = None;
    for tile in area.iter() {
        let on_perimeter = tile.x == area.tile.x
            || tile.x == area.right()
            || tile.y == area.tile.y
            || tile.y == area.bottom();
        if !on_perimeter {
            continue;
        }
        let Some(town) = world.closest_town(tile) else {
            continue;
        };
        let Some(t) = world.town(town) else {
            continue;
        };
        let dist = t.xy.distance_manhattan(tile);
        best = match best {
            Some((b, d)) if d < dist || (d == dist && b <= town) => Some((b, d)),
            _ => Some((town, dist)),
        };
    }
    best
}

/// Recompute every town's noise from the airports standing near it.
pub fn update_airports_noise(world: &mut World) {
    for town in &mut world.towns {
        town.noise_reached = 0;
    }
    let tolerance = world.settings.town_council_tolerance;
    let mut contributions = Vec::new();
    for st in world.stations.iter() {
        let Some(spec) = st.airport.spec() else {
            continue;
        };
        if st.airport.airport_type == Some(AirportType::Oilrig) || st.airport.area.is_empty() {
            continue;
        }
        if let Some((town, dist)) = nearest_town(world, &st.airport.area) {
            contributions.push((town, noise_level_for_distance(&spec, dist, tolerance)));
        }
    }
    for (town, noise) in contributions {
        if let Some(t) = world.towns.get_mut(usize::from(town.0)) {
            t.noise_reached += u16::from(noise);
        }
    }
}
