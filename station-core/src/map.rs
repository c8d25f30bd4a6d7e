//! World tile grid.
//!
//! The map is a dense row-major grid of [`Tile`]s. Coordinates are carried as
//! [`TileIndex`] (x, y) pairs so that geometry helpers do not need the map
//! size; bounds are checked against the [`Map`] where it matters.

use crate::state::{CompanyId, IndustryId, StationId, TownId};
use serde::{Deserialize, Serialize};

// ============================================================================
// Coordinates & Areas
// ============================================================================

/// A tile coordinate. Ordering is row-major (y first, then x).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileIndex {
    pub y: u16,
    pub x: u16,
}

impl TileIndex {
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Offset by a signed delta; `None` if the result leaves the coordinate space.
    pub fn offset(self, dx: i32, dy: i32) -> Option<TileIndex> {
        let x = i32::from(self.x) + dx;
        let y = i32::from(self.y) + dy;
        if (0..=i32::from(u16::MAX)).contains(&x) && (0..=i32::from(u16::MAX)).contains(&y) {
            Some(TileIndex::new(x as u16, y as u16))
        } else {
            None
        }
    }

    pub fn step(self, dir: DiagDirection) -> Option<TileIndex> {
        let (dx, dy) = dir.delta();
        self.offset(dx, dy)
    }

    pub fn distance_manhattan(self, other: TileIndex) -> u32 {
        u32::from(self.x.abs_diff(other.x)) + u32::from(self.y.abs_diff(other.y))
    }

    pub fn distance_max(self, other: TileIndex) -> u32 {
        u32::from(self.x.abs_diff(other.x)).max(u32::from(self.y.abs_diff(other.y)))
    }
}

impl std::fmt::Display for TileIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Axis-aligned rectangle of tiles. A zero width or height is the empty area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileArea {
    pub tile: TileIndex,
    pub w: u16,
    pub h: u16,
}

impl Default for TileArea {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl TileArea {
    pub const EMPTY: TileArea = TileArea {
        tile: TileIndex::new(0, 0),
        w: 0,
        h: 0,
    };

    pub fn new(tile: TileIndex, w: u16, h: u16) -> Self {
        Self { tile, w, h }
    }

    /// Smallest area spanning both corner tiles.
    pub fn from_corners(a: TileIndex, b: TileIndex) -> Self {
        let x0 = a.x.min(b.x);
        let y0 = a.y.min(b.y);
        Self {
            tile: TileIndex::new(x0, y0),
            w: a.x.max(b.x) - x0 + 1,
            h: a.y.max(b.y) - y0 + 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    pub fn clear(&mut self) {
        *self = Self::EMPTY;
    }

    pub fn right(&self) -> u16 {
        self.tile.x + self.w - 1
    }

    pub fn bottom(&self) -> u16 {
        self.tile.y + self.h - 1
    }

    pub fn contains(&self, t: TileIndex) -> bool {
        !self.is_empty()
            && t.x >= self.tile.x
            && t.x <= self.right()
            && t.y >= self.tile.y
            && t.y <= self.bottom()
    }

    pub fn intersects(&self, other: &TileArea) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.tile.x <= other.right()
            && other.tile.x <= self.right()
            && self.tile.y <= other.bottom()
            && other.tile.y <= self.bottom()
    }

    /// Grow to include `t`.
    pub fn add(&mut self, t: TileIndex) {
        if self.is_empty() {
            *self = TileArea::new(t, 1, 1);
            return;
        }
        let x0 = self.tile.x.min(t.x);
        let y0 = self.tile.y.min(t.y);
        let x1 = self.right().max(t.x);
        let y1 = self.bottom().max(t.y);
        *self = TileArea::from_corners(TileIndex::new(x0, y0), TileIndex::new(x1, y1));
    }

    /// Expand by `radius` on every side, clamped to the map.
    pub fn expand(&self, radius: u16, map: &Map) -> TileArea {
        if self.is_empty() {
            return *self;
        }
        let x0 = self.tile.x.saturating_sub(radius);
        let y0 = self.tile.y.saturating_sub(radius);
        let x1 = (self.right().saturating_add(radius)).min(map.size_x - 1);
        let y1 = (self.bottom().saturating_add(radius)).min(map.size_y - 1);
        TileArea::from_corners(TileIndex::new(x0, y0), TileIndex::new(x1, y1))
    }

    /// Row-major iteration over all tiles.
    pub fn iter(&self) -> impl Iterator<Item = TileIndex> {
        let area = *self;
        (0..area.h).flat_map(move |dy| {
            (0..area.w).map(move |dx| TileIndex::new(area.tile.x + dx, area.tile.y + dy))
        })
    }
}

// ============================================================================
// Directions, Slopes, Tracks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub fn other(self) -> Axis {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::X,
        }
    }

    pub fn track(self) -> TrackBits {
        match self {
            Axis::X => TrackBits::X,
            Axis::Y => TrackBits::Y,
        }
    }

    pub fn road_bits(self) -> RoadBits {
        match self {
            Axis::X => RoadBits::X,
            Axis::Y => RoadBits::Y,
        }
    }

    /// Direction pointing along the positive end of the axis.
    pub fn diag_dir(self) -> DiagDirection {
        match self {
            Axis::X => DiagDirection::SW,
            Axis::Y => DiagDirection::SE,
        }
    }
}

/// Edge directions of a tile. NE is towards -x, NW towards -y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagDirection {
    NE = 0,
    SE = 1,
    SW = 2,
    NW = 3,
}

impl DiagDirection {
    pub const ALL: [DiagDirection; 4] = [
        DiagDirection::NE,
        DiagDirection::SE,
        DiagDirection::SW,
        DiagDirection::NW,
    ];

    pub fn delta(self) -> (i32, i32) {
        match self {
            DiagDirection::NE => (-1, 0),
            DiagDirection::SE => (0, 1),
            DiagDirection::SW => (1, 0),
            DiagDirection::NW => (0, -1),
        }
    }

    pub fn reverse(self) -> DiagDirection {
        match self {
            DiagDirection::NE => DiagDirection::SW,
            DiagDirection::SE => DiagDirection::NW,
            DiagDirection::SW => DiagDirection::NE,
            DiagDirection::NW => DiagDirection::SE,
        }
    }

    pub fn axis(self) -> Axis {
        match self {
            DiagDirection::NE | DiagDirection::SW => Axis::X,
            DiagDirection::SE | DiagDirection::NW => Axis::Y,
        }
    }

    pub fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Raised corners of a tile plus a steep flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Slope(pub u8);

impl Slope {
    pub const FLAT: Slope = Slope(0);
    pub const W: u8 = 0x01;
    pub const S: u8 = 0x02;
    pub const E: u8 = 0x04;
    pub const N: u8 = 0x08;
    pub const STEEP: u8 = 0x10;

    pub const NE: Slope = Slope(Self::N | Self::E);
    pub const SE: Slope = Slope(Self::S | Self::E);
    pub const SW: Slope = Slope(Self::S | Self::W);
    pub const NW: Slope = Slope(Self::N | Self::W);

    pub fn is_flat(self) -> bool {
        self.0 == 0
    }

    pub fn is_steep(self) -> bool {
        self.0 & Self::STEEP != 0
    }

    /// Height difference between the lowest and highest corner.
    pub fn max_z(self) -> u8 {
        if self.is_flat() {
            0
        } else if self.is_steep() {
            2
        } else {
            1
        }
    }

    /// Inclined slopes rise towards exactly one edge.
    pub fn inclined_direction(self) -> Option<DiagDirection> {
        match self {
            Slope::NE => Some(DiagDirection::NE),
            Slope::SE => Some(DiagDirection::SE),
            Slope::SW => Some(DiagDirection::SW),
            Slope::NW => Some(DiagDirection::NW),
            _ => None,
        }
    }

    /// Whether a foundation facing `dir` can sit on this slope.
    pub fn supports_entrance(self, dir: DiagDirection) -> bool {
        !self.is_steep() && (0x4C_u8 >> (dir as u8)) & self.0 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TrackBits(pub u8);

impl TrackBits {
    pub const NONE: TrackBits = TrackBits(0);
    pub const X: TrackBits = TrackBits(0x01);
    pub const Y: TrackBits = TrackBits(0x02);
    pub const UPPER: TrackBits = TrackBits(0x04);
    pub const LOWER: TrackBits = TrackBits(0x08);
    pub const LEFT: TrackBits = TrackBits(0x10);
    pub const RIGHT: TrackBits = TrackBits(0x20);

    pub fn contains(self, other: TrackBits) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: TrackBits) -> bool {
        self.0 & other.0 != 0
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    pub fn without(self, other: TrackBits) -> TrackBits {
        TrackBits(self.0 & !other.0)
    }
}

/// Road halves present on a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RoadBits(pub u8);

impl RoadBits {
    pub const NONE: RoadBits = RoadBits(0);
    pub const NW: RoadBits = RoadBits(0x01);
    pub const SW: RoadBits = RoadBits(0x02);
    pub const SE: RoadBits = RoadBits(0x04);
    pub const NE: RoadBits = RoadBits(0x08);
    pub const X: RoadBits = RoadBits(0x02 | 0x08);
    pub const Y: RoadBits = RoadBits(0x01 | 0x04);
    pub const ALL: RoadBits = RoadBits(0x0F);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_subset_of(self, other: RoadBits) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn intersects(self, other: RoadBits) -> bool {
        self.0 & other.0 != 0
    }

    /// Exactly two perpendicular halves.
    pub fn is_corner(self) -> bool {
        matches!(self.0, 0x03 | 0x06 | 0x0C | 0x09)
    }
}

// ============================================================================
// Transport Types & Ownership
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RailType {
    Rail,
    Electric,
    Monorail,
    Maglev,
}

impl RailType {
    pub const ALL: [RailType; 4] = [
        RailType::Rail,
        RailType::Electric,
        RailType::Monorail,
        RailType::Maglev,
    ];

    /// Engines built for `self` have power on track of type `tile`.
    pub fn has_power_on(self, tile: RailType) -> bool {
        match self {
            RailType::Rail => matches!(tile, RailType::Rail | RailType::Electric),
            other => other == tile,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoadType {
    Road,
    Tram,
}

/// One road or tram layer on a tile, with the company that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadPiece {
    pub road_type: RoadType,
    pub owner: Owner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Owner {
    Company(CompanyId),
    Town,
    Water,
    None,
}

impl Owner {
    pub fn company(self) -> Option<CompanyId> {
        match self {
            Owner::Company(c) => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaterClass {
    Sea,
    Canal,
    River,
}

// ============================================================================
// Tile Contents
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoadStopType {
    Bus,
    Truck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoadStopLayout {
    /// Bay stop entered from one side.
    Bay(DiagDirection),
    DriveThrough(Axis),
}

/// What part of a station sits on a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationPart {
    Rail {
        axis: Axis,
        rail_type: RailType,
        reserved: bool,
    },
    Waypoint {
        axis: Axis,
        rail_type: RailType,
        reserved: bool,
    },
    RoadStop {
        stop_type: RoadStopType,
        layout: RoadStopLayout,
        road: Option<RoadPiece>,
        tram: Option<RoadPiece>,
    },
    Airport {
        hangar: bool,
    },
    Dock {
        direction: DiagDirection,
        /// The sloped land half; the other half sits on water.
        land: bool,
        /// Water under the water half, restored on removal.
        water: WaterClass,
    },
    Oilrig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationType {
    Rail,
    Waypoint,
    Bus,
    Truck,
    Airport,
    Dock,
    Oilrig,
}

impl StationPart {
    pub fn station_type(&self) -> StationType {
        match self {
            StationPart::Rail { .. } => StationType::Rail,
            StationPart::Waypoint { .. } => StationType::Waypoint,
            StationPart::RoadStop {
                stop_type: RoadStopType::Bus,
                ..
            } => StationType::Bus,
            StationPart::RoadStop { .. } => StationType::Truck,
            StationPart::Airport { .. } => StationType::Airport,
            StationPart::Dock { .. } => StationType::Dock,
            StationPart::Oilrig => StationType::Oilrig,
        }
    }

    /// Rail-like parts (stations and waypoints) along `axis`.
    pub fn rail_axis(&self) -> Option<Axis> {
        match self {
            StationPart::Rail { axis, .. } | StationPart::Waypoint { axis, .. } => Some(*axis),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationTile {
    pub station: StationId,
    pub part: StationPart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RailTile {
    pub rail_type: RailType,
    pub tracks: TrackBits,
    pub reserved: TrackBits,
    pub signals: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadTile {
    pub bits: RoadBits,
    pub road: Option<RoadPiece>,
    pub tram: Option<RoadPiece>,
    /// Town that built the road, if any.
    pub town: Option<TownId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileKind {
    Clear,
    Trees,
    Water(WaterClass),
    Rail(RailTile),
    Road(RoadTile),
    House(TownId),
    Industry(IndustryId),
    Station(StationTile),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub kind: TileKind,
    pub height: u8,
    pub slope: Slope,
    pub owner: Owner,
    pub bridge_above: bool,
}

impl Default for Tile {
    fn default() -> Self {
        Self {
            kind: TileKind::Clear,
            height: 1,
            slope: Slope::FLAT,
            owner: Owner::None,
            bridge_above: false,
        }
    }
}

impl Tile {
    pub fn station(&self) -> Option<&StationTile> {
        match &self.kind {
            TileKind::Station(st) => Some(st),
            _ => None,
        }
    }

    pub fn station_mut(&mut self) -> Option<&mut StationTile> {
        match &mut self.kind {
            TileKind::Station(st) => Some(st),
            _ => None,
        }
    }

    pub fn station_id(&self) -> Option<StationId> {
        self.station().map(|st| st.station)
    }

    pub fn is_water(&self) -> bool {
        matches!(self.kind, TileKind::Water(_))
    }

    /// Height of the flat surface a foundation would create.
    pub fn flat_z(&self) -> u8 {
        self.height + self.slope.max_z()
    }
}

// ============================================================================
// Map
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Map {
    pub size_x: u16,
    pub size_y: u16,
    tiles: Vec<Tile>,
}

impl Map {
    pub fn new(size_x: u16, size_y: u16) -> Self {
        Self {
            size_x,
            size_y,
            tiles: vec![Tile::default(); usize::from(size_x) * usize::from(size_y)],
        }
    }

    pub fn is_valid(&self, t: TileIndex) -> bool {
        t.x < self.size_x && t.y < self.size_y
    }

    pub fn area_is_valid(&self, area: &TileArea) -> bool {
        !area.is_empty()
            && u32::from(area.tile.x) + u32::from(area.w) <= u32::from(self.size_x)
            && u32::from(area.tile.y) + u32::from(area.h) <= u32::from(self.size_y)
    }

    fn slot(&self, t: TileIndex) -> usize {
        debug_assert!(self.is_valid(t), "tile {t} outside map");
        usize::from(t.y) * usize::from(self.size_x) + usize::from(t.x)
    }

    pub fn get(&self, t: TileIndex) -> &Tile {
        &self.tiles[self.slot(t)]
    }

    pub fn get_mut(&mut self, t: TileIndex) -> &mut Tile {
        let slot = self.slot(t);
        &mut self.tiles[slot]
    }

    /// Tile if the coordinate is on the map.
    pub fn try_get(&self, t: TileIndex) -> Option<&Tile> {
        self.is_valid(t).then(|| self.get(t))
    }

    pub fn offset(&self, t: TileIndex, dx: i32, dy: i32) -> Option<TileIndex> {
        t.offset(dx, dy).filter(|n| self.is_valid(*n))
    }

    pub fn step(&self, t: TileIndex, dir: DiagDirection) -> Option<TileIndex> {
        t.step(dir).filter(|n| self.is_valid(*n))
    }

    /// Distance to the closest map border.
    pub fn distance_from_edge(&self, t: TileIndex) -> u32 {
        let xl = u32::from(t.x);
        let yl = u32::from(t.y);
        let xh = u32::from(self.size_x) - 1 - xl;
        let yh = u32::from(self.size_y) - 1 - yl;
        xl.min(yl).min(xh).min(yh)
    }

    /// Tiles of the `size`×`size` square around `center` in spiral order,
    /// center first, then ring by ring.
    pub fn spiral(&self, center: TileIndex, size: u16) -> Vec<TileIndex> {
        let mut out = Vec::with_capacity(usize::from(size) * usize::from(size));
        if self.is_valid(center) {
            out.push(center);
        }
        let rings = i32::from(size / 2);
        for r in 1..=rings {
            // Walk the ring clockwise from its top-left corner.
            let mut x = -r;
            let mut y = -r;
            for (dx, dy) in [(1, 0), (0, 1), (-1, 0), (0, -1)] {
                for _ in 0..(2 * r) {
                    if let Some(t) = self.offset(center, x, y) {
                        out.push(t);
                    }
                    x += dx;
                    y += dy;
                }
            }
        }
        out
    }

    /// Station tiles of `station` inside the inclusive rectangle.
    pub fn has_station_tile_in(
        &self,
        station: StationId,
        left: u16,
        top: u16,
        right: u16,
        bottom: u16,
    ) -> bool {
        if left > right || top > bottom {
            return false;
        }
        TileArea::from_corners(TileIndex::new(left, top), TileIndex::new(right, bottom))
            .iter()
            .filter(|t| self.is_valid(*t))
            .any(|t| self.get(t).station_id() == Some(station))
    }
}
