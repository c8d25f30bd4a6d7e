//! Bounding rectangle of all tiles attributed to a station.
//!
//! The rectangle grows eagerly when tiles are added and shrinks only by
//! re-scanning the map from the affected edge inward after a removal. A
//! removed tile in the interior never shrinks anything, since other tiles may
//! still span the full extent.

use crate::command::CommandError;
use crate::map::{Map, TileArea, TileIndex};
use crate::state::StationId;
use serde::{Deserialize, Serialize};

/// How a tile addition treats the spread limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectMode {
    /// Only check whether the tile could be added.
    Test,
    /// Add the tile; the caller has already tested it.
    Try,
    /// Add the tile regardless of the spread limit.
    Force,
}

/// Inclusive tile rectangle. Empty when `left > right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Default for StationRect {
    fn default() -> Self {
        Self {
            left: 0,
            top: 0,
            right: -1,
            bottom: -1,
        }
    }
}

impl StationRect {
    pub fn is_empty(&self) -> bool {
        self.left > self.right || self.top > self.bottom
    }

    pub fn make_empty(&mut self) {
        *self = Self::default();
    }

    fn make_point(&mut self, tile: TileIndex) {
        let (x, y) = (i32::from(tile.x), i32::from(tile.y));
        *self = Self {
            left: x,
            top: y,
            right: x,
            bottom: y,
        };
    }

    pub fn width(&self) -> i32 {
        self.right - self.left + 1
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top + 1
    }

    /// Whether `(x, y)` lies inside the rectangle grown by `distance` on
    /// every side.
    pub fn pt_in_extended_rect(&self, x: i32, y: i32, distance: i32) -> bool {
        self.left - distance <= x
            && x <= self.right + distance
            && self.top - distance <= y
            && y <= self.bottom + distance
    }

    pub fn contains(&self, tile: TileIndex) -> bool {
        !self.is_empty() && self.pt_in_extended_rect(i32::from(tile.x), i32::from(tile.y), 0)
    }

    pub fn to_area(&self) -> TileArea {
        if self.is_empty() {
            return TileArea::EMPTY;
        }
        TileArea::from_corners(
            TileIndex::new(self.left as u16, self.top as u16),
            TileIndex::new(self.right as u16, self.bottom as u16),
        )
    }

    /// Grow to include `tile`, subject to the spread limit unless forced.
    pub fn before_add_tile(
        &mut self,
        tile: TileIndex,
        mode: RectMode,
        spread: u16,
    ) -> Result<(), CommandError> {
        let (x, y) = (i32::from(tile.x), i32::from(tile.y));
        if self.is_empty() {
            if mode != RectMode::Test {
                self.make_point(tile);
            }
        } else if !self.pt_in_extended_rect(x, y, 0) {
            let grown = Self {
                left: self.left.min(x),
                top: self.top.min(y),
                right: self.right.max(x),
                bottom: self.bottom.max(y),
            };
            let spread = i32::from(spread);
            if mode != RectMode::Force && (grown.width() > spread || grown.height() > spread) {
                debug_assert!(mode != RectMode::Try, "spread not tested before adding");
                return Err(CommandError::StationTooSpreadOut);
            }
            if mode != RectMode::Test {
                *self = grown;
            }
        }
        Ok(())
    }

    /// Grow to include a whole area. Areas wider than the spread limit are
    /// left for the per-tile checks to reject.
    pub fn before_add_rect(
        &mut self,
        area: &TileArea,
        mode: RectMode,
        spread: u16,
    ) -> Result<(), CommandError> {
        if area.is_empty() {
            return Ok(());
        }
        if mode == RectMode::Force || (area.w <= spread && area.h <= spread) {
            self.before_add_tile(area.tile, mode, spread)?;
            let far = TileIndex::new(area.right(), area.bottom());
            return self.before_add_tile(far, mode, spread);
        }
        Ok(())
    }

    /// Shrink after `tile` stopped belonging to `station`. The tile must
    /// already be cleared on the map. Returns true when the rectangle became
    /// empty.
    pub fn after_remove_tile(&mut self, map: &Map, station: StationId, tile: TileIndex) -> bool {
        let mut x = i32::from(tile.x);
        let mut y = i32::from(tile.y);

        loop {
            let left_edge = x == self.left;
            let right_edge = x == self.right;
            let top_edge = y == self.top;
            let bottom_edge = y == self.bottom;

            let reduce_x = (left_edge || right_edge)
                && !scan_for_station_tiles(map, station, x, self.top, x, self.bottom);
            let reduce_y = (top_edge || bottom_edge)
                && !scan_for_station_tiles(map, station, self.left, y, self.right, y);
            if !(reduce_x || reduce_y) {
                break;
            }

            if reduce_x {
                if left_edge {
                    x += 1;
                    self.left = x;
                } else {
                    x -= 1;
                    self.right = x;
                }
            }
            if reduce_y {
                if top_edge {
                    y += 1;
                    self.top = y;
                } else {
                    y -= 1;
                    self.bottom = y;
                }
            }

            if self.is_empty() {
                self.make_empty();
                return true;
            }
        }
        false
    }

    /// Shrink after every tile of `area` was removed.
    pub fn after_remove_rect(&mut self, map: &Map, station: StationId, area: &TileArea) -> bool {
        debug_assert!(self.pt_in_extended_rect(
            i32::from(area.tile.x),
            i32::from(area.tile.y),
            0
        ));
        debug_assert!(self.pt_in_extended_rect(
            i32::from(area.right()),
            i32::from(area.bottom()),
            0
        ));

        let empty = self.after_remove_tile(map, station, area.tile);
        if area.w != 1 || area.h != 1 {
            let far = TileIndex::new(area.right(), area.bottom());
            return self.after_remove_tile(map, station, far) || empty;
        }
        empty
    }
}

fn scan_for_station_tiles(
    map: &Map,
    station: StationId,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
) -> bool {
    if left > right || top > bottom || right < 0 || bottom < 0 {
        return false;
    }
    let clamp = |v: i32| v.clamp(0, i32::from(u16::MAX)) as u16;
    map.has_station_tile_in(station, clamp(left), clamp(top), clamp(right), clamp(bottom))
}
