//! Web-Mercator slippy-map tile math.
//!
//! Pure coordinate conversions between geographic positions and integer
//! tile indices at a given zoom level. No I/O, no state: the tile cache
//! and prefetcher build on these.

use core::fmt;
use std::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest latitude representable under Web-Mercator.
///
/// The projection diverges toward the poles; callers must clamp into
/// `±MAX_MERCATOR_LATITUDE` before requesting tile ranges, and
/// [`TileCoord::from_lat_lng`] does so defensively.
pub const MAX_MERCATOR_LATITUDE: f64 = 85.05112878;

/// Address of one slippy-map tile: `(zoom, x, y)`.
///
/// The triple uniquely identifies a tile across all zoom levels, which is
/// what makes it usable as a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TileCoord {
    /// Zoom level (0 = whole world in one tile).
    pub zoom: u8,
    /// Column index, west to east.
    pub x: u32,
    /// Row index, north to south.
    pub y: u32,
}

impl TileCoord {
    /// Project a geographic position onto the tile grid at `zoom`.
    ///
    /// Latitude is clamped to the Web-Mercator domain first, so poles map
    /// to the outermost tile row instead of producing NaN indices.
    /// Longitude 180° maps to the last column.
    ///
    /// # Examples
    ///
    /// ```
    /// use waymark_types::TileCoord;
    ///
    /// let tile = TileCoord::from_lat_lng(13.7565, 121.0583, 12);
    /// assert_eq!((tile.x, tile.y), (3425, 1889));
    /// ```
    #[must_use]
    pub fn from_lat_lng(lat: f64, lng: f64, zoom: u8) -> Self {
        let lat = lat.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE);
        let n = 2f64.powi(i32::from(zoom));

        let x = ((lng + 180.0) / 360.0 * n).floor();
        let lat_rad = lat.to_radians();
        let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor();

        let max = Self::max_index(zoom) as f64;
        Self {
            zoom,
            x: x.clamp(0.0, max) as u32,
            y: y.clamp(0.0, max) as u32,
        }
    }

    /// Largest valid x/y index at a zoom level (`2^zoom - 1`).
    #[must_use]
    pub fn max_index(zoom: u8) -> u32 {
        if zoom >= 32 {
            u32::MAX
        } else {
            ((1u64 << zoom) - 1) as u32
        }
    }

    /// Geographic position of this tile's northwest corner as `(lat, lng)`.
    ///
    /// The southeast corner is the northwest corner of `(x + 1, y + 1)`,
    /// so a tile's bounding box is recoverable from two calls.
    #[must_use]
    pub fn nw_corner(&self) -> (f64, f64) {
        let n = 2f64.powi(i32::from(self.zoom));
        let lng = f64::from(self.x) / n * 360.0 - 180.0;
        let lat = (PI * (1.0 - 2.0 * f64::from(self.y) / n)).sinh().atan().to_degrees();
        (lat, lng)
    }

    /// The square grid of side `2 * radius + 1` centered on this tile,
    /// clipped to the valid index range at this zoom level.
    ///
    /// Tiles that would fall off the edge of the grid are omitted, not
    /// wrapped.
    #[must_use]
    pub fn neighborhood(&self, radius: u32) -> Vec<TileCoord> {
        let r = i64::from(radius);
        let max = i64::from(Self::max_index(self.zoom));
        let mut tiles = Vec::with_capacity(((2 * radius + 1) * (2 * radius + 1)) as usize);

        for dx in -r..=r {
            for dy in -r..=r {
                let x = i64::from(self.x) + dx;
                let y = i64::from(self.y) + dy;
                if x < 0 || y < 0 || x > max || y > max {
                    continue;
                }
                tiles.push(TileCoord {
                    zoom: self.zoom,
                    x: x as u32,
                    y: y as u32,
                });
            }
        }
        tiles
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Inclusive rectangle of tile indices covering a viewport at one zoom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TileRange {
    /// Zoom level of every tile in the range.
    pub zoom: u8,
    /// Westernmost column.
    pub x_min: u32,
    /// Easternmost column (inclusive).
    pub x_max: u32,
    /// Northernmost row.
    pub y_min: u32,
    /// Southernmost row (inclusive).
    pub y_max: u32,
}

impl TileRange {
    /// Tile range covering a viewport given its northwest and southeast
    /// corners as `(lat, lng)` pairs.
    #[must_use]
    pub fn from_viewport(nw: (f64, f64), se: (f64, f64), zoom: u8) -> Self {
        let a = TileCoord::from_lat_lng(nw.0, nw.1, zoom);
        let b = TileCoord::from_lat_lng(se.0, se.1, zoom);

        Self {
            zoom,
            x_min: a.x.min(b.x),
            x_max: a.x.max(b.x),
            y_min: a.y.min(b.y),
            y_max: a.y.max(b.y),
        }
    }

    /// Number of tiles in the range.
    #[must_use]
    pub fn len(&self) -> usize {
        let w = (self.x_max - self.x_min + 1) as usize;
        let h = (self.y_max - self.y_min + 1) as usize;
        w * h
    }

    /// Whether the range is empty (never true for a well-formed range).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate the range row by row, north to south.
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> + '_ {
        (self.y_min..=self.y_max).flat_map(move |y| {
            (self.x_min..=self.x_max).map(move |x| TileCoord {
                zoom: self.zoom,
                x,
                y,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zoom_zero_is_single_tile() {
        let tile = TileCoord::from_lat_lng(13.7565, 121.0583, 0);
        assert_eq!(tile, TileCoord { zoom: 0, x: 0, y: 0 });
    }

    #[test]
    fn test_known_projection() {
        // Batangas City at zoom 12.
        let tile = TileCoord::from_lat_lng(13.7565, 121.0583, 12);
        assert_eq!((tile.x, tile.y), (3425, 1889));
    }

    #[test]
    fn test_origin_of_grid() {
        // Null island sits on the center seam of the grid.
        let tile = TileCoord::from_lat_lng(0.0, 0.0, 1);
        assert_eq!((tile.x, tile.y), (1, 1));
    }

    #[test]
    fn test_latitude_is_clamped() {
        let north_pole = TileCoord::from_lat_lng(90.0, 0.0, 10);
        assert_eq!(north_pole.y, 0);

        let south_pole = TileCoord::from_lat_lng(-90.0, 0.0, 10);
        assert_eq!(south_pole.y, TileCoord::max_index(10));
    }

    #[test]
    fn test_antimeridian_maps_to_last_column() {
        let tile = TileCoord::from_lat_lng(0.0, 180.0, 4);
        assert_eq!(tile.x, TileCoord::max_index(4));
    }

    #[test]
    fn test_nw_corner_brackets_projected_point() {
        let tile = TileCoord::from_lat_lng(13.7565, 121.0583, 12);
        let (nw_lat, nw_lng) = tile.nw_corner();
        let (se_lat, se_lng) = TileCoord {
            zoom: 12,
            x: tile.x + 1,
            y: tile.y + 1,
        }
        .nw_corner();

        assert!(nw_lng <= 121.0583 && 121.0583 < se_lng);
        assert!(se_lat <= 13.7565 && 13.7565 <= nw_lat);
    }

    #[test]
    fn test_neighborhood_is_three_by_three() {
        let center = TileCoord::from_lat_lng(13.7565, 121.0583, 12);
        let grid = center.neighborhood(1);
        assert_eq!(grid.len(), 9);
        assert!(grid.contains(&center));
    }

    #[test]
    fn test_neighborhood_clips_at_grid_edge() {
        let corner = TileCoord { zoom: 3, x: 0, y: 0 };
        let grid = corner.neighborhood(1);
        // Only the 2x2 quadrant inside the grid survives.
        assert_eq!(grid.len(), 4);
        assert!(grid.iter().all(|t| t.x <= 1 && t.y <= 1));
    }

    #[test]
    fn test_tile_range_from_viewport() {
        let range = TileRange::from_viewport((14.0, 120.9), (13.5, 121.2), 12);
        assert!(range.x_min <= range.x_max);
        assert!(range.y_min <= range.y_max);
        assert_eq!(range.iter().count(), range.len());
        assert!(!range.is_empty());

        // Every tile of the range projects back inside the range.
        for tile in range.iter() {
            assert_eq!(tile.zoom, 12);
            assert!(tile.x >= range.x_min && tile.x <= range.x_max);
        }
    }

    #[test]
    fn test_display() {
        let tile = TileCoord { zoom: 12, x: 3425, y: 1889 };
        assert_eq!(tile.to_string(), "12/3425/1889");
    }

    proptest! {
        /// For any point inside the Mercator domain, the tile containing it,
        /// reverse-projected, contains the original point.
        #[test]
        fn prop_tile_bounds_contain_point(
            lat in -85.0f64..85.0,
            lng in -179.999f64..179.999,
            zoom in 0u8..=18,
        ) {
            let tile = TileCoord::from_lat_lng(lat, lng, zoom);
            let (nw_lat, nw_lng) = tile.nw_corner();
            let (se_lat, se_lng) = TileCoord {
                zoom: tile.zoom,
                x: tile.x + 1,
                y: tile.y + 1,
            }
            .nw_corner();

            let eps = 1e-9;
            prop_assert!(nw_lng - eps <= lng && lng < se_lng + eps);
            prop_assert!(se_lat - eps <= lat && lat <= nw_lat + eps);
        }

        #[test]
        fn prop_indices_stay_in_range(
            lat in -90.0f64..=90.0,
            lng in -180.0f64..=180.0,
            zoom in 0u8..=18,
        ) {
            let tile = TileCoord::from_lat_lng(lat, lng, zoom);
            prop_assert!(tile.x <= TileCoord::max_index(zoom));
            prop_assert!(tile.y <= TileCoord::max_index(zoom));
        }
    }
}
