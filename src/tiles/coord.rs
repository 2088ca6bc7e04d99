use std::f64::consts::PI;
use std::fmt;
use std::path::PathBuf;

use geo_types::{Coord, Rect};

use crate::error::{TileError, TileResult};
use crate::registry::ZoomSettings;

pub const EXTENT: u32 = 4096;

pub const EARTH_RADIUS: f64 = 6_378_137.0;

const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32, zoom: &ZoomSettings) -> TileResult<Self> {
        if !zoom.contains(z) {
            return Err(TileError::InvalidCoordinate(format!(
                "zoom {z} outside [{}, {}]",
                zoom.min_zoom, zoom.max_zoom
            )));
        }
        let n = 1u64 << z;
        if x as u64 >= n || y as u64 >= n {
            return Err(TileError::InvalidCoordinate(format!(
                "tile {x}/{y} does not exist at zoom {z}"
            )));
        }
        Ok(Self { z, x, y })
    }

    pub fn parse(z: &str, x: &str, y: &str, zoom: &ZoomSettings) -> TileResult<Self> {
        let z = z
            .parse::<u8>()
            .map_err(|_| TileError::InvalidCoordinate(format!("zoom '{z}' is not a number")))?;
        let x = parse_index("x", x)?;
        let y = parse_index("y", y)?;
        Self::new(z, x, y, zoom)
    }

    pub fn tile_edges(&self) -> LonLatBounds {
        let n = (1u64 << self.z) as f64;
        let lon = |x: f64| x / n * 360.0 - 180.0;
        let lat = |y: f64| (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();
        LonLatBounds {
            west: lon(self.x as f64),
            south: lat(self.y as f64 + 1.0),
            east: lon(self.x as f64 + 1.0),
            north: lat(self.y as f64),
        }
    }

    pub fn mercator_bounds(&self) -> Rect<f64> {
        let edges = self.tile_edges();
        let (min_x, min_y) = lonlat_to_mercator(edges.west, edges.south);
        let (max_x, max_y) = lonlat_to_mercator(edges.east, edges.north);
        Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y })
    }

    pub fn relative_dir(&self) -> PathBuf {
        PathBuf::from(self.z.to_string())
            .join(self.x.to_string())
            .join(self.y.to_string())
    }
}

fn parse_index(axis: &str, raw: &str) -> TileResult<u32> {
    raw.parse::<u32>()
        .map_err(|_| TileError::InvalidCoordinate(format!("{axis} '{raw}' is not a tile index")))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LonLatBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl LonLatBounds {
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.west,
                y: self.south,
            },
            Coord {
                x: self.east,
                y: self.north,
            },
        )
    }
}

pub fn lonlat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

// Maps a projected coordinate into the tile grid: x grows east, y grows
// south, the tile spans `[0, extent]` on both axes.
pub fn mercator_to_tile(point: (f64, f64), bounds: &Rect<f64>, extent: u32) -> Coord<f64> {
    let extent = extent as f64;
    Coord {
        x: (point.0 - bounds.min().x) / bounds.width() * extent,
        y: (bounds.max().y - point.1) / bounds.height() * extent,
    }
}
