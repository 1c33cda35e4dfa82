//! Geodetic tile table and coordinate-to-tile resolution.
//!
//! Longitudes are handled in `[0, 360)`. A tile whose `min_longitude` is
//! greater than its `max_longitude` crosses the 0° seam.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};
use crate::types::TileLayout;

/// Full turn in degrees of longitude.
pub const LONGITUDE_WRAP: f64 = 360.0;

/// Tolerance applied to latitude containment at band boundaries.
pub const LATITUDE_EPSILON: f64 = 1e-6;

/// One backing file and the geodetic box it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileMetadata {
    /// File name, relative to the configured data root.
    pub filename: String,
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl TileMetadata {
    /// Create a new tile record.
    pub fn new(
        filename: impl Into<String>,
        min_latitude: f64,
        max_latitude: f64,
        min_longitude: f64,
        max_longitude: f64,
    ) -> Self {
        Self {
            filename: filename.into(),
            min_latitude,
            max_latitude,
            min_longitude,
            max_longitude,
        }
    }

    /// Whether this tile crosses the 0°/360° seam.
    pub fn wraps(&self) -> bool {
        self.min_longitude > self.max_longitude
    }

    /// Latitude extent in degrees.
    pub fn latitude_span(&self) -> f64 {
        self.max_latitude - self.min_latitude
    }

    /// Longitude extent in degrees, accounting for the seam.
    pub fn longitude_span(&self) -> f64 {
        longitude_span(self)
    }

    /// Check that the tile has a usable, finite extent.
    pub fn validate(&self) -> Result<()> {
        let values = [
            self.min_latitude,
            self.max_latitude,
            self.min_longitude,
            self.max_longitude,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(TerrainError::invalid_tile(&self.filename, "non-finite bounds"));
        }
        if self.latitude_span() <= 0.0 {
            return Err(TerrainError::invalid_tile(
                &self.filename,
                "latitude span must be positive",
            ));
        }
        if self.min_longitude == self.max_longitude {
            return Err(TerrainError::invalid_tile(
                &self.filename,
                "longitude span is zero",
            ));
        }
        let lon_range = 0.0..=LONGITUDE_WRAP;
        if !lon_range.contains(&self.min_longitude) || !lon_range.contains(&self.max_longitude) {
            return Err(TerrainError::invalid_tile(
                &self.filename,
                "longitudes must lie within 0-360",
            ));
        }
        Ok(())
    }

    fn contains_latitude(&self, lat: f64) -> bool {
        lat >= self.min_latitude - LATITUDE_EPSILON && lat <= self.max_latitude + LATITUDE_EPSILON
    }

    /// Longitude containment for an already wrapped longitude.
    fn contains_longitude(&self, lon: f64) -> bool {
        if self.wraps() {
            lon >= self.min_longitude || lon <= self.max_longitude
        } else {
            lon >= self.min_longitude && lon <= self.max_longitude
        }
    }
}

/// Normalize a longitude into `[0, 360)`.
pub fn wrap_longitude(lon: f64) -> f64 {
    let wrapped = lon % LONGITUDE_WRAP;
    let wrapped = if wrapped < 0.0 {
        wrapped + LONGITUDE_WRAP
    } else {
        wrapped
    };
    // -1e-17 % 360 + 360 rounds up to exactly 360
    if wrapped >= LONGITUDE_WRAP {
        0.0
    } else {
        wrapped
    }
}

/// Longitude extent of a tile in degrees.
pub fn longitude_span(tile: &TileMetadata) -> f64 {
    let span = tile.max_longitude - tile.min_longitude;
    if span <= 0.0 {
        span + LONGITUDE_WRAP
    } else {
        span
    }
}

/// Degrees east of the tile's western edge, clamped into `[0, span]`.
pub fn longitude_offset_within_tile(tile: &TileMetadata, lon: f64) -> f64 {
    let mut delta = wrap_longitude(lon) - tile.min_longitude;
    if tile.wraps() && delta < 0.0 {
        delta += LONGITUDE_WRAP;
    }
    delta.clamp(0.0, longitude_span(tile))
}

/// Immutable table of tiles partitioning a latitude band.
#[derive(Debug, Clone)]
pub struct TileRegistry {
    tiles: Vec<TileMetadata>,
    min_latitude: f64,
    max_latitude: f64,
}

impl TileRegistry {
    /// Build a registry from an explicit tile list.
    ///
    /// The covered band is the union of the tiles' latitude ranges.
    pub fn new(tiles: Vec<TileMetadata>) -> Result<Self> {
        if tiles.is_empty() {
            return Err(TerrainError::invalid_input("tile registry needs at least one tile"));
        }
        for tile in &tiles {
            tile.validate()?;
        }

        let min_latitude = tiles
            .iter()
            .map(|t| t.min_latitude)
            .fold(f64::INFINITY, f64::min);
        let max_latitude = tiles
            .iter()
            .map(|t| t.max_latitude)
            .fold(f64::NEG_INFINITY, f64::max);

        Ok(Self {
            tiles,
            min_latitude,
            max_latitude,
        })
    }

    /// The 32-tile SLDEM2015 table: 30° latitude bands from -60° to +60°,
    /// 45° longitude bands from 0° to 360°.
    pub fn sldem2015(layout: TileLayout, chunk_size: usize) -> Self {
        let mut tiles = Vec::with_capacity(32);
        for lat_start in (-60..60).step_by(30) {
            let lat_end = lat_start + 30;
            for lon_start in (0..360).step_by(45) {
                let lon_end = lon_start + 45;
                tiles.push(TileMetadata::new(
                    sldem2015_filename(lat_start, lat_end, lon_start, lon_end, layout, chunk_size),
                    lat_start as f64,
                    lat_end as f64,
                    lon_start as f64,
                    lon_end as f64,
                ));
            }
        }

        Self {
            tiles,
            min_latitude: -60.0,
            max_latitude: 60.0,
        }
    }

    /// Resolve the tile containing a coordinate.
    ///
    /// Returns `None` outside the covered latitude band or when no tile
    /// matches.
    pub fn find_tile(&self, lat: f64, lon: f64) -> Option<&TileMetadata> {
        if !self.in_band(lat) {
            return None;
        }

        let wrapped = wrap_longitude(lon);
        self.tiles
            .iter()
            .find(|tile| tile.contains_latitude(lat) && tile.contains_longitude(wrapped))
    }

    /// Whether a latitude lies inside the covered band.
    pub fn in_band(&self, lat: f64) -> bool {
        lat >= self.min_latitude && lat <= self.max_latitude
    }

    /// Covered latitude band (min, max).
    pub fn latitude_band(&self) -> (f64, f64) {
        (self.min_latitude, self.max_latitude)
    }

    /// All tiles in lookup order.
    pub fn tiles(&self) -> &[TileMetadata] {
        &self.tiles
    }

    /// Number of tiles.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

fn latitude_label(value: i32, southern_band: bool) -> String {
    let hemisphere = if southern_band { 'S' } else { 'N' };
    format!("{:02}{}", value.abs(), hemisphere)
}

fn sldem2015_filename(
    lat_start: i32,
    lat_end: i32,
    lon_start: i32,
    lon_end: i32,
    layout: TileLayout,
    chunk_size: usize,
) -> String {
    // The equator takes the hemisphere of the band it bounds: 30S_00S, 00N_30N.
    let southern = lat_end <= 0;
    let suffix = match layout {
        TileLayout::Chunked => format!("CHUNKED_{chunk_size}.DAT"),
        TileLayout::Raw => "FLOAT.IMG".to_string(),
    };
    format!(
        "SLDEM2015_512_{}_{}_{:03}_{:03}_{}",
        latitude_label(lat_start, southern),
        latitude_label(lat_end, southern),
        lon_start,
        lon_end,
        suffix
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TileRegistry {
        TileRegistry::sldem2015(TileLayout::Chunked, 512)
    }

    #[test]
    fn test_wrap_longitude() {
        assert_eq!(wrap_longitude(0.0), 0.0);
        assert_eq!(wrap_longitude(360.0), 0.0);
        assert_eq!(wrap_longitude(-90.0), 270.0);
        assert_eq!(wrap_longitude(725.0), 5.0);
        assert!(wrap_longitude(-1e-17) < LONGITUDE_WRAP);
    }

    #[test]
    fn test_sldem2015_table() {
        let registry = registry();
        assert_eq!(registry.len(), 32);
        assert_eq!(registry.latitude_band(), (-60.0, 60.0));
        assert_eq!(
            registry.tiles()[0].filename,
            "SLDEM2015_512_60S_30S_000_045_CHUNKED_512.DAT"
        );
        assert_eq!(
            registry.tiles()[8].filename,
            "SLDEM2015_512_30S_00S_000_045_CHUNKED_512.DAT"
        );
        assert_eq!(
            registry.tiles()[16].filename,
            "SLDEM2015_512_00N_30N_000_045_CHUNKED_512.DAT"
        );
        assert_eq!(
            registry.tiles()[31].filename,
            "SLDEM2015_512_30N_60N_315_360_CHUNKED_512.DAT"
        );

        let raw = TileRegistry::sldem2015(TileLayout::Raw, 512);
        assert_eq!(
            raw.tiles()[0].filename,
            "SLDEM2015_512_60S_30S_000_045_FLOAT.IMG"
        );
    }

    #[test]
    fn test_find_tile_contains_input() {
        let registry = registry();
        for lat in [-59.5, -31.0, -0.5, 0.5, 29.9, 59.0] {
            for lon in [-179.0, -1.0, 0.0, 12.3, 44.99, 181.0, 359.9, 400.0] {
                let tile = registry.find_tile(lat, lon).expect("tile in band");
                let wrapped = wrap_longitude(lon);
                assert!(lat >= tile.min_latitude - LATITUDE_EPSILON);
                assert!(lat <= tile.max_latitude + LATITUDE_EPSILON);
                assert!(wrapped >= tile.min_longitude && wrapped <= tile.max_longitude);
            }
        }
    }

    #[test]
    fn test_find_tile_outside_band() {
        let registry = registry();
        assert!(registry.find_tile(60.5, 10.0).is_none());
        assert!(registry.find_tile(-75.0, 10.0).is_none());
        assert!(registry.find_tile(f64::NAN, 10.0).is_none());
        assert!(registry.find_tile(60.0, 10.0).is_some());
    }

    #[test]
    fn test_wraparound_tile_continuity() {
        let seam = TileMetadata::new("seam.dat", 0.0, 30.0, 337.5, 22.5);
        let east = TileMetadata::new("east.dat", 0.0, 30.0, 22.5, 337.5);
        let registry = TileRegistry::new(vec![seam, east]).unwrap();

        assert_eq!(registry.find_tile(10.0, 359.999).unwrap().filename, "seam.dat");
        assert_eq!(registry.find_tile(10.0, 0.001).unwrap().filename, "seam.dat");
        assert_eq!(registry.find_tile(10.0, -0.5).unwrap().filename, "seam.dat");
        assert_eq!(registry.find_tile(10.0, 180.0).unwrap().filename, "east.dat");
    }

    #[test]
    fn test_longitude_span_and_offset() {
        let normal = TileMetadata::new("n.dat", 0.0, 30.0, 45.0, 90.0);
        assert_eq!(longitude_span(&normal), 45.0);
        assert_eq!(longitude_offset_within_tile(&normal, 50.0), 5.0);
        assert_eq!(longitude_offset_within_tile(&normal, 100.0), 45.0);
        assert_eq!(longitude_offset_within_tile(&normal, 10.0), 0.0);

        let seam = TileMetadata::new("s.dat", 0.0, 30.0, 350.0, 20.0);
        assert_eq!(longitude_span(&seam), 30.0);
        assert_eq!(longitude_offset_within_tile(&seam, 355.0), 5.0);
        assert_eq!(longitude_offset_within_tile(&seam, 5.0), 15.0);
        assert_eq!(longitude_offset_within_tile(&seam, -5.0), 5.0);
    }

    #[test]
    fn test_zero_span_tiles_are_rejected() {
        let flat_lat = TileMetadata::new("a.dat", 10.0, 10.0, 0.0, 45.0);
        assert!(matches!(
            TileRegistry::new(vec![flat_lat]),
            Err(TerrainError::InvalidTile { .. })
        ));

        let flat_lon = TileMetadata::new("b.dat", 0.0, 10.0, 45.0, 45.0);
        assert!(TileRegistry::new(vec![flat_lon]).is_err());

        assert!(TileRegistry::new(vec![]).is_err());
    }
}
