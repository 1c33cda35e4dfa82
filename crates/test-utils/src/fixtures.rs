//! Common test fixtures for terrain streaming tests.
//!
//! This module writes synthetic tile files in both on-disk layouts and
//! provides the small raster geometries the test suite is built around.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Common raster geometries for testing.
pub mod geometry {
    /// Raster and chunk dimensions of a synthetic tile.
    #[derive(Debug, Clone, Copy)]
    pub struct TileSpec {
        pub width: usize,
        pub height: usize,
        pub chunk_size: usize,
    }

    impl TileSpec {
        /// Returns the total number of samples.
        pub fn size(&self) -> usize {
            self.width * self.height
        }

        /// Returns the chunk grid dimensions (x, y).
        pub fn num_chunks(&self) -> (usize, usize) {
            (self.width / self.chunk_size, self.height / self.chunk_size)
        }
    }

    /// 100x100 tile split into 10x10 chunks.
    pub const SMALL_TILE: TileSpec = TileSpec {
        width: 100,
        height: 100,
        chunk_size: 10,
    };

    /// Non-square tile with a 3:2 aspect like the SLDEM2015 rasters.
    pub const WIDE_TILE: TileSpec = TileSpec {
        width: 90,
        height: 60,
        chunk_size: 15,
    };

    /// Full SLDEM2015 512 ppd tile.
    pub const SLDEM2015: TileSpec = TileSpec {
        width: 23040,
        height: 15360,
        chunk_size: 512,
    };
}

/// Common geodetic boxes as (min_lat, max_lat, min_lon, max_lon).
pub mod bounds {
    /// Northern-hemisphere tile starting at the prime meridian.
    pub const NORTH_0_45: (f64, f64, f64, f64) = (0.0, 30.0, 0.0, 45.0);

    /// Its eastern neighbour.
    pub const NORTH_45_90: (f64, f64, f64, f64) = (0.0, 30.0, 45.0, 90.0);

    /// Southern neighbour of [`NORTH_0_45`].
    pub const SOUTH_0_45: (f64, f64, f64, f64) = (-30.0, 0.0, 0.0, 45.0);

    /// Tile crossing the 0/360 seam.
    pub const SEAM: (f64, f64, f64, f64) = (0.0, 30.0, 337.5, 22.5);
}

/// Serialize samples as little-endian `f32`.
fn write_samples<W: Write>(writer: &mut W, samples: &[f32]) -> std::io::Result<()> {
    if cfg!(target_endian = "little") {
        writer.write_all(bytemuck::cast_slice(samples))
    } else {
        for value in samples {
            writer.write_all(&value.to_le_bytes())?;
        }
        Ok(())
    }
}

/// Writes a raw, row-major tile with no header.
pub fn write_raw_tile(path: &Path, data: &[f32]) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_samples(&mut writer, data)?;
    writer.flush()
}

/// Writes a chunked tile: `chunk_size` square blocks in row-major chunk
/// order, each block stored row-major.
///
/// # Panics
///
/// Panics if the dimensions are not multiples of `chunk_size` or `data`
/// does not hold `width * height` samples.
pub fn write_chunked_tile(
    path: &Path,
    data: &[f32],
    width: usize,
    height: usize,
    chunk_size: usize,
) -> std::io::Result<()> {
    assert_eq!(data.len(), width * height, "data must hold width * height samples");
    assert!(
        width % chunk_size == 0 && height % chunk_size == 0,
        "dimensions must be multiples of chunk_size"
    );

    let mut writer = BufWriter::new(File::create(path)?);
    for chunk_y in 0..height / chunk_size {
        for chunk_x in 0..width / chunk_size {
            for row in 0..chunk_size {
                let start = (chunk_y * chunk_size + row) * width + chunk_x * chunk_size;
                write_samples(&mut writer, &data[start..start + chunk_size])?;
            }
        }
    }
    writer.flush()
}
