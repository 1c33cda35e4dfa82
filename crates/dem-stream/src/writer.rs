//! Conversion of raw row-major tiles into the chunked layout.
//!
//! The source is streamed one band of `chunk_size` rows at a time, so memory
//! use is bounded by a single band regardless of tile size.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{Result, TerrainError};
use crate::types::{RasterGeometry, SAMPLE_BYTES};

/// Suffix of raw source tiles.
pub const RAW_TILE_SUFFIX: &str = "_FLOAT.IMG";

/// Outcome of a directory conversion.
#[derive(Debug, Clone, Default)]
pub struct ConvertReport {
    /// Chunked files written.
    pub converted: Vec<PathBuf>,
    /// Source files skipped because of their size.
    pub skipped: Vec<PathBuf>,
}

/// Name of the chunked file produced from a raw tile name, if it is one.
pub fn chunked_filename(raw_name: &str, chunk_size: usize) -> Option<String> {
    raw_name
        .strip_suffix(RAW_TILE_SUFFIX)
        .map(|stem| format!("{stem}_CHUNKED_{chunk_size}.DAT"))
}

/// Rewrite a raw tile into chunked order.
///
/// The source must hold exactly `tile_width * tile_height` samples. Returns
/// the number of chunks written.
pub fn convert_tile(source: &Path, dest: &Path, geometry: &RasterGeometry) -> Result<usize> {
    geometry.validate().map_err(TerrainError::config)?;

    let actual = std::fs::metadata(source)?.len();
    let expected = geometry.tile_bytes();
    if actual != expected {
        return Err(TerrainError::invalid_input(format!(
            "{}: expected {} bytes, found {}",
            source.display(),
            expected,
            actual
        )));
    }

    let (num_x, num_y) = geometry.num_chunks();
    let size = geometry.chunk_size;
    let row_bytes = geometry.tile_width * SAMPLE_BYTES;
    let chunk_row_bytes = size * SAMPLE_BYTES;

    info!(
        source = %source.display(),
        dest = %dest.display(),
        chunks_x = num_x,
        chunks_y = num_y,
        "Converting tile"
    );

    let mut reader = BufReader::new(File::open(source)?);
    let mut writer = BufWriter::new(File::create(dest)?);
    let mut band = vec![0u8; row_bytes * size];

    for _ in 0..num_y {
        reader.read_exact(&mut band)?;
        for chunk_x in 0..num_x {
            for row in 0..size {
                let start = row * row_bytes + chunk_x * chunk_row_bytes;
                writer.write_all(&band[start..start + chunk_row_bytes])?;
            }
        }
    }

    writer.flush()?;
    Ok(num_x * num_y)
}

/// Convert every raw tile directly inside `input` into `output`.
///
/// Files with the wrong size are skipped with a warning; other I/O errors
/// abort the conversion.
pub fn convert_directory(
    input: &Path,
    output: &Path,
    geometry: &RasterGeometry,
) -> Result<ConvertReport> {
    std::fs::create_dir_all(output)?;
    let mut report = ConvertReport::default();

    let walker = WalkDir::new(input)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|e| TerrainError::storage(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let Some(dest_name) = chunked_filename(name, geometry.chunk_size) else {
            continue;
        };

        let dest = output.join(dest_name);
        match convert_tile(entry.path(), &dest, geometry) {
            Ok(_) => report.converted.push(dest),
            Err(TerrainError::InvalidInput(reason)) => {
                warn!(reason = %reason, "Skipping tile");
                report.skipped.push(entry.path().to_path_buf());
            }
            Err(err) => return Err(err),
        }
    }

    if report.converted.is_empty() && report.skipped.is_empty() {
        warn!(input = %input.display(), "No {} files found", RAW_TILE_SUFFIX);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{create_test_grid, write_chunked_tile, write_raw_tile};

    #[test]
    fn test_chunked_filename() {
        assert_eq!(
            chunked_filename("SLDEM2015_512_00N_30N_000_045_FLOAT.IMG", 512).as_deref(),
            Some("SLDEM2015_512_00N_30N_000_045_CHUNKED_512.DAT")
        );
        assert!(chunked_filename("README.txt", 512).is_none());
    }

    #[test]
    fn test_convert_tile_matches_chunked_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let grid = create_test_grid(40, 30);
        let raw = dir.path().join("raw.img");
        let expected = dir.path().join("expected.dat");
        let actual = dir.path().join("actual.dat");
        write_raw_tile(&raw, &grid).unwrap();
        write_chunked_tile(&expected, &grid, 40, 30, 10).unwrap();

        let chunks = convert_tile(&raw, &actual, &RasterGeometry::new(40, 30, 10)).unwrap();
        assert_eq!(chunks, 12);
        assert_eq!(std::fs::read(&actual).unwrap(), std::fs::read(&expected).unwrap());
    }

    #[test]
    fn test_convert_tile_rejects_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw.img");
        write_raw_tile(&raw, &create_test_grid(40, 29)).unwrap();

        let err = convert_tile(&raw, &dir.path().join("out.dat"), &RasterGeometry::new(40, 30, 10))
            .unwrap_err();
        assert!(matches!(err, TerrainError::InvalidInput(_)));
    }

    #[test]
    fn test_convert_directory() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let geometry = RasterGeometry::new(20, 10, 10);

        write_raw_tile(&input.path().join("A_FLOAT.IMG"), &create_test_grid(20, 10)).unwrap();
        write_raw_tile(&input.path().join("B_FLOAT.IMG"), &create_test_grid(10, 10)).unwrap();
        std::fs::write(input.path().join("notes.txt"), b"ignored").unwrap();

        let report = convert_directory(input.path(), output.path(), &geometry).unwrap();
        assert_eq!(report.converted, vec![output.path().join("A_CHUNKED_10.DAT")]);
        assert_eq!(report.skipped, vec![input.path().join("B_FLOAT.IMG")]);
        assert!(!output.path().join("B_CHUNKED_10.DAT").exists());
    }
}
