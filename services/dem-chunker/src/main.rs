//! DEM tile preprocessor.
//!
//! Rewrites raw row-major `*_FLOAT.IMG` tiles into the chunked
//! `*_CHUNKED_<size>.DAT` layout read by the terrain loader.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use dem_stream::{convert_directory, RasterGeometry, TerrainConfig};

#[derive(Parser, Debug)]
#[command(name = "dem-chunker")]
#[command(about = "Converts raw DEM tiles into the chunked layout")]
struct Args {
    /// Directory containing the source *_FLOAT.IMG files
    #[arg(long)]
    input_dir: PathBuf,

    /// Directory the chunked .DAT files are written to
    #[arg(long)]
    output_dir: PathBuf,

    /// Terrain configuration file supplying the tile geometry
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tile width in pixels (overrides the configuration)
    #[arg(long, env = "DEM_TILE_WIDTH")]
    tile_width: Option<usize>,

    /// Tile height in pixels (overrides the configuration)
    #[arg(long, env = "DEM_TILE_HEIGHT")]
    tile_height: Option<usize>,

    /// Chunk edge length in pixels (overrides the configuration)
    #[arg(long, env = "DEM_CHUNK_SIZE")]
    chunk_size: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn geometry(&self) -> Result<RasterGeometry> {
        let mut geometry = match &self.config {
            Some(path) => TerrainConfig::from_yaml_file(path)?.geometry,
            None => RasterGeometry::default(),
        };

        if let Some(width) = self.tile_width {
            geometry.tile_width = width;
        }
        if let Some(height) = self.tile_height {
            geometry.tile_height = height;
        }
        if let Some(size) = self.chunk_size {
            geometry.chunk_size = size;
        }

        if let Err(reason) = geometry.validate() {
            bail!("invalid tile geometry: {reason}");
        }
        Ok(geometry)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let geometry = args.geometry()?;
    info!(
        input = %args.input_dir.display(),
        output = %args.output_dir.display(),
        tile_width = geometry.tile_width,
        tile_height = geometry.tile_height,
        chunk_size = geometry.chunk_size,
        "Starting DEM chunk conversion"
    );

    let report = convert_directory(&args.input_dir, &args.output_dir, &geometry)?;

    for path in &report.skipped {
        warn!(path = %path.display(), "Skipped tile with unexpected size");
    }
    info!(
        converted = report.converted.len(),
        skipped = report.skipped.len(),
        "Conversion finished"
    );

    Ok(())
}
