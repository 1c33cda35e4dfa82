//! Test data generators for creating synthetic elevation rasters.
//!
//! These generators create predictable, verifiable height patterns
//! that can be used across the test suite.

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that a sample came from the right pixel
/// by checking that grid[row][col] == col * 1000 + row.
///
/// # Arguments
///
/// * `width` - Number of columns
/// * `height` - Number of rows
///
/// # Returns
///
/// A `Vec<f32>` in row-major order (row 0 first, then row 1, etc.)
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50); // 10 * 5
/// assert_eq!(grid[0], 0.0);   // col=0, row=0 -> 0*1000 + 0
/// assert_eq!(grid[1], 1000.0); // col=1, row=0 -> 1*1000 + 0
/// assert_eq!(grid[10], 1.0);  // col=0, row=1 -> 0*1000 + 1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push(test_grid_value(col, row));
        }
    }
    data
}

/// The value [`create_test_grid`] stores at `(col, row)`.
pub fn test_grid_value(col: usize, row: usize) -> f32 {
    (col * 1000 + row) as f32
}

/// Creates a test grid whose values also encode which tile they came from.
///
/// Each cell value is `tile_index * 1_000_000 + col * 1000 + row`, so
/// samples resolved through a neighbouring tile can be told apart.
pub fn create_tagged_grid(width: usize, height: usize, tile_index: usize) -> Vec<f32> {
    let base = (tile_index * 1_000_000) as f32;
    create_test_grid(width, height)
        .into_iter()
        .map(|v| v + base)
        .collect()
}

/// Creates a smooth elevation surface in kilometres.
///
/// A few overlapping sine ridges give values roughly within -5 km to +5 km,
/// similar in range to lunar topography.
///
/// # Arguments
///
/// * `width` - Number of columns
/// * `height` - Number of rows
///
/// # Returns
///
/// A `Vec<f32>` with heights in kilometres.
pub fn create_elevation_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let u = col as f32 / width.max(1) as f32 * std::f32::consts::TAU;
            let v = row as f32 / height.max(1) as f32 * std::f32::consts::TAU;
            let h = 3.0 * (u * 2.0).sin() * (v * 1.5).cos() + 1.5 * (u * 7.0 + v * 3.0).sin();
            data.push(h);
        }
    }
    data
}

/// Creates a grid filled with a constant value.
///
/// Useful for testing edge cases and simple scenarios.
///
/// # Arguments
///
/// * `width` - Number of columns
/// * `height` - Number of rows
/// * `value` - The constant value to fill
///
/// # Returns
///
/// A `Vec<f32>` filled with the constant value.
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_grid() {
        let grid = create_test_grid(10, 5);
        assert_eq!(grid.len(), 50);
        assert_eq!(grid[0], 0.0); // col=0, row=0
        assert_eq!(grid[1], 1000.0); // col=1, row=0
        assert_eq!(grid[10], 1.0); // col=0, row=1
        assert_eq!(grid[11], 1001.0); // col=1, row=1
        assert_eq!(grid[11], test_grid_value(1, 1));
    }

    #[test]
    fn test_create_tagged_grid() {
        let grid = create_tagged_grid(10, 5, 3);
        assert_eq!(grid[0], 3_000_000.0);
        assert_eq!(grid[11], 3_001_001.0);
    }

    #[test]
    fn test_create_elevation_grid() {
        let grid = create_elevation_grid(100, 100);
        assert_eq!(grid.len(), 10000);
        let min = grid.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = grid.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        assert!(min >= -5.0);
        assert!(max <= 5.0);
        assert!(max > min);
    }

    #[test]
    fn test_create_constant_grid() {
        let grid = create_constant_grid(10, 10, 42.0);
        assert_eq!(grid.len(), 100);
        assert!(grid.iter().all(|&v| v == 42.0));
    }
}
