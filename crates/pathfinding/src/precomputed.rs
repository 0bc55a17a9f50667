//! Precomputed-grid sidecar loading and validation (spec §4.A).

use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::grid::Grid;
use crate::tilemap::TileMap;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PrecomputedGridError {
    #[error("precomputed grid dimensions {found_w}x{found_h} do not match tile-map {expected_w}x{expected_h}")]
    DimensionMismatch {
        found_w: usize,
        found_h: usize,
        expected_w: usize,
        expected_h: usize,
    },
    #[error("precomputed grid tile size {found_w}x{found_h} does not match tile-map {expected_w}x{expected_h}")]
    TileSizeMismatch {
        found_w: usize,
        found_h: usize,
        expected_w: usize,
        expected_h: usize,
    },
    #[error("precomputed grid mapHash does not match the tile-map file")]
    MapHashMismatch,
    #[error("precomputed grid gridHash does not match its own contents")]
    GridHashMismatch,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrecomputedGrid {
    pub width: usize,
    pub height: usize,
    #[serde(rename = "tileWidth")]
    pub tile_width: usize,
    #[serde(rename = "tileHeight")]
    pub tile_height: usize,
    #[serde(rename = "mapHash")]
    pub map_hash: String,
    #[serde(rename = "gridHash")]
    pub grid_hash: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, rename = "generatedAt")]
    pub generated_at: Option<String>,
    /// Row-major `0`/`1` cells, `height` rows of `width` values each.
    pub grid: Vec<Vec<u8>>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

impl PrecomputedGrid {
    fn to_grid(&self) -> Grid {
        let mut cells = Vec::with_capacity(self.width * self.height);
        for row in &self.grid {
            for &cell in row {
                cells.push(cell != 0);
            }
        }
        Grid::from_cells(self.width, self.height, self.tile_width, self.tile_height, cells)
    }

    fn grid_hash_input(&self) -> String {
        self.to_grid().stringify()
    }
}

/// Validates a precomputed-grid sidecar against the tile-map it claims to
/// describe. `map_bytes` is the raw tile-map file content (for `mapHash`).
pub fn validate_precomputed_grid(
    sidecar: &PrecomputedGrid,
    map_bytes: &[u8],
    map: &TileMap,
) -> Result<Grid, PrecomputedGridError> {
    if sidecar.width != map.width || sidecar.height != map.height {
        return Err(PrecomputedGridError::DimensionMismatch {
            found_w: sidecar.width,
            found_h: sidecar.height,
            expected_w: map.width,
            expected_h: map.height,
        });
    }
    if sidecar.tile_width != map.tile_width || sidecar.tile_height != map.tile_height {
        return Err(PrecomputedGridError::TileSizeMismatch {
            found_w: sidecar.tile_width,
            found_h: sidecar.tile_height,
            expected_w: map.tile_width,
            expected_h: map.tile_height,
        });
    }

    let expected_map_hash = sha256_hex(map_bytes);
    if expected_map_hash.len() != sidecar.map_hash.len()
        || !bool::from(expected_map_hash.as_bytes().ct_eq(sidecar.map_hash.as_bytes()))
    {
        return Err(PrecomputedGridError::MapHashMismatch);
    }

    let expected_grid_hash = sha256_hex(sidecar.grid_hash_input().as_bytes());
    if expected_grid_hash.len() != sidecar.grid_hash.len()
        || !bool::from(expected_grid_hash.as_bytes().ct_eq(sidecar.grid_hash.as_bytes()))
    {
        return Err(PrecomputedGridError::GridHashMismatch);
    }

    Ok(sidecar.to_grid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tilemap::TileMap;

    fn sample_map() -> TileMap {
        serde_json::from_value(serde_json::json!({
            "width": 2, "height": 2, "tilewidth": 32, "tileheight": 32,
            "tilesets": [], "layers": []
        }))
        .unwrap()
    }

    fn sidecar_for(map_bytes: &[u8], grid: &[Vec<u8>]) -> PrecomputedGrid {
        let flat_grid = Grid::from_cells(
            2,
            2,
            32,
            32,
            grid.iter().flatten().map(|&c| c != 0).collect(),
        );
        PrecomputedGrid {
            width: 2,
            height: 2,
            tile_width: 32,
            tile_height: 32,
            map_hash: sha256_hex(map_bytes),
            grid_hash: sha256_hex(flat_grid.stringify().as_bytes()),
            version: None,
            generated_at: None,
            grid: grid.to_vec(),
        }
    }

    #[test]
    fn valid_sidecar_passes() {
        let map_bytes = b"tile-map-bytes";
        let map = sample_map();
        let sidecar = sidecar_for(map_bytes, &[vec![0, 1], vec![1, 0]]);
        assert!(validate_precomputed_grid(&sidecar, map_bytes, &map).is_ok());
    }

    #[test]
    fn mutated_grid_byte_fails_hash_check() {
        let map_bytes = b"tile-map-bytes";
        let map = sample_map();
        let mut sidecar = sidecar_for(map_bytes, &[vec![0, 1], vec![1, 0]]);
        sidecar.grid[0][0] = 1;
        assert_eq!(
            validate_precomputed_grid(&sidecar, map_bytes, &map),
            Err(PrecomputedGridError::GridHashMismatch)
        );
    }

    #[test]
    fn mutated_map_bytes_fails_hash_check() {
        let map_bytes = b"tile-map-bytes";
        let map = sample_map();
        let sidecar = sidecar_for(map_bytes, &[vec![0, 1], vec![1, 0]]);
        assert_eq!(
            validate_precomputed_grid(&sidecar, b"different-bytes", &map),
            Err(PrecomputedGridError::MapHashMismatch)
        );
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let map_bytes = b"tile-map-bytes";
        let map = sample_map();
        let mut sidecar = sidecar_for(map_bytes, &[vec![0, 1], vec![1, 0]]);
        sidecar.width = 3;
        assert!(matches!(
            validate_precomputed_grid(&sidecar, map_bytes, &map),
            Err(PrecomputedGridError::DimensionMismatch { .. })
        ));
    }
}
