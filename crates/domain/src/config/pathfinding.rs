use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Walkable-grid source configuration (spec §4.A, §4.I `POST /api/pathfind`).
///
/// `tile_map_path` is the authoritative Tiled-style map; `precomputed_grid_path`,
/// if set, is validated against it at startup and used instead of rasterising
/// the map on every boot.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathfindingConfig {
    #[serde(default)]
    pub tile_map_path: Option<PathBuf>,
    #[serde(default)]
    pub precomputed_grid_path: Option<PathBuf>,
}
