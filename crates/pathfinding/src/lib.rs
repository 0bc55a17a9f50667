//! Walkable-map construction and A* pathfinding over a tile grid (spec
//! §4.A). Grid building is synchronous and CPU-bound; callers on the
//! async side should run it via `spawn_blocking` rather than blocking a
//! room's own task (spec §5 suspension point (vi)).

pub mod astar;
pub mod grid;
pub mod precomputed;
pub mod tilemap;

pub use astar::find_path;
pub use grid::{build_grid_from_tilemap, Grid};
pub use precomputed::{validate_precomputed_grid, PrecomputedGrid, PrecomputedGridError};
pub use tilemap::TileMap;
