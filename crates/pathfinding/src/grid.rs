//! Walkable-grid construction: tile-layer GID rasterisation and
//! object-layer shape rasterisation (spec §4.A).

use crate::tilemap::{LayerDef, MapObject, TileMap, BLOCKING_OBJECT_LAYERS, GID_MASK};

/// Tiles touched only on the trailing edge of an interval are excluded by
/// shrinking the interval by this epsilon before flooring (spec §4.A).
const EPSILON: f64 = 1e-4;

#[derive(Debug, Clone)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    pub tile_width: usize,
    pub tile_height: usize,
    cells: Vec<bool>,
}

impl Grid {
    pub fn new(width: usize, height: usize, tile_width: usize, tile_height: usize) -> Self {
        Self {
            width,
            height,
            tile_width,
            tile_height,
            cells: vec![false; width * height],
        }
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    pub fn is_blocked(&self, x: usize, y: usize) -> bool {
        x >= self.width || y >= self.height || self.cells[self.index(x, y)]
    }

    pub fn is_walkable(&self, x: usize, y: usize) -> bool {
        !self.is_blocked(x, y)
    }

    pub fn set_blocked(&mut self, x: usize, y: usize) {
        if x < self.width && y < self.height {
            let idx = self.index(x, y);
            self.cells[idx] = true;
        }
    }

    /// Deterministic string form used to compute `gridHash` (spec §4.A
    /// precomputed-grid validation): one `0`/`1` character per cell,
    /// row-major.
    pub fn stringify(&self) -> String {
        self.cells
            .iter()
            .map(|&b| if b { '1' } else { '0' })
            .collect()
    }

    pub fn from_cells(width: usize, height: usize, tile_width: usize, tile_height: usize, cells: Vec<bool>) -> Self {
        Self {
            width,
            height,
            tile_width,
            tile_height,
            cells,
        }
    }
}

/// Builds the walkable grid directly from a tile-map document.
pub fn build_grid_from_tilemap(map: &TileMap) -> Grid {
    let mut grid = Grid::new(map.width, map.height, map.tile_width, map.tile_height);
    let blocking_gids = map.blocking_gids();

    for layer in &map.layers {
        match layer {
            LayerDef::Tile { data, .. } => rasterize_tile_layer(&mut grid, data, &blocking_gids),
            LayerDef::ObjectGroup { name, objects } if is_blocking_layer(name) => {
                for object in objects {
                    rasterize_object(&mut grid, object);
                }
            }
            LayerDef::ObjectGroup { .. } | LayerDef::Other => {}
        }
    }

    grid
}

fn is_blocking_layer(name: &str) -> bool {
    BLOCKING_OBJECT_LAYERS.iter().any(|n| *n == name)
}

fn rasterize_tile_layer(grid: &mut Grid, data: &[u32], blocking_gids: &std::collections::HashSet<u32>) {
    for (i, &raw_gid) in data.iter().enumerate() {
        let gid = raw_gid & GID_MASK;
        if gid == 0 || !blocking_gids.contains(&gid) {
            continue;
        }
        let x = i % grid.width;
        let y = i / grid.width;
        grid.set_blocked(x, y);
    }
}

fn rasterize_object(grid: &mut Grid, object: &MapObject) {
    let has_polygon = object.polygon.as_ref().is_some_and(|p| p.len() >= 3);

    if !has_polygon && !object.ellipse && object.rotation == 0.0 {
        let top = if object.gid.is_some() {
            object.y - object.height
        } else {
            object.y
        };
        rasterize_rect(grid, object.x, top, object.width, object.height);
        return;
    }

    if !has_polygon && !object.ellipse {
        // Rotated rectangle: rotate the four corners about (left, top) and
        // rasterise the resulting polygon.
        let top = if object.gid.is_some() {
            object.y - object.height
        } else {
            object.y
        };
        let left = object.x;
        let corners = [
            (left, top),
            (left + object.width, top),
            (left + object.width, top + object.height),
            (left, top + object.height),
        ];
        let rotated: Vec<(f64, f64)> = corners
            .iter()
            .map(|&(px, py)| rotate_point(px, py, left, top, object.rotation))
            .collect();
        rasterize_polygon(grid, &rotated);
        return;
    }

    if has_polygon {
        let points = object.polygon.as_ref().unwrap();
        let rotated: Vec<(f64, f64)> = points
            .iter()
            .map(|p| rotate_point(object.x + p.x, object.y + p.y, object.x, object.y, object.rotation))
            .collect();
        rasterize_polygon(grid, &rotated);
        return;
    }

    if object.ellipse {
        rasterize_ellipse(grid, object.x, object.y, object.width, object.height);
    }
}

/// Rotates `(px, py)` clockwise by `degrees` about `(cx, cy)` (Tiled's
/// rotation convention).
fn rotate_point(px: f64, py: f64, cx: f64, cy: f64, degrees: f64) -> (f64, f64) {
    if degrees == 0.0 {
        return (px, py);
    }
    let rad = degrees.to_radians();
    let dx = px - cx;
    let dy = py - cy;
    let (sin, cos) = rad.sin_cos();
    (cx + dx * cos - dy * sin, cy + dx * sin + dy * cos)
}

fn rasterize_rect(grid: &mut Grid, left: f64, top: f64, width: f64, height: f64) {
    if width <= 0.0 || height <= 0.0 {
        return;
    }
    let tw = grid.tile_width as f64;
    let th = grid.tile_height as f64;

    let x0 = (left / tw).floor();
    let x1 = ((left + width - EPSILON) / tw).floor();
    let y0 = (top / th).floor();
    let y1 = ((top + height - EPSILON) / th).floor();

    let (x0, x1) = (x0.min(x1), x0.max(x1));
    let (y0, y1) = (y0.min(y1), y0.max(y1));

    for gy in iter_range(y0, y1) {
        for gx in iter_range(x0, x1) {
            if grid.in_bounds(gx, gy) {
                grid.set_blocked(gx as usize, gy as usize);
            }
        }
    }
}

fn iter_range(from: f64, to: f64) -> impl Iterator<Item = i64> {
    let from = from as i64;
    let to = to as i64;
    from..=to
}

/// Scanline-rasterises a polygon: fills inter-edge spans at each tile row's
/// vertical midpoint, plus marks any tile whose center is inside the
/// polygon and every tile containing a vertex (spec §4.A).
fn rasterize_polygon(grid: &mut Grid, points: &[(f64, f64)]) {
    if points.len() < 3 {
        return;
    }

    let tw = grid.tile_width as f64;
    let th = grid.tile_height as f64;

    let min_x = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let max_x = points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let min_y = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let max_y = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);

    let y0 = (min_y / th).floor().max(0.0) as usize;
    let y1 = (max_y / th).floor().max(0.0) as usize;
    let x0 = (min_x / tw).floor().max(0.0) as usize;
    let x1 = (max_x / tw).floor().max(0.0) as usize;

    for gy in y0..=y1.min(grid.height.saturating_sub(1)) {
        let mid_y = gy as f64 * th + th / 2.0;
        let mut xs: Vec<f64> = Vec::new();
        for i in 0..points.len() {
            let (ax, ay) = points[i];
            let (bx, by) = points[(i + 1) % points.len()];
            if (ay <= mid_y && by > mid_y) || (by <= mid_y && ay > mid_y) {
                let t = (mid_y - ay) / (by - ay);
                xs.push(ax + t * (bx - ax));
            }
        }
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        for pair in xs.chunks(2) {
            if let [start, end] = pair {
                let gx0 = (start / tw).floor().max(0.0) as usize;
                let gx1 = ((end - EPSILON) / tw).floor().max(0.0) as usize;
                for gx in gx0..=gx1.min(grid.width.saturating_sub(1)) {
                    grid.set_blocked(gx, gy);
                }
            }
        }
    }

    for gy in y0..=y1.min(grid.height.saturating_sub(1)) {
        for gx in x0..=x1.min(grid.width.saturating_sub(1)) {
            let cx = gx as f64 * tw + tw / 2.0;
            let cy = gy as f64 * th + th / 2.0;
            if point_in_polygon(cx, cy, points) {
                grid.set_blocked(gx, gy);
            }
        }
    }

    for &(vx, vy) in points {
        let gx = (vx / tw).floor();
        let gy = (vy / th).floor();
        if grid.in_bounds(gx as i64, gy as i64) {
            grid.set_blocked(gx as usize, gy as usize);
        }
    }
}

fn point_in_polygon(px: f64, py: f64, points: &[(f64, f64)]) -> bool {
    let mut inside = false;
    let n = points.len();
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = points[i];
        let (xj, yj) = points[j];
        if ((yi > py) != (yj > py)) && (px < (xj - xi) * (py - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn rasterize_ellipse(grid: &mut Grid, left: f64, top: f64, width: f64, height: f64) {
    if width <= 0.0 || height <= 0.0 {
        return;
    }
    let tw = grid.tile_width as f64;
    let th = grid.tile_height as f64;
    let cx = left + width / 2.0;
    let cy = top + height / 2.0;
    let rx = width / 2.0;
    let ry = height / 2.0;

    let x0 = (left / tw).floor().max(0.0) as usize;
    let x1 = ((left + width) / tw).floor().max(0.0) as usize;
    let y0 = (top / th).floor().max(0.0) as usize;
    let y1 = ((top + height) / th).floor().max(0.0) as usize;

    for gy in y0..=y1.min(grid.height.saturating_sub(1)) {
        for gx in x0..=x1.min(grid.width.saturating_sub(1)) {
            let tile_cx = gx as f64 * tw + tw / 2.0;
            let tile_cy = gy as f64 * th + th / 2.0;
            let nx = (tile_cx - cx) / rx;
            let ny = (tile_cy - cy) / ry;
            if nx * nx + ny * ny <= 1.0 {
                grid.set_blocked(gx, gy);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_blocks_exact_tile_span() {
        let mut grid = Grid::new(4, 4, 32, 32);
        rasterize_rect(&mut grid, 32.0, 32.0, 64.0, 32.0);
        assert!(grid.is_blocked(1, 1));
        assert!(grid.is_blocked(2, 1));
        assert!(!grid.is_blocked(3, 1));
        assert!(!grid.is_blocked(0, 0));
    }

    #[test]
    fn ellipse_blocks_inscribed_tiles() {
        let mut grid = Grid::new(4, 4, 32, 32);
        rasterize_ellipse(&mut grid, 0.0, 0.0, 128.0, 128.0);
        assert!(grid.is_blocked(1, 1));
        assert!(!grid.is_blocked(0, 0));
    }

    #[test]
    fn polygon_marks_vertex_tiles() {
        let mut grid = Grid::new(4, 4, 32, 32);
        let triangle = [(10.0, 10.0), (100.0, 10.0), (50.0, 100.0)];
        rasterize_polygon(&mut grid, &triangle);
        assert!(grid.is_blocked(0, 0));
        assert!(grid.is_blocked(3, 0));
        assert!(grid.is_blocked(1, 3));
    }

    #[test]
    fn grid_stringify_round_trips_shape() {
        let mut grid = Grid::new(2, 2, 32, 32);
        grid.set_blocked(1, 0);
        assert_eq!(grid.stringify(), "0100");
    }
}
