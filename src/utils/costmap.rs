// Cost grid consumed by the planner
// Cell values follow the usual navigation costmap convention.

use std::ops::Deref;

use itertools::iproduct;
use nalgebra::DMatrix;

use crate::common::{GridCell, PlannerError, PlannerResult, Point2D};

pub const FREE_SPACE: u8 = 0;
/// Highest cost that is still not an obstacle
pub const MAX_NON_OBSTACLE: u8 = 252;
/// Robot center inside the inscribed radius of an obstacle
pub const INSCRIBED_INFLATED_OBSTACLE: u8 = 253;
pub const LETHAL_OBSTACLE: u8 = 254;
pub const NO_INFORMATION: u8 = 255;

/// Inflation parameters used to spread obstacle cost around lethal cells
#[derive(Debug, Clone, Copy)]
pub struct InflationParams {
    /// Inscribed radius of the robot [m]
    pub inscribed_radius: f64,
    /// Distance from obstacles where cost drops to zero [m]
    pub inflation_radius: f64,
    /// Exponential decay rate of the cost
    pub cost_scaling_factor: f64,
}

impl Default for InflationParams {
    fn default() -> Self {
        Self {
            inscribed_radius: 0.1,
            inflation_radius: 0.55,
            cost_scaling_factor: 10.0,
        }
    }
}

impl InflationParams {
    /// Cost of a cell at `distance` meters from the nearest obstacle
    pub fn cost_at_distance(&self, distance: f64) -> u8 {
        if distance <= 0.0 {
            LETHAL_OBSTACLE
        } else if distance <= self.inscribed_radius {
            INSCRIBED_INFLATED_OBSTACLE
        } else if distance > self.inflation_radius {
            FREE_SPACE
        } else {
            let factor = (-self.cost_scaling_factor * (distance - self.inscribed_radius)).exp();
            ((MAX_NON_OBSTACLE as f64 - 1.0) * factor) as u8
        }
    }

    /// Cost at the circumscribed radius: below it no footprint can touch an obstacle
    pub fn circumscribed_cost(&self, circumscribed_radius: f64) -> u8 {
        self.cost_at_distance(circumscribed_radius)
    }
}

/// 2-D cost grid with a world frame placement.
///
/// Storage is indexed `(x, y)`. Continuous grid coordinates put the center of
/// cell `(i, j)` at `(i, j)`, so a cell spans `[i - 0.5, i + 0.5)`.
#[derive(Debug, Clone)]
pub struct Costmap {
    grid: DMatrix<u8>,
    resolution: f64,
    origin: Point2D,
    revision: u64,
}

impl Costmap {
    /// Empty (free) costmap of `size_x` by `size_y` cells
    pub fn new(size_x: usize, size_y: usize, resolution: f64, origin: Point2D) -> Self {
        debug_assert!(resolution > 0.0);
        Self {
            grid: DMatrix::from_element(size_x, size_y, FREE_SPACE),
            resolution,
            origin,
            revision: 0,
        }
    }

    pub fn from_matrix(grid: DMatrix<u8>, resolution: f64, origin: Point2D) -> PlannerResult<Self> {
        if !(resolution > 0.0) {
            return Err(PlannerError::ConfigError(format!(
                "costmap resolution must be positive, got {}",
                resolution
            )));
        }
        Ok(Self {
            grid,
            resolution,
            origin,
            revision: 0,
        })
    }

    pub fn size_x(&self) -> usize {
        self.grid.nrows()
    }

    pub fn size_y(&self) -> usize {
        self.grid.ncols()
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn origin(&self) -> Point2D {
        self.origin
    }

    /// Bumped on every mutation so caches can detect stale data
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn contains(&self, cell: GridCell) -> bool {
        cell.x >= 0 && cell.y >= 0 && (cell.x as usize) < self.size_x() && (cell.y as usize) < self.size_y()
    }

    pub fn cost(&self, x: usize, y: usize) -> u8 {
        self.grid[(x, y)]
    }

    pub fn cost_at(&self, cell: GridCell) -> Option<u8> {
        if self.contains(cell) {
            Some(self.grid[(cell.x as usize, cell.y as usize)])
        } else {
            None
        }
    }

    pub fn set_cost(&mut self, x: usize, y: usize, cost: u8) {
        self.grid[(x, y)] = cost;
        self.revision += 1;
    }

    /// Set every cell of the inclusive rectangle, clipped to the map
    pub fn fill_rect(&mut self, min: GridCell, max: GridCell, cost: u8) {
        let x0 = min.x.max(0) as usize;
        let y0 = min.y.max(0) as usize;
        let x1 = (max.x.min(self.size_x() as i32 - 1)).max(-1);
        let y1 = (max.y.min(self.size_y() as i32 - 1)).max(-1);
        if x1 < 0 || y1 < 0 {
            return;
        }
        for (x, y) in iproduct!(x0..=x1 as usize, y0..=y1 as usize) {
            self.grid[(x, y)] = cost;
        }
        self.revision += 1;
    }

    /// Cell containing a world point
    pub fn world_to_map(&self, wx: f64, wy: f64) -> Option<GridCell> {
        let mx = ((wx - self.origin.x) / self.resolution).floor();
        let my = ((wy - self.origin.y) / self.resolution).floor();
        if !mx.is_finite() || !my.is_finite() {
            return None;
        }
        let cell = GridCell::new(mx as i32, my as i32);
        if self.contains(cell) {
            Some(cell)
        } else {
            None
        }
    }

    /// World point to continuous grid coordinates
    pub fn world_to_grid(&self, wx: f64, wy: f64) -> (f64, f64) {
        (
            (wx - self.origin.x) / self.resolution - 0.5,
            (wy - self.origin.y) / self.resolution - 0.5,
        )
    }

    /// Continuous grid coordinates to world point
    pub fn grid_to_world(&self, gx: f64, gy: f64) -> Point2D {
        Point2D::new(
            self.origin.x + (gx + 0.5) * self.resolution,
            self.origin.y + (gy + 0.5) * self.resolution,
        )
    }

    /// World coordinates of a cell center
    pub fn map_to_world(&self, cell: GridCell) -> Point2D {
        self.grid_to_world(cell.x as f64, cell.y as f64)
    }

    /// Cell containing continuous grid coordinates
    pub fn cell_at_grid(&self, gx: f64, gy: f64) -> Option<GridCell> {
        if !gx.is_finite() || !gy.is_finite() {
            return None;
        }
        let cell = GridCell::new(gx.round() as i32, gy.round() as i32);
        if self.contains(cell) {
            Some(cell)
        } else {
            None
        }
    }

    /// Cost at continuous grid coordinates
    pub fn cost_at_grid(&self, gx: f64, gy: f64) -> Option<u8> {
        self.cell_at_grid(gx, gy).map(|c| self.grid[(c.x as usize, c.y as usize)])
    }

    /// Spread cost around lethal cells
    pub fn inflate(&mut self, params: &InflationParams) {
        let reach = (params.inflation_radius / self.resolution).ceil() as i32;
        let (size_x, size_y) = (self.size_x() as i32, self.size_y() as i32);
        let lethal: Vec<(i32, i32)> = iproduct!(0..size_x, 0..size_y)
            .filter(|&(x, y)| self.grid[(x as usize, y as usize)] == LETHAL_OBSTACLE)
            .collect();

        let mut inflated = self.grid.clone();
        for (ox, oy) in lethal {
            for (dx, dy) in iproduct!(-reach..=reach, -reach..=reach) {
                let (x, y) = (ox + dx, oy + dy);
                if x < 0 || y < 0 || x >= size_x || y >= size_y {
                    continue;
                }
                let current = inflated[(x as usize, y as usize)];
                if current == LETHAL_OBSTACLE || current == NO_INFORMATION {
                    continue;
                }
                let distance = ((dx * dx + dy * dy) as f64).sqrt() * self.resolution;
                let cost = params.cost_at_distance(distance);
                if cost > current {
                    inflated[(x as usize, y as usize)] = cost;
                }
            }
        }
        self.grid = inflated;
        self.revision += 1;
    }
}

impl Deref for Costmap {
    type Target = DMatrix<u8>;

    fn deref(&self) -> &Self::Target {
        &self.grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_map_round_trip() {
        let costmap = Costmap::new(20, 10, 0.5, Point2D::new(-1.0, 2.0));
        let cell = costmap.world_to_map(1.3, 4.1).unwrap();
        assert_eq!(cell, GridCell::new(4, 4));

        let center = costmap.map_to_world(cell);
        assert!((center.x - 1.25).abs() < 1e-12);
        assert!((center.y - 4.25).abs() < 1e-12);

        let (gx, gy) = costmap.world_to_grid(center.x, center.y);
        assert!((gx - 4.0).abs() < 1e-12);
        assert!((gy - 4.0).abs() < 1e-12);
        assert_eq!(costmap.cell_at_grid(gx + 0.3, gy - 0.3), Some(cell));
    }

    #[test]
    fn test_out_of_bounds() {
        let costmap = Costmap::new(10, 10, 1.0, Point2D::origin());
        assert!(costmap.world_to_map(-0.1, 5.0).is_none());
        assert!(costmap.world_to_map(5.0, 10.0).is_none());
        assert!(costmap.cost_at(GridCell::new(10, 0)).is_none());
        assert!(costmap.cell_at_grid(-0.6, 0.0).is_none());
        assert_eq!(costmap.cell_at_grid(-0.4, 0.0), Some(GridCell::new(0, 0)));
    }

    #[test]
    fn test_revision_tracks_mutation() {
        let mut costmap = Costmap::new(5, 5, 1.0, Point2D::origin());
        let before = costmap.revision();
        costmap.set_cost(1, 1, LETHAL_OBSTACLE);
        assert!(costmap.revision() > before);
        assert_eq!(costmap.cost(1, 1), LETHAL_OBSTACLE);
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut costmap = Costmap::new(5, 5, 1.0, Point2D::origin());
        costmap.fill_rect(GridCell::new(3, -2), GridCell::new(9, 1), LETHAL_OBSTACLE);
        assert_eq!(costmap.cost(4, 0), LETHAL_OBSTACLE);
        assert_eq!(costmap.cost(3, 1), LETHAL_OBSTACLE);
        assert_eq!(costmap.cost(2, 1), FREE_SPACE);
        assert_eq!(costmap.cost(3, 2), FREE_SPACE);
    }

    #[test]
    fn test_inflation_decays_with_distance() {
        let mut costmap = Costmap::new(21, 21, 0.05, Point2D::origin());
        costmap.set_cost(10, 10, LETHAL_OBSTACLE);
        costmap.inflate(&InflationParams::default());

        assert_eq!(costmap.cost(10, 10), LETHAL_OBSTACLE);
        assert_eq!(costmap.cost(11, 10), INSCRIBED_INFLATED_OBSTACLE);
        assert!(costmap.cost(14, 10) < INSCRIBED_INFLATED_OBSTACLE);
        assert!(costmap.cost(14, 10) > costmap.cost(16, 10));
        assert_eq!(costmap.cost(0, 0), FREE_SPACE);
    }

    #[test]
    fn test_circumscribed_cost() {
        let params = InflationParams::default();
        assert_eq!(params.circumscribed_cost(0.05), INSCRIBED_INFLATED_OBSTACLE);
        assert_eq!(params.circumscribed_cost(1.0), FREE_SPACE);
        let mid = params.circumscribed_cost(0.2);
        assert!(mid > FREE_SPACE && mid < INSCRIBED_INFLATED_OBSTACLE);
    }
}
