//! Footprint collision checking on the costmap
//!
//! The footprint is pre-rotated for a fixed set of orientations; queries snap
//! the yaw to the nearest one. Coordinates are continuous grid coordinates
//! (cell centers at integers).

use std::f64::consts::PI;

use itertools::iproduct;

use crate::common::{normalize_angle, GridCell, Point2D, Pose2D};
use crate::utils::{Costmap, InflationParams, INSCRIBED_INFLATED_OBSTACLE, LETHAL_OBSTACLE, NO_INFORMATION};

/// Orientation bins used for collision checking (5 degrees each)
pub const NUM_COLLISION_BINS: usize = 72;

/// Robot outline in the robot frame [m]
#[derive(Debug, Clone, PartialEq)]
pub enum Footprint {
    Polygon(Vec<Point2D>),
    Circle { radius: f64 },
}

impl Footprint {
    /// Rectangle centered on the robot origin
    pub fn rectangle(length: f64, width: f64) -> Self {
        let (hl, hw) = (length / 2.0, width / 2.0);
        Footprint::Polygon(vec![
            Point2D::new(hl, hw),
            Point2D::new(-hl, hw),
            Point2D::new(-hl, -hw),
            Point2D::new(hl, -hw),
        ])
    }

    pub fn circle(radius: f64) -> Self {
        Footprint::Circle { radius }
    }

    pub fn circumscribed_radius(&self) -> f64 {
        match self {
            Footprint::Polygon(points) => points
                .iter()
                .map(|p| p.distance(&Point2D::origin()))
                .fold(0.0, f64::max),
            Footprint::Circle { radius } => *radius,
        }
    }

    /// Cost below which the footprint cannot touch a lethal cell
    pub fn circumscribed_cost(&self, inflation: &InflationParams) -> u8 {
        inflation.circumscribed_cost(self.circumscribed_radius())
    }
}

fn bresenham_line(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<(i32, i32)> {
    let mut cells = Vec::new();

    let dx = (x1 - x0).abs();
    let dy = (y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx - dy;
    let (mut x, mut y) = (x0, y0);

    loop {
        cells.push((x, y));
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x += sx;
        }
        if e2 < dx {
            err += dx;
            y += sy;
        }
    }
    cells
}

/// Even-odd rule
fn point_in_polygon(x: f64, y: f64, polygon: &[(f64, f64)]) -> bool {
    let mut inside = false;
    let n = polygon.len();
    for i in 0..n {
        let (xi, yi) = polygon[i];
        let (xj, yj) = polygon[(i + n - 1) % n];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
    }
    inside
}

/// Collision checker for one footprint, resolution and unknown-space policy
#[derive(Debug, Clone)]
pub struct GridCollisionChecker {
    footprint: Footprint,
    /// Footprint vertices in cells for every orientation bin
    oriented: Vec<Vec<Point2D>>,
    radius_cells: f64,
    circumscribed_cost: u8,
    allow_unknown: bool,
    resolution: f64,
}

impl GridCollisionChecker {
    pub fn new(footprint: Footprint, circumscribed_cost: u8, allow_unknown: bool, resolution: f64) -> Self {
        let bin_size = 2.0 * PI / NUM_COLLISION_BINS as f64;
        let (oriented, radius_cells) = match &footprint {
            Footprint::Polygon(points) => {
                let scaled: Vec<Point2D> = points
                    .iter()
                    .map(|p| Point2D::new(p.x / resolution, p.y / resolution))
                    .collect();
                let oriented = (0..NUM_COLLISION_BINS)
                    .map(|bin| scaled.iter().map(|p| p.rotated(bin as f64 * bin_size)).collect())
                    .collect();
                (oriented, 0.0)
            }
            Footprint::Circle { radius } => (Vec::new(), radius / resolution),
        };
        Self {
            footprint,
            oriented,
            radius_cells,
            circumscribed_cost,
            allow_unknown,
            resolution,
        }
    }

    pub fn footprint(&self) -> &Footprint {
        &self.footprint
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn allow_unknown(&self) -> bool {
        self.allow_unknown
    }

    pub fn circumscribed_cost(&self) -> u8 {
        self.circumscribed_cost
    }

    /// Nearest of the fixed collision orientations
    pub fn orientation_bin(yaw: f64) -> usize {
        let bin_size = 2.0 * PI / NUM_COLLISION_BINS as f64;
        (normalize_angle(yaw) / bin_size).round() as usize % NUM_COLLISION_BINS
    }

    /// Whether the footprint at grid pose `(gx, gy, yaw)` collides
    pub fn in_collision(&self, costmap: &Costmap, gx: f64, gy: f64, yaw: f64) -> bool {
        let center = match costmap.cost_at_grid(gx, gy) {
            Some(cost) => cost,
            None => return true,
        };

        if center == NO_INFORMATION {
            if !self.allow_unknown {
                return true;
            }
        } else {
            if center >= INSCRIBED_INFLATED_OBSTACLE {
                return true;
            }
            if center < self.circumscribed_cost {
                return false;
            }
        }

        match &self.footprint {
            Footprint::Polygon(_) => self.polygon_in_collision(costmap, gx, gy, Self::orientation_bin(yaw)),
            Footprint::Circle { .. } => self.disk_in_collision(costmap, gx, gy),
        }
    }

    /// Center cost when the pose is collision free
    pub fn pose_cost(&self, costmap: &Costmap, gx: f64, gy: f64, yaw: f64) -> Option<u8> {
        if self.in_collision(costmap, gx, gy, yaw) {
            None
        } else {
            costmap.cost_at_grid(gx, gy)
        }
    }

    pub fn is_free_cell(&self, costmap: &Costmap, cell: GridCell, yaw: f64) -> bool {
        !self.in_collision(costmap, cell.x as f64, cell.y as f64, yaw)
    }

    pub fn is_free_world(&self, costmap: &Costmap, pose: &Pose2D) -> bool {
        let (gx, gy) = costmap.world_to_grid(pose.x, pose.y);
        !self.in_collision(costmap, gx, gy, pose.yaw)
    }

    fn cell_blocked(&self, costmap: &Costmap, x: i32, y: i32) -> bool {
        match costmap.cost_at(GridCell::new(x, y)) {
            None => true,
            Some(LETHAL_OBSTACLE) => true,
            Some(NO_INFORMATION) => !self.allow_unknown,
            Some(_) => false,
        }
    }

    fn polygon_in_collision(&self, costmap: &Costmap, gx: f64, gy: f64, bin: usize) -> bool {
        let polygon: Vec<(f64, f64)> = self.oriented[bin].iter().map(|p| (gx + p.x, gy + p.y)).collect();
        if polygon.is_empty() {
            return self.cell_blocked(costmap, gx.round() as i32, gy.round() as i32);
        }

        let n = polygon.len();
        for i in 0..n {
            let (ax, ay) = polygon[i];
            let (bx, by) = polygon[(i + 1) % n];
            let edge = bresenham_line(ax.round() as i32, ay.round() as i32, bx.round() as i32, by.round() as i32);
            if edge.into_iter().any(|(x, y)| self.cell_blocked(costmap, x, y)) {
                return true;
            }
        }

        if n < 3 {
            return false;
        }
        let min_x = polygon.iter().map(|p| p.0).fold(f64::INFINITY, f64::min).ceil() as i32;
        let max_x = polygon.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max).floor() as i32;
        let min_y = polygon.iter().map(|p| p.1).fold(f64::INFINITY, f64::min).ceil() as i32;
        let max_y = polygon.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max).floor() as i32;
        iproduct!(min_x..=max_x, min_y..=max_y)
            .filter(|&(x, y)| point_in_polygon(x as f64, y as f64, &polygon))
            .any(|(x, y)| self.cell_blocked(costmap, x, y))
    }

    fn disk_in_collision(&self, costmap: &Costmap, gx: f64, gy: f64) -> bool {
        let r = self.radius_cells;
        let (min_x, max_x) = ((gx - r).ceil() as i32, (gx + r).floor() as i32);
        let (min_y, max_y) = ((gy - r).ceil() as i32, (gy + r).floor() as i32);
        if self.cell_blocked(costmap, gx.round() as i32, gy.round() as i32) {
            return true;
        }
        iproduct!(min_x..=max_x, min_y..=max_y)
            .filter(|&(x, y)| (x as f64 - gx).powi(2) + (y as f64 - gy).powi(2) <= r * r)
            .any(|(x, y)| self.cell_blocked(costmap, x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_map() -> Costmap {
        Costmap::new(40, 40, 0.1, Point2D::origin())
    }

    #[test]
    fn test_free_and_out_of_bounds() {
        let costmap = open_map();
        let checker = GridCollisionChecker::new(Footprint::rectangle(0.6, 0.2), 0, false, 0.1);

        assert!(!checker.in_collision(&costmap, 20.0, 20.0, 0.3));
        assert!(checker.in_collision(&costmap, -1.0, 20.0, 0.0));
        assert!(checker.in_collision(&costmap, 20.0, 40.0, 0.0));
        // Center inside, footprint hangs off the map
        assert!(checker.in_collision(&costmap, 1.0, 20.0, 0.0));
        assert!(!checker.in_collision(&costmap, 1.0, 20.0, PI / 2.0));
    }

    #[test]
    fn test_orientation_matters() {
        let mut costmap = open_map();
        costmap.set_cost(22, 20, LETHAL_OBSTACLE);
        let checker = GridCollisionChecker::new(Footprint::rectangle(0.6, 0.2), 0, false, 0.1);

        assert!(checker.in_collision(&costmap, 20.0, 20.0, 0.0));
        assert!(checker.in_collision(&costmap, 20.0, 20.0, PI));
        assert!(!checker.in_collision(&costmap, 20.0, 20.0, PI / 2.0));
        // 3 degrees snaps back to the 0 bin
        assert!(checker.in_collision(&costmap, 20.0, 20.0, 3.0_f64.to_radians()));
    }

    #[test]
    fn test_interior_cells_are_checked() {
        let mut costmap = open_map();
        costmap.set_cost(21, 20, LETHAL_OBSTACLE);
        let checker = GridCollisionChecker::new(Footprint::rectangle(1.0, 0.6), 0, false, 0.1);
        // Obstacle strictly inside the outline, away from every edge
        assert!(checker.in_collision(&costmap, 20.0, 20.0, 0.0));
    }

    #[test]
    fn test_center_cost_shortcuts() {
        let mut costmap = open_map();
        costmap.set_cost(20, 20, INSCRIBED_INFLATED_OBSTACLE);
        let checker = GridCollisionChecker::new(Footprint::rectangle(0.6, 0.2), 100, false, 0.1);
        assert!(checker.in_collision(&costmap, 20.0, 20.0, 0.0));

        // Below the circumscribed cost the exact test is skipped
        let mut costmap = open_map();
        costmap.set_cost(22, 20, LETHAL_OBSTACLE);
        costmap.set_cost(20, 20, 50);
        assert!(!checker.in_collision(&costmap, 20.0, 20.0, 0.0));
        costmap.set_cost(20, 20, 150);
        assert!(checker.in_collision(&costmap, 20.0, 20.0, 0.0));
    }

    #[test]
    fn test_unknown_policy() {
        let mut costmap = open_map();
        costmap.set_cost(20, 20, NO_INFORMATION);

        let strict = GridCollisionChecker::new(Footprint::rectangle(0.6, 0.2), 0, false, 0.1);
        let lenient = GridCollisionChecker::new(Footprint::rectangle(0.6, 0.2), 0, true, 0.1);
        assert!(strict.in_collision(&costmap, 20.0, 20.0, 0.0));
        assert!(!lenient.in_collision(&costmap, 20.0, 20.0, 0.0));

        // Unknown cell under the footprint edge
        assert!(strict.in_collision(&costmap, 18.0, 20.0, 0.0));
        assert!(!lenient.in_collision(&costmap, 18.0, 20.0, 0.0));
    }

    #[test]
    fn test_circle_footprint() {
        let mut costmap = open_map();
        costmap.set_cost(23, 20, LETHAL_OBSTACLE);
        let checker = GridCollisionChecker::new(Footprint::circle(0.25), 0, false, 0.1);

        assert!(!checker.in_collision(&costmap, 20.0, 20.0, 0.0));
        assert!(checker.in_collision(&costmap, 21.0, 20.0, 1.0));
        assert_eq!(checker.pose_cost(&costmap, 20.0, 20.0, 0.0), Some(0));
        assert_eq!(checker.pose_cost(&costmap, 21.0, 20.0, 0.0), None);
    }

    #[test]
    fn test_world_and_cell_queries() {
        let mut costmap = open_map();
        costmap.set_cost(10, 10, LETHAL_OBSTACLE);
        let checker = GridCollisionChecker::new(Footprint::circle(0.05), 0, false, 0.1);

        assert!(!checker.is_free_world(&costmap, &Pose2D::new(1.05, 1.05, 0.0)));
        assert!(checker.is_free_world(&costmap, &Pose2D::new(2.05, 1.05, 0.0)));
        assert!(!checker.is_free_cell(&costmap, GridCell::new(10, 10), 0.0));
        assert!(checker.is_free_cell(&costmap, GridCell::new(12, 10), 0.0));
    }

    #[test]
    fn test_circumscribed_cost_from_inflation() {
        let footprint = Footprint::rectangle(0.6, 0.2);
        assert!((footprint.circumscribed_radius() - (0.3f64.powi(2) + 0.1f64.powi(2)).sqrt()).abs() < 1e-12);
        let cost = footprint.circumscribed_cost(&InflationParams::default());
        assert!(cost > 0 && cost < INSCRIBED_INFLATED_OBSTACLE);
    }
}
