//! Admissible cost-to-go estimate for lattice states
//!
//! Two lower bounds are combined: the shortest Dubins / Reeds-Shepp curve to
//! the goal (which ignores obstacles) and an 8-connected wavefront from the
//! goal over the costmap (which ignores kinematics). Both are in cells.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::f64::consts::SQRT_2;

use itertools::iproduct;
use ordered_float::OrderedFloat;
use tracing::{debug, info};

use crate::common::{GridCell, Pose2D};
use crate::path_planning::state_lattice::analytic_curve::AnalyticPath;
use crate::utils::{Costmap, INSCRIBED_INFLATED_OBSTACLE, NO_INFORMATION};

/// Worst ratio between an 8-connected grid distance and the Euclidean one
const OCTILE_RATIO: f64 = 1.0824;

/// Side of the analytic lookup table in cells, always odd
pub fn lookup_table_dim(size_world: f64, resolution: f64) -> usize {
    let mut dim = (size_world / resolution + 1e-9).floor().max(1.0) as usize;
    if dim % 2 == 0 {
        info!(
            "Even sized heuristic lookup table size set {}, increasing size by 1 to make odd",
            dim
        );
        dim += 1;
    }
    dim
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AnalyticKey {
    goal_yaw: f64,
    radius: f64,
    allow_reverse: bool,
}

/// Cost-to-go tables for one goal
#[derive(Debug, Clone)]
pub struct LatticeHeuristic {
    heading_angles: Vec<f64>,
    /// Minimum turning radius [cells]
    radius: f64,
    allow_reverse: bool,
    allow_unknown: bool,
    cache_obstacle_heuristic: bool,
    lookup_dim: usize,
    goal: Option<(GridCell, usize)>,
    /// Analytic lengths by (dx, dy, bin) around the goal, NaN when not computed
    analytic_table: Vec<f64>,
    analytic_key: Option<AnalyticKey>,
    /// Wavefront distances, empty until first use
    obstacle_field: Vec<f64>,
    obstacle_source: Option<(GridCell, u64, usize, usize)>,
    obstacle_builds: usize,
}

impl LatticeHeuristic {
    pub fn new(
        heading_angles: Vec<f64>,
        radius: f64,
        allow_reverse: bool,
        allow_unknown: bool,
        cache_obstacle_heuristic: bool,
        lookup_dim: usize,
    ) -> Self {
        Self {
            heading_angles,
            radius,
            allow_reverse,
            allow_unknown,
            cache_obstacle_heuristic,
            lookup_dim: lookup_dim.max(1) | 1,
            goal: None,
            analytic_table: Vec::new(),
            analytic_key: None,
            obstacle_field: Vec::new(),
            obstacle_source: None,
            obstacle_builds: 0,
        }
    }

    pub fn lookup_dim(&self) -> usize {
        self.lookup_dim
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Number of wavefront computations so far
    pub fn obstacle_builds(&self) -> usize {
        self.obstacle_builds
    }

    /// Prepare for a search towards `goal`.
    ///
    /// The analytic table survives as long as the goal heading, radius and
    /// reverse policy are unchanged. The wavefront is dropped unless caching
    /// is enabled, in which case it is only rebuilt when stale.
    pub fn set_goal(&mut self, goal: GridCell, goal_bin: usize) {
        self.goal = Some((goal, goal_bin));

        let key = AnalyticKey {
            goal_yaw: self.heading(goal_bin),
            radius: self.radius,
            allow_reverse: self.allow_reverse,
        };
        if self.analytic_key != Some(key) {
            let n = self.lookup_dim * self.lookup_dim * self.heading_angles.len();
            self.analytic_table.clear();
            self.analytic_table.resize(n, f64::NAN);
            self.analytic_key = Some(key);
        }

        if !self.cache_obstacle_heuristic {
            self.obstacle_source = None;
        }
    }

    /// Lower bound of the remaining cost from `cell` at heading `bin`
    pub fn estimate(&mut self, costmap: &Costmap, cell: GridCell, bin: usize) -> f64 {
        let analytic = self.analytic_distance(cell, bin);
        let obstacle = self.obstacle_distance(costmap, cell);
        analytic.max(obstacle)
    }

    /// Shortest curve length ignoring obstacles
    pub fn analytic_distance(&mut self, cell: GridCell, bin: usize) -> f64 {
        let (goal, goal_bin) = match self.goal {
            Some(goal) => goal,
            None => return 0.0,
        };
        let dx = cell.x - goal.x;
        let dy = cell.y - goal.y;
        let half = (self.lookup_dim / 2) as i32;

        if dx.abs() > half || dy.abs() > half {
            return self.curve_length(dx, dy, bin, goal_bin);
        }

        let index = (((dy + half) as usize * self.lookup_dim) + (dx + half) as usize) * self.heading_angles.len()
            + bin % self.heading_angles.len().max(1);
        match self.analytic_table.get(index) {
            Some(value) if !value.is_nan() => *value,
            _ => {
                let value = self.curve_length(dx, dy, bin, goal_bin);
                if let Some(slot) = self.analytic_table.get_mut(index) {
                    *slot = value;
                }
                value
            }
        }
    }

    /// Wavefront distance discounted to stay below any feasible path length
    pub fn obstacle_distance(&mut self, costmap: &Costmap, cell: GridCell) -> f64 {
        let goal = match self.goal {
            Some((goal, _)) => goal,
            None => return 0.0,
        };
        let source = (goal, costmap.revision(), costmap.size_x(), costmap.size_y());
        if self.obstacle_source != Some(source) {
            self.obstacle_field = self.wavefront(costmap, goal);
            self.obstacle_source = Some(source);
            self.obstacle_builds += 1;
        }

        if !costmap.contains(cell) {
            return 0.0;
        }
        let distance = self.obstacle_field[cell.y as usize * costmap.size_x() + cell.x as usize];
        if distance.is_infinite() {
            distance
        } else {
            (distance / OCTILE_RATIO - 1.0).max(0.0)
        }
    }

    fn heading(&self, bin: usize) -> f64 {
        if self.heading_angles.is_empty() {
            0.0
        } else {
            self.heading_angles[bin % self.heading_angles.len()]
        }
    }

    fn curve_length(&self, dx: i32, dy: i32, bin: usize, goal_bin: usize) -> f64 {
        let from = Pose2D::new(dx as f64, dy as f64, self.heading(bin));
        let to = Pose2D::new(0.0, 0.0, self.heading(goal_bin));
        let euclidean = from.distance(&to);
        if !(self.radius > 1e-9) {
            return euclidean;
        }
        let curve = if self.allow_reverse {
            AnalyticPath::reeds_shepp(&from, &to, self.radius)
        } else {
            AnalyticPath::dubins(&from, &to, self.radius)
        };
        curve.map_or(euclidean, |c| c.length())
    }

    fn blocked(&self, cost: u8) -> bool {
        if cost == NO_INFORMATION {
            !self.allow_unknown
        } else {
            cost >= INSCRIBED_INFLATED_OBSTACLE
        }
    }

    fn wavefront(&self, costmap: &Costmap, goal: GridCell) -> Vec<f64> {
        let (size_x, size_y) = (costmap.size_x(), costmap.size_y());
        let mut distances = vec![f64::INFINITY; size_x * size_y];
        if !costmap.contains(goal) {
            return distances;
        }

        let index = |x: usize, y: usize| y * size_x + x;
        let mut queue = BinaryHeap::new();
        distances[index(goal.x as usize, goal.y as usize)] = 0.0;
        queue.push((Reverse(OrderedFloat(0.0)), goal.x as usize, goal.y as usize));

        while let Some((Reverse(OrderedFloat(distance)), x, y)) = queue.pop() {
            if distance > distances[index(x, y)] {
                continue;
            }
            for (dx, dy) in iproduct!(-1i32..=1, -1i32..=1) {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let (nx, ny) = (x as i32 + dx, y as i32 + dy);
                if nx < 0 || ny < 0 || nx as usize >= size_x || ny as usize >= size_y {
                    continue;
                }
                let (nx, ny) = (nx as usize, ny as usize);
                if self.blocked(costmap.cost(nx, ny)) {
                    continue;
                }
                let step = if dx != 0 && dy != 0 { SQRT_2 } else { 1.0 };
                let alt = distance + step;
                if alt < distances[index(nx, ny)] {
                    distances[index(nx, ny)] = alt;
                    queue.push((Reverse(OrderedFloat(alt)), nx, ny));
                }
            }
        }

        debug!(
            "Obstacle heuristic computed from goal ({}, {}) over {}x{} cells",
            goal.x, goal.y, size_x, size_y
        );
        distances
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Point2D;
    use crate::utils::LETHAL_OBSTACLE;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    fn uniform_headings(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 * 2.0 * PI / n as f64).collect()
    }

    fn heuristic(allow_reverse: bool, cache: bool) -> LatticeHeuristic {
        LatticeHeuristic::new(uniform_headings(16), 8.0, allow_reverse, false, cache, 21)
    }

    #[test]
    fn test_lookup_table_dim_is_odd() {
        assert_eq!(lookup_table_dim(20.0, 0.05), 401);
        assert_eq!(lookup_table_dim(2.1, 0.1), 21);
        assert_eq!(lookup_table_dim(0.3, 0.1), 3);
        assert_eq!(lookup_table_dim(0.01, 0.1), 1);
        for size in [1.0, 2.0, 3.3, 7.25, 20.0] {
            assert_eq!(lookup_table_dim(size, 0.05) % 2, 1);
        }
    }

    #[test]
    fn test_zero_at_goal() {
        let costmap = Costmap::new(50, 50, 0.05, Point2D::origin());
        let mut h = heuristic(false, false);
        h.set_goal(GridCell::new(25, 25), 3);
        assert_eq!(h.estimate(&costmap, GridCell::new(25, 25), 3), 0.0);
        assert!(h.estimate(&costmap, GridCell::new(25, 25), 11) > 0.0);
    }

    #[test]
    fn test_bounded_below_by_obstacle_free_distance() {
        let mut forward = heuristic(false, false);
        let mut both = heuristic(true, false);
        let goal = GridCell::new(30, 30);
        forward.set_goal(goal, 0);
        both.set_goal(goal, 0);

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let cell = GridCell::new(rng.gen_range(0..60), rng.gen_range(0..60));
            let bin = rng.gen_range(0..16);
            let euclidean = (((cell.x - goal.x).pow(2) + (cell.y - goal.y).pow(2)) as f64).sqrt();
            let f = forward.analytic_distance(cell, bin);
            let r = both.analytic_distance(cell, bin);
            assert!(f + 1e-9 >= euclidean);
            assert!(r + 1e-9 >= euclidean);
            assert!(r <= f + 1e-9);
        }
    }

    #[test]
    fn test_table_matches_direct_computation() {
        let mut h = heuristic(true, false);
        h.set_goal(GridCell::new(100, 100), 4);
        // Inside and outside the 21 cell table
        for cell in [GridCell::new(103, 97), GridCell::new(140, 100)] {
            let first = h.analytic_distance(cell, 9);
            let second = h.analytic_distance(cell, 9);
            let direct = AnalyticPath::reeds_shepp(
                &Pose2D::new((cell.x - 100) as f64, (cell.y - 100) as f64, 9.0 * PI / 8.0),
                &Pose2D::new(0.0, 0.0, 4.0 * PI / 8.0),
                8.0,
            )
            .unwrap()
            .length();
            assert_relative_eq!(first, direct, epsilon = 1e-9);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_table_reset_on_goal_heading_change() {
        let mut h = heuristic(false, false);
        h.set_goal(GridCell::new(10, 10), 0);
        let east = h.analytic_distance(GridCell::new(5, 10), 0);
        h.set_goal(GridCell::new(10, 10), 8);
        let west = h.analytic_distance(GridCell::new(5, 10), 0);
        assert_relative_eq!(east, 5.0, epsilon = 1e-9);
        assert!(west > east + 8.0);
    }

    #[test]
    fn test_wall_raises_estimate() {
        let mut costmap = Costmap::new(40, 40, 0.05, Point2D::origin());
        costmap.fill_rect(GridCell::new(20, 0), GridCell::new(20, 34), LETHAL_OBSTACLE);
        let mut h = heuristic(false, false);
        h.set_goal(GridCell::new(30, 5), 0);

        let start = GridCell::new(10, 5);
        let around = h.obstacle_distance(&costmap, start);
        assert!(around > 40.0);
        assert!(h.estimate(&costmap, start, 0) >= around);

        // Sealed wall: the far side is unreachable
        costmap.fill_rect(GridCell::new(20, 0), GridCell::new(20, 39), LETHAL_OBSTACLE);
        h.set_goal(GridCell::new(30, 5), 0);
        assert!(h.obstacle_distance(&costmap, start).is_infinite());
    }

    #[test]
    fn test_unknown_cells_follow_policy() {
        let mut costmap = Costmap::new(30, 30, 0.05, Point2D::origin());
        costmap.fill_rect(GridCell::new(15, 0), GridCell::new(15, 29), NO_INFORMATION);

        let mut strict = LatticeHeuristic::new(uniform_headings(16), 8.0, false, false, false, 21);
        let mut lenient = LatticeHeuristic::new(uniform_headings(16), 8.0, false, true, false, 21);
        strict.set_goal(GridCell::new(25, 10), 0);
        lenient.set_goal(GridCell::new(25, 10), 0);
        assert!(strict.obstacle_distance(&costmap, GridCell::new(5, 10)).is_infinite());
        assert_relative_eq!(
            lenient.obstacle_distance(&costmap, GridCell::new(5, 10)),
            20.0 / OCTILE_RATIO - 1.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_obstacle_cache() {
        let mut costmap = Costmap::new(30, 30, 0.05, Point2D::origin());
        let cell = GridCell::new(3, 3);

        let mut uncached = heuristic(false, false);
        for _ in 0..3 {
            uncached.set_goal(GridCell::new(20, 20), 0);
            uncached.estimate(&costmap, cell, 0);
            uncached.estimate(&costmap, cell, 1);
        }
        assert_eq!(uncached.obstacle_builds(), 3);

        let mut cached = heuristic(false, true);
        for _ in 0..3 {
            cached.set_goal(GridCell::new(20, 20), 0);
            cached.estimate(&costmap, cell, 0);
        }
        assert_eq!(cached.obstacle_builds(), 1);

        // New goal cell or a modified grid invalidates the cache
        cached.set_goal(GridCell::new(21, 20), 0);
        cached.estimate(&costmap, cell, 0);
        assert_eq!(cached.obstacle_builds(), 2);
        costmap.set_cost(10, 10, LETHAL_OBSTACLE);
        cached.set_goal(GridCell::new(21, 20), 0);
        cached.estimate(&costmap, cell, 0);
        assert_eq!(cached.obstacle_builds(), 3);
    }
}
