//! Path smoother
//!
//! Gradient-style smoothing of a lattice path: every interior pose is pulled
//! towards its original position (`w_data`) and towards the midpoint of its
//! neighbors (`w_smooth`). The path is split at cusps so forward and reverse
//! stretches are smoothed separately and the cusp poses stay in place. An
//! iteration that puts a pose in collision, or bends a stretch tighter than
//! both the turning radius and the tightest bend it already had, is rolled
//! back and ends that stretch.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::common::{Path2D, Pose2D};
use crate::utils::Costmap;

use super::collision_checker::GridCollisionChecker;
use super::config::SmootherParams;

/// What happened during one call to [`Smoother::smooth`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SmoothingOutcome {
    /// Accepted iterations over all stretches and passes
    pub iterations: usize,
    /// Stretches between cusps
    pub segments: usize,
    /// Every stretch converged below the tolerance
    pub converged: bool,
    /// Some iteration was rolled back
    pub rejected: bool,
    pub timed_out: bool,
    /// The refinement pass ran
    pub refined: bool,
}

impl SmoothingOutcome {
    pub fn modified(&self) -> bool {
        self.iterations > 0
    }
}

#[derive(Debug, Clone)]
pub struct Smoother {
    params: SmootherParams,
    /// Curvature bound [1/m], zero until initialized
    max_curvature: f64,
}

/// Menger curvature of three points
fn curvature(a: &Pose2D, b: &Pose2D, c: &Pose2D) -> f64 {
    let ab = a.distance(b);
    let bc = b.distance(c);
    let ca = c.distance(a);
    let denominator = ab * bc * ca;
    if denominator < 1e-12 {
        return 0.0;
    }
    let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
    2.0 * cross.abs() / denominator
}

/// Whether the step into pose `i + 1` moves against the heading
fn step_is_reverse(poses: &[Pose2D], i: usize, previous: bool) -> bool {
    let (from, to) = (&poses[i], &poses[i + 1]);
    let along = (to.x - from.x) * to.yaw.cos() + (to.y - from.y) * to.yaw.sin();
    if along.abs() < 1e-9 {
        previous
    } else {
        along < 0.0
    }
}

/// Index ranges between cusps, with their travel direction
fn split_at_cusps(poses: &[Pose2D]) -> Vec<(usize, usize, bool)> {
    let mut segments = Vec::new();
    if poses.len() < 2 {
        return segments;
    }
    let mut start = 0;
    let mut reverse = step_is_reverse(poses, 0, false);
    for i in 1..poses.len() - 1 {
        let step = step_is_reverse(poses, i, reverse);
        if step != reverse {
            segments.push((start, i, reverse));
            start = i;
            reverse = step;
        }
    }
    segments.push((start, poses.len() - 1, reverse));
    segments
}

enum SegmentEnd {
    Converged,
    Rejected,
    IterationCap,
    TimedOut,
}

impl Smoother {
    pub fn new(params: SmootherParams) -> Self {
        Self {
            params,
            max_curvature: 0.0,
        }
    }

    /// Set the minimum turning radius [m]
    pub fn initialize(&mut self, min_turning_radius: f64) {
        self.max_curvature = if min_turning_radius > 0.0 {
            1.0 / min_turning_radius
        } else {
            f64::INFINITY
        };
    }

    pub fn params(&self) -> &SmootherParams {
        &self.params
    }

    pub fn max_curvature(&self) -> f64 {
        self.max_curvature
    }

    /// Smooth `path` in place within `time_budget`.
    ///
    /// The first and last poses, and every cusp, never move. On timeout the
    /// last accepted iterate is kept.
    pub fn smooth(
        &self,
        path: &mut Path2D,
        costmap: &Costmap,
        checker: &GridCollisionChecker,
        time_budget: Duration,
    ) -> SmoothingOutcome {
        let deadline = Instant::now().checked_add(time_budget);
        let mut outcome = SmoothingOutcome::default();
        if path.len() < 3 {
            outcome.converged = true;
            return outcome;
        }

        self.smooth_pass(&mut path.poses, costmap, checker, deadline, &mut outcome);
        if self.params.do_refinement && !outcome.timed_out {
            outcome.refined = true;
            self.smooth_pass(&mut path.poses, costmap, checker, deadline, &mut outcome);
        }

        debug!(
            "Smoothed {} poses in {} segments: {} iterations, converged {}, timed out {}",
            path.len(),
            outcome.segments,
            outcome.iterations,
            outcome.converged,
            outcome.timed_out
        );
        outcome
    }

    fn smooth_pass(
        &self,
        poses: &mut [Pose2D],
        costmap: &Costmap,
        checker: &GridCollisionChecker,
        deadline: Option<Instant>,
        outcome: &mut SmoothingOutcome,
    ) {
        let segments = split_at_cusps(poses);
        outcome.segments = segments.len();
        outcome.converged = true;

        for (start, end, reverse) in segments {
            if end - start < 2 {
                continue;
            }
            let (end_state, iterations) =
                self.smooth_segment(&mut poses[start..=end], reverse, costmap, checker, deadline);
            outcome.iterations += iterations;
            match end_state {
                SegmentEnd::Converged => {}
                SegmentEnd::Rejected => {
                    outcome.rejected = true;
                    outcome.converged = false;
                }
                SegmentEnd::IterationCap => outcome.converged = false,
                SegmentEnd::TimedOut => {
                    outcome.timed_out = true;
                    outcome.converged = false;
                    return;
                }
            }
        }
    }

    fn smooth_segment(
        &self,
        poses: &mut [Pose2D],
        reverse: bool,
        costmap: &Costmap,
        checker: &GridCollisionChecker,
        deadline: Option<Instant>,
    ) -> (SegmentEnd, usize) {
        let original = poses.to_vec();
        let n = original.len();
        let curvature_bound = original
            .windows(3)
            .map(|w| curvature(&w[0], &w[1], &w[2]))
            .fold(self.max_curvature, f64::max);
        let (w_data, w_smooth) = (self.params.w_data, self.params.w_smooth);
        let mut current = original.clone();

        for iteration in 0..self.params.max_iterations {
            if deadline.map_or(false, |d| Instant::now() >= d) {
                poses.copy_from_slice(&current);
                return (SegmentEnd::TimedOut, iteration);
            }

            let mut candidate = current.clone();
            let mut change = 0.0;
            for i in 1..n - 1 {
                let (x, y) = (candidate[i].x, candidate[i].y);
                let dx = w_data * (original[i].x - x) + w_smooth * (candidate[i + 1].x + candidate[i - 1].x - 2.0 * x);
                let dy = w_data * (original[i].y - y) + w_smooth * (candidate[i + 1].y + candidate[i - 1].y - 2.0 * y);
                candidate[i].x = x + dx;
                candidate[i].y = y + dy;
                change += dx.abs() + dy.abs();
            }
            for i in 1..n - 1 {
                let heading = (candidate[i + 1].y - candidate[i - 1].y).atan2(candidate[i + 1].x - candidate[i - 1].x);
                let yaw = if reverse { heading + std::f64::consts::PI } else { heading };
                candidate[i] = Pose2D::new(candidate[i].x, candidate[i].y, yaw);
            }

            if !self.is_valid(&candidate, curvature_bound, costmap, checker) {
                trace!("Smoothing iteration {} rejected", iteration);
                poses.copy_from_slice(&current);
                return (SegmentEnd::Rejected, iteration);
            }
            current = candidate;

            if change < self.params.tolerance {
                poses.copy_from_slice(&current);
                return (SegmentEnd::Converged, iteration + 1);
            }
        }

        poses.copy_from_slice(&current);
        (SegmentEnd::IterationCap, self.params.max_iterations)
    }

    /// Interior poses collision free and no bend tighter than `curvature_bound`
    fn is_valid(
        &self,
        poses: &[Pose2D],
        curvature_bound: f64,
        costmap: &Costmap,
        checker: &GridCollisionChecker,
    ) -> bool {
        let n = poses.len();
        (1..n - 1).all(|i| {
            curvature(&poses[i - 1], &poses[i], &poses[i + 1]) <= curvature_bound + 1e-9
                && checker.is_free_world(costmap, &poses[i])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{GridCell, Point2D};
    use crate::path_planning::state_lattice::collision_checker::Footprint;
    use crate::utils::LETHAL_OBSTACLE;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn open_costmap() -> Costmap {
        Costmap::new(100, 100, 0.1, Point2D::origin())
    }

    fn checker() -> GridCollisionChecker {
        GridCollisionChecker::new(Footprint::circle(0.1), 0, false, 0.1)
    }

    fn smoother() -> Smoother {
        let mut smoother = Smoother::new(SmootherParams::default());
        smoother.initialize(0.5);
        smoother
    }

    fn noisy_line(seed: u64) -> Path2D {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 0.03).unwrap();
        let mut poses: Vec<Pose2D> = (0..=40)
            .map(|i| Pose2D::new(1.0 + i as f64 * 0.1, 5.0 + noise.sample(&mut rng), 0.0))
            .collect();
        poses[0].y = 5.0;
        poses[40].y = 5.0;
        Path2D::from_poses(poses)
    }

    fn roughness(path: &Path2D) -> f64 {
        path.poses
            .windows(3)
            .map(|w| (w[0].x + w[2].x - 2.0 * w[1].x).powi(2) + (w[0].y + w[2].y - 2.0 * w[1].y).powi(2))
            .sum()
    }

    #[test]
    fn test_smoothing_reduces_jitter() {
        let costmap = open_costmap();
        let mut path = noisy_line(3);
        let before = path.clone();

        let outcome = smoother().smooth(&mut path, &costmap, &checker(), Duration::from_secs(5));
        assert!(outcome.modified());
        assert!(!outcome.timed_out);
        assert!(outcome.refined);
        assert_eq!(outcome.segments, 1);
        assert!(roughness(&path) < 0.5 * roughness(&before));
        assert_eq!(path.first(), before.first());
        assert_eq!(path.last(), before.last());
        assert_eq!(path.len(), before.len());
        assert!(path.poses.iter().all(|p| checker().is_free_world(&costmap, p)));
    }

    #[test]
    fn test_never_moves_into_obstacles() {
        let mut costmap = open_costmap();
        // Obstacle just inside the corner of an L shaped path
        costmap.fill_rect(GridCell::new(36, 26), GridCell::new(38, 28), LETHAL_OBSTACLE);
        let checker = checker();
        let mut poses = Vec::new();
        for i in 0..=30 {
            poses.push(Pose2D::new(1.05 + i as f64 * 0.1, 3.05, 0.0));
        }
        // Ends at y 0.35 so the 1-cell footprint stays on the map
        for i in 1..=27 {
            poses.push(Pose2D::new(4.05, 3.05 - i as f64 * 0.1, -std::f64::consts::FRAC_PI_2));
        }
        let mut path = Path2D::from_poses(poses);
        assert!(path.poses.iter().all(|p| checker.is_free_world(&costmap, p)));

        let mut smoother = Smoother::new(SmootherParams::default());
        smoother.initialize(0.0);
        smoother.smooth(&mut path, &costmap, &checker, Duration::from_secs(5));
        assert!(path.poses.iter().all(|p| checker.is_free_world(&costmap, p)));
    }

    #[test]
    fn test_zero_budget_keeps_path() {
        let costmap = open_costmap();
        let mut path = noisy_line(5);
        let before = path.clone();
        let outcome = smoother().smooth(&mut path, &costmap, &checker(), Duration::ZERO);
        assert!(outcome.timed_out);
        assert!(!outcome.modified());
        assert_eq!(path, before);
    }

    #[test]
    fn test_cusps_stay_in_place() {
        let costmap = open_costmap();
        let mut rng = StdRng::seed_from_u64(9);
        let noise = Normal::new(0.0, 0.02).unwrap();
        let mut poses = Vec::new();
        // Forward along +x, then back out along the same line and heading
        for i in 0..=20 {
            poses.push(Pose2D::new(2.0 + i as f64 * 0.1, 5.0 + noise.sample(&mut rng), 0.0));
        }
        for i in 1..=20 {
            poses.push(Pose2D::new(4.0 - i as f64 * 0.1, 5.0 + noise.sample(&mut rng), 0.0));
        }
        poses[0].y = 5.0;
        poses[20].y = 5.0;
        let last = poses.len() - 1;
        poses[last].y = 5.0;
        let mut path = Path2D::from_poses(poses);
        let cusp = path.poses[20];

        assert_eq!(split_at_cusps(&path.poses).len(), 2);
        let outcome = smoother().smooth(&mut path, &costmap, &checker(), Duration::from_secs(5));
        assert_eq!(outcome.segments, 2);
        assert_eq!(path.poses[20], cusp);
        // Reverse stretch keeps facing +x
        for pose in &path.poses[22..last] {
            assert!(pose.yaw.cos() > 0.9);
        }
    }

    #[test]
    fn test_curvature_never_exceeds_bound() {
        let costmap = open_costmap();
        let mut rng = StdRng::seed_from_u64(21);
        let noise = Normal::new(0.0, 0.01).unwrap();
        // Quarter circle of radius 1 m with jitter, bound at 0.8 m
        let poses: Vec<Pose2D> = (0..=30)
            .map(|i| {
                let t = i as f64 / 30.0 * std::f64::consts::FRAC_PI_2;
                let r = if i == 0 || i == 30 { 1.0 } else { 1.0 + noise.sample(&mut rng) };
                Pose2D::new(5.0 + r * t.sin(), 4.0 + r - r * t.cos(), t)
            })
            .collect();
        let original = poses.clone();
        let mut path = Path2D::from_poses(poses);

        let mut smoother = Smoother::new(SmootherParams::default());
        smoother.initialize(0.8);
        smoother.smooth(&mut path, &costmap, &checker(), Duration::from_secs(5));

        let bound = original
            .windows(3)
            .map(|w| curvature(&w[0], &w[1], &w[2]))
            .fold(1.0 / 0.8, f64::max);
        for w in path.poses.windows(3) {
            assert!(curvature(&w[0], &w[1], &w[2]) <= bound + 1e-6);
        }
    }

    #[test]
    fn test_short_paths_untouched() {
        let costmap = open_costmap();
        let mut path = Path2D::from_poses(vec![Pose2D::new(1.0, 1.0, 0.0), Pose2D::new(1.1, 1.0, 0.0)]);
        let before = path.clone();
        let outcome = smoother().smooth(&mut path, &costmap, &checker(), Duration::from_secs(1));
        assert!(outcome.converged);
        assert_eq!(path, before);
    }
}
