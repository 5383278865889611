//! Lattice search space
//!
//! States are `(cell, heading bin)`; edges are grid motions of the primitive
//! library. Everything here works in grid units: cell centers at integer
//! coordinates, lengths in cells.

use crate::common::{GridCell, PlannerError, PlannerResult, Pose2D};
use crate::path_planning::a_star::{AnalyticConnection, SearchSpace, Successor};
use crate::utils::{Costmap, LETHAL_OBSTACLE, MAX_NON_OBSTACLE, NO_INFORMATION};

use super::analytic_curve::{AnalyticPath, Steer};
use super::collision_checker::GridCollisionChecker;
use super::config::PlannerConfig;
use super::heuristic::LatticeHeuristic;
use super::motion_table::{GridMotion, GridMotionTable, TravelDirection};

/// Pose spacing used when checking an analytic connection [cells]
const ANALYTIC_STEP: f64 = 0.5;

/// Edge cost parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub reverse_penalty: f64,
    pub change_penalty: f64,
    pub non_straight_penalty: f64,
    pub cost_penalty: f64,
    pub analytic_expansion_ratio: f64,
    pub allow_reverse: bool,
    pub allow_unknown: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self::from(&PlannerConfig::default())
    }
}

impl From<&PlannerConfig> for SearchParams {
    fn from(config: &PlannerConfig) -> Self {
        Self {
            reverse_penalty: config.reverse_penalty,
            change_penalty: config.change_penalty,
            non_straight_penalty: config.non_straight_penalty,
            cost_penalty: config.cost_penalty,
            analytic_expansion_ratio: config.analytic_expansion_ratio,
            allow_reverse: config.allow_reverse_expansion,
            allow_unknown: config.allow_unknown,
        }
    }
}

impl SearchParams {
    /// Cost multiplier for traversing a cell
    pub fn travel_factor(&self, cell_cost: u8) -> f64 {
        let cost = if cell_cost == NO_INFORMATION {
            MAX_NON_OBSTACLE
        } else {
            cell_cost.min(MAX_NON_OBSTACLE)
        };
        1.0 + self.cost_penalty * cost as f64 / MAX_NON_OBSTACLE as f64
    }

    /// Cost of taking `motion` after `incoming`, ending on a cell of `cell_cost`
    pub fn edge_cost(&self, motion: &GridMotion, incoming: Option<LatticeMotion>, cell_cost: u8) -> f64 {
        let length = motion.length;
        let mut cost = length * self.travel_factor(cell_cost);
        if !motion.straight {
            cost += self.non_straight_penalty * length;
            if incoming.map_or(false, |m| m.straight) {
                cost += self.change_penalty * length;
            }
        }
        let was_reverse = incoming.map_or(false, |m| m.reverse);
        if (motion.direction == TravelDirection::Reverse) != was_reverse {
            cost += self.reverse_penalty * length;
        }
        cost
    }
}

/// Search state: a cell and a lattice heading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LatticeState {
    pub cell: GridCell,
    pub bin: usize,
}

impl LatticeState {
    pub fn new(x: i32, y: i32, bin: usize) -> Self {
        Self {
            cell: GridCell::new(x, y),
            bin,
        }
    }
}

/// Reference to the grid motion that produced a state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatticeMotion {
    /// Start heading of the motion
    pub bin: usize,
    /// Position among the motions of that heading
    pub index: usize,
    pub straight: bool,
    pub reverse: bool,
}

/// Per-call view over the planner's search resources
pub struct LatticeSpace<'a> {
    costmap: &'a Costmap,
    motions: &'a GridMotionTable,
    heading_angles: &'a [f64],
    checker: &'a GridCollisionChecker,
    heuristic: &'a mut LatticeHeuristic,
    params: SearchParams,
    /// Minimum turning radius [cells]
    radius: f64,
}

impl<'a> LatticeSpace<'a> {
    pub fn new(
        costmap: &'a Costmap,
        motions: &'a GridMotionTable,
        heading_angles: &'a [f64],
        checker: &'a GridCollisionChecker,
        heuristic: &'a mut LatticeHeuristic,
        params: SearchParams,
    ) -> Self {
        let radius = heuristic.radius();
        Self {
            costmap,
            motions,
            heading_angles,
            checker,
            heuristic,
            params,
            radius,
        }
    }

    pub fn num_headings(&self) -> usize {
        self.heading_angles.len()
    }

    fn heading(&self, bin: usize) -> f64 {
        self.heading_angles.get(bin).copied().unwrap_or(0.0)
    }

    fn check_state(&self, state: &LatticeState, what: &str) -> PlannerResult<()> {
        if !self.costmap.contains(state.cell) {
            return Err(PlannerError::InvalidInput(format!(
                "{} cell ({}, {}) is outside the {}x{} costmap",
                what,
                state.cell.x,
                state.cell.y,
                self.costmap.size_x(),
                self.costmap.size_y()
            )));
        }
        if state.bin >= self.num_headings() {
            return Err(PlannerError::InvalidInput(format!(
                "{} heading bin {} is out of range ({} headings)",
                what,
                state.bin,
                self.num_headings()
            )));
        }
        Ok(())
    }

    fn collision_free(&self, cell: GridCell, poses: &[Pose2D]) -> bool {
        poses.iter().all(|p| {
            !self
                .checker
                .in_collision(self.costmap, cell.x as f64 + p.x, cell.y as f64 + p.y, p.yaw)
        })
    }
}

impl<'a> SearchSpace for LatticeSpace<'a> {
    type State = LatticeState;
    type Motion = LatticeMotion;

    fn state_count(&self) -> usize {
        self.costmap.size_x() * self.costmap.size_y() * self.num_headings()
    }

    fn state_index(&self, state: &LatticeState) -> Option<usize> {
        if !self.costmap.contains(state.cell) || state.bin >= self.num_headings() {
            return None;
        }
        let cell = state.cell.y as usize * self.costmap.size_x() + state.cell.x as usize;
        Some(cell * self.num_headings() + state.bin)
    }

    fn check_start(&self, state: &LatticeState) -> PlannerResult<()> {
        self.check_state(state, "start")?;
        match self.costmap.cost_at(state.cell) {
            Some(LETHAL_OBSTACLE) => Err(PlannerError::InvalidInput(format!(
                "start cell ({}, {}) is occupied",
                state.cell.x, state.cell.y
            ))),
            Some(NO_INFORMATION) if !self.params.allow_unknown => Err(PlannerError::InvalidInput(format!(
                "start cell ({}, {}) is unknown",
                state.cell.x, state.cell.y
            ))),
            _ => Ok(()),
        }
    }

    fn check_goal(&self, state: &LatticeState) -> PlannerResult<()> {
        self.check_state(state, "goal")
    }

    fn begin_search(&mut self, _start: &LatticeState, goal: &LatticeState) {
        self.heuristic.set_goal(goal.cell, goal.bin);
    }

    fn heuristic(&mut self, state: &LatticeState) -> f64 {
        self.heuristic.estimate(self.costmap, state.cell, state.bin)
    }

    fn expand(
        &mut self,
        state: &LatticeState,
        incoming: Option<LatticeMotion>,
        out: &mut Vec<Successor<LatticeState, LatticeMotion>>,
    ) -> PlannerResult<()> {
        let mut available = false;
        for (index, motion) in self.motions.motions_for(state.bin, self.params.allow_reverse).enumerate() {
            available = true;
            let end = state.cell.offset(motion.end_dx, motion.end_dy);
            let end_cost = match self.costmap.cost_at(end) {
                Some(cost) => cost,
                None => continue,
            };
            if !self.collision_free(state.cell, &motion.poses) {
                continue;
            }
            out.push(Successor {
                state: LatticeState {
                    cell: end,
                    bin: motion.end_bin,
                },
                motion: LatticeMotion {
                    bin: state.bin,
                    index,
                    straight: motion.straight,
                    reverse: motion.direction == TravelDirection::Reverse,
                },
                cost: self.params.edge_cost(motion, incoming, end_cost),
            });
        }

        if available {
            Ok(())
        } else {
            Err(PlannerError::InvalidUse(format!(
                "heading bin {} has no motion primitives",
                state.bin
            )))
        }
    }

    fn analytic_expansion(
        &mut self,
        state: &LatticeState,
        incoming: Option<LatticeMotion>,
        goal: &LatticeState,
    ) -> Option<AnalyticConnection> {
        let dx = (goal.cell.x - state.cell.x) as f64;
        let dy = (goal.cell.y - state.cell.y) as f64;
        if !(dx.hypot(dy) < self.params.analytic_expansion_ratio * self.radius) {
            return None;
        }

        let from = self.state_pose(state);
        let to = self.state_pose(goal);
        let curve = if self.params.allow_reverse {
            AnalyticPath::reeds_shepp(&from, &to, self.radius)
        } else {
            AnalyticPath::dubins(&from, &to, self.radius)
        }?;

        let samples = curve.sample(ANALYTIC_STEP);
        let mut cost = 0.0;
        for pair in samples.windows(2) {
            let pose = &pair[1];
            if self.checker.in_collision(self.costmap, pose.x, pose.y, pose.yaw) {
                return None;
            }
            let cell_cost = self.costmap.cost_at_grid(pose.x, pose.y)?;
            cost += pair[0].distance(&pair[1]) * self.params.travel_factor(cell_cost);
        }

        let mut reverse = incoming.map_or(false, |m| m.reverse);
        for segment in curve.segments() {
            let length = segment.length.abs();
            if segment.steer != Steer::Straight {
                cost += self.params.non_straight_penalty * length;
            }
            if (segment.length < 0.0) != reverse {
                cost += self.params.reverse_penalty * length;
                reverse = segment.length < 0.0;
            }
        }

        Some(AnalyticConnection {
            poses: samples.into_iter().skip(1).collect(),
            cost,
        })
    }

    fn state_pose(&self, state: &LatticeState) -> Pose2D {
        Pose2D::new(state.cell.x as f64, state.cell.y as f64, self.heading(state.bin))
    }

    fn motion_poses(&self, from: &LatticeState, motion: &LatticeMotion) -> Vec<Pose2D> {
        let grid_motion = match self.motions.motion(motion.bin, self.params.allow_reverse, motion.index) {
            Some(m) => m,
            None => return Vec::new(),
        };
        let (x, y) = (from.cell.x as f64, from.cell.y as f64);
        let mut poses: Vec<Pose2D> = grid_motion
            .poses
            .iter()
            .map(|p| Pose2D::new(x + p.x, y + p.y, p.yaw))
            .collect();
        // The last pose is the successor state itself
        if let Some(last) = poses.last_mut() {
            let end = LatticeState {
                cell: from.cell.offset(grid_motion.end_dx, grid_motion.end_dy),
                bin: grid_motion.end_bin,
            };
            *last = self.state_pose(&end);
        }
        poses
    }
}
