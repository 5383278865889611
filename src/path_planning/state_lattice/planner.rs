//! Lattice planner
//!
//! Owns the motion primitive library and the search resources built from
//! it. All state sits behind one mutex that is held for a whole planning
//! call or reconfiguration, so a lattice reload never races a search.
//! Components are rebuilt lazily: a parameter change only marks them stale.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::common::{Path2D, PathPlanner, PlannerError, PlannerResult, Pose2D, Visualizable};
use crate::path_planning::a_star::{AStarAlgorithm, SearchLimits};
use crate::utils::{colors, Costmap, PathStyle, Visualizer};

use super::collision_checker::{Footprint, GridCollisionChecker};
use super::config::{Invalidation, ParameterUpdate, PlannerConfig};
use super::heuristic::{lookup_table_dim, LatticeHeuristic};
use super::lattice_space::{LatticeMotion, LatticeSpace, LatticeState, SearchParams};
use super::motion_table::{GridMotionTable, LatticeMotionTable};
use super::smoother::Smoother;

/// Smoothing only pays off on paths longer than this
const MIN_POSES_TO_SMOOTH: usize = 6;

/// A planned path with its search statistics
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// World poses, start first
    pub path: Path2D,
    pub iterations: usize,
    pub smoothed: bool,
    /// Minimum turning radius of the lattice used [m]
    pub turning_radius: f64,
    /// Search cost in cell units
    pub cost: f64,
}

/// Everything the search needs for one grid resolution
struct SearchResources {
    resolution: f64,
    motions: GridMotionTable,
    heading_angles: Vec<f64>,
    checker: GridCollisionChecker,
    heuristic: LatticeHeuristic,
    engine: AStarAlgorithm<LatticeState, LatticeMotion>,
    params: SearchParams,
}

impl SearchResources {
    fn build(
        config: &PlannerConfig,
        lattice: &LatticeMotionTable,
        footprint: &Footprint,
        circumscribed_cost: u8,
        resolution: f64,
    ) -> Self {
        let heading_angles = lattice.metadata().heading_angles.clone();
        let heuristic = LatticeHeuristic::new(
            heading_angles.clone(),
            lattice.turning_radius() / resolution,
            config.allow_reverse_expansion,
            config.allow_unknown,
            config.cache_obstacle_heuristic,
            lookup_table_dim(config.lookup_table_size, resolution),
        );
        let limits = SearchLimits {
            max_iterations: config.iteration_cap(),
            max_planning_time: Some(config.planning_budget()),
        };
        Self {
            resolution,
            motions: lattice.grid_motions(resolution),
            heading_angles,
            checker: GridCollisionChecker::new(footprint.clone(), circumscribed_cost, config.allow_unknown, resolution),
            heuristic,
            engine: AStarAlgorithm::new(limits),
            params: SearchParams::from(config),
        }
    }
}

struct PlannerState {
    config: PlannerConfig,
    footprint: Footprint,
    circumscribed_cost: u8,
    lattice: Arc<LatticeMotionTable>,
    search: Option<SearchResources>,
    smoother: Option<Smoother>,
    search_builds: usize,
    smoother_builds: usize,
}

/// State lattice planner over a 2D costmap
pub struct LatticePlanner {
    state: Mutex<PlannerState>,
    /// Resolution the planner was configured for [m/cell]
    resolution: f64,
}

impl LatticePlanner {
    /// Validate `config` and load its lattice file.
    ///
    /// `circumscribed_cost` is the costmap value at the footprint's
    /// circumscribed radius; cells cheaper than that skip the exact
    /// footprint test.
    pub fn configure(
        config: PlannerConfig,
        footprint: Footprint,
        circumscribed_cost: u8,
        resolution: f64,
    ) -> PlannerResult<Self> {
        config.validate()?;
        if !(resolution > 0.0) || !resolution.is_finite() {
            return Err(PlannerError::ConfigError(format!(
                "resolution must be positive, got {}",
                resolution
            )));
        }
        let lattice = LatticeMotionTable::load(&config.lattice_filepath)?;
        info!(
            "Configured lattice planner with {} ({} headings, turning radius {} m), allow reverse: {}",
            config.lattice_filepath.display(),
            lattice.num_headings(),
            lattice.turning_radius(),
            config.allow_reverse_expansion
        );

        Ok(Self {
            state: Mutex::new(PlannerState {
                config,
                footprint,
                circumscribed_cost,
                lattice: Arc::new(lattice),
                search: None,
                smoother: None,
                search_builds: 0,
                smoother_builds: 0,
            }),
            resolution,
        })
    }

    pub fn config(&self) -> PlannerConfig {
        self.state.lock().config.clone()
    }

    pub fn lattice(&self) -> Arc<LatticeMotionTable> {
        self.state.lock().lattice.clone()
    }

    /// How many times the search resources were built
    pub fn search_builds(&self) -> usize {
        self.state.lock().search_builds
    }

    /// How many times the smoother was built
    pub fn smoother_builds(&self) -> usize {
        self.state.lock().smoother_builds
    }

    /// Plan from `start` to `goal` in world coordinates
    pub fn create_plan(&self, start: &Pose2D, goal: &Pose2D, costmap: &Costmap) -> PlannerResult<Plan> {
        let started = Instant::now();
        let mut guard = self.state.lock();
        let PlannerState {
            config,
            footprint,
            circumscribed_cost,
            lattice,
            search,
            smoother,
            search_builds,
            smoother_builds,
        } = &mut *guard;

        let resolution = costmap.resolution();
        if search.as_ref().map_or(false, |s| (s.resolution - resolution).abs() > 1e-9) {
            info!(
                "Costmap resolution changed to {}, rebuilding the search resources",
                resolution
            );
            *search = None;
        } else if search.is_none() && (resolution - self.resolution).abs() > 1e-9 {
            debug!(
                "Planning at resolution {} instead of the configured {}",
                resolution, self.resolution
            );
        }

        let search = search.get_or_insert_with(|| {
            *search_builds += 1;
            debug!("Building lattice search resources at resolution {}", resolution);
            SearchResources::build(config, lattice, footprint, *circumscribed_cost, resolution)
        });
        let smoother = smoother.get_or_insert_with(|| {
            *smoother_builds += 1;
            let mut smoother = Smoother::new(config.smoother.clone());
            smoother.initialize(lattice.turning_radius());
            smoother
        });

        let start_state = to_state(costmap, lattice, start, "start")?;
        let goal_state = to_state(costmap, lattice, goal, "goal")?;

        let mut space = LatticeSpace::new(
            costmap,
            &search.motions,
            &search.heading_angles,
            &search.checker,
            &mut search.heuristic,
            search.params,
        );
        search.engine.set_start(&space, start_state)?;
        search.engine.set_goal(&space, goal_state)?;
        let report = match search.engine.create_path(&mut space) {
            Ok(report) => report,
            Err(e) => {
                warn!("Failed to plan from {:?} to {:?}: {}", start_state, goal_state, e);
                return Err(e);
            }
        };

        let poses = report
            .poses
            .iter()
            .rev()
            .map(|p| {
                let world = costmap.grid_to_world(p.x, p.y);
                Pose2D::new(world.x, world.y, p.yaw)
            })
            .collect();
        let mut path = Path2D::from_poses(poses);

        let mut smoothed = false;
        if report.iterations > 1 && path.len() > MIN_POSES_TO_SMOOTH {
            let remaining = config.planning_budget().saturating_sub(started.elapsed());
            let outcome = smoother.smooth(&mut path, costmap, &search.checker, remaining);
            if outcome.timed_out {
                warn!("Smoothing ran out of planning time, returning a partially smoothed path");
            }
            smoothed = outcome.modified();
        }

        info!(
            "Planned {} poses in {} iterations ({:.1} ms), cost {:.2}",
            path.len(),
            report.iterations,
            started.elapsed().as_secs_f64() * 1e3,
            report.cost
        );

        Ok(Plan {
            path,
            iterations: report.iterations,
            smoothed,
            turning_radius: lattice.turning_radius(),
            cost: report.cost,
        })
    }

    /// Apply parameter changes.
    ///
    /// Either every update takes effect or none does. A new lattice file is
    /// loaded here so a bad path is reported now rather than on the next
    /// plan.
    pub fn reconfigure(&self, updates: &[ParameterUpdate]) -> PlannerResult<()> {
        let mut state = self.state.lock();
        let mut config = state.config.clone();
        let mut invalidation = Invalidation::default();
        for update in updates {
            invalidation |= update.apply(&mut config);
        }
        config.validate()?;

        let reload = updates
            .iter()
            .any(|u| matches!(u, ParameterUpdate::LatticeFilepath(_)));
        if reload {
            let lattice = LatticeMotionTable::load(&config.lattice_filepath)?;
            info!(
                "Reloaded lattice {} (turning radius {} m)",
                config.lattice_filepath.display(),
                lattice.turning_radius()
            );
            state.lattice = Arc::new(lattice);
        }

        state.config = config;
        if invalidation.search {
            state.search = None;
        }
        if invalidation.smoother {
            state.smoother = None;
        }
        debug!(
            "Applied {} parameter updates, search stale: {}, smoother stale: {}",
            updates.len(),
            invalidation.search,
            invalidation.smoother
        );
        Ok(())
    }
}

/// Grid cell and nearest lattice heading of a world pose
fn to_state(costmap: &Costmap, lattice: &LatticeMotionTable, pose: &Pose2D, what: &str) -> PlannerResult<LatticeState> {
    let cell = costmap.world_to_map(pose.x, pose.y).ok_or_else(|| {
        PlannerError::InvalidInput(format!(
            "{} ({:.3}, {:.3}) is outside the costmap",
            what, pose.x, pose.y
        ))
    })?;
    Ok(LatticeState {
        cell,
        bin: lattice.closest_bin(pose.yaw),
    })
}

impl Visualizable for Plan {
    fn visualize(&self, vis: &mut Visualizer) {
        let caption = if self.smoothed { "Smoothed path" } else { "Path" };
        vis.plot_path(&self.path, &PathStyle::new(colors::PATH, caption));
        if let (Some(start), Some(goal)) = (self.path.first(), self.path.last()) {
            let marker = self.turning_radius * 0.5;
            vis.plot_start(start, marker);
            vis.plot_goal(goal, marker);
        }
    }
}

impl PathPlanner for LatticePlanner {
    fn plan(&self, start: Pose2D, goal: Pose2D, costmap: &Costmap) -> PlannerResult<Path2D> {
        self.create_plan(&start, &goal, costmap).map(|plan| plan.path)
    }
}
