//! State Lattice Planner Module
//!
//! Kinematically feasible planning over a 2D costmap. A precomputed library
//! of motion primitives connects discrete (cell, heading) states; A* searches
//! that graph with a heuristic combining obstacle-free curve lengths and an
//! obstacle-aware wavefront, and the result is smoothed.
//!
//! # Components
//!
//! - `motion_table`: primitive library file and its per-heading index
//! - `lattice_generator`: builds primitive libraries for a vehicle
//! - `analytic_curve`: Dubins and Reeds-Shepp connections
//! - `collision_checker`: oriented footprint test against the costmap
//! - `heuristic`: lower bound of the remaining cost
//! - `lattice_space`: the search space handed to the A* engine
//! - `smoother`: path smoothing under curvature and collision constraints
//! - `planner`: configuration, reload and the planning entry point
//!
//! # Example
//!
//! ```no_run
//! use lattice_planner::common::{Point2D, Pose2D};
//! use lattice_planner::path_planning::state_lattice::{Footprint, LatticePlanner, PlannerConfig};
//! use lattice_planner::utils::Costmap;
//!
//! let config = PlannerConfig::from_toml_file("planner.toml").unwrap();
//! let planner = LatticePlanner::configure(config, Footprint::rectangle(0.5, 0.3), 0, 0.05).unwrap();
//!
//! let costmap = Costmap::new(200, 200, 0.05, Point2D::origin());
//! let plan = planner
//!     .create_plan(&Pose2D::new(1.0, 1.0, 0.0), &Pose2D::new(8.0, 6.0, 1.57), &costmap)
//!     .unwrap();
//! println!("{} poses after {} iterations", plan.path.len(), plan.iterations);
//! ```
//!
//! # References
//!
//! - M. Pivtoraiko, R. Knepper, A. Kelly, "Differentially Constrained Mobile
//!   Robot Motion Planning in State Lattices"
//! - S. Macenski et al., "Open-Source, Cost-Aware Kinematically Feasible
//!   Planning for Mobile and Surface Robotics"

pub mod analytic_curve;
pub mod collision_checker;
pub mod config;
pub mod heuristic;
pub mod lattice_generator;
pub mod lattice_space;
pub mod motion_table;
pub mod planner;
pub mod smoother;

#[cfg(test)]
mod test_fixtures;

// Re-exports
pub use analytic_curve::{AnalyticPath, CurveSegment, Steer};
pub use collision_checker::{Footprint, GridCollisionChecker};
pub use config::{Invalidation, ParameterUpdate, PlannerConfig, SmootherParams};
pub use heuristic::{lookup_table_dim, LatticeHeuristic};
pub use lattice_generator::{LatticeGenerator, LatticeGeneratorConfig};
pub use lattice_space::{LatticeMotion, LatticeSpace, LatticeState, SearchParams};
pub use motion_table::{
    GridMotion, GridMotionTable, LatticeMetadata, LatticeMotionTable, MotionPrimitive, TravelDirection,
};
pub use planner::{LatticePlanner, Plan};
pub use smoother::{Smoother, SmoothingOutcome};
