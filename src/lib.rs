//! lattice_planner - state lattice path planning in Rust
//!
//! This crate plans kinematically feasible paths for car-like and
//! differential robots over 2D costmaps using precomputed motion
//! primitives, A* search and path smoothing.

// Core modules
pub mod common;
pub mod utils;

// Algorithm modules
pub mod path_planning;

// Re-export common types for convenience
pub use common::{GridCell, Path2D, Point2D, Pose2D};
pub use common::{PathPlanner, Visualizable};
pub use common::{NoPathReason, PlannerError, PlannerResult};
pub use path_planning::state_lattice::{Footprint, LatticePlanner, Plan, PlannerConfig};
pub use utils::Costmap;
