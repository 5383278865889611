//! Utility modules for lattice_planner

pub mod costmap;
pub mod visualization;

pub use costmap::*;
pub use visualization::{colors, PathStyle, PointStyle, Visualizer};
