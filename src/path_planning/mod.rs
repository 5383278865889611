// Path Planning algorithms module

pub mod a_star;
pub mod state_lattice;

pub use a_star::*;
pub use state_lattice::{LatticePlanner, Plan, PlannerConfig};
