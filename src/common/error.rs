//! Error types for lattice_planner

use std::fmt;

use thiserror::Error;

/// Why a search ended without reaching the goal (iteration cap excluded)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoPathReason {
    /// Every reachable state was expanded
    FrontierExhausted,
    /// The planning deadline ran out before the goal was reached
    DeadlineExceeded,
}

impl fmt::Display for NoPathReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoPathReason::FrontierExhausted => write!(f, "open set exhausted"),
            NoPathReason::DeadlineExceeded => write!(f, "planning time exceeded"),
        }
    }
}

/// Main error type for the lattice planner
#[derive(Debug, Error)]
pub enum PlannerError {
    /// Missing or malformed lattice file, invalid numeric parameters
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// Start or goal unusable for this grid
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Search finished without a path
    #[error("No valid path found: {reason} after {iterations} iterations")]
    NoPath {
        reason: NoPathReason,
        iterations: usize,
    },
    /// Search stopped at the configured iteration cap
    #[error("Exceeded maximum iterations ({iterations})")]
    IterationLimit { iterations: usize },
    /// Internal invariant violated during search
    #[error("Invalid use: {0}")]
    InvalidUse(String),
    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PlannerError {
    /// True for the failures a caller may see as an empty plan
    pub fn is_search_failure(&self) -> bool {
        matches!(
            self,
            PlannerError::NoPath { .. }
                | PlannerError::IterationLimit { .. }
                | PlannerError::InvalidUse(_)
        )
    }
}

/// Result type alias for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;
