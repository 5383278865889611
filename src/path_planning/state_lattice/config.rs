//! Planner and smoother configuration
//!
//! Both structs deserialize from TOML with every field optional:
//!
//! ```toml
//! allow_unknown = false
//! lattice_filepath = "lattices/ackermann_16.json"
//! max_planning_time = 2.0
//!
//! [smoother]
//! w_smooth = 0.25
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::{PlannerError, PlannerResult};

/// Path smoother parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmootherParams {
    /// Stop when the total change of one iteration drops below this
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Pull towards the original path
    pub w_data: f64,
    /// Pull towards the neighbors' midpoint
    pub w_smooth: f64,
    /// Smooth the smoothed path once more
    pub do_refinement: bool,
}

impl Default for SmootherParams {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 1000,
            w_data: 0.2,
            w_smooth: 0.3,
            do_refinement: true,
        }
    }
}

impl SmootherParams {
    pub fn validate(&self) -> PlannerResult<()> {
        for (name, value) in [
            ("smoother.tolerance", self.tolerance),
            ("smoother.w_data", self.w_data),
            ("smoother.w_smooth", self.w_smooth),
        ] {
            non_negative(name, value)?;
        }
        Ok(())
    }
}

/// Lattice planner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Allow traversing unknown cells
    pub allow_unknown: bool,
    /// Expansion cap, `<= 0` disables it
    pub max_iterations: i64,
    /// Motion primitive library (JSON)
    pub lattice_filepath: PathBuf,
    /// Keep the obstacle heuristic between plans with the same goal cell
    pub cache_obstacle_heuristic: bool,
    /// Extra cost factor for changing travel direction
    pub reverse_penalty: f64,
    /// Extra cost factor for starting to turn after a straight motion
    pub change_penalty: f64,
    /// Extra cost factor for turning motions
    pub non_straight_penalty: f64,
    /// Weight of the traversed cell cost
    pub cost_penalty: f64,
    /// Analytic expansion is tried within this many turning radii of the goal
    pub analytic_expansion_ratio: f64,
    /// Search plus smoothing budget [s]
    pub max_planning_time: f64,
    /// Side of the analytic heuristic lookup table [m]
    pub lookup_table_size: f64,
    pub allow_reverse_expansion: bool,
    pub smoother: SmootherParams,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            allow_unknown: true,
            max_iterations: 1_000_000,
            lattice_filepath: PathBuf::from("default_model.json"),
            cache_obstacle_heuristic: false,
            reverse_penalty: 2.0,
            change_penalty: 0.05,
            non_straight_penalty: 1.05,
            cost_penalty: 2.0,
            analytic_expansion_ratio: 3.5,
            max_planning_time: 5.0,
            lookup_table_size: 20.0,
            allow_reverse_expansion: false,
            smoother: SmootherParams::default(),
        }
    }
}

impl PlannerConfig {
    pub fn from_toml_str(text: &str) -> PlannerResult<Self> {
        let config: PlannerConfig = toml::from_str(text)
            .map_err(|e| PlannerError::ConfigError(format!("invalid planner configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> PlannerResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            PlannerError::ConfigError(format!("failed to read configuration {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> PlannerResult<String> {
        toml::to_string(self).map_err(|e| PlannerError::ConfigError(format!("failed to encode configuration: {}", e)))
    }

    pub fn validate(&self) -> PlannerResult<()> {
        for (name, value) in [
            ("reverse_penalty", self.reverse_penalty),
            ("change_penalty", self.change_penalty),
            ("non_straight_penalty", self.non_straight_penalty),
            ("cost_penalty", self.cost_penalty),
            ("analytic_expansion_ratio", self.analytic_expansion_ratio),
        ] {
            non_negative(name, value)?;
        }
        if !(self.max_planning_time > 0.0) || !self.max_planning_time.is_finite() {
            return Err(PlannerError::ConfigError(format!(
                "max_planning_time must be positive, got {}",
                self.max_planning_time
            )));
        }
        if !(self.lookup_table_size > 0.0) || !self.lookup_table_size.is_finite() {
            return Err(PlannerError::ConfigError(format!(
                "lookup_table_size must be positive, got {}",
                self.lookup_table_size
            )));
        }
        if self.lattice_filepath.as_os_str().is_empty() {
            return Err(PlannerError::ConfigError("lattice_filepath is empty".to_string()));
        }
        self.smoother.validate()
    }

    /// Iteration cap, `None` when disabled
    pub fn iteration_cap(&self) -> Option<usize> {
        if self.max_iterations <= 0 {
            None
        } else {
            Some(self.max_iterations as usize)
        }
    }

    pub fn planning_budget(&self) -> Duration {
        Duration::from_secs_f64(self.max_planning_time.max(0.0))
    }
}

fn non_negative(name: &str, value: f64) -> PlannerResult<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(PlannerError::ConfigError(format!(
            "{} must be a non-negative number, got {}",
            name, value
        )))
    }
}

/// Components that must be rebuilt after a parameter change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Invalidation {
    pub search: bool,
    pub smoother: bool,
}

impl std::ops::BitOrAssign for Invalidation {
    fn bitor_assign(&mut self, rhs: Self) {
        self.search |= rhs.search;
        self.smoother |= rhs.smoother;
    }
}

/// One runtime parameter change
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterUpdate {
    AllowUnknown(bool),
    MaxIterations(i64),
    LatticeFilepath(PathBuf),
    CacheObstacleHeuristic(bool),
    ReversePenalty(f64),
    ChangePenalty(f64),
    NonStraightPenalty(f64),
    CostPenalty(f64),
    AnalyticExpansionRatio(f64),
    MaxPlanningTime(f64),
    LookupTableSize(f64),
    AllowReverseExpansion(bool),
    SmootherTolerance(f64),
    SmootherMaxIterations(usize),
    SmootherWData(f64),
    SmootherWSmooth(f64),
    SmootherDoRefinement(bool),
}

impl ParameterUpdate {
    /// Parse a `name = value` pair using the configuration field names
    pub fn parse(name: &str, value: &str) -> PlannerResult<Self> {
        let value = value.trim();
        let update = match name.trim() {
            "allow_unknown" => ParameterUpdate::AllowUnknown(parse_value(name, value)?),
            "max_iterations" => ParameterUpdate::MaxIterations(parse_value(name, value)?),
            "lattice_filepath" => ParameterUpdate::LatticeFilepath(PathBuf::from(value)),
            "cache_obstacle_heuristic" => ParameterUpdate::CacheObstacleHeuristic(parse_value(name, value)?),
            "reverse_penalty" => ParameterUpdate::ReversePenalty(parse_value(name, value)?),
            "change_penalty" => ParameterUpdate::ChangePenalty(parse_value(name, value)?),
            "non_straight_penalty" => ParameterUpdate::NonStraightPenalty(parse_value(name, value)?),
            "cost_penalty" => ParameterUpdate::CostPenalty(parse_value(name, value)?),
            "analytic_expansion_ratio" => ParameterUpdate::AnalyticExpansionRatio(parse_value(name, value)?),
            "max_planning_time" => ParameterUpdate::MaxPlanningTime(parse_value(name, value)?),
            "lookup_table_size" => ParameterUpdate::LookupTableSize(parse_value(name, value)?),
            "allow_reverse_expansion" => ParameterUpdate::AllowReverseExpansion(parse_value(name, value)?),
            "smoother.tolerance" => ParameterUpdate::SmootherTolerance(parse_value(name, value)?),
            "smoother.max_iterations" => ParameterUpdate::SmootherMaxIterations(parse_value(name, value)?),
            "smoother.w_data" => ParameterUpdate::SmootherWData(parse_value(name, value)?),
            "smoother.w_smooth" => ParameterUpdate::SmootherWSmooth(parse_value(name, value)?),
            "smoother.do_refinement" => ParameterUpdate::SmootherDoRefinement(parse_value(name, value)?),
            other => {
                return Err(PlannerError::ConfigError(format!("unknown parameter {}", other)));
            }
        };
        Ok(update)
    }

    /// Write the new value into `config` and report what it invalidates
    pub fn apply(&self, config: &mut PlannerConfig) -> Invalidation {
        let search_only = Invalidation {
            search: true,
            smoother: false,
        };
        let smoother_only = Invalidation {
            search: false,
            smoother: true,
        };
        match self {
            ParameterUpdate::AllowUnknown(v) => {
                config.allow_unknown = *v;
                search_only
            }
            ParameterUpdate::MaxIterations(v) => {
                config.max_iterations = *v;
                search_only
            }
            ParameterUpdate::LatticeFilepath(v) => {
                config.lattice_filepath = v.clone();
                Invalidation {
                    search: true,
                    smoother: true,
                }
            }
            ParameterUpdate::CacheObstacleHeuristic(v) => {
                config.cache_obstacle_heuristic = *v;
                search_only
            }
            ParameterUpdate::ReversePenalty(v) => {
                config.reverse_penalty = *v;
                search_only
            }
            ParameterUpdate::ChangePenalty(v) => {
                config.change_penalty = *v;
                search_only
            }
            ParameterUpdate::NonStraightPenalty(v) => {
                config.non_straight_penalty = *v;
                search_only
            }
            ParameterUpdate::CostPenalty(v) => {
                config.cost_penalty = *v;
                search_only
            }
            ParameterUpdate::AnalyticExpansionRatio(v) => {
                config.analytic_expansion_ratio = *v;
                search_only
            }
            ParameterUpdate::MaxPlanningTime(v) => {
                config.max_planning_time = *v;
                search_only
            }
            ParameterUpdate::LookupTableSize(v) => {
                config.lookup_table_size = *v;
                search_only
            }
            ParameterUpdate::AllowReverseExpansion(v) => {
                config.allow_reverse_expansion = *v;
                search_only
            }
            ParameterUpdate::SmootherTolerance(v) => {
                config.smoother.tolerance = *v;
                smoother_only
            }
            ParameterUpdate::SmootherMaxIterations(v) => {
                config.smoother.max_iterations = *v;
                smoother_only
            }
            ParameterUpdate::SmootherWData(v) => {
                config.smoother.w_data = *v;
                smoother_only
            }
            ParameterUpdate::SmootherWSmooth(v) => {
                config.smoother.w_smooth = *v;
                smoother_only
            }
            ParameterUpdate::SmootherDoRefinement(v) => {
                config.smoother.do_refinement = *v;
                smoother_only
            }
        }
    }
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> PlannerResult<T> {
    value
        .parse()
        .map_err(|_| PlannerError::ConfigError(format!("invalid value {:?} for {}", value, name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PlannerConfig::default();
        assert!(config.allow_unknown);
        assert_eq!(config.max_iterations, 1_000_000);
        assert_eq!(config.non_straight_penalty, 1.05);
        assert_eq!(config.analytic_expansion_ratio, 3.5);
        assert_eq!(config.smoother.max_iterations, 1000);
        assert!(config.smoother.do_refinement);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = PlannerConfig::from_toml_str(
            r#"
            allow_unknown = false
            max_iterations = 0
            lattice_filepath = "lattices/ackermann_16.json"

            [smoother]
            w_smooth = 0.25
            "#,
        )
        .unwrap();
        assert!(!config.allow_unknown);
        assert_eq!(config.iteration_cap(), None);
        assert_eq!(config.lattice_filepath, PathBuf::from("lattices/ackermann_16.json"));
        assert_eq!(config.smoother.w_smooth, 0.25);
        assert_eq!(config.smoother.w_data, 0.2);
        assert_eq!(config.reverse_penalty, 2.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            PlannerConfig::from_toml_str("reverse_penalty = -1.0"),
            Err(PlannerError::ConfigError(_))
        ));
        assert!(PlannerConfig::from_toml_str("max_planning_time = 0.0").is_err());
        assert!(PlannerConfig::from_toml_str("lookup_table_size = -3.0").is_err());
        assert!(PlannerConfig::from_toml_str("[smoother]\nw_data = -0.1").is_err());
        assert!(PlannerConfig::from_toml_str("allow_unknown = 3").is_err());
    }

    #[test]
    fn test_toml_file_round_trip() {
        let mut config = PlannerConfig::default();
        config.cost_penalty = 3.5;
        config.smoother.do_refinement = false;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes()).unwrap();
        let loaded = PlannerConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(loaded, config);

        assert!(PlannerConfig::from_toml_file("/nonexistent/planner.toml").is_err());
    }

    #[test]
    fn test_iteration_cap() {
        let mut config = PlannerConfig::default();
        assert_eq!(config.iteration_cap(), Some(1_000_000));
        config.max_iterations = -5;
        assert_eq!(config.iteration_cap(), None);
        assert_eq!(config.planning_budget(), Duration::from_secs(5));
    }

    #[test]
    fn test_updates_report_invalidation() {
        let mut config = PlannerConfig::default();

        let hit = ParameterUpdate::ReversePenalty(4.0).apply(&mut config);
        assert_eq!(config.reverse_penalty, 4.0);
        assert!(hit.search && !hit.smoother);

        let hit = ParameterUpdate::SmootherWData(0.1).apply(&mut config);
        assert!(!hit.search && hit.smoother);

        let hit = ParameterUpdate::LatticeFilepath(PathBuf::from("other.json")).apply(&mut config);
        assert!(hit.search && hit.smoother);

        let mut total = Invalidation::default();
        total |= ParameterUpdate::SmootherDoRefinement(false).apply(&mut config);
        total |= ParameterUpdate::AllowUnknown(false).apply(&mut config);
        assert_eq!(
            total,
            Invalidation {
                search: true,
                smoother: true
            }
        );
    }

    #[test]
    fn test_parse_updates() {
        assert_eq!(
            ParameterUpdate::parse("max_iterations", " -1 ").unwrap(),
            ParameterUpdate::MaxIterations(-1)
        );
        assert_eq!(
            ParameterUpdate::parse("smoother.do_refinement", "false").unwrap(),
            ParameterUpdate::SmootherDoRefinement(false)
        );
        assert!(ParameterUpdate::parse("cost_penalty", "lots").is_err());
        assert!(ParameterUpdate::parse("tolerance", "1.0").is_err());
    }
}
