//! Common traits defining planner interfaces

use crate::common::error::PlannerResult;
use crate::common::types::*;
use crate::utils::Costmap;

/// Trait for pose-to-pose planners working on a cost grid
pub trait PathPlanner {
    /// Plan a path from start to goal, start pose first
    fn plan(&self, start: Pose2D, goal: Pose2D, costmap: &Costmap) -> PlannerResult<Path2D>;
}

/// Trait for visualizable items
pub trait Visualizable {
    /// Draw onto the visualizer
    fn visualize(&self, vis: &mut crate::utils::Visualizer);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StraightLinePlanner;

    impl PathPlanner for StraightLinePlanner {
        fn plan(&self, start: Pose2D, goal: Pose2D, _costmap: &Costmap) -> PlannerResult<Path2D> {
            Ok(Path2D::from_poses(vec![start, goal]))
        }
    }

    #[test]
    fn test_path_planner_trait() {
        let planner = StraightLinePlanner;
        let costmap = Costmap::new(4, 4, 1.0, Point2D::origin());
        let path = planner
            .plan(Pose2D::origin(), Pose2D::new(1.0, 1.0, 0.0), &costmap)
            .unwrap();
        assert_eq!(path.len(), 2);
    }
}
