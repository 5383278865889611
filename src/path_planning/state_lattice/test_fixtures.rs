//! Shared fixtures for the lattice planner tests

use std::path::Path;

use crate::common::{Point2D, Pose2D};
use crate::utils::Costmap;

use super::collision_checker::Footprint;
use super::lattice_generator::{LatticeGenerator, LatticeGeneratorConfig};
use super::motion_table::{LatticeMetadata, LatticeMotionTable, MotionPrimitive, TravelDirection};

pub const RESOLUTION: f64 = 0.1;
pub const TURNING_RADIUS: f64 = 0.5;

/// 16 heading lattice, radius of 5 cells at 0.1 m
pub fn sample_lattice() -> LatticeMotionTable {
    lattice_with_radius(TURNING_RADIUS)
}

pub fn lattice_with_radius(turning_radius: f64) -> LatticeMotionTable {
    LatticeGenerator::new(LatticeGeneratorConfig {
        turning_radius,
        grid_resolution: RESOLUTION,
        num_of_headings: 16,
        step_distance: RESOLUTION / 2.0,
    })
    .generate()
    .unwrap()
}

/// Write a generated lattice into `dir` and return its path
pub fn write_lattice(dir: &Path, name: &str, turning_radius: f64) -> std::path::PathBuf {
    let path = dir.join(name);
    lattice_with_radius(turning_radius).save(&path).unwrap();
    path
}

/// 16 headings, only heading 0 has primitives
pub fn sparse_lattice() -> LatticeMotionTable {
    let metadata = LatticeMetadata {
        motion_model: "ackermann".to_string(),
        turning_radius: TURNING_RADIUS,
        grid_resolution: RESOLUTION,
        num_of_headings: 16,
        heading_angles: Vec::new(),
        number_of_trajectories: 1,
    };
    let straight = MotionPrimitive {
        trajectory_id: 0,
        start_angle_index: 0,
        end_angle_index: 0,
        left_turn: false,
        trajectory_radius: 0.0,
        trajectory_length: 0.2,
        arc_length: 0.0,
        straight_length: 0.2,
        direction: TravelDirection::Forward,
        poses: vec![
            Pose2D::new(0.0, 0.0, 0.0),
            Pose2D::new(0.1, 0.0, 0.0),
            Pose2D::new(0.2, 0.0, 0.0),
        ],
    };
    LatticeMotionTable::from_parts(metadata, vec![straight]).unwrap()
}

pub fn open_costmap(size_x: usize, size_y: usize) -> Costmap {
    Costmap::new(size_x, size_y, RESOLUTION, Point2D::origin())
}

/// 0.2 m by 0.1 m robot
pub fn small_footprint() -> Footprint {
    Footprint::rectangle(0.2, 0.1)
}

/// World pose at the center of cell `(x, y)` of an origin-anchored costmap
pub fn cell_pose(x: i32, y: i32, yaw: f64) -> Pose2D {
    Pose2D::new((x as f64 + 0.5) * RESOLUTION, (y as f64 + 0.5) * RESOLUTION, yaw)
}
