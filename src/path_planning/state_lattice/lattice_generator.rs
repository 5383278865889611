//! Lattice generator for Ackermann vehicles
//!
//! Builds a primitive library whose straight and turning primitives all end on
//! cell centers. Headings are the directions of small integer grid vectors.
//! Each start heading gets one straight primitive and one turn to each
//! neighbouring heading, composed of a circular arc and a straight piece.

use nalgebra::{Matrix2, Vector2};
use tracing::debug;

use crate::common::{normalize_angle, pi_2_pi, PlannerError, PlannerResult, Pose2D};

use super::analytic_curve::{AnalyticPath, CurveSegment, Steer};
use super::motion_table::{LatticeMetadata, LatticeMotionTable, MotionPrimitive, TravelDirection};

/// Configuration for the lattice generator
#[derive(Debug, Clone)]
pub struct LatticeGeneratorConfig {
    /// Minimum turning radius [m]
    pub turning_radius: f64,
    /// Grid resolution [m/cell]
    pub grid_resolution: f64,
    /// Number of heading bins, 8 or 16
    pub num_of_headings: usize,
    /// Maximum spacing between primitive poses [m]
    pub step_distance: f64,
}

impl Default for LatticeGeneratorConfig {
    fn default() -> Self {
        Self {
            turning_radius: 0.5,
            grid_resolution: 0.05,
            num_of_headings: 16,
            step_distance: 0.025,
        }
    }
}

/// Integer grid directions, sorted by angle
fn heading_directions(num_of_headings: usize) -> PlannerResult<Vec<(i32, i32)>> {
    let base: &[(i32, i32)] = match num_of_headings {
        16 => &[(1, 0), (2, 1), (1, 1), (1, 2)],
        8 => &[(1, 0), (1, 1)],
        n => {
            return Err(PlannerError::ConfigError(format!(
                "lattice generator supports 8 or 16 headings, got {}",
                n
            )))
        }
    };

    let mut directions: Vec<(i32, i32)> = (0..4)
        .flat_map(|quarter| {
            base.iter().map(move |&(x, y)| match quarter {
                0 => (x, y),
                1 => (-y, x),
                2 => (-x, -y),
                _ => (y, -x),
            })
        })
        .collect();
    directions.sort_by(|a, b| {
        let angle_a = normalize_angle((a.1 as f64).atan2(a.0 as f64));
        let angle_b = normalize_angle((b.1 as f64).atan2(b.0 as f64));
        angle_a.total_cmp(&angle_b)
    });
    Ok(directions)
}

/// A turn expressed in cells
#[derive(Debug, Clone, Copy)]
struct TurnCandidate {
    end: (i32, i32),
    radius: f64,
    straight: f64,
    arc_first: bool,
    length: f64,
}

pub struct LatticeGenerator {
    config: LatticeGeneratorConfig,
}

impl LatticeGenerator {
    pub fn new(config: LatticeGeneratorConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(LatticeGeneratorConfig::default())
    }

    /// Build the primitive library
    pub fn generate(&self) -> PlannerResult<LatticeMotionTable> {
        let config = &self.config;
        if !(config.turning_radius > 0.0) || !(config.grid_resolution > 0.0) {
            return Err(PlannerError::ConfigError(format!(
                "lattice generator needs positive turning radius and resolution, got {} and {}",
                config.turning_radius, config.grid_resolution
            )));
        }
        let directions = heading_directions(config.num_of_headings)?;
        let angles: Vec<f64> = directions
            .iter()
            .map(|&(x, y)| normalize_angle((y as f64).atan2(x as f64)))
            .collect();

        let resolution = config.grid_resolution;
        let min_radius = config.turning_radius / resolution;
        let step = (config.step_distance / resolution).min(0.5);
        let step = if step > 0.0 { step } else { 0.5 };
        let n = directions.len();

        let mut primitives = Vec::with_capacity(3 * n);
        for start in 0..n {
            let mut turns = Vec::with_capacity(2);
            for end in [(start + 1) % n, (start + n - 1) % n] {
                let turn = shortest_turn(angles[start], angles[end], min_radius).ok_or_else(|| {
                    PlannerError::ConfigError(format!(
                        "no cell-aligned turn from heading {} to {} with radius {}",
                        start, end, config.turning_radius
                    ))
                })?;
                turns.push((end, turn));
            }

            let shortest = turns
                .iter()
                .map(|(_, t)| t.length)
                .fold(f64::INFINITY, f64::min);
            let (dx, dy) = directions[start];
            let unit = ((dx * dx + dy * dy) as f64).sqrt();
            let repeats = ((shortest / unit).round() as i32).max(1);

            let id = primitives.len();
            primitives.push(straight_primitive(id, start, angles[start], (dx * repeats, dy * repeats), step, resolution));
            for (end, turn) in turns {
                let id = primitives.len();
                primitives.push(turn_primitive(id, start, end, angles[start], angles[end], &turn, step, resolution));
            }
        }

        debug!(
            "Generated lattice with {} headings, {} primitives, radius {} cells",
            n,
            primitives.len(),
            min_radius
        );

        let metadata = LatticeMetadata {
            motion_model: "ackermann".to_string(),
            turning_radius: config.turning_radius,
            grid_resolution: resolution,
            num_of_headings: n,
            heading_angles: angles,
            number_of_trajectories: primitives.len(),
        };
        LatticeMotionTable::from_parts(metadata, primitives)
    }
}

/// Shortest arc+straight or straight+arc turn ending on a cell center
fn shortest_turn(start_angle: f64, end_angle: f64, min_radius: f64) -> Option<TurnCandidate> {
    let delta = pi_2_pi(end_angle - start_angle);
    let side = if delta > 0.0 { 1.0 } else { -1.0 };
    let end_heading = start_angle + delta;

    // Displacement of a unit-radius arc from the start to the end heading
    let arc = Vector2::new(
        side * (end_heading.sin() - start_angle.sin()),
        side * (start_angle.cos() - end_heading.cos()),
    );
    let start_dir = Vector2::new(start_angle.cos(), start_angle.sin());
    let end_dir = Vector2::new(end_heading.cos(), end_heading.sin());

    let arc_then_straight = Matrix2::from_columns(&[arc, end_dir]).try_inverse();
    let straight_then_arc = Matrix2::from_columns(&[start_dir, arc]).try_inverse();

    let mut window = (2.0 * min_radius).ceil() as i32 + 8;
    for _ in 0..4 {
        let mut best: Option<TurnCandidate> = None;
        for x in -window..=window {
            for y in -window..=window {
                if x == 0 && y == 0 {
                    continue;
                }
                let target = Vector2::new(x as f64, y as f64);
                let mut consider = |radius: f64, straight: f64, arc_first: bool| {
                    if radius < min_radius - 1e-9 || straight < -1e-9 {
                        return;
                    }
                    let straight = straight.max(0.0);
                    let length = radius * delta.abs() + straight;
                    if best.map_or(true, |b| length < b.length) {
                        best = Some(TurnCandidate {
                            end: (x, y),
                            radius,
                            straight,
                            arc_first,
                            length,
                        });
                    }
                };
                if let Some(inverse) = arc_then_straight {
                    let solution = inverse * target;
                    consider(solution[0], solution[1], true);
                }
                if let Some(inverse) = straight_then_arc {
                    let solution = inverse * target;
                    consider(solution[1], solution[0], false);
                }
            }
        }
        if best.is_some() {
            return best;
        }
        window *= 2;
    }
    None
}

fn straight_primitive(
    id: usize,
    bin: usize,
    angle: f64,
    end: (i32, i32),
    step: f64,
    resolution: f64,
) -> MotionPrimitive {
    let length = ((end.0 * end.0 + end.1 * end.1) as f64).sqrt();
    let path = AnalyticPath::from_segments(
        Pose2D::new(0.0, 0.0, angle),
        Pose2D::new(end.0 as f64, end.1 as f64, angle),
        1.0,
        vec![CurveSegment {
            steer: Steer::Straight,
            length,
        }],
    );
    MotionPrimitive {
        trajectory_id: id,
        start_angle_index: bin,
        end_angle_index: bin,
        left_turn: false,
        trajectory_radius: 0.0,
        trajectory_length: length * resolution,
        arc_length: 0.0,
        straight_length: length * resolution,
        direction: TravelDirection::Forward,
        poses: to_world(path.sample(step), resolution),
    }
}

#[allow(clippy::too_many_arguments)]
fn turn_primitive(
    id: usize,
    start_bin: usize,
    end_bin: usize,
    start_angle: f64,
    end_angle: f64,
    turn: &TurnCandidate,
    step: f64,
    resolution: f64,
) -> MotionPrimitive {
    let left = pi_2_pi(end_angle - start_angle) > 0.0;
    let arc = CurveSegment {
        steer: if left { Steer::Left } else { Steer::Right },
        length: turn.length - turn.straight,
    };
    let straight = CurveSegment {
        steer: Steer::Straight,
        length: turn.straight,
    };
    let segments = if turn.arc_first { vec![arc, straight] } else { vec![straight, arc] };
    let path = AnalyticPath::from_segments(
        Pose2D::new(0.0, 0.0, start_angle),
        Pose2D::new(turn.end.0 as f64, turn.end.1 as f64, end_angle),
        turn.radius,
        segments,
    );
    MotionPrimitive {
        trajectory_id: id,
        start_angle_index: start_bin,
        end_angle_index: end_bin,
        left_turn: left,
        trajectory_radius: turn.radius * resolution,
        trajectory_length: turn.length * resolution,
        arc_length: (turn.length - turn.straight) * resolution,
        straight_length: turn.straight * resolution,
        direction: TravelDirection::Forward,
        poses: to_world(path.sample(step), resolution),
    }
}

fn to_world(poses: Vec<Pose2D>, resolution: f64) -> Vec<Pose2D> {
    poses
        .into_iter()
        .map(|p| Pose2D::new(p.x * resolution, p.y * resolution, p.yaw))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::angle_distance;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn generate(radius: f64, resolution: f64, headings: usize) -> LatticeMotionTable {
        LatticeGenerator::new(LatticeGeneratorConfig {
            turning_radius: radius,
            grid_resolution: resolution,
            num_of_headings: headings,
            step_distance: resolution / 2.0,
        })
        .generate()
        .unwrap()
    }

    #[test]
    fn test_heading_directions() {
        let dirs = heading_directions(16).unwrap();
        assert_eq!(dirs.len(), 16);
        assert_eq!(dirs[0], (1, 0));
        assert_eq!(dirs[1], (2, 1));
        assert_eq!(dirs[4], (0, 1));
        assert_eq!(dirs[8], (-1, 0));
        assert_eq!(heading_directions(8).unwrap().len(), 8);
        assert!(matches!(heading_directions(12), Err(PlannerError::ConfigError(_))));
    }

    #[test]
    fn test_primitives_end_on_cell_centers() {
        for headings in [8, 16] {
            let resolution = 0.05;
            let table = generate(0.25, resolution, headings);
            assert_eq!(table.primitives().len(), 3 * headings);

            for primitive in table.primitives() {
                let end = primitive.end_pose().unwrap();
                let (cx, cy) = (end.x / resolution, end.y / resolution);
                assert!((cx - cx.round()).abs() < 1e-9);
                assert!((cy - cy.round()).abs() < 1e-9);
                assert!(angle_distance(end.yaw, table.heading_angle(primitive.end_angle_index)) < 1e-12);
                assert!(angle_distance(primitive.poses[0].yaw, table.heading_angle(primitive.start_angle_index)) < 1e-12);

                if primitive.is_straight() {
                    assert_eq!(primitive.start_angle_index, primitive.end_angle_index);
                } else {
                    assert!(primitive.trajectory_radius >= 0.25 - 1e-9);
                }
                for pair in primitive.poses.windows(2) {
                    assert!(pair[0].distance(&pair[1]) <= 0.5 * resolution + 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_shallow_turn_geometry() {
        // 5 cell radius, heading 0 to atan(1/2): arc then a short straight to (4, 1)
        let table = generate(0.25, 0.05, 16);
        let turn = table
            .primitives_for(0, false)
            .find(|p| p.end_angle_index == 1)
            .unwrap();
        let end = turn.end_pose().unwrap();
        assert_relative_eq!(end.x, 0.2, epsilon = 1e-9);
        assert_relative_eq!(end.y, 0.05, epsilon = 1e-9);
        assert!(turn.left_turn);
        assert_relative_eq!(turn.trajectory_radius / 0.05, 8.4721, epsilon = 1e-3);
        assert_relative_eq!(turn.straight_length / 0.05, 0.2361, epsilon = 1e-3);
    }

    #[test]
    fn test_every_heading_has_an_opposite() {
        let table = generate(0.5, 0.05, 16);
        for bin in 0..table.num_headings() {
            let opposite = table.opposite_bin(bin);
            assert!(angle_distance(table.heading_angle(opposite), table.heading_angle(bin) + PI) < 1e-12);
            assert_eq!(table.opposite_bin(opposite), bin);
            assert_eq!(table.primitives_for(bin, true).count(), 6);
        }
    }

    #[test]
    fn test_rejects_bad_config() {
        let generator = LatticeGenerator::new(LatticeGeneratorConfig {
            num_of_headings: 12,
            ..Default::default()
        });
        assert!(matches!(generator.generate(), Err(PlannerError::ConfigError(_))));

        let generator = LatticeGenerator::new(LatticeGeneratorConfig {
            turning_radius: 0.0,
            ..Default::default()
        });
        assert!(generator.generate().is_err());
    }

    #[test]
    fn test_generated_lattice_round_trip() {
        let table = generate(0.5, 0.05, 16);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generated.json");
        table.save(&path).unwrap();

        let reloaded = LatticeMotionTable::load(&path).unwrap();
        assert_eq!(reloaded.primitives(), table.primitives());
        assert_eq!(reloaded.metadata().heading_angles, table.metadata().heading_angles);
    }
}
