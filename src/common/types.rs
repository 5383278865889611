//! Common types used throughout lattice_planner

use std::f64::consts::PI;

use nalgebra::{Rotation2, Vector2, Vector3};

/// Normalize an angle to [0, 2pi)
pub fn normalize_angle(angle: f64) -> f64 {
    let two_pi = 2.0 * PI;
    let mut a = angle % two_pi;
    if a < 0.0 {
        a += two_pi;
    }
    // -1e-17 % 2pi + 2pi rounds to exactly 2pi
    if a >= two_pi {
        a -= two_pi;
    }
    a
}

/// Normalize an angle to [-pi, pi]
pub fn pi_2_pi(angle: f64) -> f64 {
    let mut a = normalize_angle(angle);
    if a > PI {
        a -= 2.0 * PI;
    }
    a
}

/// Smallest absolute difference between two angles, in [0, pi]
pub fn angle_distance(a: f64, b: f64) -> f64 {
    pi_2_pi(a - b).abs()
}

/// 2D point representation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    /// Rotate about the origin
    pub fn rotated(&self, angle: f64) -> Point2D {
        Point2D::from(Rotation2::new(angle) * self.to_vector())
    }
}

impl From<(f64, f64)> for Point2D {
    fn from(tuple: (f64, f64)) -> Self {
        Self { x: tuple.0, y: tuple.1 }
    }
}

impl From<Vector2<f64>> for Point2D {
    fn from(v: Vector2<f64>) -> Self {
        Self { x: v[0], y: v[1] }
    }
}

/// 2D pose (position + heading). Yaw is kept in [0, 2pi).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self {
            x,
            y,
            yaw: normalize_angle(yaw),
        }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0, yaw: 0.0 }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    pub fn distance(&self, other: &Pose2D) -> f64 {
        self.position().distance(&other.position())
    }

    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.yaw)
    }

    /// Unit vector pointing along the heading
    pub fn heading_vector(&self) -> Vector2<f64> {
        Vector2::new(self.yaw.cos(), self.yaw.sin())
    }
}

impl From<Vector3<f64>> for Pose2D {
    fn from(v: Vector3<f64>) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Path represented as a sequence of poses
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path2D {
    pub poses: Vec<Pose2D>,
}

impl Path2D {
    pub fn new() -> Self {
        Self { poses: Vec::new() }
    }

    pub fn from_poses(poses: Vec<Pose2D>) -> Self {
        Self { poses }
    }

    pub fn push(&mut self, pose: Pose2D) {
        self.poses.push(pose);
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn first(&self) -> Option<&Pose2D> {
        self.poses.first()
    }

    pub fn last(&self) -> Option<&Pose2D> {
        self.poses.last()
    }

    pub fn x_coords(&self) -> Vec<f64> {
        self.poses.iter().map(|p| p.x).collect()
    }

    pub fn y_coords(&self) -> Vec<f64> {
        self.poses.iter().map(|p| p.y).collect()
    }

    pub fn total_length(&self) -> f64 {
        if self.poses.len() < 2 {
            return 0.0;
        }
        self.poses.windows(2).map(|w| w[0].distance(&w[1])).sum()
    }
}

/// Grid cell index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCell {
    pub x: i32,
    pub y: i32,
}

impl GridCell {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point2d_distance() {
        let p1 = Point2D::new(0.0, 0.0);
        let p2 = Point2D::new(3.0, 4.0);
        assert!((p1.distance(&p2) - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_pose2d_yaw_is_normalized() {
        let pose = Pose2D::new(0.0, 0.0, -PI / 2.0);
        assert!((pose.yaw - 1.5 * PI).abs() < 1e-12);

        let pose = Pose2D::new(0.0, 0.0, 5.0 * PI);
        assert!((pose.yaw - PI).abs() < 1e-12);

        let pose = Pose2D::new(0.0, 0.0, -1e-17);
        assert!(pose.yaw >= 0.0 && pose.yaw < 2.0 * PI);
    }

    #[test]
    fn test_angle_distance_wraps() {
        assert!((angle_distance(0.1, 2.0 * PI - 0.1) - 0.2).abs() < 1e-12);
        assert!((angle_distance(0.0, PI) - PI).abs() < 1e-12);
    }

    #[test]
    fn test_point_rotation() {
        let p = Point2D::new(1.0, 0.0).rotated(PI / 2.0);
        assert!(p.x.abs() < 1e-12);
        assert!((p.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_path2d_total_length() {
        let path = Path2D::from_poses(vec![
            Pose2D::new(0.0, 0.0, 0.0),
            Pose2D::new(1.0, 0.0, 0.0),
            Pose2D::new(1.0, 1.0, PI / 2.0),
        ]);
        assert!((path.total_length() - 2.0).abs() < 1e-10);
    }
}
