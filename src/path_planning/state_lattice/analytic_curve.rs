//! Analytic curves for curvature-bounded vehicles
//!
//! Dubins curves (forward only, six words) and Reeds-Shepp curves (forward and
//! reverse) between two poses for a given minimum turning radius. Both are
//! the shortest paths of their kind and serve as heuristic lower bounds and as
//! the shortcut connection to the goal during search.

use std::f64::consts::PI;

use crate::common::{normalize_angle, pi_2_pi, Pose2D};

/// Steering of one curve segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Steer {
    Left,
    Straight,
    Right,
}

impl Steer {
    fn mirrored(self) -> Self {
        match self {
            Steer::Left => Steer::Right,
            Steer::Right => Steer::Left,
            Steer::Straight => Steer::Straight,
        }
    }
}

/// Segment of an analytic curve; negative length drives backwards
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveSegment {
    pub steer: Steer,
    pub length: f64,
}

/// Pose reached after driving `distance` along a segment from `origin`
pub fn advance(origin: &Pose2D, steer: Steer, distance: f64, radius: f64) -> Pose2D {
    let (x, y, yaw) = (origin.x, origin.y, origin.yaw);
    match steer {
        Steer::Straight => Pose2D::new(x + distance * yaw.cos(), y + distance * yaw.sin(), yaw),
        Steer::Left => {
            let end_yaw = yaw + distance / radius;
            Pose2D::new(
                x + radius * (end_yaw.sin() - yaw.sin()),
                y + radius * (yaw.cos() - end_yaw.cos()),
                end_yaw,
            )
        }
        Steer::Right => {
            let end_yaw = yaw - distance / radius;
            Pose2D::new(
                x + radius * (yaw.sin() - end_yaw.sin()),
                y + radius * (end_yaw.cos() - yaw.cos()),
                end_yaw,
            )
        }
    }
}

/// Shortest analytic curve between two poses
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticPath {
    start: Pose2D,
    goal: Pose2D,
    radius: f64,
    segments: Vec<CurveSegment>,
}

/// Segment lengths normalized by the turning radius
type Word = Vec<(Steer, f64)>;

impl AnalyticPath {
    /// Shortest forward-only curve
    pub fn dubins(from: &Pose2D, to: &Pose2D, radius: f64) -> Option<Self> {
        if !(radius > 0.0) {
            return None;
        }
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let d = (dx * dx + dy * dy).sqrt() / radius;
        // Direction to the goal is undefined when the positions coincide
        let phi = if d < 1e-10 { from.yaw } else { dy.atan2(dx) };
        let alpha = normalize_angle(from.yaw - phi);
        let beta = normalize_angle(to.yaw - phi);

        let words = [
            dubins_lsl(d, alpha, beta),
            dubins_rsr(d, alpha, beta),
            dubins_lsr(d, alpha, beta),
            dubins_rsl(d, alpha, beta),
            dubins_rlr(d, alpha, beta),
            dubins_lrl(d, alpha, beta),
        ];
        Self::shortest(from, to, radius, words.into_iter().flatten())
    }

    /// Shortest curve allowing cusps
    pub fn reeds_shepp(from: &Pose2D, to: &Pose2D, radius: f64) -> Option<Self> {
        if !(radius > 0.0) {
            return None;
        }
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let (c, s) = (from.yaw.cos(), from.yaw.sin());
        let x = (c * dx + s * dy) / radius;
        let y = (-s * dx + c * dy) / radius;
        let phi = pi_2_pi(to.yaw - from.yaw);

        let words: [fn(f64, f64, f64) -> Option<Word>; 12] = [
            left_straight_left,
            left_straight_right,
            left_x_right_x_left,
            left_x_right_left,
            left_right_x_left,
            left_right_x_left_right,
            left_x_right_left_x_right,
            left_x_right90_straight_left,
            left_x_right90_straight_right,
            left_straight_right90_x_left,
            left_straight_left90_x_right,
            left_x_right90_straight_left90_x_right,
        ];

        let mut candidates: Vec<Word> = Vec::new();
        for word in words {
            candidates.extend(word(x, y, phi));
            candidates.extend(word(-x, y, -phi).map(timeflip));
            candidates.extend(word(x, -y, -phi).map(reflect));
            candidates.extend(word(-x, -y, phi).map(|w| reflect(timeflip(w))));
        }
        Self::shortest(from, to, radius, candidates.into_iter())
    }

    /// Curve made of known segments, lengths in input units
    pub(crate) fn from_segments(start: Pose2D, goal: Pose2D, radius: f64, segments: Vec<CurveSegment>) -> Self {
        Self {
            start,
            goal,
            radius,
            segments: segments.into_iter().filter(|s| s.length.abs() > 1e-10).collect(),
        }
    }

    fn shortest<I: Iterator<Item = Word>>(from: &Pose2D, to: &Pose2D, radius: f64, words: I) -> Option<Self> {
        let best = words
            .filter(|w| w.iter().all(|(_, l)| l.is_finite()))
            .map(|w| {
                let total: f64 = w.iter().map(|(_, l)| l.abs()).sum();
                (total, w)
            })
            .fold(None::<(f64, Word)>, |best, (total, w)| match best {
                Some((best_total, _)) if best_total <= total => best,
                _ => Some((total, w)),
            })?;

        Some(Self {
            start: *from,
            goal: *to,
            radius,
            segments: best
                .1
                .into_iter()
                .filter(|(_, l)| l.abs() > 1e-10)
                .map(|(steer, l)| CurveSegment {
                    steer,
                    length: l * radius,
                })
                .collect(),
        })
    }

    /// Total travelled distance in input units
    pub fn length(&self) -> f64 {
        self.segments.iter().map(|s| s.length.abs()).sum()
    }

    pub fn segments(&self) -> &[CurveSegment] {
        &self.segments
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn has_reverse(&self) -> bool {
        self.segments.iter().any(|s| s.length < 0.0)
    }

    /// Poses from start to goal, at most `step` apart along the curve.
    ///
    /// The final pose is the exact goal.
    pub fn sample(&self, step: f64) -> Vec<Pose2D> {
        let step = if step > 0.0 { step } else { self.radius * 0.1 };
        let mut poses = vec![self.start];
        let mut origin = self.start;
        for segment in &self.segments {
            let count = (segment.length.abs() / step).ceil().max(1.0) as usize;
            for k in 1..=count {
                let distance = segment.length * k as f64 / count as f64;
                poses.push(advance(&origin, segment.steer, distance, self.radius));
            }
            if let Some(last) = poses.last() {
                origin = *last;
            }
        }
        if poses.len() == 1 {
            poses.push(self.goal);
        } else if let Some(last) = poses.last_mut() {
            *last = self.goal;
        }
        poses
    }
}

// ============================================================================
// Dubins words (alpha, beta relative to the start-goal direction)
// ============================================================================

/// Straight segments shorter than this are treated as absent
const DEGENERATE_EPSILON: f64 = 1e-6;
const ROUNDING_EPSILON: f64 = 1e-9;
/// Reeds-Shepp segment signs are checked with this slack
const SIGN_TOLERANCE: f64 = -1e-6;

/// Angle in [0, 2pi) with values just below 2pi folded to zero
fn snapped_mod_two_pi(angle: f64) -> f64 {
    let a = normalize_angle(angle);
    if 2.0 * PI - a < DEGENERATE_EPSILON {
        0.0
    } else {
        a
    }
}

fn dubins_lsl(d: f64, alpha: f64, beta: f64) -> Option<Word> {
    let (sa, ca, sb, cb) = (alpha.sin(), alpha.cos(), beta.sin(), beta.cos());
    let (vx, vy) = (d + sa - sb, cb - ca);
    let p = vx.hypot(vy);
    // Both circles coincide: a single arc
    let theta = if p < DEGENERATE_EPSILON { alpha } else { vy.atan2(vx) };
    let t = snapped_mod_two_pi(-alpha + theta);
    let q = snapped_mod_two_pi(beta - theta);
    Some(vec![(Steer::Left, t), (Steer::Straight, p), (Steer::Left, q)])
}

fn dubins_rsr(d: f64, alpha: f64, beta: f64) -> Option<Word> {
    let (sa, ca, sb, cb) = (alpha.sin(), alpha.cos(), beta.sin(), beta.cos());
    let (vx, vy) = (d - sa + sb, ca - cb);
    let p = vx.hypot(vy);
    let theta = if p < DEGENERATE_EPSILON { alpha } else { vy.atan2(vx) };
    let t = snapped_mod_two_pi(alpha - theta);
    let q = snapped_mod_two_pi(-beta + theta);
    Some(vec![(Steer::Right, t), (Steer::Straight, p), (Steer::Right, q)])
}

fn dubins_lsr(d: f64, alpha: f64, beta: f64) -> Option<Word> {
    let (sa, ca, sb, cb) = (alpha.sin(), alpha.cos(), beta.sin(), beta.cos());
    let p_sq = -2.0 + d * d + 2.0 * (ca * cb + sa * sb) + 2.0 * d * (sa + sb);
    if p_sq < -ROUNDING_EPSILON {
        return None;
    }
    let p = p_sq.max(0.0).sqrt();
    let theta = (-ca - cb).atan2(d + sa + sb) - (-2.0_f64).atan2(p);
    let t = snapped_mod_two_pi(-alpha + theta);
    let q = snapped_mod_two_pi(-beta + theta);
    Some(vec![(Steer::Left, t), (Steer::Straight, p), (Steer::Right, q)])
}

fn dubins_rsl(d: f64, alpha: f64, beta: f64) -> Option<Word> {
    let (sa, ca, sb, cb) = (alpha.sin(), alpha.cos(), beta.sin(), beta.cos());
    let p_sq = -2.0 + d * d + 2.0 * (ca * cb + sa * sb) - 2.0 * d * (sa + sb);
    if p_sq < -ROUNDING_EPSILON {
        return None;
    }
    let p = p_sq.max(0.0).sqrt();
    let theta = (ca + cb).atan2(d - sa - sb) - (2.0_f64).atan2(p);
    let t = snapped_mod_two_pi(alpha - theta);
    let q = snapped_mod_two_pi(beta - theta);
    Some(vec![(Steer::Right, t), (Steer::Straight, p), (Steer::Left, q)])
}

fn dubins_rlr(d: f64, alpha: f64, beta: f64) -> Option<Word> {
    let (sa, ca, sb, cb) = (alpha.sin(), alpha.cos(), beta.sin(), beta.cos());
    let tmp = (6.0 - d * d + 2.0 * (ca * cb + sa * sb) + 2.0 * d * (sa - sb)) / 8.0;
    if tmp.abs() > 1.0 + ROUNDING_EPSILON {
        return None;
    }
    let p = snapped_mod_two_pi(2.0 * PI - tmp.clamp(-1.0, 1.0).acos());
    let theta = (ca - cb).atan2(d - sa + sb);
    let t = snapped_mod_two_pi(alpha - theta + p / 2.0);
    let q = snapped_mod_two_pi(alpha - beta - t + p);
    Some(vec![(Steer::Right, t), (Steer::Left, p), (Steer::Right, q)])
}

fn dubins_lrl(d: f64, alpha: f64, beta: f64) -> Option<Word> {
    let (sa, ca, sb, cb) = (alpha.sin(), alpha.cos(), beta.sin(), beta.cos());
    let tmp = (6.0 - d * d + 2.0 * (ca * cb + sa * sb) - 2.0 * d * (sa - sb)) / 8.0;
    if tmp.abs() > 1.0 + ROUNDING_EPSILON {
        return None;
    }
    let p = snapped_mod_two_pi(2.0 * PI - tmp.clamp(-1.0, 1.0).acos());
    let theta = (cb - ca).atan2(d + sa - sb);
    let t = snapped_mod_two_pi(-alpha + theta + p / 2.0);
    let q = snapped_mod_two_pi(beta - alpha - t + p);
    Some(vec![(Steer::Left, t), (Steer::Right, p), (Steer::Left, q)])
}

// ============================================================================
// Reeds-Shepp words in the start frame, unit turning radius
// ============================================================================

fn polar(x: f64, y: f64) -> (f64, f64) {
    let r = x.hypot(y);
    (r, if r < 1e-9 { 0.0 } else { y.atan2(x) })
}

fn timeflip(word: Word) -> Word {
    word.into_iter().map(|(steer, l)| (steer, -l)).collect()
}

fn reflect(word: Word) -> Word {
    word.into_iter().map(|(steer, l)| (steer.mirrored(), l)).collect()
}

use Steer::{Left as L, Right as R, Straight as S};

fn left_straight_left(x: f64, y: f64, phi: f64) -> Option<Word> {
    let (u, t) = polar(x - phi.sin(), y - 1.0 + phi.cos());
    if t >= SIGN_TOLERANCE && t <= PI - SIGN_TOLERANCE {
        let v = pi_2_pi(phi - t);
        if v >= SIGN_TOLERANCE && v <= PI - SIGN_TOLERANCE {
            return Some(vec![(L, t), (S, u), (L, v)]);
        }
    }
    None
}

fn left_straight_right(x: f64, y: f64, phi: f64) -> Option<Word> {
    let (u1, t1) = polar(x + phi.sin(), y - 1.0 - phi.cos());
    let u1_sq = u1 * u1;
    if u1_sq >= 4.0 {
        let u = (u1_sq - 4.0).sqrt();
        let t = pi_2_pi(t1 + 2.0_f64.atan2(u));
        let v = pi_2_pi(t - phi);
        if t >= SIGN_TOLERANCE && v >= SIGN_TOLERANCE {
            return Some(vec![(L, t), (S, u), (R, v)]);
        }
    }
    None
}

fn left_x_right_x_left(x: f64, y: f64, phi: f64) -> Option<Word> {
    let (u1, theta) = polar(x - phi.sin(), y - 1.0 + phi.cos());
    if u1 <= 4.0 {
        let a = (0.25 * u1).acos();
        let t = pi_2_pi(a + theta + PI / 2.0);
        let u = pi_2_pi(PI - 2.0 * a);
        let v = pi_2_pi(phi - t - u);
        return Some(vec![(L, t), (R, -u), (L, v)]);
    }
    None
}

fn left_x_right_left(x: f64, y: f64, phi: f64) -> Option<Word> {
    let (u1, theta) = polar(x - phi.sin(), y - 1.0 + phi.cos());
    if u1 <= 4.0 {
        let a = (0.25 * u1).acos();
        let t = pi_2_pi(a + theta + PI / 2.0);
        let u = pi_2_pi(PI - 2.0 * a);
        let v = pi_2_pi(-phi + t + u);
        return Some(vec![(L, t), (R, -u), (L, -v)]);
    }
    None
}

fn left_right_x_left(x: f64, y: f64, phi: f64) -> Option<Word> {
    let (u1, theta) = polar(x - phi.sin(), y - 1.0 + phi.cos());
    if u1 <= 4.0 && u1 > 0.0 {
        let u = (1.0 - u1 * u1 * 0.125).acos();
        let a = (2.0 * u.sin() / u1).clamp(-1.0, 1.0).asin();
        let t = pi_2_pi(-a + theta + PI / 2.0);
        let v = pi_2_pi(t - u - phi);
        return Some(vec![(L, t), (R, u), (L, -v)]);
    }
    None
}

fn left_right_x_left_right(x: f64, y: f64, phi: f64) -> Option<Word> {
    let (u1, theta) = polar(x + phi.sin(), y - 1.0 - phi.cos());
    if u1 <= 2.0 {
        let a = ((u1 + 2.0) * 0.25).acos();
        let t = pi_2_pi(theta + a + PI / 2.0);
        let u = pi_2_pi(a);
        let v = pi_2_pi(phi - t + 2.0 * u);
        if t >= SIGN_TOLERANCE && u >= SIGN_TOLERANCE && v >= SIGN_TOLERANCE {
            return Some(vec![(L, t), (R, u), (L, -u), (R, -v)]);
        }
    }
    None
}

fn left_x_right_left_x_right(x: f64, y: f64, phi: f64) -> Option<Word> {
    let (u1, theta) = polar(x + phi.sin(), y - 1.0 - phi.cos());
    let u2 = (20.0 - u1 * u1) / 16.0;
    if (0.0..=1.0).contains(&u2) && u1 > 0.0 {
        let u = u2.acos();
        let a = (2.0 * u.sin() / u1).clamp(-1.0, 1.0).asin();
        let t = pi_2_pi(theta + a + PI / 2.0);
        let v = pi_2_pi(t - phi);
        if t >= SIGN_TOLERANCE && v >= SIGN_TOLERANCE {
            return Some(vec![(L, t), (R, -u), (L, -u), (R, v)]);
        }
    }
    None
}

fn left_x_right90_straight_left(x: f64, y: f64, phi: f64) -> Option<Word> {
    let (u1, theta) = polar(x - phi.sin(), y - 1.0 + phi.cos());
    if u1 >= 2.0 {
        let root = (u1 * u1 - 4.0).sqrt();
        let u = root - 2.0;
        let a = 2.0_f64.atan2(root);
        let t = pi_2_pi(theta + a + PI / 2.0);
        let v = pi_2_pi(t - phi + PI / 2.0);
        if t >= SIGN_TOLERANCE && v >= SIGN_TOLERANCE {
            return Some(vec![(L, t), (R, -PI / 2.0), (S, -u), (L, -v)]);
        }
    }
    None
}

fn left_straight_right90_x_left(x: f64, y: f64, phi: f64) -> Option<Word> {
    let (u1, theta) = polar(x - phi.sin(), y - 1.0 + phi.cos());
    if u1 >= 2.0 {
        let root = (u1 * u1 - 4.0).sqrt();
        let u = root - 2.0;
        let a = root.atan2(2.0);
        let t = pi_2_pi(theta - a + PI / 2.0);
        let v = pi_2_pi(t - phi - PI / 2.0);
        if t >= SIGN_TOLERANCE && v >= SIGN_TOLERANCE {
            return Some(vec![(L, t), (S, u), (R, PI / 2.0), (L, -v)]);
        }
    }
    None
}

fn left_x_right90_straight_right(x: f64, y: f64, phi: f64) -> Option<Word> {
    let (u1, theta) = polar(x + phi.sin(), y - 1.0 - phi.cos());
    if u1 >= 2.0 {
        let t = pi_2_pi(theta + PI / 2.0);
        let u = u1 - 2.0;
        let v = pi_2_pi(phi - t - PI / 2.0);
        if t >= SIGN_TOLERANCE && v >= SIGN_TOLERANCE {
            return Some(vec![(L, t), (R, -PI / 2.0), (S, -u), (R, -v)]);
        }
    }
    None
}

fn left_straight_left90_x_right(x: f64, y: f64, phi: f64) -> Option<Word> {
    let (u1, theta) = polar(x + phi.sin(), y - 1.0 - phi.cos());
    if u1 >= 2.0 {
        let t = pi_2_pi(theta);
        let u = u1 - 2.0;
        let v = pi_2_pi(phi - t - PI / 2.0);
        if t >= SIGN_TOLERANCE && v >= SIGN_TOLERANCE {
            return Some(vec![(L, t), (S, u), (L, PI / 2.0), (R, -v)]);
        }
    }
    None
}

fn left_x_right90_straight_left90_x_right(x: f64, y: f64, phi: f64) -> Option<Word> {
    let (u1, theta) = polar(x + phi.sin(), y - 1.0 - phi.cos());
    if u1 >= 4.0 {
        let root = (u1 * u1 - 4.0).sqrt();
        let u = root - 4.0;
        let a = 2.0_f64.atan2(root);
        let t = pi_2_pi(theta + a + PI / 2.0);
        let v = pi_2_pi(t - phi);
        if t >= SIGN_TOLERANCE && v >= SIGN_TOLERANCE {
            return Some(vec![(L, t), (R, -PI / 2.0), (S, -u), (L, -PI / 2.0), (R, v)]);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::angle_distance;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};

    fn assert_reaches(path: &AnalyticPath, goal: &Pose2D) {
        // Integrate the segments without the exact-goal substitution
        let mut pose = path.start;
        for segment in path.segments() {
            pose = advance(&pose, segment.steer, segment.length, path.radius());
        }
        assert!(pose.distance(goal) < 1e-4, "ended at {:?}, goal {:?}", pose, goal);
        assert!(angle_distance(pose.yaw, goal.yaw) < 1e-4);
    }

    #[test]
    fn test_straight_ahead() {
        let from = Pose2D::new(0.0, 0.0, 0.0);
        let to = Pose2D::new(5.0, 0.0, 0.0);
        let dubins = AnalyticPath::dubins(&from, &to, 1.0).unwrap();
        assert_relative_eq!(dubins.length(), 5.0, epsilon = 1e-9);
        let rs = AnalyticPath::reeds_shepp(&from, &to, 1.0).unwrap();
        assert_relative_eq!(rs.length(), 5.0, epsilon = 1e-9);
        assert!(!rs.has_reverse());
    }

    #[test]
    fn test_same_pose_is_zero_length() {
        let pose = Pose2D::new(2.0, 3.0, 1.0);
        assert_relative_eq!(AnalyticPath::dubins(&pose, &pose, 2.0).unwrap().length(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(AnalyticPath::reeds_shepp(&pose, &pose, 2.0).unwrap().length(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_backing_up_prefers_reverse() {
        let from = Pose2D::new(0.0, 0.0, 0.0);
        let to = Pose2D::new(-3.0, 0.0, 0.0);
        let rs = AnalyticPath::reeds_shepp(&from, &to, 1.0).unwrap();
        assert_relative_eq!(rs.length(), 3.0, epsilon = 1e-9);
        assert!(rs.has_reverse());

        let dubins = AnalyticPath::dubins(&from, &to, 1.0).unwrap();
        assert!(dubins.length() > 3.0 + 2.0 * PI - 1e-6);
    }

    #[test]
    fn test_quarter_turn() {
        let from = Pose2D::new(0.0, 0.0, 0.0);
        let to = Pose2D::new(2.0, 2.0, PI / 2.0);
        let dubins = AnalyticPath::dubins(&from, &to, 2.0).unwrap();
        assert_relative_eq!(dubins.length(), PI, epsilon = 1e-9);
        assert_eq!(dubins.segments().len(), 1);
        assert_eq!(dubins.segments()[0].steer, Steer::Left);
    }

    #[test]
    fn test_curves_reach_goal() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let from = Pose2D::new(rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0), rng.gen_range(0.0..2.0 * PI));
            let to = Pose2D::new(rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0), rng.gen_range(0.0..2.0 * PI));
            let radius = rng.gen_range(0.5..3.0);

            let dubins = AnalyticPath::dubins(&from, &to, radius).unwrap();
            assert_reaches(&dubins, &to);
            assert!(!dubins.has_reverse());

            let rs = AnalyticPath::reeds_shepp(&from, &to, radius).unwrap();
            assert_reaches(&rs, &to);
            // Reversing can only shorten the route
            assert!(rs.length() <= dubins.length() + 1e-6);
            assert!(rs.length() >= from.distance(&to) - 1e-6);
        }
    }

    #[test]
    fn test_sample_spacing_and_endpoints() {
        let from = Pose2D::new(1.0, 1.0, 0.3);
        let to = Pose2D::new(6.0, -2.0, 4.0);
        let path = AnalyticPath::dubins(&from, &to, 1.5).unwrap();
        let poses = path.sample(0.2);

        assert_eq!(poses.first(), Some(&from));
        assert_eq!(poses.last(), Some(&to));
        for pair in poses.windows(2) {
            assert!(pair[0].distance(&pair[1]) <= 0.2 + 1e-9);
        }
    }
}
