//! Lattice motion table
//!
//! Loads a motion primitive library (JSON), indexes the primitives by start
//! heading and hands out the per-resolution grid motions used by the search.

use std::f64::consts::PI;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::common::{angle_distance, normalize_angle, PlannerError, PlannerResult, Pose2D, Visualizable};
use crate::utils::{colors, PathStyle, Visualizer};

/// Arc length below which a primitive counts as straight
const STRAIGHT_ARC_EPSILON: f64 = 1e-3;

/// Direction the vehicle travels along a primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelDirection {
    #[default]
    Forward,
    Reverse,
}

/// Library-wide description of the lattice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeMetadata {
    #[serde(default = "default_motion_model")]
    pub motion_model: String,
    /// Minimum turning radius [m]
    pub turning_radius: f64,
    /// Resolution the library was generated for [m/cell]
    pub grid_resolution: f64,
    pub num_of_headings: usize,
    /// Angle of every heading bin; uniform spacing when absent
    #[serde(default)]
    pub heading_angles: Vec<f64>,
    #[serde(default)]
    pub number_of_trajectories: usize,
}

fn default_motion_model() -> String {
    "ackermann".to_string()
}

fn default_version() -> f64 {
    1.0
}

impl LatticeMetadata {
    /// Read only the metadata block of a library file
    pub fn from_file<P: AsRef<Path>>(path: P) -> PlannerResult<Self> {
        #[derive(Deserialize)]
        struct MetadataOnly {
            lattice_metadata: LatticeMetadata,
        }

        let text = read_library(path.as_ref())?;
        let parsed: MetadataOnly = serde_json::from_str(&text).map_err(|e| {
            PlannerError::ConfigError(format!(
                "malformed lattice file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let mut metadata = parsed.lattice_metadata;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Check the numeric fields and fill in uniform heading angles
    fn validate(&mut self) -> PlannerResult<()> {
        if self.num_of_headings == 0 {
            return Err(PlannerError::ConfigError(
                "lattice file declares zero headings".to_string(),
            ));
        }
        if !(self.turning_radius >= 0.0) {
            return Err(PlannerError::ConfigError(format!(
                "lattice turning radius must be non-negative, got {}",
                self.turning_radius
            )));
        }
        if !(self.grid_resolution > 0.0) {
            return Err(PlannerError::ConfigError(format!(
                "lattice grid resolution must be positive, got {}",
                self.grid_resolution
            )));
        }
        if self.heading_angles.is_empty() {
            let step = 2.0 * PI / self.num_of_headings as f64;
            self.heading_angles = (0..self.num_of_headings).map(|i| i as f64 * step).collect();
        } else if self.heading_angles.len() != self.num_of_headings {
            return Err(PlannerError::ConfigError(format!(
                "lattice lists {} heading angles for {} headings",
                self.heading_angles.len(),
                self.num_of_headings
            )));
        }
        for angle in &mut self.heading_angles {
            *angle = normalize_angle(*angle);
        }
        Ok(())
    }
}

/// One precomputed trajectory between two heading bins.
///
/// Pose translations are relative to the primitive start in world units, yaw
/// is absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionPrimitive {
    pub trajectory_id: usize,
    pub start_angle_index: usize,
    pub end_angle_index: usize,
    #[serde(default)]
    pub left_turn: bool,
    #[serde(default)]
    pub trajectory_radius: f64,
    pub trajectory_length: f64,
    #[serde(default)]
    pub arc_length: f64,
    #[serde(default)]
    pub straight_length: f64,
    #[serde(default)]
    pub direction: TravelDirection,
    #[serde(with = "pose_triples")]
    pub poses: Vec<Pose2D>,
}

impl MotionPrimitive {
    pub fn is_straight(&self) -> bool {
        self.arc_length < STRAIGHT_ARC_EPSILON
    }

    pub fn is_reverse(&self) -> bool {
        self.direction == TravelDirection::Reverse
    }

    /// Final pose relative to the primitive start
    pub fn end_pose(&self) -> Option<&Pose2D> {
        self.poses.last()
    }

    /// Drive a forward primitive of the opposite heading backwards.
    ///
    /// The footprint traces the same curve, the vehicle faces the other way.
    fn reversed(&self, start_bin: usize, end_bin: usize, trajectory_id: usize) -> Self {
        Self {
            trajectory_id,
            start_angle_index: start_bin,
            end_angle_index: end_bin,
            direction: TravelDirection::Reverse,
            poses: self
                .poses
                .iter()
                .map(|p| Pose2D::new(p.x, p.y, p.yaw + PI))
                .collect(),
            ..self.clone()
        }
    }
}

mod pose_triples {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::common::Pose2D;

    pub fn serialize<S: Serializer>(poses: &[Pose2D], serializer: S) -> Result<S::Ok, S::Error> {
        let triples: Vec<[f64; 3]> = poses.iter().map(|p| [p.x, p.y, p.yaw]).collect();
        triples.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Pose2D>, D::Error> {
        let triples = Vec::<[f64; 3]>::deserialize(deserializer)?;
        Ok(triples
            .into_iter()
            .map(|[x, y, yaw]| Pose2D::new(x, y, yaw))
            .collect())
    }
}

#[derive(Serialize, Deserialize)]
struct LatticeFile {
    #[serde(default = "default_version")]
    version: f64,
    lattice_metadata: LatticeMetadata,
    primitives: Vec<MotionPrimitive>,
}

fn read_library(path: &Path) -> PlannerResult<String> {
    fs::read_to_string(path).map_err(|e| {
        PlannerError::ConfigError(format!(
            "failed to read lattice file {}: {}",
            path.display(),
            e
        ))
    })
}

/// Primitive library indexed by start heading
#[derive(Debug, Clone)]
pub struct LatticeMotionTable {
    metadata: LatticeMetadata,
    /// Primitives as listed in the library
    primitives: Vec<MotionPrimitive>,
    /// Indices of forward primitives per start bin
    forward: Vec<Vec<usize>>,
    /// Explicit and synthesized reverse primitives per start bin
    reverse: Vec<Vec<MotionPrimitive>>,
}

impl LatticeMotionTable {
    /// Load and validate a library file
    pub fn load<P: AsRef<Path>>(path: P) -> PlannerResult<Self> {
        let path = path.as_ref();
        let text = read_library(path)?;
        let file: LatticeFile = serde_json::from_str(&text).map_err(|e| {
            PlannerError::ConfigError(format!("malformed lattice file {}: {}", path.display(), e))
        })?;
        let table = Self::from_parts(file.lattice_metadata, file.primitives)?;
        debug!(
            "Loaded lattice {} with {} headings and {} primitives",
            path.display(),
            table.num_headings(),
            table.primitives.len()
        );
        Ok(table)
    }

    /// Build a table from already parsed parts
    pub fn from_parts(mut metadata: LatticeMetadata, primitives: Vec<MotionPrimitive>) -> PlannerResult<Self> {
        metadata.validate()?;
        let num_headings = metadata.num_of_headings;

        for primitive in &primitives {
            if primitive.start_angle_index >= num_headings || primitive.end_angle_index >= num_headings {
                return Err(PlannerError::ConfigError(format!(
                    "primitive {} uses heading index out of range ({} -> {}, {} headings)",
                    primitive.trajectory_id,
                    primitive.start_angle_index,
                    primitive.end_angle_index,
                    num_headings
                )));
            }
            if primitive.poses.is_empty() {
                return Err(PlannerError::ConfigError(format!(
                    "primitive {} has no poses",
                    primitive.trajectory_id
                )));
            }
            if !(primitive.trajectory_length >= 0.0) {
                return Err(PlannerError::ConfigError(format!(
                    "primitive {} has negative length {}",
                    primitive.trajectory_id, primitive.trajectory_length
                )));
            }
        }

        if metadata.number_of_trajectories != primitives.len() {
            if metadata.number_of_trajectories != 0 {
                warn!(
                    "Lattice declares {} trajectories but lists {}",
                    metadata.number_of_trajectories,
                    primitives.len()
                );
            }
            metadata.number_of_trajectories = primitives.len();
        }

        let mut table = Self {
            metadata,
            primitives,
            forward: vec![Vec::new(); num_headings],
            reverse: vec![Vec::new(); num_headings],
        };

        for (index, primitive) in table.primitives.iter().enumerate() {
            match primitive.direction {
                TravelDirection::Forward => table.forward[primitive.start_angle_index].push(index),
                TravelDirection::Reverse => table.reverse[primitive.start_angle_index].push(primitive.clone()),
            }
        }

        let mut next_id = table.primitives.len();
        for bin in 0..num_headings {
            let opposite = table.opposite_bin(bin);
            let synthesized: Vec<MotionPrimitive> = table.forward[opposite]
                .iter()
                .map(|&index| {
                    let source = &table.primitives[index];
                    let end_bin = table.opposite_bin(source.end_angle_index);
                    next_id += 1;
                    source.reversed(bin, end_bin, next_id - 1)
                })
                .collect();
            table.reverse[bin].extend(synthesized);
        }

        for (bin, indices) in table.forward.iter().enumerate() {
            if indices.is_empty() {
                warn!("Lattice heading {} has no forward primitives", bin);
            }
        }

        Ok(table)
    }

    pub fn metadata(&self) -> &LatticeMetadata {
        &self.metadata
    }

    pub fn num_headings(&self) -> usize {
        self.metadata.num_of_headings
    }

    /// Minimum turning radius [m]
    pub fn turning_radius(&self) -> f64 {
        self.metadata.turning_radius
    }

    /// Primitives as listed in the library file
    pub fn primitives(&self) -> &[MotionPrimitive] {
        &self.primitives
    }

    pub fn heading_angle(&self, bin: usize) -> f64 {
        self.metadata.heading_angles[bin % self.metadata.num_of_headings]
    }

    /// Nearest heading bin; exact ties resolve to the lower index
    pub fn closest_bin(&self, yaw: f64) -> usize {
        let yaw = normalize_angle(yaw);
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (bin, &angle) in self.metadata.heading_angles.iter().enumerate() {
            let distance = angle_distance(yaw, angle);
            if distance < best_distance {
                best = bin;
                best_distance = distance;
            }
        }
        best
    }

    pub fn opposite_bin(&self, bin: usize) -> usize {
        self.closest_bin(self.heading_angle(bin) + PI)
    }

    /// Primitives leaving `bin`; reverse ones only when allowed
    pub fn primitives_for(&self, bin: usize, allow_reverse: bool) -> impl Iterator<Item = &MotionPrimitive> + '_ {
        let forward: &[usize] = self.forward.get(bin).map_or(&[], |v| v.as_slice());
        let reverse: &[MotionPrimitive] = match self.reverse.get(bin) {
            Some(v) if allow_reverse => v.as_slice(),
            _ => &[],
        };
        forward
            .iter()
            .map(move |&index| &self.primitives[index])
            .chain(reverse.iter())
    }

    /// Write the library back in the same schema
    pub fn save<P: AsRef<Path>>(&self, path: P) -> PlannerResult<()> {
        let file = LatticeFile {
            version: default_version(),
            lattice_metadata: self.metadata.clone(),
            primitives: self.primitives.clone(),
        };
        let text = serde_json::to_string_pretty(&file)
            .map_err(|e| PlannerError::ConfigError(format!("failed to encode lattice: {}", e)))?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Primitives converted to grid units for one costmap resolution
    pub fn grid_motions(&self, resolution: f64) -> GridMotionTable {
        let library_resolution = self.metadata.grid_resolution;
        if ((library_resolution - resolution) / resolution).abs() > 1e-6 {
            warn!(
                "Lattice was generated for resolution {} but the costmap uses {}; primitive end points are rounded to cells",
                library_resolution, resolution
            );
        }
        let scale = |p: &MotionPrimitive| GridMotion::from_primitive(p, resolution);
        GridMotionTable {
            forward: self
                .forward
                .iter()
                .map(|indices| indices.iter().map(|&i| scale(&self.primitives[i])).collect())
                .collect(),
            reverse: self
                .reverse
                .iter()
                .map(|prims| prims.iter().map(scale).collect())
                .collect(),
            resolution,
        }
    }
}

/// A primitive expressed in grid cells
#[derive(Debug, Clone, PartialEq)]
pub struct GridMotion {
    pub start_bin: usize,
    pub end_bin: usize,
    /// Cell offset of the end pose
    pub end_dx: i32,
    pub end_dy: i32,
    /// Poses after the start, translation in cells relative to the start cell
    pub poses: Vec<Pose2D>,
    /// Length in cells
    pub length: f64,
    pub straight: bool,
    pub direction: TravelDirection,
}

impl GridMotion {
    fn from_primitive(primitive: &MotionPrimitive, resolution: f64) -> Self {
        let (end_x, end_y) = primitive
            .end_pose()
            .map_or((0.0, 0.0), |p| (p.x / resolution, p.y / resolution));
        Self {
            start_bin: primitive.start_angle_index,
            end_bin: primitive.end_angle_index,
            end_dx: end_x.round() as i32,
            end_dy: end_y.round() as i32,
            poses: primitive
                .poses
                .iter()
                .skip(1)
                .map(|p| Pose2D::new(p.x / resolution, p.y / resolution, p.yaw))
                .collect(),
            length: primitive.trajectory_length / resolution,
            straight: primitive.is_straight(),
            direction: primitive.direction,
        }
    }
}

/// Grid motions of every heading for one resolution
#[derive(Debug, Clone)]
pub struct GridMotionTable {
    forward: Vec<Vec<GridMotion>>,
    reverse: Vec<Vec<GridMotion>>,
    resolution: f64,
}

impl GridMotionTable {
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn motions_for(&self, bin: usize, allow_reverse: bool) -> impl Iterator<Item = &GridMotion> + '_ {
        let forward: &[GridMotion] = self.forward.get(bin).map_or(&[], |v| v.as_slice());
        let reverse: &[GridMotion] = match self.reverse.get(bin) {
            Some(v) if allow_reverse => v.as_slice(),
            _ => &[],
        };
        forward.iter().chain(reverse.iter())
    }

    /// Flat view used to identify a motion by number
    pub fn motion(&self, bin: usize, allow_reverse: bool, index: usize) -> Option<&GridMotion> {
        self.motions_for(bin, allow_reverse).nth(index)
    }
}

/// Draws every listed primitive from the origin
impl Visualizable for LatticeMotionTable {
    fn visualize(&self, vis: &mut Visualizer) {
        for (i, primitive) in self.primitives.iter().enumerate() {
            let caption = if i == 0 { "Primitives" } else { "" };
            let x: Vec<f64> = primitive.poses.iter().map(|p| p.x).collect();
            let y: Vec<f64> = primitive.poses.iter().map(|p| p.y).collect();
            vis.plot_path_xy(&x, &y, &PathStyle::new(colors::PRIMITIVE, caption).with_line_width(1.0));
        }
    }
}
