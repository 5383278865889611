//! Visualization utilities for lattice_planner
//!
//! Collects plot layers (costmap obstacles, paths, primitives, poses) and
//! renders them into a single gnuplot axes on save.

use std::io;

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};
use itertools::iproduct;

use crate::common::{Path2D, PlannerError, PlannerResult, Point2D, Pose2D};
use crate::utils::costmap::{Costmap, INSCRIBED_INFLATED_OBSTACLE, NO_INFORMATION};

/// Color palette for consistent styling
pub mod colors {
    pub const BLACK: &str = "#000000";
    pub const RED: &str = "#FF0000";
    pub const GREEN: &str = "#00FF00";
    pub const BLUE: &str = "#0000FF";
    pub const CYAN: &str = "#00FFFF";
    pub const GRAY: &str = "#808080";

    // Semantic colors
    pub const OBSTACLE: &str = BLACK;
    pub const UNKNOWN: &str = GRAY;
    pub const START: &str = GREEN;
    pub const GOAL: &str = BLUE;
    pub const PATH: &str = RED;
    pub const PRIMITIVE: &str = CYAN;
}

/// Style for path rendering
#[derive(Debug, Clone)]
pub struct PathStyle {
    pub color: String,
    pub line_width: f64,
    pub caption: String,
}

impl PathStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            line_width: 2.0,
            caption: caption.to_string(),
        }
    }

    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = width;
        self
    }
}

impl Default for PathStyle {
    fn default() -> Self {
        Self::new(colors::PATH, "Path")
    }
}

/// Style for point rendering
#[derive(Debug, Clone)]
pub struct PointStyle {
    pub color: String,
    pub size: f64,
    pub symbol: char,
    pub caption: String,
}

impl PointStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            size: 1.0,
            symbol: 'O',
            caption: caption.to_string(),
        }
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    pub fn with_symbol(mut self, symbol: char) -> Self {
        self.symbol = symbol;
        self
    }
}

#[derive(Debug, Clone)]
enum Layer {
    Lines { x: Vec<f64>, y: Vec<f64>, style: PathStyle },
    Points { x: Vec<f64>, y: Vec<f64>, style: PointStyle },
}

/// Plot builder backed by gnuplot
pub struct Visualizer {
    layers: Vec<Layer>,
    title: String,
    x_label: String,
    y_label: String,
    x_range: Option<(f64, f64)>,
    y_range: Option<(f64, f64)>,
    aspect_ratio: Option<f64>,
}

impl Visualizer {
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            title: String::new(),
            x_label: "X [m]".to_string(),
            y_label: "Y [m]".to_string(),
            x_range: None,
            y_range: None,
            aspect_ratio: Some(1.0),
        }
    }

    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.title = title.to_string();
        self
    }

    pub fn set_x_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.x_range = Some((min, max));
        self
    }

    pub fn set_y_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.y_range = Some((min, max));
        self
    }

    /// Set aspect ratio (None for auto)
    pub fn set_aspect_ratio(&mut self, ratio: Option<f64>) -> &mut Self {
        self.aspect_ratio = ratio;
        self
    }

    /// Number of layers queued for rendering
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn plot_path(&mut self, path: &Path2D, style: &PathStyle) -> &mut Self {
        self.plot_path_xy(&path.x_coords(), &path.y_coords(), style)
    }

    pub fn plot_path_xy(&mut self, x: &[f64], y: &[f64], style: &PathStyle) -> &mut Self {
        self.layers.push(Layer::Lines {
            x: x.to_vec(),
            y: y.to_vec(),
            style: style.clone(),
        });
        self
    }

    pub fn plot_points(&mut self, points: &[Point2D], style: &PointStyle) -> &mut Self {
        self.layers.push(Layer::Points {
            x: points.iter().map(|p| p.x).collect(),
            y: points.iter().map(|p| p.y).collect(),
            style: style.clone(),
        });
        self
    }

    /// Cells at or above the inscribed cost, and unknown cells, as squares
    pub fn plot_costmap(&mut self, costmap: &Costmap) -> &mut Self {
        let mut obstacles = Vec::new();
        let mut unknown = Vec::new();
        for (x, y) in iproduct!(0..costmap.size_x(), 0..costmap.size_y()) {
            let cost = costmap.cost(x, y);
            let center = costmap.map_to_world(crate::common::GridCell::new(x as i32, y as i32));
            if cost == NO_INFORMATION {
                unknown.push(center);
            } else if cost >= INSCRIBED_INFLATED_OBSTACLE {
                obstacles.push(center);
            }
        }
        if !obstacles.is_empty() {
            self.plot_points(
                &obstacles,
                &PointStyle::new(colors::OBSTACLE, "Obstacles").with_symbol('S').with_size(0.5),
            );
        }
        if !unknown.is_empty() {
            self.plot_points(
                &unknown,
                &PointStyle::new(colors::UNKNOWN, "Unknown").with_symbol('S').with_size(0.5),
            );
        }
        self
    }

    /// Pose marker with a heading tick of length `size`
    pub fn plot_pose(&mut self, pose: &Pose2D, size: f64, style: &PointStyle) -> &mut Self {
        self.plot_points(&[pose.position()], style);
        let tip = pose.position().to_vector() + pose.heading_vector() * size;
        self.layers.push(Layer::Lines {
            x: vec![pose.x, tip[0]],
            y: vec![pose.y, tip[1]],
            style: PathStyle::new(&style.color, "").with_line_width(2.0),
        });
        self
    }

    pub fn plot_start(&mut self, pose: &Pose2D, size: f64) -> &mut Self {
        self.plot_pose(pose, size, &PointStyle::new(colors::START, "Start").with_size(1.5))
    }

    pub fn plot_goal(&mut self, pose: &Pose2D, size: f64) -> &mut Self {
        self.plot_pose(pose, size, &PointStyle::new(colors::GOAL, "Goal").with_size(1.5))
    }

    /// Save plot to PNG file
    pub fn save_png(&self, path: &str, width: u32, height: u32) -> PlannerResult<()> {
        let mut figure = self.render();
        figure
            .save_to_png(path, width, height)
            .map_err(|e| PlannerError::IoError(io::Error::new(io::ErrorKind::Other, e.to_string())))
    }

    /// Save plot to SVG file
    pub fn save_svg(&self, path: &str) -> PlannerResult<()> {
        let mut figure = self.render();
        figure
            .save_to_svg(path, 800, 600)
            .map_err(|e| PlannerError::IoError(io::Error::new(io::ErrorKind::Other, e.to_string())))
    }

    fn render(&self) -> Figure {
        let mut figure = Figure::new();
        let axes = figure.axes2d();

        for layer in &self.layers {
            match layer {
                Layer::Lines { x, y, style } => {
                    axes.lines(
                        x,
                        y,
                        &[
                            Caption(style.caption.as_str()),
                            Color(style.color.as_str()),
                            LineWidth(style.line_width),
                        ],
                    );
                }
                Layer::Points { x, y, style } => {
                    axes.points(
                        x,
                        y,
                        &[
                            Caption(style.caption.as_str()),
                            Color(style.color.as_str()),
                            PointSymbol(style.symbol),
                            PointSize(style.size),
                        ],
                    );
                }
            }
        }

        if !self.title.is_empty() {
            axes.set_title(&self.title, &[]);
        }
        axes.set_x_label(&self.x_label, &[]);
        axes.set_y_label(&self.y_label, &[]);
        if let Some((min, max)) = self.x_range {
            axes.set_x_range(AutoOption::Fix(min), AutoOption::Fix(max));
        }
        if let Some((min, max)) = self.y_range {
            axes.set_y_range(AutoOption::Fix(min), AutoOption::Fix(max));
        }
        if let Some(ratio) = self.aspect_ratio {
            axes.set_aspect_ratio(AutoOption::Fix(ratio));
        }
        figure
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::costmap::LETHAL_OBSTACLE;

    #[test]
    fn test_path_style() {
        let style = PathStyle::new(colors::RED, "Test Path").with_line_width(3.0);
        assert_eq!(style.line_width, 3.0);
        assert_eq!(style.color, colors::RED);
    }

    #[test]
    fn test_costmap_layers() {
        let mut costmap = Costmap::new(4, 4, 1.0, Point2D::origin());
        let mut vis = Visualizer::new();
        vis.plot_costmap(&costmap);
        assert_eq!(vis.layer_count(), 0);

        costmap.set_cost(1, 1, LETHAL_OBSTACLE);
        costmap.set_cost(2, 2, NO_INFORMATION);
        vis.plot_costmap(&costmap);
        assert_eq!(vis.layer_count(), 2);
    }

    #[test]
    fn test_pose_adds_heading_tick() {
        let mut vis = Visualizer::new();
        vis.plot_start(&Pose2D::new(1.0, 1.0, 0.0), 0.5);
        assert_eq!(vis.layer_count(), 2);
    }
}
