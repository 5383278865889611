// State lattice planning demo
//
// Generates a primitive library, plans through a parking-lot style costmap
// and plots the result. An optional first argument points to a TOML planner
// configuration; its lattice_filepath is replaced by the generated library.
//
// RUST_LOG=debug cargo run --bin lattice_demo [planner.toml]

use std::env;
use std::fs;
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use lattice_planner::common::{GridCell, PlannerResult, Point2D, Pose2D, Visualizable};
use lattice_planner::path_planning::state_lattice::{
    Footprint, LatticeGenerator, LatticeGeneratorConfig, LatticePlanner, PlannerConfig,
};
use lattice_planner::utils::{Costmap, InflationParams, Visualizer, LETHAL_OBSTACLE};

const RESOLUTION: f64 = 0.05;

fn build_costmap(inflation: &InflationParams) -> Costmap {
    let mut costmap = Costmap::new(240, 160, RESOLUTION, Point2D::origin());
    // Boundary walls
    costmap.fill_rect(GridCell::new(0, 0), GridCell::new(239, 1), LETHAL_OBSTACLE);
    costmap.fill_rect(GridCell::new(0, 158), GridCell::new(239, 159), LETHAL_OBSTACLE);
    costmap.fill_rect(GridCell::new(0, 0), GridCell::new(1, 159), LETHAL_OBSTACLE);
    costmap.fill_rect(GridCell::new(238, 0), GridCell::new(239, 159), LETHAL_OBSTACLE);
    // Parked cars
    for i in 0..4 {
        let x = 40 + i * 45;
        costmap.fill_rect(GridCell::new(x, 2), GridCell::new(x + 18, 40), LETHAL_OBSTACLE);
        costmap.fill_rect(GridCell::new(x, 110), GridCell::new(x + 18, 157), LETHAL_OBSTACLE);
    }
    // Island in the middle of the aisle
    costmap.fill_rect(GridCell::new(100, 70), GridCell::new(140, 82), LETHAL_OBSTACLE);
    costmap.inflate(inflation);
    costmap
}

fn main() -> PlannerResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let crate_dir = env!("CARGO_MANIFEST_DIR");
    let out_dir = PathBuf::from(crate_dir).join("img");
    fs::create_dir_all(&out_dir)?;

    let generator = LatticeGenerator::new(LatticeGeneratorConfig {
        turning_radius: 0.5,
        grid_resolution: RESOLUTION,
        num_of_headings: 16,
        step_distance: RESOLUTION / 2.0,
    });
    let lattice = generator.generate()?;
    let lattice_path = out_dir.join("lattice_demo_model.json");
    lattice.save(&lattice_path)?;
    info!(
        "Generated {} primitives into {}",
        lattice.primitives().len(),
        lattice_path.display()
    );

    let mut primitives = Visualizer::new();
    primitives.set_title("Motion primitives");
    lattice.visualize(&mut primitives);
    primitives.save_svg(&out_dir.join("lattice_primitives.svg").to_string_lossy())?;

    let config = match env::args().nth(1) {
        Some(path) => PlannerConfig::from_toml_file(path)?,
        None => PlannerConfig::default(),
    };
    let config = PlannerConfig {
        lattice_filepath: lattice_path,
        ..config
    };

    let footprint = Footprint::rectangle(0.5, 0.3);
    let inflation = InflationParams {
        inscribed_radius: 0.15,
        ..InflationParams::default()
    };
    let circumscribed_cost = footprint.circumscribed_cost(&inflation);
    let costmap = build_costmap(&inflation);

    let planner = LatticePlanner::configure(config, footprint, circumscribed_cost, RESOLUTION)?;
    let start = Pose2D::new(1.0, 3.75, 0.0);
    let goal = Pose2D::new(10.4, 1.2, -std::f64::consts::FRAC_PI_2);
    let plan = planner.create_plan(&start, &goal, &costmap)?;
    info!(
        "Path with {} poses, {:.2} m long, {} iterations, smoothed: {}",
        plan.path.len(),
        plan.path.total_length(),
        plan.iterations,
        plan.smoothed
    );

    let mut vis = Visualizer::new();
    vis.set_title("State lattice planner");
    vis.plot_costmap(&costmap);
    plan.visualize(&mut vis);
    vis.save_svg(&out_dir.join("lattice_planner.svg").to_string_lossy())?;
    vis.save_png(&out_dir.join("lattice_planner.png").to_string_lossy(), 1200, 800)?;
    Ok(())
}
