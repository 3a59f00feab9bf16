//! Toolpath CLI - plan G-code from per-layer contour job files.
//!
//! Usage:
//!   toolpath-cli plan <job.json> -o <output.gcode> [options]
//!   toolpath-cli info <job.json>
//!
//! A job file carries one `config` object (any omitted field falls back
//! to its default) and a `layers` array; each layer has a `z_um` height
//! and polygon sets `outer_walls`, `inner_walls`, `bridges` and
//! `boundary` (see `toolpath::config::JobLayer`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, LevelFilter};
use std::fs;
use std::path::PathBuf;
use toolpath::{unscale, GCodeExport, GCodePlanner, JobFile, VERSION};

/// Tool-path planner for 3D-printing G-code generation
#[derive(Parser, Debug)]
#[command(name = "toolpath-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Plan a job file and generate G-code
    Plan {
        /// Input job file (JSON)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output G-code file (stdout when omitted)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Override the minimum layer time in seconds
        #[arg(long)]
        min_layer_time: Option<f64>,

        /// Disable perimeter overlap merging
        #[arg(long)]
        no_merge: bool,
    },

    /// Summarise a job file
    Info {
        /// Input job file (JSON)
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        LevelFilter::Debug
    } else if cli.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new().filter_level(level).init();

    match cli.command {
        Commands::Plan {
            input,
            output,
            min_layer_time,
            no_merge,
        } => plan(input, output, min_layer_time, no_merge),
        Commands::Info { input } => summarise(input),
    }
}

fn plan(
    input: PathBuf,
    output: Option<PathBuf>,
    min_layer_time: Option<f64>,
    no_merge: bool,
) -> Result<()> {
    let mut job = JobFile::load(&input)
        .with_context(|| format!("Failed to load job file {}", input.display()))?;
    if let Some(min_time) = min_layer_time {
        job.config.minimum_layer_time_s = min_time;
    }
    if no_merge {
        job.config.merge_overlapping_lines = false;
    }
    job.config.validate().context("Invalid planner config")?;
    let config = &job.config;

    let mut export = GCodeExport::new();
    export.write_comment(&format!("generated by toolpath-cli {}", VERSION));
    export.set_retraction(
        config.retraction_amount_mm,
        config.retraction_speed,
        config.retraction_z_hop_um,
    );
    export.set_extrusion(
        config.layer_thickness_um,
        config.filament_diameter_um,
        config.extrusion_multiplier,
    );

    let outer_config = config.outer_wall_config();
    let inner_config = config.inner_wall_config();
    let bridge_config = config.bridge_config();

    let bar = ProgressBar::new(job.layers.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} layers {msg}")
            .expect("valid progress template"),
    );

    for (layer_index, layer) in job.layers.iter().enumerate() {
        export.set_z(layer.z_um);
        export.write_comment(&format!("LAYER:{}", layer_index));

        let mut planner = GCodePlanner::new(
            export,
            config.travel_speed,
            config.retraction_minimum_distance_um,
            config.perimeter_start_end_overlap,
            config.merge_overlapping_lines,
        );
        if config.avoid_crossing_perimeters && !layer.boundary.is_empty() {
            planner.set_outer_perimeters_to_avoid_crossing(Some(layer.boundary.clone()));
            planner.move_inside_the_outer_perimeter(config.line_width_um * 2);
        }

        planner.queue_polygons_by_optimizer(&layer.inner_walls, &inner_config);
        planner.queue_polygons_by_optimizer(&layer.outer_walls, &outer_config);
        planner.queue_polygons(&layer.bridges, &bridge_config);

        planner.force_minimum_layer_time(config.minimum_layer_time_s, config.minimum_print_speed);
        planner.write_queued_gcode(
            config.layer_thickness_um,
            config.fan_speed_percent,
            config.bridge_fan_speed_percent,
        );

        export = planner.into_export();
        bar.inc(1);
    }
    bar.finish_and_clear();

    let gcode = export.gcode();
    info!(
        "planned {} layers, {} moves, {:.1}s estimated, {:.2}mm filament",
        job.layers.len(),
        export.move_count(),
        export.total_print_time(),
        export.extrusion_amount()
    );

    match output {
        Some(path) => fs::write(&path, gcode)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{}", gcode),
    }
    Ok(())
}

fn summarise(input: PathBuf) -> Result<()> {
    let job = JobFile::load(&input)
        .with_context(|| format!("Failed to load job file {}", input.display()))?;

    let mut wall_count = 0;
    let mut wall_length = 0;
    for layer in &job.layers {
        for polygon in layer.outer_walls.iter().chain(layer.inner_walls.iter()) {
            wall_count += 1;
            wall_length += polygon.length(true);
        }
    }

    println!("layers:       {}", job.layers.len());
    println!("wall loops:   {}", wall_count);
    println!("wall length:  {:.1} mm", unscale(wall_length));
    println!("line width:   {:.2} mm", unscale(job.config.line_width_um));
    println!(
        "layer height: {:.2} mm",
        unscale(job.config.layer_thickness_um)
    );
    Ok(())
}
