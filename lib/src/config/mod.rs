//! Planner configuration and job-file types.
//!
//! `PlannerConfig` collects the settings the planning core needs for a
//! print: feature speeds, stroke geometry, retraction policy, seam
//! handling and cooling limits. `JobFile` is the JSON document the CLI
//! consumes: one config plus per-layer polygon sets.

use crate::gcode::GCodePathConfig;
use crate::geometry::Polygons;
use crate::{Coord, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for planning one print.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    // === Speeds (mm/s) ===
    /// Travel move speed.
    pub travel_speed: i32,
    /// Outer wall print speed.
    pub outer_wall_speed: i32,
    /// Inner wall print speed.
    pub inner_wall_speed: i32,
    /// Bridge print speed (never rescaled by speed factors).
    pub bridge_speed: i32,

    // === Stroke geometry (micrometres) ===
    /// Nominal extrusion width.
    pub line_width_um: Coord,
    /// Layer thickness.
    pub layer_thickness_um: Coord,

    // === Retraction ===
    /// Travels shorter than this skip retraction.
    pub retraction_minimum_distance_um: Coord,
    /// Filament pull-back length (mm).
    pub retraction_amount_mm: f64,
    /// Retraction speed (mm/s).
    pub retraction_speed: i32,
    /// Z hop while retracted (micrometres), 0 disables.
    pub retraction_z_hop_um: Coord,

    // === Seam and overlap handling ===
    /// Fraction of the seam overlap to keep, in [0, 1].
    pub perimeter_start_end_overlap: f64,
    /// Collapse back-on-itself wall overlaps into variable-width strokes.
    pub merge_overlapping_lines: bool,
    /// Route travels inside the outer perimeter when a boundary is given.
    pub avoid_crossing_perimeters: bool,
    /// Ramp Z across the last wall loop of each layer.
    pub spiralize: bool,

    // === Cooling ===
    /// Layers finishing faster than this are slowed down (seconds).
    pub minimum_layer_time_s: f64,
    /// Floor for the slowdown (mm/s).
    pub minimum_print_speed: i32,
    /// Layer fan speed in percent.
    pub fan_speed_percent: i32,
    /// Fan percent on bridges, -1 leaves the layer fan untouched.
    pub bridge_fan_speed_percent: i32,

    // === Filament ===
    /// Filament diameter (micrometres).
    pub filament_diameter_um: Coord,
    /// Flow rate adjustment, 1.0 = neutral.
    pub extrusion_multiplier: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            travel_speed: 150,
            outer_wall_speed: 30,
            inner_wall_speed: 50,
            bridge_speed: 30,
            line_width_um: 400,
            layer_thickness_um: 200,
            retraction_minimum_distance_um: 1_500,
            retraction_amount_mm: 4.5,
            retraction_speed: 45,
            retraction_z_hop_um: 0,
            perimeter_start_end_overlap: 0.15,
            merge_overlapping_lines: true,
            avoid_crossing_perimeters: true,
            spiralize: false,
            minimum_layer_time_s: 5.0,
            minimum_print_speed: 10,
            fan_speed_percent: 100,
            bridge_fan_speed_percent: 100,
            filament_diameter_um: 1_750,
            extrusion_multiplier: 1.0,
        }
    }
}

impl PlannerConfig {
    /// Check the settings a plan cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.travel_speed <= 0
            || self.outer_wall_speed <= 0
            || self.inner_wall_speed <= 0
            || self.bridge_speed <= 0
        {
            return Err(Error::Config("speeds must be positive".to_string()));
        }
        if self.line_width_um <= 0 {
            return Err(Error::Config("line width must be positive".to_string()));
        }
        if self.layer_thickness_um <= 0 {
            return Err(Error::Config("layer thickness must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.perimeter_start_end_overlap) {
            return Err(Error::Config(
                "perimeter overlap ratio must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// Path config for outer walls.
    pub fn outer_wall_config(&self) -> GCodePathConfig {
        GCodePathConfig::new(self.outer_wall_speed, self.line_width_um, "WALL-OUTER")
            .with_spiralize(self.spiralize)
    }

    /// Path config for inner walls.
    pub fn inner_wall_config(&self) -> GCodePathConfig {
        GCodePathConfig::new(self.inner_wall_speed, self.line_width_um, "WALL-INNER")
    }

    /// Path config for bridged extrusions.
    pub fn bridge_config(&self) -> GCodePathConfig {
        GCodePathConfig::new(self.bridge_speed, self.line_width_um, "BRIDGE")
            .with_closed_loop(false)
    }
}

/// One layer of a job: a Z height plus its extrusion contours.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JobLayer {
    /// Layer plane height in micrometres.
    pub z_um: Coord,
    /// Closed outer wall loops.
    #[serde(default)]
    pub outer_walls: Polygons,
    /// Closed inner wall loops.
    #[serde(default)]
    pub inner_walls: Polygons,
    /// Open bridged paths.
    #[serde(default)]
    pub bridges: Polygons,
    /// Boundary contours travels should stay inside. Empty disables
    /// crossing avoidance for the layer.
    #[serde(default)]
    pub boundary: Polygons,
}

/// A whole job: config plus layers, as read from JSON.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JobFile {
    #[serde(default)]
    pub config: PlannerConfig,
    pub layers: Vec<JobLayer>,
}

impl JobFile {
    /// Parse a job from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Job(e.to_string()))
    }

    /// Load a job file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
