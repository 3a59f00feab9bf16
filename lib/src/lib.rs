//! # Toolpath
//!
//! The tool-path planning core of a 3D-printing G-code generator.
//!
//! Given per-layer extrusion contours, this library produces an ordered
//! stream of machine motion commands with per-segment speed and
//! extrusion-width annotations:
//! - Travel planning with retraction policy and boundary-avoiding routes
//! - Thin-line detection and perimeter-overlap merging (back-on-itself
//!   paths collapse into single variable-width strokes)
//! - Minimum layer time enforcement via extrusion speed rescaling
//! - Spiral Z ramping, seam trimming and small-move coalescing during
//!   emission
//!
//! ## Example
//!
//! ```rust
//! use toolpath::{GCodeExport, GCodePathConfig, GCodePlanner, Point, Polygon};
//!
//! let mut planner = GCodePlanner::new(GCodeExport::new(), 150, 1_500, 0.15, true);
//! let wall = GCodePathConfig::new(30, 400, "WALL-OUTER");
//! let square = Polygon::from_points(vec![
//!     Point::new(0, 0),
//!     Point::new(10_000, 0),
//!     Point::new(10_000, 10_000),
//!     Point::new(0, 10_000),
//! ]);
//! planner.queue_polygon(&square, 0, &wall);
//! planner.write_queued_gcode(200, 100, -1);
//! let gcode = planner.into_export().gcode();
//! assert!(gcode.contains("TYPE:WALL-OUTER"));
//! ```

// Core modules
pub mod config;
pub mod gcode;
pub mod geometry;
pub mod order;
pub mod overlap;
pub mod travel;

// Re-export commonly used types
pub use config::{JobFile, JobLayer, PlannerConfig};
pub use gcode::{
    trim_perimeter, GCodeCommand, GCodeExport, GCodePath, GCodePathConfig, GCodePlanner, PathQueue,
};
pub use geometry::{clean_polygon, clean_polygons, Point, Polygon, Polygons, Segment};
pub use order::PathOrderOptimizer;
pub use overlap::{
    find_thin_lines, make_close_segments_mergeable, make_close_segments_mergeable_set,
    merge_perimeter_overlaps,
};
pub use travel::AvoidCrossingPerimeters;

/// Coordinate type used throughout the planner: 64-bit integer
/// micrometres.
pub type Coord = i64;

/// Floating-point type for unscaled (millimetre) values.
pub type CoordF = f64;

/// Scaling factor between millimetres and internal units:
/// 1 mm = 1,000 units, so 1 unit = 1 micrometre.
pub const SCALING_FACTOR: f64 = 1_000.0;

/// Scale a millimetre value to integer micrometres.
#[inline]
pub fn scale(v: CoordF) -> Coord {
    (v * SCALING_FACTOR).round() as Coord
}

/// Unscale integer micrometres to millimetres.
#[inline]
pub fn unscale(v: Coord) -> CoordF {
    v as CoordF / SCALING_FACTOR
}

/// Result type used by the outer surfaces of the crate. The planning
/// core itself has no recoverable error surface: its operations
/// succeed or silently no-op.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for configuration and job-file handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job file error: {0}")]
    Job(String),
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
