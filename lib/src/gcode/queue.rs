//! Grouped move queue.
//!
//! The planner does not write G-code as moves arrive: it appends them
//! into `GCodePath` groups sharing one config, and a single emission
//! pass converts the whole queue at layer end. Grouping happens on
//! append: a move joins the newest path only while that path shares its
//! config and has not been sealed.

use crate::geometry::{Point, Polygon};
use crate::Coord;
use serde::{Deserialize, Serialize};

/// Immutable per-feature printing parameters shared by the moves of a
/// path group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GCodePathConfig {
    /// Nominal speed in mm/s.
    pub speed: i32,
    /// Stroke width in micrometres; `0` marks a travel config.
    pub line_width_um: Coord,
    /// Feature tag written as `TYPE:<comment>`. The literals
    /// `WALL-OUTER`, `WALL-INNER` and `BRIDGE` carry semantics.
    pub comment: String,
    /// Whether queued polygons close back onto their start vertex.
    pub closed_loop: bool,
    /// Whether this path may ramp Z across one loop.
    pub spiralize: bool,
}

impl GCodePathConfig {
    /// Create a config with the given speed, width and feature tag.
    pub fn new(speed: i32, line_width_um: Coord, comment: &str) -> Self {
        Self {
            speed,
            line_width_um,
            comment: comment.to_string(),
            closed_loop: true,
            spiralize: false,
        }
    }

    /// Set whether queued polygons are closed loops.
    pub fn with_closed_loop(mut self, closed_loop: bool) -> Self {
        self.closed_loop = closed_loop;
        self
    }

    /// Enable spiral Z ramping for this config.
    pub fn with_spiralize(mut self, spiralize: bool) -> Self {
        self.spiralize = spiralize;
        self
    }

    /// A travel config deposits no material.
    #[inline]
    pub fn is_travel(&self) -> bool {
        self.line_width_um == 0
    }

    /// Bridges print at raw config speed and may override the fan.
    #[inline]
    pub fn is_bridge(&self) -> bool {
        self.comment == "BRIDGE"
    }

    /// Wall paths are eligible for overlap merging.
    #[inline]
    pub fn is_wall(&self) -> bool {
        self.comment == "WALL-OUTER" || self.comment == "WALL-INNER"
    }
}

/// One group of consecutive moves sharing a config.
#[derive(Clone, Debug)]
pub struct GCodePath {
    pub config: GCodePathConfig,
    pub extruder_index: i32,
    /// Sealed: no further moves may join this group.
    pub done: bool,
    /// Emit a retraction before this group.
    pub retract: bool,
    /// Ordered destinations of the grouped moves.
    pub points: Polygon,
}

impl GCodePath {
    fn new(config: GCodePathConfig, extruder_index: i32) -> Self {
        Self {
            config,
            extruder_index,
            done: false,
            retract: false,
            points: Polygon::new(),
        }
    }

    /// Total planar length, including the closing edge for closed-loop
    /// configs.
    pub fn length(&self) -> Coord {
        self.points.length(self.config.closed_loop)
    }
}

/// Append-only list of path groups.
#[derive(Debug, Default)]
pub struct PathQueue {
    paths: Vec<GCodePath>,
}

impl PathQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// The queued paths, in append order.
    #[inline]
    pub fn paths(&self) -> &[GCodePath] {
        &self.paths
    }

    /// Number of queued paths.
    #[inline]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the queue holds no paths.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// The grouping rule: reuse the newest path when it shares `config`
    /// and is not sealed, otherwise append a fresh one.
    pub fn latest_with_config(
        &mut self,
        config: &GCodePathConfig,
        extruder_index: i32,
    ) -> &mut GCodePath {
        let needs_new = match self.paths.last() {
            Some(last) => last.done || last.config != *config,
            None => true,
        };
        if needs_new {
            self.paths.push(GCodePath::new(config.clone(), extruder_index));
        }
        self.paths
            .last_mut()
            .expect("queue cannot be empty after append")
    }

    /// Seal the newest path so the next append starts a fresh group.
    /// Guarantees an impending retraction lands after the current
    /// sequence rather than inside it.
    pub fn force_new_path_start(&mut self) {
        if let Some(last) = self.paths.last_mut() {
            last.done = true;
        }
    }

    /// Take the queued paths out for emission, leaving the queue empty.
    pub fn take_paths(&mut self) -> Vec<GCodePath> {
        std::mem::take(&mut self.paths)
    }

    /// Append a single destination under the grouping rule.
    pub fn append_point(
        &mut self,
        destination: Point,
        config: &GCodePathConfig,
        extruder_index: i32,
    ) {
        self.latest_with_config(config, extruder_index)
            .points
            .push(destination);
    }
}
