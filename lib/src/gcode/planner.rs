//! Per-layer motion planner.
//!
//! `GCodePlanner` is the public facade of the planning core. Callers
//! queue travels, extrusion moves and whole polygons during a layer;
//! the planner groups them into paths, decides retractions and
//! boundary-avoiding routes as they arrive, optionally rescales
//! extrusion speed to respect a minimum layer time, and finally walks
//! the queue once in `write_queued_gcode`, applying small-move
//! coalescing, spiral Z ramping, seam trimming and overlap merging on
//! the way out to the writer.

use super::queue::{GCodePathConfig, PathQueue};
use super::writer::GCodeExport;
use crate::geometry::{Point, Polygon, Polygons};
use crate::order::PathOrderOptimizer;
use crate::overlap::merge_perimeter_overlaps;
use crate::travel::AvoidCrossingPerimeters;
use crate::Coord;
use log::debug;

/// Per-layer planner over an owned G-code writer.
pub struct GCodePlanner {
    export: GCodeExport,
    queue: PathQueue,
    travel_config: GCodePathConfig,

    last_position: Point,
    current_extruder_index: i32,
    /// Integer percent applied to non-bridge extrusion speeds.
    extrude_speed_factor: i32,
    /// Integer percent applied to travel speeds.
    travel_speed_factor: i32,

    retraction_minimum_distance_um: Coord,
    force_retraction: bool,
    always_retract: bool,
    boundary: Option<AvoidCrossingPerimeters>,

    /// Fraction of the seam overlap to keep, in `[0, 1]`. Below 1 the
    /// emission pass trims perimeter tails.
    perimeter_start_end_overlap_ratio: f64,
    merge_overlapping_lines: bool,

    total_print_time: f64,
    /// Dwell the layer would still need after rescaling to reach the
    /// minimum layer time. Recorded, not emitted.
    extra_time: f64,
}

impl GCodePlanner {
    /// Create a planner for one layer over the given writer.
    pub fn new(
        export: GCodeExport,
        travel_speed: i32,
        retraction_minimum_distance_um: Coord,
        perimeter_start_end_overlap: f64,
        merge_overlapping_lines: bool,
    ) -> Self {
        let last_position = export.position_xy();
        Self {
            export,
            queue: PathQueue::new(),
            travel_config: GCodePathConfig::new(travel_speed, 0, "travel"),
            last_position,
            current_extruder_index: 0,
            extrude_speed_factor: 100,
            travel_speed_factor: 100,
            retraction_minimum_distance_um,
            force_retraction: false,
            always_retract: false,
            boundary: None,
            perimeter_start_end_overlap_ratio: perimeter_start_end_overlap.clamp(0.0, 1.0),
            merge_overlapping_lines,
            total_print_time: 0.0,
            extra_time: 0.0,
        }
    }

    /// The active extruder index for newly queued paths.
    #[inline]
    pub fn extruder(&self) -> i32 {
        self.current_extruder_index
    }

    /// Select the extruder for newly queued paths. The tool change
    /// itself is emitted by the emission pass.
    #[inline]
    pub fn set_extruder(&mut self, extruder: i32) {
        self.current_extruder_index = extruder;
    }

    /// Extrusion speed factor in integer percent, never below 1.
    #[inline]
    pub fn extrude_speed_factor(&self) -> i32 {
        self.extrude_speed_factor
    }

    /// Set the extrusion speed factor (integer percent, clamped >= 1).
    #[inline]
    pub fn set_extrude_speed_factor(&mut self, factor_percent: i32) {
        self.extrude_speed_factor = factor_percent.max(1);
    }

    /// Travel speed factor in integer percent, never below 1.
    #[inline]
    pub fn travel_speed_factor(&self) -> i32 {
        self.travel_speed_factor
    }

    /// Set the travel speed factor (integer percent, clamped >= 1).
    #[inline]
    pub fn set_travel_speed_factor(&mut self, factor_percent: i32) {
        self.travel_speed_factor = factor_percent.max(1);
    }

    /// Force a retraction onto the next queued travel.
    #[inline]
    pub fn force_retract(&mut self) {
        self.force_retraction = true;
    }

    /// Retract on every travel longer than the retraction minimum
    /// distance, even without a boundary.
    #[inline]
    pub fn set_always_retract(&mut self, always_retract: bool) {
        self.always_retract = always_retract;
    }

    /// Install (or clear) the outer-perimeter boundary that travels
    /// should stay inside of.
    pub fn set_outer_perimeters_to_avoid_crossing(&mut self, boundary: Option<Polygons>) {
        self.boundary = boundary.map(AvoidCrossingPerimeters::new);
    }

    /// Planar position the next queued move will start from.
    #[inline]
    pub fn last_position(&self) -> Point {
        self.last_position
    }

    /// Time the emitted layer is estimated to take, filled in by
    /// `force_minimum_layer_time`.
    #[inline]
    pub fn total_print_time(&self) -> f64 {
        self.total_print_time
    }

    /// Dwell still owed after rescaling (see `force_minimum_layer_time`).
    #[inline]
    pub fn extra_time(&self) -> f64 {
        self.extra_time
    }

    /// Borrow the underlying writer.
    #[inline]
    pub fn export(&self) -> &GCodeExport {
        &self.export
    }

    /// Mutably borrow the underlying writer (layer Z, retraction and
    /// extrusion settings live there).
    #[inline]
    pub fn export_mut(&mut self) -> &mut GCodeExport {
        &mut self.export
    }

    /// Finish with this planner and recover the writer.
    #[inline]
    pub fn into_export(self) -> GCodeExport {
        self.export
    }

    /// Number of paths currently queued.
    #[inline]
    pub fn queued_path_count(&self) -> usize {
        self.queue.len()
    }

    /// Seal the newest queued path so the next append starts a fresh
    /// one.
    #[inline]
    pub fn force_new_path_start(&mut self) {
        self.queue.force_new_path_start();
    }

    /// Queue one extrusion move to `destination` under `config`.
    pub fn queue_extrusion_move(&mut self, destination: Point, config: &GCodePathConfig) {
        let z = self.export.current_z();
        self.queue
            .append_point(destination.at_z(z), config, self.current_extruder_index);
        self.last_position = destination.xy();
    }

    /// Queue a travel to `destination`, deciding retraction and
    /// boundary-avoiding waypoints.
    pub fn queue_travel(&mut self, destination: Point) {
        let z = self.export.current_z();
        let path = self
            .queue
            .latest_with_config(&self.travel_config, self.current_extruder_index);

        if self.force_retraction {
            path.retract = true;
            self.force_retraction = false;
        } else if let Some(boundary) = &self.boundary {
            if let Some(waypoints) =
                boundary.create_path_inside_boundary(self.last_position, destination.xy())
            {
                // Stay inside the boundary through the waypoints; a
                // long interior route still deserves a retraction.
                let mut travel_length = 0;
                let mut previous = self.last_position;
                for waypoint in &waypoints {
                    path.points.push(waypoint.xy().at_z(z));
                    travel_length += (waypoint.xy() - previous).length();
                    previous = waypoint.xy();
                }
                travel_length += (destination.xy() - previous).length();
                if travel_length > self.retraction_minimum_distance_um {
                    path.retract = true;
                }
            } else if (destination.xy() - self.last_position)
                .longer_than(self.retraction_minimum_distance_um)
            {
                path.retract = true;
            }
        } else if self.always_retract
            && (destination.xy() - self.last_position)
                .longer_than(self.retraction_minimum_distance_um)
        {
            path.retract = true;
        }

        path.points.push(destination.xy().at_z(z));
        self.last_position = destination.xy();
    }

    /// Queue a whole polygon starting at `start_index`. Closed loops
    /// walk all vertices and close back onto the start; open paths walk
    /// forward from index 0 or backwards from a non-zero start.
    pub fn queue_polygon(&mut self, polygon: &Polygon, start_index: usize, config: &GCodePathConfig) {
        if polygon.is_empty() {
            return;
        }
        let start = polygon[start_index];
        if !config.spiralize && self.last_position != start.xy() {
            self.queue_travel(start);
        }

        let n = polygon.len();
        if config.closed_loop {
            for offset in 1..n {
                self.queue_extrusion_move(polygon[(start_index + offset) % n], config);
            }
            if n > 2 {
                self.queue_extrusion_move(polygon[start_index], config);
            }
        } else if start_index == 0 {
            for i in 1..n {
                self.queue_extrusion_move(polygon[i], config);
            }
        } else {
            for i in (1..n).rev() {
                self.queue_extrusion_move(polygon[i - 1], config);
            }
        }
    }

    /// Queue several polygons in their given order.
    pub fn queue_polygons(&mut self, polygons: &Polygons, config: &GCodePathConfig) {
        for polygon in polygons {
            self.queue_polygon(polygon, 0, config);
        }
    }

    /// Queue a polygon batch in the island order and with the start
    /// vertices chosen by the tour optimiser.
    pub fn queue_polygons_by_optimizer(&mut self, polygons: &Polygons, config: &GCodePathConfig) {
        if polygons.is_empty() {
            return;
        }
        let mut optimizer = PathOrderOptimizer::new(self.last_position);
        optimizer.add_polygons(polygons);
        optimizer.optimize(config);
        for island in 0..optimizer.best_island_order_index.len() {
            let polygon_index = optimizer.best_island_order_index[island];
            self.queue_polygon(
                &polygons[polygon_index],
                optimizer.start_index_in_polygon[polygon_index],
                config,
            );
        }
    }

    /// If the current position lies outside the boundary, travel to a
    /// point pushed `distance` inside it. The nudge is applied twice so
    /// tight 90-degree corners cannot trap the result on the wrong
    /// side.
    pub fn move_inside_the_outer_perimeter(&mut self, distance: Coord) {
        let target = {
            let Some(boundary) = &self.boundary else {
                return;
            };
            if boundary.point_is_inside_boundary(self.last_position) {
                return;
            }
            let mut point = self.last_position;
            if !boundary.move_point_inside_boundary(&mut point, distance) {
                return;
            }
            boundary.move_point_inside_boundary(&mut point, distance);
            if !boundary.point_is_inside_boundary(point) {
                return;
            }
            point
        };
        self.queue_travel(target);
        // Any impending retraction must come after this move.
        self.force_new_path_start();
    }

    /// Slow extrusion down so the queued layer takes at least
    /// `min_time` seconds, without dropping below
    /// `minimum_printing_speed` mm/s. Updates the extrusion speed
    /// factor and records any residual time the rescale could not
    /// absorb.
    pub fn force_minimum_layer_time(&mut self, min_time: f64, minimum_printing_speed: i32) {
        let mut last_position = self.export.position();
        let mut travel_time = 0.0;
        let mut extrude_time = 0.0;
        for path in self.queue.paths() {
            for &point in path.points.iter() {
                let seconds = (point - last_position).length_mm() / path.config.speed as f64;
                if path.config.line_width_um != 0 {
                    extrude_time += seconds;
                } else {
                    travel_time += seconds;
                }
                last_position = point;
            }
        }

        let total_time = extrude_time + travel_time;
        if total_time < min_time && extrude_time > 0.0 {
            let min_extrude_time = (min_time - travel_time).max(1.0);
            let mut factor = extrude_time / min_extrude_time;
            for path in self.queue.paths() {
                if path.config.line_width_um == 0 {
                    continue;
                }
                let speed = path.config.speed as f64 * factor;
                if speed < minimum_printing_speed as f64 {
                    // Only the final clamp value survives this loop.
                    factor = minimum_printing_speed as f64 / path.config.speed as f64;
                }
            }

            // A stronger slowdown may already be in effect.
            if factor * 100.0 < self.extrude_speed_factor as f64 {
                self.set_extrude_speed_factor((factor * 100.0) as i32);
            } else {
                factor = self.extrude_speed_factor as f64 / 100.0;
            }

            let residual = min_time - extrude_time / factor - travel_time;
            if residual > 0.1 {
                // TODO: spend the residual circling the print instead
                // of just recording it.
                self.extra_time = residual;
            }
            self.total_print_time = extrude_time / factor + travel_time;
            debug!(
                "layer below minimum time ({total_time:.2}s < {min_time:.2}s), extrusion factor {factor:.3}"
            );
        } else {
            self.total_print_time = total_time;
        }
    }

    /// Emit the queued paths in order. `fan_speed_percent` is the layer
    /// fan setting; `bridge_fan_speed_percent` overrides it on BRIDGE
    /// paths (`-1` disables the override).
    pub fn write_queued_gcode(
        &mut self,
        layer_thickness_um: Coord,
        fan_speed_percent: i32,
        bridge_fan_speed_percent: i32,
    ) {
        let paths = self.queue.take_paths();
        debug!("emitting {} queued path(s)", paths.len());
        let mut last_config: Option<GCodePathConfig> = None;
        let mut path_index = 0;

        while path_index < paths.len() {
            let path = &paths[path_index];

            if path.extruder_index != self.export.extruder_index() {
                self.export.switch_extruder(path.extruder_index);
            } else if path.retract {
                self.export.write_retraction();
            }

            if !path.config.is_travel() && last_config.as_ref() != Some(&path.config) {
                if path.config.is_bridge() && bridge_fan_speed_percent != -1 {
                    self.export.write_fan_command(bridge_fan_speed_percent);
                } else if last_config.as_ref().is_some_and(|c| c.is_bridge()) {
                    self.export.write_fan_command(fan_speed_percent);
                }
                self.export
                    .write_comment(&format!("TYPE:{}", path.config.comment));
                last_config = Some(path.config.clone());
            }

            let mut speed = path.config.speed as f64;
            if path.config.is_travel() {
                speed = speed * self.travel_speed_factor as f64 / 100.0;
            } else if !path.config.is_bridge() {
                speed = speed * self.extrude_speed_factor as f64 / 100.0;
            }

            // Runs of tiny single-point extrusions collapse into
            // midpoint strokes with rescaled widths.
            if path.points.len() == 1
                && !path.config.is_travel()
                && (self.export.position_xy() - path.points[0])
                    .shorter_than(path.config.line_width_um * 2)
            {
                let mut run_end = path_index + 1;
                while run_end < paths.len()
                    && paths[run_end].points.len() == 1
                    && (paths[run_end].points[0] - paths[run_end - 1].points[0])
                        .shorter_than(path.config.line_width_um * 2)
                {
                    run_end += 1;
                }
                if run_end - path_index >= 3 {
                    let mut i = path_index;
                    while i + 1 < run_end {
                        let old_length =
                            (self.export.position_xy() - paths[i].points[0]).length();
                        let midpoint = (paths[i].points[0] + paths[i + 1].points[0]) / 2;
                        let new_length = (self.export.position_xy() - midpoint).length();
                        if new_length > 0 {
                            self.export.write_move(
                                midpoint,
                                speed,
                                path.config.line_width_um * old_length / new_length,
                            );
                        }
                        i += 2;
                    }
                    let last_point = paths[run_end - 1].points[0];
                    let width = if last_point.width != 0 {
                        last_point.width
                    } else {
                        path.config.line_width_um
                    };
                    self.export.write_move(last_point, speed, width);
                    path_index = run_end;
                    continue;
                }
            }

            // Only the last spiral-marked path in the queue spirals.
            let mut spiralize = path.config.spiralize;
            if spiralize {
                for later in &paths[path_index + 1..] {
                    if later.config.spiralize {
                        spiralize = false;
                    }
                }
            }
            if spiralize {
                let z_start = self.export.current_z();
                let mut total_length = 0.0;
                let mut position = self.export.position_xy();
                for &point in path.points.iter() {
                    total_length += (point - position).length_mm();
                    position = point;
                }

                let mut length = 0.0;
                let mut position = self.export.position_xy();
                for &point in path.points.iter() {
                    length += (point - position).length_mm();
                    position = point;
                    if total_length > 0.0 {
                        self.export.set_z(
                            z_start + (layer_thickness_um as f64 * length / total_length) as Coord,
                        );
                    }
                    self.export.write_move(point, speed, path.config.line_width_um);
                }
                path_index += 1;
                continue;
            }

            if self.merge_overlapping_lines && path.config.is_wall() {
                let mut points = path.points.clone();
                let mut path_is_closed = path.config.closed_loop;
                if self.perimeter_start_end_overlap_ratio < 1.0 {
                    points = trim_perimeter(
                        &points,
                        path.config.line_width_um,
                        self.perimeter_start_end_overlap_ratio,
                    );
                    path_is_closed = false;
                }

                let mut merged_emitted = false;
                if path.config.line_width_um > 0 && points.len() > 2 {
                    // The overlap scan needs to see the approach from
                    // the current machine position.
                    points.points_mut().insert(0, self.export.position());
                    let (merged, mut separated) = merge_perimeter_overlaps(
                        &points,
                        path.config.line_width_um,
                        path_is_closed,
                    );
                    if merged {
                        self.write_merged_polygons(&mut separated, speed);
                        merged_emitted = true;
                    }
                }
                if !merged_emitted {
                    self.write_path_points(points.points(), speed, path.config.line_width_um);
                }
                path_index += 1;
                continue;
            }

            self.write_path_points(path.points.points(), speed, path.config.line_width_um);
            path_index += 1;
        }

        self.export.update_total_print_time();
    }

    fn write_path_points(&mut self, points: &[Point], speed: f64, default_width_um: Coord) {
        for &point in points {
            let width = if point.width != 0 {
                point.width
            } else {
                default_width_um
            };
            self.export.write_move(point, speed, width);
        }
    }

    fn write_merged_polygons(&mut self, polygons: &mut Polygons, speed: f64) {
        let travel_speed = self.travel_config.speed as f64;
        for polygon in polygons.iter_mut() {
            if polygon.is_empty() {
                continue;
            }
            if polygon.len() == 2 {
                // Print the nearer endpoint first.
                let position = self.export.position_xy();
                if (position - polygon[1]).length_squared()
                    < (position - polygon[0]).length_squared()
                {
                    polygon.reverse();
                }
            }
            self.export.write_move(polygon[0], travel_speed, 0);
            for i in 1..polygon.len() {
                self.export.write_move(polygon[i], speed, polygon[i - 1].width);
            }
        }
    }
}

/// Shorten the tail of a perimeter so its seam does not double up on
/// its start: removes `lineWidth * (1 - ratio)` of trailing length,
/// interpolating the final point unless the removal target is too small
/// (50 um) to survive integer truncation. Returns a new path; the input
/// is not mutated.
pub fn trim_perimeter(perimeter: &Polygon, line_width_um: Coord, overlap_ratio: f64) -> Polygon {
    let target = (line_width_um as f64 * (1.0 - overlap_ratio)) as Coord;
    let mut trimmed = perimeter.clone();
    let mut current_distance = 0;
    for i in (1..perimeter.len()).rev() {
        current_distance += (perimeter[i] - perimeter[i - 1]).length();
        if current_distance > target {
            if target > 50 {
                let delta = perimeter[i] - perimeter[i - 1];
                let kept = perimeter[i - 1] + delta * (current_distance - target) / current_distance;
                trimmed.points_mut().truncate(i);
                trimmed.push(kept.at_z(perimeter[i].z));
            } else {
                trimmed.points_mut().truncate(i + 1);
            }
            return trimmed;
        }
        trimmed.points_mut().truncate(i);
    }
    trimmed
}
