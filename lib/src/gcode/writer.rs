//! Low-level G-code writer.
//!
//! `GCodeExport` is a serial stateful sink: it tracks the machine
//! position, Z, extruder, retraction state and cumulative extrusion,
//! and renders the commands the planner asks for. Extrusion amounts use
//! absolute E with a rectangular cross-section model (line width times
//! layer height).

use super::GCodeCommand;
use crate::geometry::Point;
use crate::{unscale, Coord};
use std::f64::consts::PI;

/// Stateful G-code writer.
#[derive(Debug)]
pub struct GCodeExport {
    commands: Vec<GCodeCommand>,

    /// Planar machine position in micrometres.
    position: Point,
    /// Z for subsequent moves, in micrometres.
    current_z: Coord,
    /// Z of the last emitted move, used to skip redundant Z words.
    last_written_z: Option<Coord>,
    /// Feed rate of the last emitted move (mm/min).
    current_feed: Option<f64>,

    extruder_index: i32,
    /// Cumulative absolute E in millimetres of filament.
    extrusion_amount_mm: f64,
    is_retracted: bool,

    retraction_amount_mm: f64,
    retraction_speed: i32,
    retraction_z_hop_um: Coord,

    layer_thickness_um: Coord,
    filament_area_mm2: f64,
    extrusion_multiplier: f64,

    /// Fan percent last written, for deduplication.
    fan_speed_percent: Option<i32>,

    /// Time accumulated since the last `update_total_print_time`.
    estimated_time_s: f64,
    total_print_time_s: f64,
}

impl Default for GCodeExport {
    fn default() -> Self {
        Self::new()
    }
}

impl GCodeExport {
    /// Create a writer at the origin with no retraction configured.
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            position: Point::zero(),
            current_z: 0,
            last_written_z: None,
            current_feed: None,
            extruder_index: 0,
            extrusion_amount_mm: 0.0,
            is_retracted: false,
            retraction_amount_mm: 0.0,
            retraction_speed: 45,
            retraction_z_hop_um: 0,
            layer_thickness_um: 0,
            filament_area_mm2: filament_area(1750),
            extrusion_multiplier: 1.0,
            fan_speed_percent: None,
            estimated_time_s: 0.0,
            total_print_time_s: 0.0,
        }
    }

    /// Configure retraction: pull-back length (mm), speed (mm/s) and
    /// optional Z hop (micrometres).
    pub fn set_retraction(&mut self, amount_mm: f64, speed: i32, z_hop_um: Coord) {
        self.retraction_amount_mm = amount_mm;
        self.retraction_speed = speed;
        self.retraction_z_hop_um = z_hop_um;
    }

    /// Configure the extrusion model for the coming layer.
    pub fn set_extrusion(
        &mut self,
        layer_thickness_um: Coord,
        filament_diameter_um: Coord,
        multiplier: f64,
    ) {
        self.layer_thickness_um = layer_thickness_um;
        self.filament_area_mm2 = filament_area(filament_diameter_um);
        self.extrusion_multiplier = multiplier;
    }

    /// Machine position including the current Z annotation.
    #[inline]
    pub fn position(&self) -> Point {
        self.position.at_z(self.current_z)
    }

    /// Planar machine position.
    #[inline]
    pub fn position_xy(&self) -> Point {
        self.position.xy()
    }

    /// Current Z in micrometres.
    #[inline]
    pub fn position_z(&self) -> Coord {
        self.current_z
    }

    /// Current Z in micrometres (alias used by the spiral ramp).
    #[inline]
    pub fn current_z(&self) -> Coord {
        self.current_z
    }

    /// Set the Z for subsequent moves.
    #[inline]
    pub fn set_z(&mut self, z: Coord) {
        self.current_z = z;
    }

    /// Index of the active extruder.
    #[inline]
    pub fn extruder_index(&self) -> i32 {
        self.extruder_index
    }

    /// Cumulative extruded filament in millimetres.
    #[inline]
    pub fn extrusion_amount(&self) -> f64 {
        self.extrusion_amount_mm
    }

    /// Switch to another extruder, retracting first.
    pub fn switch_extruder(&mut self, index: i32) {
        if index == self.extruder_index {
            return;
        }
        self.write_retraction();
        self.extruder_index = index;
        self.commands.push(GCodeCommand::SelectTool { index });
    }

    /// Pull the filament back to avoid oozing across a travel. A no-op
    /// when no retraction is configured or one is already active.
    pub fn write_retraction(&mut self) {
        if self.retraction_amount_mm <= 0.0 || self.is_retracted {
            return;
        }
        let feed = (self.retraction_speed * 60) as f64;
        self.commands.push(GCodeCommand::LinearMove {
            x: None,
            y: None,
            z: None,
            e: Some(self.extrusion_amount_mm - self.retraction_amount_mm),
            f: Some(feed),
        });
        self.current_feed = Some(feed);
        if self.retraction_z_hop_um > 0 {
            let hop_z = self.current_z + self.retraction_z_hop_um;
            self.commands.push(GCodeCommand::RapidMove {
                x: None,
                y: None,
                z: Some(unscale(hop_z)),
                f: None,
            });
            self.last_written_z = Some(hop_z);
        }
        self.is_retracted = true;
    }

    /// Write a fan command, skipping values already in effect.
    pub fn write_fan_command(&mut self, speed_percent: i32) {
        let speed_percent = speed_percent.clamp(0, 100);
        if self.fan_speed_percent == Some(speed_percent) {
            return;
        }
        self.fan_speed_percent = Some(speed_percent);
        if speed_percent > 0 {
            self.commands.push(GCodeCommand::SetFanSpeed {
                s: (speed_percent * 255 / 100) as u32,
            });
        } else {
            self.commands.push(GCodeCommand::FanOff);
        }
    }

    /// Write a `;` comment line.
    pub fn write_comment(&mut self, text: &str) {
        self.commands.push(GCodeCommand::Comment(text.to_string()));
    }

    /// Write one motion command. `line_width_um == 0` is a travel;
    /// anything else extrudes with that stroke width.
    pub fn write_move(&mut self, destination: Point, speed_mm_s: f64, line_width_um: Coord) {
        let delta = destination.xy() - self.position;
        let length_mm = delta.length_mm();
        let feed = speed_mm_s * 60.0;

        let z = if self.last_written_z != Some(self.current_z) {
            self.last_written_z = Some(self.current_z);
            Some(unscale(self.current_z))
        } else {
            None
        };
        let f = if self.current_feed != Some(feed) {
            self.current_feed = Some(feed);
            Some(feed)
        } else {
            None
        };
        let x = Some(unscale(destination.x));
        let y = Some(unscale(destination.y));

        if line_width_um == 0 {
            self.commands.push(GCodeCommand::RapidMove { x, y, z, f });
        } else {
            if self.is_retracted {
                self.unretract();
            }
            let volume_mm3 = length_mm
                * unscale(line_width_um)
                * unscale(self.layer_thickness_um)
                * self.extrusion_multiplier;
            self.extrusion_amount_mm += volume_mm3 / self.filament_area_mm2;
            self.commands.push(GCodeCommand::LinearMove {
                x,
                y,
                z,
                e: Some(self.extrusion_amount_mm),
                f,
            });
        }

        self.position = destination.xy();
        if speed_mm_s > 0.0 {
            self.estimated_time_s += length_mm / speed_mm_s;
        }
    }

    fn unretract(&mut self) {
        let feed = (self.retraction_speed * 60) as f64;
        self.commands.push(GCodeCommand::LinearMove {
            x: None,
            y: None,
            z: None,
            e: Some(self.extrusion_amount_mm),
            f: Some(feed),
        });
        self.current_feed = Some(feed);
        self.is_retracted = false;
    }

    /// Fold the time estimated since the last call into the total.
    pub fn update_total_print_time(&mut self) {
        self.total_print_time_s += self.estimated_time_s;
        self.estimated_time_s = 0.0;
    }

    /// Total estimated print time in seconds.
    #[inline]
    pub fn total_print_time(&self) -> f64 {
        self.total_print_time_s
    }

    /// All commands written so far.
    #[inline]
    pub fn commands(&self) -> &[GCodeCommand] {
        &self.commands
    }

    /// Number of motion commands written so far.
    pub fn move_count(&self) -> usize {
        self.commands.iter().filter(|c| c.is_move()).count()
    }

    /// Render the whole output as G-code text.
    pub fn gcode(&self) -> String {
        let mut out = String::new();
        for command in &self.commands {
            out.push_str(&command.to_gcode());
            out.push('\n');
        }
        out
    }
}

fn filament_area(diameter_um: Coord) -> f64 {
    let radius_mm = unscale(diameter_um) / 2.0;
    PI * radius_mm * radius_mm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_travel_move() {
        let mut export = GCodeExport::new();
        export.write_move(Point::new(10_000, 0), 150.0, 0);
        assert_eq!(export.position_xy(), Point::new(10_000, 0));
        assert_eq!(export.move_count(), 1);
        assert!(export.gcode().starts_with("G0 X10.000 Y0.000"));
        // Travel does not extrude.
        assert_eq!(export.extrusion_amount(), 0.0);
    }

    #[test]
    fn test_extrusion_accumulates() {
        let mut export = GCodeExport::new();
        export.set_extrusion(200, 1_750, 1.0);
        export.write_move(Point::new(10_000, 0), 50.0, 400);
        let after_first = export.extrusion_amount();
        assert!(after_first > 0.0);
        export.write_move(Point::new(20_000, 0), 50.0, 400);
        assert!(export.extrusion_amount() > after_first);
        // 10mm at 0.4mm x 0.2mm over a 1.75mm filament.
        let expected = 10.0 * 0.4 * 0.2 / (PI * 0.875 * 0.875);
        assert!((after_first - expected).abs() < 1e-9);
    }

    #[test]
    fn test_retraction_and_unretract() {
        let mut export = GCodeExport::new();
        export.set_extrusion(200, 1_750, 1.0);
        export.set_retraction(4.5, 45, 0);
        export.write_move(Point::new(10_000, 0), 50.0, 400);
        let e_before = export.extrusion_amount();

        export.write_retraction();
        // A second retraction is a no-op.
        export.write_retraction();
        let retracts = export
            .commands()
            .iter()
            .filter(|c| matches!(c, GCodeCommand::LinearMove { x: None, e: Some(e), .. } if *e < e_before))
            .count();
        assert_eq!(retracts, 1);

        // The next extrusion unretracts first.
        export.write_move(Point::new(20_000, 0), 50.0, 400);
        let unretracts = export
            .commands()
            .iter()
            .filter(|c| matches!(c, GCodeCommand::LinearMove { x: None, e: Some(e), .. } if (*e - e_before).abs() < 1e-12))
            .count();
        assert_eq!(unretracts, 1);
    }

    #[test]
    fn test_fan_deduplication() {
        let mut export = GCodeExport::new();
        export.write_fan_command(50);
        export.write_fan_command(50);
        export.write_fan_command(0);
        assert_eq!(export.commands().len(), 2);
        assert_eq!(export.commands()[1], GCodeCommand::FanOff);
    }

    #[test]
    fn test_z_written_once_per_height() {
        let mut export = GCodeExport::new();
        export.set_z(200);
        export.write_move(Point::new(1_000, 0), 150.0, 0);
        export.write_move(Point::new(2_000, 0), 150.0, 0);
        let with_z = export
            .commands()
            .iter()
            .filter(|c| matches!(c, GCodeCommand::RapidMove { z: Some(_), .. }))
            .count();
        assert_eq!(with_z, 1);
    }

    #[test]
    fn test_switch_extruder() {
        let mut export = GCodeExport::new();
        export.switch_extruder(0);
        assert!(export.commands().is_empty());
        export.switch_extruder(1);
        assert_eq!(export.extruder_index(), 1);
        assert!(export
            .commands()
            .iter()
            .any(|c| *c == GCodeCommand::SelectTool { index: 1 }));
    }

    #[test]
    fn test_print_time_estimate() {
        let mut export = GCodeExport::new();
        // 100mm at 50mm/s = 2 seconds.
        export.write_move(Point::new(100_000, 0), 50.0, 0);
        assert_eq!(export.total_print_time(), 0.0);
        export.update_total_print_time();
        assert!((export.total_print_time() - 2.0).abs() < 1e-9);
    }
}
