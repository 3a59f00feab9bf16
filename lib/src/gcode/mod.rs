//! G-code generation module.
//!
//! This module provides the motion planner and the low-level writer it
//! drives:
//! - [`GCodePlanner`] - the per-layer planning facade: queues travels
//!   and extrusions, decides retractions, rescales for minimum layer
//!   time and emits the queue in one pass
//! - [`PathQueue`] / [`GCodePath`] / [`GCodePathConfig`] - the grouped
//!   move queue the planner appends into
//! - [`GCodeExport`] - the stateful writer that renders moves,
//!   retractions, fan and comment commands

mod planner;
mod queue;
mod writer;

pub use planner::{trim_perimeter, GCodePlanner};
pub use queue::{GCodePath, GCodePathConfig, PathQueue};
pub use writer::GCodeExport;

/// G-code command types emitted by the writer.
#[derive(Clone, Debug, PartialEq)]
pub enum GCodeCommand {
    /// G0 - Rapid move (travel)
    RapidMove {
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        f: Option<f64>,
    },
    /// G1 - Linear move (extrusion or retraction)
    LinearMove {
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        e: Option<f64>,
        f: Option<f64>,
    },
    /// T - Select tool
    SelectTool { index: i32 },
    /// M106 - Set fan speed
    SetFanSpeed { s: u32 },
    /// M107 - Fan off
    FanOff,
    /// Comment
    Comment(String),
}

impl GCodeCommand {
    /// Convert the command to a G-code string.
    pub fn to_gcode(&self) -> String {
        match self {
            GCodeCommand::RapidMove { x, y, z, f } => {
                let mut cmd = String::from("G0");
                push_axis(&mut cmd, 'X', *x);
                push_axis(&mut cmd, 'Y', *y);
                push_axis(&mut cmd, 'Z', *z);
                if let Some(v) = f {
                    cmd.push_str(&format!(" F{:.0}", v));
                }
                cmd
            }
            GCodeCommand::LinearMove { x, y, z, e, f } => {
                let mut cmd = String::from("G1");
                push_axis(&mut cmd, 'X', *x);
                push_axis(&mut cmd, 'Y', *y);
                push_axis(&mut cmd, 'Z', *z);
                if let Some(v) = e {
                    cmd.push_str(&format!(" E{:.5}", v));
                }
                if let Some(v) = f {
                    cmd.push_str(&format!(" F{:.0}", v));
                }
                cmd
            }
            GCodeCommand::SelectTool { index } => format!("T{}", index),
            GCodeCommand::SetFanSpeed { s } => format!("M106 S{}", s),
            GCodeCommand::FanOff => "M107".to_string(),
            GCodeCommand::Comment(text) => format!("; {}", text),
        }
    }

    /// Whether this command moves the machine.
    pub fn is_move(&self) -> bool {
        matches!(
            self,
            GCodeCommand::RapidMove { .. } | GCodeCommand::LinearMove { .. }
        )
    }
}

fn push_axis(cmd: &mut String, axis: char, value: Option<f64>) {
    if let Some(v) = value {
        cmd.push_str(&format!(" {}{:.3}", axis, v));
    }
}
