//! Alignment result of one survey

use serde::{Deserialize, Serialize};

/// Placement quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Grade::A => write!(f, "A"),
            Grade::B => write!(f, "B"),
            Grade::C => write!(f, "C"),
        }
    }
}

/// Position and rotation offset of a component relative to its tray pins
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetResult {
    pub center_offset_mm: f64,
    pub angle_offset_deg: f64,
    pub x_offset_mm: f64,
    pub y_offset_mm: f64,
    pub grade: Grade,
}

impl OffsetResult {
    /// X offset rounded to whole micrometers
    pub fn x_offset_um(&self) -> i64 {
        (self.x_offset_mm * 1000.0).round() as i64
    }

    /// Y offset rounded to whole micrometers
    pub fn y_offset_um(&self) -> i64 {
        (self.y_offset_mm * 1000.0).round() as i64
    }

    pub fn center_offset_um(&self) -> f64 {
        self.center_offset_mm * 1000.0
    }

    pub fn as_triple(&self) -> OffsetTriple {
        OffsetTriple {
            x_um: self.x_offset_um() as f64,
            y_um: self.y_offset_um() as f64,
            angle_deg: self.angle_offset_deg,
        }
    }
}

/// Offsets in the form stored in the database and drawn on accuracy plots
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OffsetTriple {
    pub x_um: f64,
    pub y_um: f64,
    pub angle_deg: f64,
}
