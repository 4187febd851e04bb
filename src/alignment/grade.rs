//! Placement grading
//!
//! | Grade | X and Y offset | Angle offset |
//! |-------|----------------|--------------|
//! | A     | ≤ 50 µm        | ≤ 0.02°      |
//! | B     | ≤ 100 µm       | ≤ 0.04°      |
//! | C     | otherwise      | otherwise    |

use crate::entities::Grade;

/// Upper bounds (µm, degrees) for each grade better than C
const THRESHOLDS: [(Grade, f64, f64); 2] = [(Grade::A, 50.0, 0.02), (Grade::B, 100.0, 0.04)];

/// Grade a placement from its axis offsets (mm) and angle offset (degrees)
pub fn grade(x_offset_mm: f64, y_offset_mm: f64, angle_offset_deg: f64) -> Grade {
    let x_um = (x_offset_mm * 1000.0).abs();
    let y_um = (y_offset_mm * 1000.0).abs();
    let angle = angle_offset_deg.abs();

    THRESHOLDS
        .iter()
        .find(|(_, max_um, max_deg)| x_um <= *max_um && y_um <= *max_um && angle <= *max_deg)
        .map(|(g, _, _)| *g)
        .unwrap_or(Grade::C)
}
