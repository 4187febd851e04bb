//! 2D geometry primitives used by the alignment engine and the renderer

use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A point (or vector) in the survey plane, in millimeters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean length of the vector from the origin
    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Direction of the vector in degrees
    pub fn angle_deg(&self) -> f64 {
        vector_angle_deg(self.x, self.y)
    }
}

impl Add for Point2 {
    type Output = Point2;

    fn add(self, rhs: Point2) -> Point2 {
        Point2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point2 {
    type Output = Point2;

    fn sub(self, rhs: Point2) -> Point2 {
        Point2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl From<(f64, f64)> for Point2 {
    fn from((x, y): (f64, f64)) -> Self {
        Point2::new(x, y)
    }
}

impl std::fmt::Display for Point2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

/// Rotate `(x, y)` about the origin by `to_angle_deg - from_angle_deg`
pub fn rotate(x: f64, y: f64, from_angle_deg: f64, to_angle_deg: f64) -> (f64, f64) {
    let rad = (to_angle_deg - from_angle_deg).to_radians();
    let (sin, cos) = rad.sin_cos();
    (x * cos - y * sin, x * sin + y * cos)
}

/// Angle of the vector `(x, y)` in degrees, in (-180, 180]
pub fn vector_angle_deg(x: f64, y: f64) -> f64 {
    y.atan2(x).to_degrees()
}

/// Wrap an angle in degrees into (-180, 180]
pub fn wrap_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Average of a set of optional points
#[derive(Debug, Clone, PartialEq)]
pub struct Average {
    pub point: Point2,
    /// Positions (into the input slice) that were missing and skipped
    pub missing: Vec<usize>,
}

impl Average {
    /// Whether every input contributed to the mean
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("all {count} points to average are missing")]
pub struct AllPointsMissingError {
    pub count: usize,
}

/// Arithmetic mean over the present entries
///
/// Missing entries are reported back in [`Average::missing`]; whether a
/// reduced mean is acceptable is up to the caller.
pub fn average_ignoring_missing(points: &[Option<Point2>]) -> Result<Average, AllPointsMissingError> {
    let mut sum = Point2::default();
    let mut present = 0usize;
    let mut missing = Vec::new();

    for (i, point) in points.iter().enumerate() {
        match point {
            Some(p) => {
                sum = sum + *p;
                present += 1;
            }
            None => missing.push(i),
        }
    }

    if present == 0 {
        return Err(AllPointsMissingError {
            count: points.len(),
        });
    }

    let n = present as f64;
    Ok(Average {
        point: Point2::new(sum.x / n, sum.y / n),
        missing,
    })
}
