//! Alignment of a placed component against its tray
//!
//! Geometry helpers, the reference tables, the offset computation and the
//! placement grade.

pub mod engine;
pub mod geometry;
pub mod grade;
pub mod lookup;

pub use engine::{AlignmentEngine, AlignmentError, AlignmentReport};
pub use geometry::{rotate, vector_angle_deg, wrap_degrees, Point2};
pub use grade::grade;
pub use lookup::{AngleRule, LookupError, PinNames, ReferenceLookup};
