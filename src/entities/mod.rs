//! Entity types - survey data and the values derived from it

pub mod component;
pub mod fiducial;
pub mod offsets;
pub mod survey;

pub use component::{ComponentKind, KindParams};
pub use fiducial::{FiducialError, FiducialSet, ReferencePins};
pub use offsets::{Grade, OffsetResult, OffsetTriple};
pub use survey::{Density, FeaturePoint, Geometry, Metadata, PositionId, SurveyRecord};
