//! Alignment engine: fiducials + tray pins → offsets and grade

use miette::Diagnostic;
use thiserror::Error;

use crate::alignment::geometry::{
    average_ignoring_missing, wrap_degrees, AllPointsMissingError, Point2,
};
use crate::alignment::grade::grade;
use crate::alignment::lookup::{LookupError, ReferenceLookup};
use crate::core::policy::DecisionPolicy;
use crate::entities::{ComponentKind, FiducialSet, Metadata, OffsetResult, ReferencePins};

/// Largest physically plausible angle offset (degrees)
pub const MAX_ANGLE_OFFSET_DEG: f64 = 20.0;

/// Largest physically plausible axis offset (mm)
pub const MAX_AXIS_OFFSET_MM: f64 = 5.0;

#[derive(Debug, Error, Diagnostic)]
pub enum AlignmentError {
    #[error(transparent)]
    #[diagnostic(code(ogp::config))]
    Configuration(#[from] LookupError),

    #[error("fiducial FD{0} is required for the angle measurement but was not measured")]
    #[diagnostic(code(ogp::input))]
    MissingFiducial(usize),

    #[error("no usable fiducial among FD{indices:?}")]
    #[diagnostic(code(ogp::input))]
    NoFiducials {
        indices: Vec<usize>,
        #[source]
        source: AllPointsMissingError,
    },

    #[error("fiducials {missing:?} are missing and the reduced set was declined")]
    #[diagnostic(code(ogp::input))]
    PartialFiducialsDeclined { missing: Vec<usize> },

    #[error("angle offset {angle_deg:.3}° exceeds ±20°")]
    #[diagnostic(
        code(ogp::range),
        help("check the fiducial points and the tray position (1 vs 2)")
    )]
    AngleOutOfRange { angle_deg: f64 },

    #[error("offset ({x_mm:.3}, {y_mm:.3}) mm exceeds ±5 mm")]
    #[diagnostic(
        code(ogp::range),
        help("check the fiducial points and the tray position (1 vs 2)")
    )]
    OffsetOutOfRange { x_mm: f64, y_mm: f64 },
}

impl AlignmentError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, AlignmentError::Configuration(_))
    }

    pub fn is_range(&self) -> bool {
        matches!(
            self,
            AlignmentError::AngleOutOfRange { .. } | AlignmentError::OffsetOutOfRange { .. }
        )
    }
}

/// Intermediate values of one computation, kept for display
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentReport {
    pub pins: ReferencePins,
    pub pin_angle_deg: f64,
    pub fiducial_center: Point2,
    pub fiducial_angle_deg: f64,
    pub used_indices: Vec<usize>,
    pub result: OffsetResult,
}

pub struct AlignmentEngine {
    lookup: ReferenceLookup,
}

impl AlignmentEngine {
    pub fn new(lookup: ReferenceLookup) -> Self {
        Self { lookup }
    }

    /// Engine backed by the built-in fixture tables
    pub fn standard() -> Result<Self, AlignmentError> {
        Ok(Self::new(ReferenceLookup::standard()?))
    }

    pub fn lookup(&self) -> &ReferenceLookup {
        &self.lookup
    }

    /// Compute offsets, returning only the result
    pub fn compute_offsets(
        &self,
        kind: ComponentKind,
        metadata: &Metadata,
        fiducials: &FiducialSet,
        pins: &ReferencePins,
        policy: &dyn DecisionPolicy,
    ) -> Result<OffsetResult, AlignmentError> {
        self.compute_report(kind, metadata, fiducials, pins, policy)
            .map(|report| report.result)
    }

    /// Compute offsets along with the intermediate values
    pub fn compute_report(
        &self,
        kind: ComponentKind,
        metadata: &Metadata,
        fiducials: &FiducialSet,
        pins: &ReferencePins,
        policy: &dyn DecisionPolicy,
    ) -> Result<AlignmentReport, AlignmentError> {
        let (geometry, density, position) =
            (metadata.geometry, metadata.density, metadata.position_id);

        // Reference frame from the tray pins
        let pin_rule = self.lookup.pin_angle_rule(geometry, density, position)?;
        let fiducial_rule = self.lookup.fiducial_angle_rule(geometry, density, position)?;
        let indices = self.lookup.fiducial_indices(kind, geometry, density)?;
        let adjustment = self.lookup.adjustment(kind, geometry, density, position)?;

        let pin_angle = pin_rule.apply(pins.axis());
        tracing::debug!(axis = %pins.axis(), pin_angle, "pin vector hole→slot");

        // Fiducial center from the selected indices only
        let average = average_ignoring_missing(&fiducials.select(indices)).map_err(|source| {
            AlignmentError::NoFiducials {
                indices: indices.to_vec(),
                source,
            }
        })?;

        let missing: Vec<usize> = average.missing.iter().map(|&i| indices[i]).collect();
        if !missing.is_empty() {
            tracing::warn!(
                component = %metadata.component_id,
                ?missing,
                "selected fiducials missing from the survey"
            );
            if !policy.accept_partial_fiducials(&metadata.component_id, &missing) {
                return Err(AlignmentError::PartialFiducialsDeclined { missing });
            }
        }
        let used_indices: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|i| !missing.contains(i))
            .collect();

        let center = average.point;
        let offset = center - pins.hole - adjustment;
        tracing::debug!(%center, hole = %pins.hole, %adjustment, "fiducial center");

        // Orientation from FD3→FD1
        let fd1 = fiducials.get(1).ok_or(AlignmentError::MissingFiducial(1))?;
        let fd3 = fiducials.get(3).ok_or(AlignmentError::MissingFiducial(3))?;
        let fiducial_angle = fiducial_rule.apply(fd1 - fd3);
        let angle_offset = wrap_degrees(fiducial_angle - pin_angle);

        if angle_offset.abs() > MAX_ANGLE_OFFSET_DEG || !angle_offset.is_finite() {
            tracing::error!(angle_offset, "angle offset out of range");
            return Err(AlignmentError::AngleOutOfRange {
                angle_deg: angle_offset,
            });
        }
        if offset.x.abs() > MAX_AXIS_OFFSET_MM
            || offset.y.abs() > MAX_AXIS_OFFSET_MM
            || !offset.x.is_finite()
            || !offset.y.is_finite()
        {
            tracing::error!(x = offset.x, y = offset.y, "axis offset out of range");
            return Err(AlignmentError::OffsetOutOfRange {
                x_mm: offset.x,
                y_mm: offset.y,
            });
        }

        let result = OffsetResult {
            center_offset_mm: offset.norm(),
            angle_offset_deg: angle_offset,
            x_offset_mm: offset.x,
            y_offset_mm: offset.y,
            grade: grade(offset.x, offset.y, angle_offset),
        };

        Ok(AlignmentReport {
            pins: *pins,
            pin_angle_deg: pin_angle,
            fiducial_center: center,
            fiducial_angle_deg: fiducial_angle,
            used_indices,
            result,
        })
    }
}
