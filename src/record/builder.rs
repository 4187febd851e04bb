//! Upload record assembly
//!
//! Two steps per survey: [`RecordBuilder::measure`] turns the survey into an
//! alignment result (protomodules and modules only), and
//! [`RecordBuilder::build`] turns survey plus result into the columns of one
//! inspection row.

use miette::Diagnostic;
use thiserror::Error;

use crate::alignment::{AlignmentEngine, AlignmentError, AlignmentReport};
use crate::core::database::{DatabaseClient, UploadError, UploadRecord};
use crate::core::policy::DecisionPolicy;
use crate::core::tray::{TrayError, TrayStore};
use crate::entities::{ComponentKind, FiducialError, FiducialSet, OffsetResult, OffsetTriple, SurveyRecord};
use crate::record::render::{HeightMapSpec, PlotRenderer};

#[derive(Debug, Error, Diagnostic)]
pub enum MeasureError {
    #[error(transparent)]
    #[diagnostic(code(ogp::input))]
    Tray(#[from] TrayError),

    #[error(transparent)]
    #[diagnostic(code(ogp::input))]
    Fiducials(#[from] FiducialError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Alignment(#[from] AlignmentError),
}

/// What an inspection row of a kind carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordShape {
    /// Flatness and thickness only
    Surface,
    /// Alignment offsets plotted on their own
    Aligned,
    /// Alignment offsets plotted against the prior protomodule survey
    AlignedOnPrior,
}

impl From<ComponentKind> for RecordShape {
    fn from(kind: ComponentKind) -> Self {
        match kind {
            ComponentKind::Baseplate | ComponentKind::Hexaboard => RecordShape::Surface,
            ComponentKind::Protomodule => RecordShape::Aligned,
            ComponentKind::Module => RecordShape::AlignedOnPrior,
        }
    }
}

/// Builds upload records from parsed surveys
pub struct RecordBuilder<'a> {
    engine: &'a AlignmentEngine,
    trays: &'a dyn TrayStore,
    renderer: &'a dyn PlotRenderer,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(
        engine: &'a AlignmentEngine,
        trays: &'a dyn TrayStore,
        renderer: &'a dyn PlotRenderer,
    ) -> Self {
        Self {
            engine,
            trays,
            renderer,
        }
    }

    /// Alignment result of a survey; `None` for kinds without fiducials
    pub fn measure(
        &self,
        kind: ComponentKind,
        survey: &SurveyRecord,
        policy: &dyn DecisionPolicy,
    ) -> Result<Option<OffsetResult>, MeasureError> {
        let Some(report) = self.report(kind, survey, policy)? else {
            return Ok(None);
        };

        let result = report.result;
        tracing::info!(
            component = %survey.metadata.component_id,
            x_um = result.x_offset_um(),
            y_um = result.y_offset_um(),
            angle = result.angle_offset_deg,
            grade = %result.grade,
            "computed offsets"
        );
        Ok(Some(result))
    }

    /// Alignment result together with the pins and fiducials it came from
    pub fn report(
        &self,
        kind: ComponentKind,
        survey: &SurveyRecord,
        policy: &dyn DecisionPolicy,
    ) -> Result<Option<AlignmentReport>, MeasureError> {
        if !kind.has_alignment() {
            return Ok(None);
        }

        let meta = &survey.metadata;
        let lookup = self.engine.lookup();
        let fiducials = FiducialSet::from_features(survey.component_points(), |name| {
            lookup.fiducial_index(meta.geometry, name)
        })?;
        let pins = self.trays.reference_pins(meta, lookup)?;

        let present: Vec<_> = fiducials.present().collect();
        self.renderer.render_fiducials(&meta.component_id, &present, &pins);

        let report = self
            .engine
            .compute_report(kind, meta, &fiducials, &pins, policy)?;
        Ok(Some(report))
    }

    /// Columns of the inspection row for a survey
    pub fn build(
        &self,
        kind: ComponentKind,
        survey: &SurveyRecord,
        offsets: Option<&OffsetResult>,
        db: &dyn DatabaseClient,
    ) -> Result<UploadRecord, UploadError> {
        let meta = &survey.metadata;
        let params = kind.params();
        let mut record = UploadRecord::new(kind);
        let name_column = record.name_column();
        record.insert(name_column, meta.component_id.as_str());

        let points: Vec<(f64, f64, f64)> = survey.component_points().map(|p| (p.x, p.y, p.z)).collect();
        let heights: Vec<f64> = points.iter().map(|p| p.2).collect();
        let avg_thickness = round3(mean(&heights));

        match (RecordShape::from(kind), offsets) {
            (RecordShape::Surface, _) => {
                record.insert("flatness", meta.flatness);
                record.insert("thickness", avg_thickness);
            }
            (shape, Some(result)) => {
                let own = result.as_triple();
                let (sensor, pcb) = match shape {
                    RecordShape::AlignedOnPrior => match db.fetch_prior_offsets(&meta.component_id)? {
                        Some(prior) => (prior, own),
                        None => {
                            tracing::warn!(
                                component = %meta.component_id,
                                "no protomodule survey found for this module; plotting its own offsets"
                            );
                            (own, OffsetTriple::default())
                        }
                    },
                    _ => (own, OffsetTriple::default()),
                };

                record.insert("x_offset_mu", result.x_offset_um());
                record.insert("y_offset_mu", result.y_offset_um());
                record.insert("ang_offset_deg", round3(result.angle_offset_deg));
                record.insert("weight", meta.weight);
                record.insert("max_thickness", round3(heights.iter().copied().fold(f64::NAN, f64::max)));
                record.insert("avg_thickness", avg_thickness);
                record.insert("grade", result.grade.to_string());
                record.insert(
                    "offsetplot",
                    self.renderer
                        .render_accuracy_plot(&meta.component_id, sensor, pcb),
                );
            }
            (_, None) => {
                tracing::warn!(component = %meta.component_id, "no alignment result to record");
            }
        }

        let spec = HeightMapSpec {
            name: meta.file_stem(),
            new_angle: params.new_angle,
            vmin: params.vmin,
            vmax: params.vmax,
        };
        record.insert("hexplot", self.renderer.render_height_map(&points, &spec));
        record.insert("x_points", points.iter().map(|p| p.0).collect::<Vec<f64>>());
        record.insert("y_points", points.iter().map(|p| p.1).collect::<Vec<f64>>());
        record.insert("z_points", heights);
        record.insert("inspector", meta.operator.as_str());
        record.insert("comment", meta.comment.clone());
        record.insert("date_inspect", meta.run_date.format("%Y-%m-%d").to_string());
        record.insert("time_inspect", meta.run_time.format("%H:%M:%S").to_string());

        Ok(record)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
