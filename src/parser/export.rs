//! Export of a parsed survey as a metadata YAML file and a feature CSV

use std::fs;
use std::path::{Path, PathBuf};

use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use crate::entities::{FeaturePoint, SurveyRecord};

/// Name of the directory, next to the survey, that keeps untouched copies
pub const BACKUP_DIR: &str = ".backup";

/// Files written by [`export_survey`]
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFiles {
    pub meta: PathBuf,
    pub features: PathBuf,
    /// Copy of the source file, when a backup was requested
    pub backup: Option<PathBuf>,
}

#[derive(Serialize)]
struct FeatureRow<'a> {
    #[serde(rename = "FeatureType")]
    feature_type: &'a str,
    #[serde(rename = "FeatureName")]
    feature_name: &'a str,
    #[serde(rename = "X_coordinate")]
    x: f64,
    #[serde(rename = "Y_coordinate")]
    y: f64,
    #[serde(rename = "Z_coordinate")]
    z: f64,
    #[serde(rename = "I_coordinate")]
    i: Option<f64>,
    #[serde(rename = "J_coordinate")]
    j: Option<f64>,
    #[serde(rename = "K_coordinate")]
    k: Option<f64>,
    #[serde(rename = "Radius")]
    radius: Option<f64>,
}

impl<'a> From<&'a FeaturePoint> for FeatureRow<'a> {
    fn from(p: &'a FeaturePoint) -> Self {
        Self {
            feature_type: &p.feature_type,
            feature_name: &p.name,
            x: p.x,
            y: p.y,
            z: p.z,
            i: p.i,
            j: p.j,
            k: p.k,
            radius: p.radius,
        }
    }
}

/// Write `<ComponentID>_<Operator>_meta.yaml` and `<ComponentID>_<Operator>.csv`
///
/// The output directory must differ from the directory of `source`. With
/// `backup`, the source is also copied into `.backup/` beside it unless a copy
/// of that name already exists.
pub fn export_survey(
    source: &Path,
    record: &SurveyRecord,
    out_dir: &Path,
    backup: bool,
) -> Result<ExportedFiles> {
    fs::create_dir_all(out_dir).into_diagnostic()?;

    let source_dir = source
        .parent()
        .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
        .unwrap_or(Path::new("."));
    let same_dir = match (fs::canonicalize(source_dir), fs::canonicalize(out_dir)) {
        (Ok(a), Ok(b)) => a == b,
        _ => source_dir == out_dir,
    };
    if same_dir {
        return Err(miette::miette!(
            help = "choose a separate output directory with --out",
            "Input and output directories must differ ({})",
            out_dir.display()
        ));
    }

    let backup = if backup {
        Some(backup_source(source, source_dir)?)
    } else {
        None
    };

    let stem = record.metadata.file_stem();
    let meta = out_dir.join(format!("{}_meta.yaml", stem));
    let features = out_dir.join(format!("{}.csv", stem));

    let yaml = serde_yml::to_string(&record.metadata).into_diagnostic()?;
    fs::write(&meta, yaml).into_diagnostic()?;

    let mut writer = csv::Writer::from_path(&features).into_diagnostic()?;
    for point in &record.points {
        writer.serialize(FeatureRow::from(point)).into_diagnostic()?;
    }
    writer.flush().into_diagnostic()?;

    tracing::info!(meta = %meta.display(), features = %features.display(), "exported survey");
    Ok(ExportedFiles {
        meta,
        features,
        backup,
    })
}

fn backup_source(source: &Path, source_dir: &Path) -> Result<PathBuf> {
    let file_name = source.file_name().ok_or_else(|| {
        miette::miette!("Cannot back up {}: not a file path", source.display())
    })?;
    let dir = source_dir.join(BACKUP_DIR);
    fs::create_dir_all(&dir).into_diagnostic()?;

    let target = dir.join(file_name);
    if target.exists() {
        tracing::debug!(path = %target.display(), "backup already present");
    } else {
        fs::copy(source, &target).into_diagnostic()?;
        tracing::debug!(path = %target.display(), "backed up survey");
    }
    Ok(target)
}
