//! `ogp check` command - offsets and grade of one survey, without uploading

use std::path::{Path, PathBuf};

use console::style;
use miette::{IntoDiagnostic, Result};
use tabled::{builder::Builder, settings::Style};

use crate::alignment::{AlignmentEngine, AlignmentReport};
use crate::cli::helpers::styled_grade;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::{Config, DirTrayStore, FixedPolicy};
use crate::entities::{ComponentKind, SurveyRecord};
use crate::parser::{OgpTextParser, SurveyParser};
use crate::record::{PngRenderer, RecordBuilder};

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    /// Survey file
    pub file: PathBuf,

    /// Component type (default: from the name of the file's directory)
    #[arg(long = "type", short = 't')]
    pub kind: Option<ComponentKind>,

    /// Average the remaining fiducials when some are missing
    #[arg(long)]
    pub accept_partial: bool,

    /// Output format
    #[arg(long, short = 'f', default_value = "table")]
    pub format: OutputFormat,
}

pub fn run(args: CheckArgs, global: &GlobalOpts) -> Result<()> {
    let kind = match args.kind {
        Some(k) => k,
        None => kind_from_dir(&args.file)?,
    };
    if !kind.has_alignment() {
        return Err(miette::miette!(
            help = "only protomodules and modules carry fiducials",
            "{} surveys have no alignment measurement",
            kind
        ));
    }

    let config = Config::load(global.config.as_deref())?;
    let trays = DirTrayStore::new(config.require_tray_dir()?);
    let engine = AlignmentEngine::standard()?;
    let renderer = PngRenderer::new();
    let builder = RecordBuilder::new(&engine, &trays, &renderer);

    let survey = OgpTextParser::new().parse(&args.file)?;
    let policy = FixedPolicy {
        accept_partial_fiducials: args.accept_partial,
        ..FixedPolicy::decline_all()
    };
    let report = builder
        .report(kind, &survey, &policy)?
        .ok_or_else(|| miette::miette!("{} surveys have no alignment measurement", kind))?;

    match args.format {
        OutputFormat::Json => print_json(&survey, kind, &report),
        OutputFormat::Table => {
            print_table(&survey, kind, &report);
            Ok(())
        }
    }
}

/// `protomodules/PM1.txt` is a protomodule survey
fn kind_from_dir(file: &Path) -> Result<ComponentKind> {
    file.parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| {
            miette::miette!(
                help = "pass --type protomodule or --type module",
                "Cannot tell the component type of {}",
                file.display()
            )
        })
}

fn print_table(survey: &SurveyRecord, kind: ComponentKind, report: &AlignmentReport) {
    let meta = &survey.metadata;
    let result = &report.result;

    println!(
        "{} {} {} ({} {}, position {}, tray {})",
        style("→").blue(),
        kind,
        style(&meta.component_id).cyan(),
        meta.geometry,
        meta.density,
        meta.position_id,
        meta.tray_id()
    );

    let mut builder = Builder::default();
    builder.push_record(["Quantity", "Value"]);
    builder.push_record(["Hole pin".to_string(), report.pins.hole.to_string()]);
    builder.push_record(["Slot pin".to_string(), report.pins.slot.to_string()]);
    builder.push_record(["Pin angle (°)".to_string(), format!("{:.4}", report.pin_angle_deg)]);
    builder.push_record(["Fiducials used".to_string(), fiducial_names(&report.used_indices)]);
    builder.push_record(["Fiducial center".to_string(), report.fiducial_center.to_string()]);
    builder.push_record(["Fiducial angle (°)".to_string(), format!("{:.4}", report.fiducial_angle_deg)]);
    builder.push_record(["X offset (µm)".to_string(), result.x_offset_um().to_string()]);
    builder.push_record(["Y offset (µm)".to_string(), result.y_offset_um().to_string()]);
    builder.push_record(["Center offset (µm)".to_string(), format!("{:.1}", result.center_offset_um())]);
    builder.push_record(["Angle offset (°)".to_string(), format!("{:.3}", result.angle_offset_deg)]);
    println!("{}", builder.build().with(Style::rounded()).to_string());

    println!("  Grade: {}", styled_grade(result.grade).bold());
}

fn print_json(survey: &SurveyRecord, kind: ComponentKind, report: &AlignmentReport) -> Result<()> {
    let result = &report.result;
    let value = serde_json::json!({
        "component_id": survey.metadata.component_id,
        "kind": kind,
        "hole_pin": report.pins.hole,
        "slot_pin": report.pins.slot,
        "pin_angle_deg": report.pin_angle_deg,
        "fiducials_used": report.used_indices,
        "fiducial_center": report.fiducial_center,
        "fiducial_angle_deg": report.fiducial_angle_deg,
        "x_offset_um": result.x_offset_um(),
        "y_offset_um": result.y_offset_um(),
        "center_offset_um": result.center_offset_um(),
        "angle_offset_deg": result.angle_offset_deg,
        "grade": result.grade,
    });
    println!("{}", serde_json::to_string_pretty(&value).into_diagnostic()?);
    Ok(())
}

fn fiducial_names(indices: &[usize]) -> String {
    indices
        .iter()
        .map(|i| format!("FD{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}
