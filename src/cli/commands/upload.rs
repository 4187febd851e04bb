//! `ogp upload` command - process and upload new survey files

use console::{style, Term};
use miette::Result;
use tabled::{builder::Builder, settings::Style};

use crate::alignment::AlignmentEngine;
use crate::cli::helpers::{ensure_config_ready, file_label, selected_kinds, styled_grade, styled_state, truncate_str};
use crate::cli::GlobalOpts;
use crate::core::pipeline::{discover, FileState, Pipeline, RunSummary};
use crate::core::{Config, DecisionPolicy, DirTrayStore, FixedPolicy, InteractivePolicy, Inventory, SqliteClient};
use crate::entities::ComponentKind;
use crate::parser::OgpTextParser;

#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    /// Only process this component type (baseplate, hexaboard, protomodule, module)
    #[arg(long = "type", short = 't')]
    pub kind: Option<ComponentKind>,

    /// Parse, compute and build records without uploading
    #[arg(long)]
    pub dry_run: bool,

    /// Answer yes to every question
    #[arg(long, short = 'y', conflicts_with = "no_prompt")]
    pub yes: bool,

    /// Answer no to every question instead of prompting
    #[arg(long)]
    pub no_prompt: bool,
}

pub fn run(args: UploadArgs, global: &GlobalOpts) -> Result<()> {
    let config = Config::load(global.config.as_deref())?;
    ensure_config_ready(&config)?;

    let survey_dir = config.require_survey_dir()?;
    let trays = DirTrayStore::new(config.require_tray_dir()?);
    let db = SqliteClient::open(config.require_database()?)?;
    let mut inventory = Inventory::open(&config.require_inventory()?)?;
    let engine = AlignmentEngine::standard()?;

    let candidates = discover(survey_dir, &selected_kinds(args.kind), &inventory)?;
    if candidates.is_empty() {
        if !global.quiet {
            println!("{} No new survey files", style("✓").green());
        }
        return Ok(());
    }
    if !global.quiet {
        println!(
            "{} Found {} new survey file(s){}",
            style("→").blue(),
            candidates.len(),
            if args.dry_run { " (dry run)" } else { "" }
        );
    }

    let policy: Box<dyn DecisionPolicy> = if args.yes {
        Box::new(FixedPolicy::accept_all())
    } else if args.no_prompt || !Term::stderr().is_term() {
        Box::new(FixedPolicy::decline_all())
    } else {
        Box::new(InteractivePolicy::new())
    };

    let parser = OgpTextParser::new();
    let pipeline = Pipeline::new(&parser, &engine, &trays, &db, policy.as_ref())
        .with_image_dir(config.image_dir())
        .with_dry_run(args.dry_run);
    let summary = pipeline.run(candidates, &mut inventory)?;

    print_summary(&summary, args.dry_run, global);

    if summary.all_succeeded {
        Ok(())
    } else {
        Err(miette::miette!(
            help = "fix the rejected files and run again; uploaded files are not processed twice",
            "{} of {} file(s) did not complete",
            summary.outcomes.len() - summary.completed(),
            summary.outcomes.len()
        ))
    }
}

fn print_summary(summary: &RunSummary, dry_run: bool, global: &GlobalOpts) {
    if global.quiet {
        for (outcome, error) in summary.failures() {
            eprintln!("{} {}: {}", style("✗").red(), file_label(&outcome.candidate.path), error);
        }
        return;
    }

    let mut builder = Builder::default();
    builder.push_record(["File", "Type", "Component", "X (µm)", "Y (µm)", "Angle (°)", "Grade", "State"]);
    for outcome in &summary.outcomes {
        let offsets = outcome.offsets;
        builder.push_record([
            truncate_str(&file_label(&outcome.candidate.path), 32),
            outcome.candidate.kind.to_string(),
            outcome.component_id.clone().unwrap_or_else(|| "-".to_string()),
            offsets.map_or("-".to_string(), |o| o.x_offset_um().to_string()),
            offsets.map_or("-".to_string(), |o| o.y_offset_um().to_string()),
            offsets.map_or("-".to_string(), |o| format!("{:.3}", o.angle_offset_deg)),
            outcome
                .grade()
                .map_or("-".to_string(), |g| styled_grade(g).to_string()),
            styled_state(&outcome.state).to_string(),
        ]);
    }
    println!("{}", builder.build().with(Style::rounded()).to_string());

    for (outcome, error) in summary.failures() {
        println!(
            "{} {}: {}",
            style("✗").red(),
            file_label(&outcome.candidate.path),
            error
        );
    }

    let verb = if dry_run { "Checked" } else { "Uploaded" };
    println!(
        "{} {} {} of {} file(s)",
        if summary.all_succeeded {
            style("✓").green()
        } else {
            style("!").yellow()
        },
        verb,
        summary.completed(),
        summary.outcomes.len()
    );
    if summary.aborted {
        let pending = summary
            .outcomes
            .iter()
            .filter(|o| o.state == FileState::Discovered)
            .count();
        println!(
            "  {} batch stopped; {} file(s) left for the next run",
            style("→").dim(),
            pending
        );
    }
}
