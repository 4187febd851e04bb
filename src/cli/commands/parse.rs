//! `ogp parse` command - export one survey as metadata YAML and feature CSV

use std::path::PathBuf;

use console::style;
use miette::Result;

use crate::cli::GlobalOpts;
use crate::parser::{export_survey, OgpTextParser, SurveyParser};

#[derive(clap::Args, Debug)]
pub struct ParseArgs {
    /// Survey file
    pub file: PathBuf,

    /// Output directory (must differ from the survey's directory)
    #[arg(long, short = 'o')]
    pub out: PathBuf,

    /// Also keep a copy of the survey in `.backup/` next to it
    #[arg(long)]
    pub backup: bool,
}

pub fn run(args: ParseArgs, global: &GlobalOpts) -> Result<()> {
    let survey = OgpTextParser::new().parse(&args.file)?;
    let files = export_survey(&args.file, &survey, &args.out, args.backup)?;

    if !global.quiet {
        println!(
            "{} Parsed {} ({} features)",
            style("✓").green(),
            style(&survey.metadata.component_id).cyan(),
            survey.points.len()
        );
        println!("  {}", files.meta.display());
        println!("  {}", files.features.display());
        if let Some(backup) = &files.backup {
            println!("  {}", backup.display());
        }
    }
    Ok(())
}
