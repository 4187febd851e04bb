//! `ogp inventory` command - the record of uploaded survey files
//!
//! A file listed here is never uploaded again. Clearing the inventory makes
//! every survey under the survey directory a candidate on the next run.

use clap::Subcommand;
use console::{style, Term};
use dialoguer::{theme::ColorfulTheme, Confirm};
use miette::{IntoDiagnostic, Result};
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::truncate_str;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::{Config, Inventory};

#[derive(Subcommand, Debug)]
pub enum InventoryCommands {
    /// List uploaded files
    List {
        /// Output format
        #[arg(long, short = 'f', default_value = "table")]
        format: OutputFormat,
    },

    /// Show inventory statistics
    Status,

    /// Forget every uploaded file
    Clear {
        /// Do not ask for confirmation
        #[arg(long)]
        force: bool,
    },
}

pub fn run(cmd: InventoryCommands, global: &GlobalOpts) -> Result<()> {
    let config = Config::load(global.config.as_deref())?;
    let mut inventory = Inventory::open(&config.require_inventory()?)?;

    match cmd {
        InventoryCommands::List { format } => run_list(&inventory, format),
        InventoryCommands::Status => run_status(&inventory),
        InventoryCommands::Clear { force } => run_clear(&mut inventory, force),
    }
}

fn run_list(inventory: &Inventory, format: OutputFormat) -> Result<()> {
    let entries = inventory.list_all()?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&entries).into_diagnostic()?);
        }
        OutputFormat::Table => {
            if entries.is_empty() {
                println!("No files uploaded yet");
                return Ok(());
            }
            let mut builder = Builder::default();
            builder.push_record(["Hash", "Type", "File", "Processed"]);
            for entry in &entries {
                builder.push_record([
                    entry.identity.short().to_string(),
                    entry.kind.to_string(),
                    truncate_str(&entry.path.display().to_string(), 60),
                    entry.processed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                ]);
            }
            println!("{}", builder.build().with(Style::rounded()).to_string());
            println!("{} file(s)", style(entries.len()).cyan());
        }
    }

    Ok(())
}

fn run_status(inventory: &Inventory) -> Result<()> {
    let stats = inventory.statistics()?;

    println!("{}", style("Inventory Status").bold());
    println!("{}", style("─".repeat(40)).dim());
    if let Some(path) = inventory.path() {
        println!("  Location:       {}", path.display());
    }
    println!("  Uploaded files: {}", style(stats.total).cyan());
    println!(
        "  Database size:  {} KB",
        style(stats.db_size_bytes / 1024).cyan()
    );

    if !stats.by_kind.is_empty() {
        println!();
        println!("  {}", style("By Type:").bold());
        for (kind, count) in &stats.by_kind {
            println!("    {:<12} {}", kind, count);
        }
    }

    Ok(())
}

fn run_clear(inventory: &mut Inventory, force: bool) -> Result<()> {
    if !force {
        if !Term::stderr().is_term() {
            return Err(miette::miette!(
                help = "pass --force to clear without confirmation",
                "Refusing to clear the inventory without confirmation"
            ));
        }
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Forget all uploaded files? They will be uploaded again on the next run")
            .default(false)
            .interact()
            .into_diagnostic()?;
        if !confirmed {
            println!("Cancelled");
            return Ok(());
        }
    }

    let removed = inventory.clear()?;
    println!("{} Cleared {} entries", style("✓").green(), removed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FileIdentity, InventoryEntry};
    use crate::entities::ComponentKind;

    #[test]
    fn test_forced_clear_empties_inventory() {
        let mut inventory = Inventory::open_in_memory().unwrap();
        inventory
            .add(&InventoryEntry::new(
                FileIdentity::of_bytes(b"survey"),
                "modules/M1.txt",
                ComponentKind::Module,
            ))
            .unwrap();

        run_clear(&mut inventory, true).unwrap();
        assert!(inventory.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_list_formats() {
        let inventory = Inventory::open_in_memory().unwrap();
        assert!(run_list(&inventory, OutputFormat::Table).is_ok());
        assert!(run_list(&inventory, OutputFormat::Json).is_ok());
    }
}
