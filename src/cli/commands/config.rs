//! `ogp config` command - Configuration management

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::GlobalOpts;
use crate::core::Config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration and any problems with it
    Show(ShowArgs),

    /// Show paths to configuration files
    Path,

    /// Write a commented configuration file
    Init(InitArgs),
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Show only this key's value
    pub key: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Where to write (default: the global config file)
    pub path: Option<PathBuf>,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// Keys accepted in configuration files
const VALID_KEYS: &[(&str, &str)] = &[
    ("survey_dir", "Root of the survey tree (OGP_SURVEY_DIR)"),
    ("tray_dir", "Directory of tray reference files (OGP_TRAY_DIR)"),
    ("database", "SQLite inspection database (OGP_DATABASE)"),
    ("inventory", "SQLite record of uploaded files (OGP_INVENTORY)"),
    ("image_dir", "Where rendered images are saved (OGP_IMAGE_DIR)"),
    ("inst_code", "Institution code"),
    ("institution_name", "Institution name"),
];

/// Run a config subcommand
pub fn run(cmd: ConfigCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ConfigCommands::Show(args) => run_show(args, global),
        ConfigCommands::Path => run_path(global),
        ConfigCommands::Init(args) => run_init(args),
    }
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let config = Config::load(global.config.as_deref())?;

    if let Some(key) = &args.key {
        if !VALID_KEYS.iter().any(|(k, _)| k == key) {
            return Err(miette::miette!(
                help = format!(
                    "valid keys: {}",
                    VALID_KEYS.iter().map(|(k, _)| *k).collect::<Vec<_>>().join(", ")
                ),
                "Unknown configuration key '{}'",
                key
            ));
        }
        return match get_config_value(&config, key) {
            Some(v) => {
                println!("{}", v);
                Ok(())
            }
            None => Err(miette::miette!("Key '{}' is not set", key)),
        };
    }

    println!("{}", style("Effective Configuration").bold().underlined());
    println!();
    for (key, description) in VALID_KEYS {
        print_config_value(key, get_config_value(&config, key).as_deref(), description);
    }

    let issues = config.verify();
    if !issues.is_empty() {
        println!();
        for issue in &issues {
            println!("  {} {}", style("!").yellow(), issue);
        }
    }

    println!();
    println!("{}", style("Config Sources (in priority order):").dim());
    println!("  1. Environment variables (OGP_SURVEY_DIR, OGP_TRAY_DIR, ...)");
    println!("  2. --config file");
    println!("  3. Global config (~/.config/ogp/config.yaml)");

    Ok(())
}

fn run_path(global: &GlobalOpts) -> Result<()> {
    let global_path = get_global_config_path()?;

    println!("{}", style("Configuration file paths:").bold());
    println!();
    print_path("Global:", &global_path);
    if let Some(explicit) = &global.config {
        print_path("--config:", explicit);
    }

    Ok(())
}

fn run_init(args: InitArgs) -> Result<()> {
    let path = match args.path {
        Some(p) => p,
        None => get_global_config_path()?,
    };

    if path.exists() && !args.force {
        return Err(miette::miette!(
            help = "use --force to overwrite",
            "Config file already exists: {}",
            path.display()
        ));
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).into_diagnostic()?;
        }
    }
    fs::write(&path, Config::template()).into_diagnostic()?;

    println!(
        "{} Wrote {}",
        style("✓").green(),
        style(path.display()).cyan()
    );
    Ok(())
}

// Helper functions

fn get_global_config_path() -> Result<PathBuf> {
    Config::global_config_path()
        .ok_or_else(|| miette::miette!("Could not determine global config directory"))
}

fn get_config_value(config: &Config, key: &str) -> Option<String> {
    let path = |p: Option<PathBuf>| p.map(|p| p.display().to_string());
    match key {
        "survey_dir" => path(config.survey_dir.clone()),
        "tray_dir" => path(config.tray_dir.clone()),
        "database" => path(config.database.clone()),
        "inventory" => path(config.inventory_path()),
        "image_dir" => path(config.image_dir()),
        "inst_code" => config.inst_code.clone(),
        "institution_name" => config.institution_name.clone(),
        _ => None,
    }
}

fn print_config_value(key: &str, value: Option<&str>, description: &str) {
    match value {
        Some(v) => println!("  {:<18} {}", style(key).cyan(), style(v).yellow()),
        None => println!(
            "  {:<18} {}  {}",
            style(key).cyan(),
            style("(not set)").dim(),
            style(description).dim()
        ),
    }
}

fn print_path(label: &str, path: &Path) {
    println!("  {:<9} {}", style(label).cyan(), path.display());
    if path.exists() {
        println!("            {}", style("(exists)").green());
    } else {
        println!("            {}", style("(not created)").dim());
    }
}
