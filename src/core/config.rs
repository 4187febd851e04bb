//! Configuration management with layered hierarchy

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use miette::{IntoDiagnostic, Result};

/// Uploader configuration with layered hierarchy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root holding `baseplates/`, `hexaboards/`, `protomodules/`, `modules/`
    pub survey_dir: Option<PathBuf>,

    /// Directory of tray reference files (`<NNN>.yaml`)
    pub tray_dir: Option<PathBuf>,

    /// SQLite file of the inspection database
    pub database: Option<PathBuf>,

    /// SQLite file recording uploaded surveys
    pub inventory: Option<PathBuf>,

    /// Where rendered images are saved (default `<survey_dir>/images`)
    pub image_dir: Option<PathBuf>,

    /// Institution code, reported by `ogp config show`
    pub inst_code: Option<String>,

    pub institution_name: Option<String>,
}

/// Problems found by [`Config::verify`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub key: &'static str,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();

        // 1. Built-in defaults (already in Default impl)

        // 2. Global user config (~/.config/ogp/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                config.merge_lenient(&global_path);
            }
        }

        // 3. Explicit --config file; errors here are fatal
        if let Some(path) = explicit {
            config.merge(Self::from_file(path)?);
        }

        // 4. Environment variables
        config.merge(Self::from_env());

        Ok(config)
    }

    /// Read a single config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| miette::miette!("Cannot read config {}: {}", path.display(), e))?;
        serde_yml::from_str(&contents).into_diagnostic()
    }

    fn from_env() -> Self {
        let path = |key: &str| std::env::var_os(key).map(PathBuf::from);
        Config {
            survey_dir: path("OGP_SURVEY_DIR"),
            tray_dir: path("OGP_TRAY_DIR"),
            database: path("OGP_DATABASE"),
            inventory: path("OGP_INVENTORY"),
            image_dir: path("OGP_IMAGE_DIR"),
            inst_code: None,
            institution_name: None,
        }
    }

    /// Get the path to the global config file
    pub fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "ogp")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge a config file, logging and skipping it when it is unusable
    fn merge_lenient(&mut self, path: &Path) {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(path = %path.display(), "cannot read config, ignoring it: {}", e);
                return;
            }
        };
        match serde_yml::from_str::<Config>(&contents) {
            Ok(other) => self.merge(other),
            Err(e) => tracing::warn!(path = %path.display(), "invalid config, ignoring it: {}", e),
        }
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Config) {
        if other.survey_dir.is_some() {
            self.survey_dir = other.survey_dir;
        }
        if other.tray_dir.is_some() {
            self.tray_dir = other.tray_dir;
        }
        if other.database.is_some() {
            self.database = other.database;
        }
        if other.inventory.is_some() {
            self.inventory = other.inventory;
        }
        if other.image_dir.is_some() {
            self.image_dir = other.image_dir;
        }
        if other.inst_code.is_some() {
            self.inst_code = other.inst_code;
        }
        if other.institution_name.is_some() {
            self.institution_name = other.institution_name;
        }
    }

    /// Image directory, defaulting under the survey directory
    pub fn image_dir(&self) -> Option<PathBuf> {
        self.image_dir
            .clone()
            .or_else(|| self.survey_dir.as_ref().map(|d| d.join("images")))
    }

    /// Inventory file, defaulting next to the database
    pub fn inventory_path(&self) -> Option<PathBuf> {
        self.inventory.clone().or_else(|| {
            self.database
                .as_ref()
                .map(|db| db.with_file_name("ogp_inventory.db"))
        })
    }

    /// Report missing keys and directories that do not exist
    pub fn verify(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        for (key, dir) in [("survey_dir", &self.survey_dir), ("tray_dir", &self.tray_dir)] {
            match dir {
                None => issues.push(ConfigIssue {
                    key,
                    message: "not set".to_string(),
                }),
                Some(d) if !d.is_dir() => issues.push(ConfigIssue {
                    key,
                    message: format!("{} is not a directory", d.display()),
                }),
                Some(_) => {}
            }
        }

        if self.database.is_none() {
            issues.push(ConfigIssue {
                key: "database",
                message: "not set".to_string(),
            });
        }

        issues
    }

    pub fn require_survey_dir(&self) -> Result<&Path> {
        required("survey_dir", &self.survey_dir)
    }

    pub fn require_tray_dir(&self) -> Result<&Path> {
        required("tray_dir", &self.tray_dir)
    }

    pub fn require_database(&self) -> Result<&Path> {
        required("database", &self.database)
    }

    pub fn require_inventory(&self) -> Result<PathBuf> {
        self.inventory_path().ok_or_else(|| not_set("inventory"))
    }

    /// Commented default file written by `ogp config init`
    pub fn template() -> &'static str {
        r#"# OGP survey uploader configuration

# Root directory holding baseplates/, hexaboards/, protomodules/, modules/
survey_dir: /path/to/surveys

# Directory of tray reference files (001.yaml, 002.yaml, ...)
tray_dir: /path/to/trays

# SQLite inspection database
database: /path/to/inspections.db

# SQLite inventory of uploaded survey files
inventory: /path/to/ogp_inventory.db

# Rendered images; defaults to <survey_dir>/images
# image_dir: /path/to/images

inst_code: ""
institution_name: ""
"#
    }
}

fn required<'a>(key: &str, value: &'a Option<PathBuf>) -> Result<&'a Path> {
    value.as_deref().ok_or_else(|| not_set(key))
}

fn not_set(key: &str) -> miette::Report {
    miette::miette!(
        help = "set it in the config file (`ogp config init`) or via the environment",
        "Configuration key '{}' is not set",
        key
    )
}
