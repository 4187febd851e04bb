//! Integration tests for the ogp CLI
//!
//! These tests exercise the CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use ogp::core::SqliteClient;
use ogp::entities::ComponentKind;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const TRAY: &str = "\
p1_center_pin_xy: [100.0, 100.0]
p1O_xy: [200.0, 100.0]
p2_center_pin_xy: [300.0, 100.0]
p2M_xy: [400.0, 100.0]
";

/// Survey of a Full HD component on tray 1, position 1
fn survey(component: &str, fd1_x: f64) -> String {
    format!(
        "\
OGP Survey
Runtime: 06:03:24 09:30:00
Component ID: {component}
Operator: alice
Geometry: Full
Density: HD
Flatness: 0.05
Thickness: 1.6
Position ID: 1
TrayNo: 1
Weight: 12.5
Comment: integration
---
Circle FD1
Point {fd1_x} 100.0 1.50
Circle FD2
Point 100.02 130.0 1.60
Circle FD3
Point 70.02 100.0 1.70
Circle FD4
Point 100.02 70.0 1.60
Point Thick1
Point 100.0 100.0 1.61
"
    )
}

/// Temp workspace with survey tree, tray files and databases
struct Workspace {
    tmp: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("surveys/protomodules")).unwrap();
        fs::create_dir_all(tmp.path().join("trays")).unwrap();
        fs::create_dir_all(tmp.path().join("home")).unwrap();
        fs::write(tmp.path().join("trays/001.yaml"), TRAY).unwrap();
        Self { tmp }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.tmp.path().join(rel)
    }

    fn add_protomodule(&self, file: &str, component: &str) {
        fs::write(
            self.path("surveys/protomodules").join(file),
            survey(component, 130.02),
        )
        .unwrap();
    }

    fn register(&self, names: &[&str]) {
        let db = SqliteClient::open(&self.path("ogp.db")).unwrap();
        for name in names {
            db.register(ComponentKind::Protomodule, name).unwrap();
        }
    }

    fn inspections(&self) -> usize {
        SqliteClient::open(&self.path("ogp.db"))
            .unwrap()
            .inspection_count(ComponentKind::Protomodule)
            .unwrap()
    }

    /// An ogp command configured for this workspace and isolated from the user's config
    fn ogp(&self) -> Command {
        let mut cmd = Command::cargo_bin("ogp").unwrap();
        cmd.current_dir(self.tmp.path())
            .env("HOME", self.path("home"))
            .env("XDG_CONFIG_HOME", self.path("home/.config"))
            .env_remove("OGP_CONFIG")
            .env_remove("RUST_LOG")
            .env("OGP_SURVEY_DIR", self.path("surveys"))
            .env("OGP_TRAY_DIR", self.path("trays"))
            .env("OGP_DATABASE", self.path("ogp.db"))
            .env("OGP_INVENTORY", self.path("inventory.db"))
            .env("OGP_IMAGE_DIR", self.path("images"));
        cmd
    }
}

// ============================================================================
// CLI Basic Tests
// ============================================================================

#[test]
fn test_help_displays() {
    Command::cargo_bin("ogp")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("inventory"));
}

#[test]
fn test_version_displays() {
    Command::cargo_bin("ogp")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ogp"));
}

#[test]
fn test_completions_bash() {
    Command::cargo_bin("ogp")
        .unwrap()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ogp"));
}

// ============================================================================
// Upload Tests
// ============================================================================

#[test]
fn test_upload_requires_configuration() {
    let ws = Workspace::new();
    ws.ogp()
        .env_remove("OGP_SURVEY_DIR")
        .env_remove("OGP_DATABASE")
        .arg("upload")
        .assert()
        .failure()
        .stderr(predicate::str::contains("survey_dir"));
}

#[test]
fn test_upload_is_idempotent() {
    let ws = Workspace::new();
    ws.add_protomodule("PM1_alice.txt", "PM1");
    ws.add_protomodule("PM2_alice.txt", "PM2");
    ws.register(&["PM1", "PM2"]);

    ws.ogp()
        .arg("upload")
        .assert()
        .success()
        .stdout(predicate::str::contains("Uploaded 2 of 2"))
        .stdout(predicate::str::contains("PM1"));
    assert_eq!(ws.inspections(), 2);
    assert!(ws.path("images/protomodules/PM1_alice_heights.png").exists());
    assert!(ws.path("images/protomodules/PM1_offsetplot.png").exists());
    assert!(ws.path("images/protomodules/PM1_FDpoints.png").exists());

    ws.ogp()
        .arg("upload")
        .assert()
        .success()
        .stdout(predicate::str::contains("No new survey files"));
    assert_eq!(ws.inspections(), 2);
}

#[test]
fn test_unregistered_component_declined_without_prompt() {
    let ws = Workspace::new();
    ws.add_protomodule("PM9.txt", "PM9");

    ws.ogp()
        .args(["upload", "--no-prompt"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("not registered"));
    assert_eq!(ws.inspections(), 0);

    // Answering yes uploads without linking
    ws.ogp()
        .args(["upload", "--yes"])
        .assert()
        .success();
    assert_eq!(ws.inspections(), 1);
}

#[test]
fn test_rejected_file_fails_run() {
    let ws = Workspace::new();
    fs::write(
        ws.path("surveys/protomodules/broken.txt"),
        "Operator: alice\n---\n",
    )
    .unwrap();

    ws.ogp()
        .args(["upload", "--no-prompt"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("TrayNo"));
}

#[test]
fn test_three_fiducials_rejected_before_upload() {
    let ws = Workspace::new();
    ws.register(&["PM1"]);
    let text = survey("PM1", 130.02).replace("Circle FD4\nPoint 100.02 70.0 1.60\n", "");
    fs::write(ws.path("surveys/protomodules/PM1.txt"), text).unwrap();

    ws.ogp()
        .args(["upload", "--no-prompt"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("invalid survey data"))
        .stdout(predicate::str::contains("2, 4, 6, or 8"));
    assert_eq!(ws.inspections(), 0);

    ws.ogp()
        .args(["inventory", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No files uploaded yet"));
}

#[test]
fn test_dry_run_uploads_nothing() {
    let ws = Workspace::new();
    ws.add_protomodule("PM1.txt", "PM1");

    ws.ogp()
        .args(["upload", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Checked 1 of 1"));
    assert_eq!(ws.inspections(), 0);

    ws.ogp()
        .args(["inventory", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No files uploaded yet"));
}

#[test]
fn test_type_filter() {
    let ws = Workspace::new();
    ws.add_protomodule("PM1.txt", "PM1");
    ws.register(&["PM1"]);

    ws.ogp()
        .args(["upload", "--type", "modules"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No new survey files"));
    assert_eq!(ws.inspections(), 0);
}

// ============================================================================
// Inventory Tests
// ============================================================================

#[test]
fn test_inventory_list_and_clear() {
    let ws = Workspace::new();
    ws.add_protomodule("PM1.txt", "PM1");
    ws.register(&["PM1"]);
    ws.ogp().arg("upload").assert().success();

    ws.ogp()
        .args(["inventory", "list", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"kind\": \"protomodule\""));

    ws.ogp()
        .args(["inventory", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("protomodule"));

    // Clearing without --force needs a terminal
    ws.ogp().args(["inventory", "clear"]).assert().failure();

    ws.ogp()
        .args(["inventory", "clear", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 1"));

    ws.ogp().arg("upload").assert().success();
    assert_eq!(ws.inspections(), 2);
}

// ============================================================================
// Check and Parse Tests
// ============================================================================

#[test]
fn test_check_prints_grade() {
    let ws = Workspace::new();
    ws.add_protomodule("PM1.txt", "PM1");

    ws.ogp()
        .args(["check", "surveys/protomodules/PM1.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Grade: A"))
        .stdout(predicate::str::contains("FD1, FD2, FD3, FD4"));

    ws.ogp()
        .args(["check", "surveys/protomodules/PM1.txt", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"x_offset_um\": 20"))
        .stdout(predicate::str::contains("\"grade\": \"A\""));
}

#[test]
fn test_check_rejects_baseplate() {
    let ws = Workspace::new();
    ws.add_protomodule("PM1.txt", "PM1");

    ws.ogp()
        .args(["check", "surveys/protomodules/PM1.txt", "--type", "baseplate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no alignment measurement"));
}

#[test]
fn test_check_out_of_range() {
    let ws = Workspace::new();
    fs::write(
        ws.path("surveys/protomodules/far.txt"),
        survey("PM1", 190.0),
    )
    .unwrap();

    ws.ogp()
        .args(["check", "surveys/protomodules/far.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exceeds"));
}

#[test]
fn test_parse_exports_files() {
    let ws = Workspace::new();
    ws.add_protomodule("PM1.txt", "PM1");

    ws.ogp()
        .args(["parse", "surveys/protomodules/PM1.txt", "--out", "parsed"])
        .assert()
        .success();
    assert!(ws.path("parsed/PM1_alice_meta.yaml").exists());
    let csv = fs::read_to_string(ws.path("parsed/PM1_alice.csv")).unwrap();
    assert!(csv.starts_with("FeatureType,FeatureName"));

    ws.ogp()
        .args(["parse", "surveys/protomodules/PM1.txt", "--out", "surveys/protomodules"])
        .assert()
        .failure();
}

#[test]
fn test_parse_backup_not_uploaded() {
    let ws = Workspace::new();
    ws.add_protomodule("PM1.txt", "PM1");
    ws.register(&["PM1"]);

    ws.ogp()
        .args(["parse", "surveys/protomodules/PM1.txt", "--out", "parsed", "--backup"])
        .assert()
        .success()
        .stdout(predicate::str::contains(".backup"));
    let meta = fs::read_to_string(ws.path("parsed/PM1_alice_meta.yaml")).unwrap();
    assert!(meta.contains("ComponentID: PM1"));
    assert_eq!(
        fs::read_to_string(ws.path("surveys/protomodules/.backup/PM1.txt")).unwrap(),
        survey("PM1", 130.02)
    );

    // The backup folder is not a survey source
    ws.ogp()
        .args(["upload", "--no-prompt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Uploaded 1 of 1"));
    assert_eq!(ws.inspections(), 1);
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_config_init_and_show() {
    let ws = Workspace::new();
    let path = ws.path("ogp.yaml");

    ws.ogp()
        .args(["config", "init"])
        .arg(&path)
        .assert()
        .success();
    assert!(path.exists());

    ws.ogp()
        .args(["config", "show", "survey_dir"])
        .assert()
        .success()
        .stdout(predicate::str::contains("surveys"));

    ws.ogp()
        .args(["config", "show", "colour"])
        .assert()
        .failure();
}

#[test]
fn test_config_show_institution() {
    let ws = Workspace::new();
    fs::write(ws.path("ogp.yaml"), "inst_code: CMU\ninstitution_name: Carnegie Mellon\n").unwrap();

    ws.ogp()
        .args(["--config", "ogp.yaml", "config", "show", "inst_code"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CMU"));
}

#[test]
fn test_unreadable_global_config_is_skipped() {
    let ws = Workspace::new();
    // A directory where the global config file should be
    fs::create_dir_all(ws.path("home/.config/ogp/config.yaml")).unwrap();

    ws.ogp()
        .args(["config", "show", "survey_dir"])
        .assert()
        .success()
        .stdout(predicate::str::contains("surveys"))
        .stderr(predicate::str::contains("cannot read config"));
}
