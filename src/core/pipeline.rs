//! Batch processing of survey files
//!
//! Each file moves through `Discovered → Parsed → Computed → Uploaded →
//! Recorded`, or stops in `Failed`. A file reaches the inventory only after
//! the relational store confirmed its row, so an interrupted run is resumed
//! by running again.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use miette::{Diagnostic, IntoDiagnostic, Result};
use thiserror::Error;
use walkdir::WalkDir;

use crate::alignment::{AlignmentEngine, AlignmentError};
use crate::core::database::{DatabaseClient, UploadError, UploadRecord};
use crate::core::inventory::{FileIdentity, Inventory, InventoryEntry};
use crate::core::policy::DecisionPolicy;
use crate::core::tray::{TrayError, TrayStore};
use crate::entities::{ComponentKind, Grade, OffsetResult};
use crate::parser::{ParseError, SurveyParser};
use crate::record::{MeasureError, PlotRenderer, PngRenderer, RecordBuilder};

/// Extension of survey files written by the OGP
const SURVEY_EXTENSION: &str = "txt";

/// Processing step of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Compute,
    Upload,
    Record,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Parse => write!(f, "parse"),
            Stage::Compute => write!(f, "compute"),
            Stage::Upload => write!(f, "upload"),
            Stage::Record => write!(f, "record"),
        }
    }
}

/// Why a file was rejected
#[derive(Debug, Clone, Error, Diagnostic, PartialEq)]
pub enum PipelineError {
    #[error("{stage}: invalid survey data: {message}")]
    #[diagnostic(code(ogp::input))]
    InputData { stage: Stage, message: String },

    #[error("{stage}: no reference rule: {message}")]
    #[diagnostic(code(ogp::config))]
    Configuration { stage: Stage, message: String },

    #[error("{stage}: {message}")]
    #[diagnostic(
        code(ogp::range),
        help("an offset this large usually means a fixture or measurement mistake")
    )]
    Range { stage: Stage, message: String },

    #[error("{stage}: {message}")]
    #[diagnostic(code(ogp::upload))]
    Upload { stage: Stage, message: String },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::InputData { stage, .. }
            | PipelineError::Configuration { stage, .. }
            | PipelineError::Range { stage, .. }
            | PipelineError::Upload { stage, .. } => *stage,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            PipelineError::InputData { message, .. }
            | PipelineError::Configuration { message, .. }
            | PipelineError::Range { message, .. }
            | PipelineError::Upload { message, .. } => message,
        }
    }

    fn upload(stage: Stage, error: impl std::fmt::Display) -> Self {
        PipelineError::Upload {
            stage,
            message: error.to_string(),
        }
    }
}

impl From<ParseError> for PipelineError {
    fn from(e: ParseError) -> Self {
        PipelineError::InputData {
            stage: Stage::Parse,
            message: e.to_string(),
        }
    }
}

impl From<MeasureError> for PipelineError {
    fn from(e: MeasureError) -> Self {
        let stage = Stage::Compute;
        let message = e.to_string();
        match e {
            MeasureError::Tray(TrayError::NoPinMapping { .. }) => {
                PipelineError::Configuration { stage, message }
            }
            MeasureError::Alignment(ref a) if a.is_configuration() => {
                PipelineError::Configuration { stage, message }
            }
            MeasureError::Alignment(AlignmentError::AngleOutOfRange { .. })
            | MeasureError::Alignment(AlignmentError::OffsetOutOfRange { .. }) => {
                PipelineError::Range { stage, message }
            }
            _ => PipelineError::InputData { stage, message },
        }
    }
}

/// Where a file ended up
#[derive(Debug, Clone, PartialEq)]
pub enum FileState {
    Discovered,
    Parsed,
    Computed,
    Uploaded,
    Recorded,
    Failed(PipelineError),
}

impl FileState {
    pub fn label(&self) -> &'static str {
        match self {
            FileState::Discovered => "pending",
            FileState::Parsed => "parsed",
            FileState::Computed => "computed",
            FileState::Uploaded => "uploaded",
            FileState::Recorded => "recorded",
            FileState::Failed(_) => "failed",
        }
    }
}

/// A survey file not yet in the inventory
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub path: PathBuf,
    pub kind: ComponentKind,
    pub identity: FileIdentity,
}

/// Result of one file of a run
#[derive(Debug, Clone, PartialEq)]
pub struct FileOutcome {
    pub candidate: Candidate,
    pub state: FileState,
    pub component_id: Option<String>,
    pub offsets: Option<OffsetResult>,
}

impl FileOutcome {
    fn pending(candidate: Candidate) -> Self {
        Self {
            candidate,
            state: FileState::Discovered,
            component_id: None,
            offsets: None,
        }
    }

    pub fn grade(&self) -> Option<Grade> {
        self.offsets.map(|o| o.grade)
    }
}

/// What a run did
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Every candidate reached its final state
    pub all_succeeded: bool,
    /// Position of the last file that completed, in candidate order
    pub last_success_index: Option<usize>,
    /// The batch stopped before all candidates were tried
    pub aborted: bool,
    pub outcomes: Vec<FileOutcome>,
}

impl RunSummary {
    /// Files that reached their final state
    pub fn completed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.state, FileState::Recorded | FileState::Computed))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&FileOutcome, &PipelineError)> {
        self.outcomes.iter().filter_map(|o| match &o.state {
            FileState::Failed(e) => Some((o, e)),
            _ => None,
        })
    }
}

/// Survey files under `survey_dir` not yet in the inventory
///
/// Files are read from `<survey_dir>/<kind dir>/*.txt`, kinds in batch
/// order and files by name within a kind. A file whose contents repeat an
/// earlier candidate is skipped.
pub fn discover(
    survey_dir: &Path,
    kinds: &[ComponentKind],
    inventory: &Inventory,
) -> Result<Vec<Candidate>> {
    let mut ordered: Vec<ComponentKind> = kinds.to_vec();
    ordered.sort();
    ordered.dedup();

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for kind in ordered {
        let dir = survey_dir.join(kind.dir_name());
        if !dir.is_dir() {
            tracing::debug!(dir = %dir.display(), "no survey directory for {}", kind);
            continue;
        }

        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(SURVEY_EXTENSION)
            {
                continue;
            }

            let identity = FileIdentity::of_file(path).into_diagnostic()?;
            if inventory.contains(&identity)? {
                tracing::debug!(file = %path.display(), "already uploaded");
                continue;
            }
            if !seen.insert(identity.clone()) {
                tracing::warn!(file = %path.display(), "same contents as an earlier file; skipped");
                continue;
            }

            candidates.push(Candidate {
                path: path.to_path_buf(),
                kind,
                identity,
            });
        }
    }

    Ok(candidates)
}

/// Drives candidates through parse, compute, upload and record
pub struct Pipeline<'a> {
    parser: &'a dyn SurveyParser,
    engine: &'a AlignmentEngine,
    trays: &'a dyn TrayStore,
    db: &'a dyn DatabaseClient,
    policy: &'a dyn DecisionPolicy,
    image_dir: Option<PathBuf>,
    dry_run: bool,
}

/// How the batch continues after a file
enum Next {
    Continue,
    Stop,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        parser: &'a dyn SurveyParser,
        engine: &'a AlignmentEngine,
        trays: &'a dyn TrayStore,
        db: &'a dyn DatabaseClient,
        policy: &'a dyn DecisionPolicy,
    ) -> Self {
        Self {
            parser,
            engine,
            trays,
            db,
            policy,
            image_dir: None,
            dry_run: false,
        }
    }

    /// Save rendered images under `<dir>/<kind dir>/`
    pub fn with_image_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.image_dir = dir;
        self
    }

    /// Stop every file after its record is built
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn renderer(&self, kind: ComponentKind) -> PngRenderer {
        match &self.image_dir {
            Some(dir) if !self.dry_run => PngRenderer::saving_to(dir.join(kind.dir_name())),
            _ => PngRenderer::new(),
        }
    }

    /// Process candidates in order
    ///
    /// Errors returned here are about the inventory itself; per-file
    /// problems end up in the outcomes.
    pub fn run(&self, candidates: Vec<Candidate>, inventory: &mut Inventory) -> Result<RunSummary> {
        let mut outcomes: Vec<FileOutcome> = candidates.into_iter().map(FileOutcome::pending).collect();
        let total = outcomes.len();
        let final_state = if self.dry_run {
            FileState::Computed
        } else {
            FileState::Recorded
        };
        let mut last_success_index = None;
        let mut aborted = false;

        for (index, outcome) in outcomes.iter_mut().enumerate() {
            let next = self.process(outcome, inventory);
            if outcome.state == final_state {
                last_success_index = Some(index);
            }

            if let Next::Stop = next {
                aborted = index + 1 < total;
                tracing::warn!(file = %outcome.candidate.path.display(), "batch stopped");
                break;
            }
        }

        let all_succeeded = outcomes.iter().all(|o| o.state == final_state);

        Ok(RunSummary {
            all_succeeded,
            last_success_index,
            aborted,
            outcomes,
        })
    }

    fn process(&self, outcome: &mut FileOutcome, inventory: &mut Inventory) -> Next {
        let path = outcome.candidate.path.clone();
        let kind = outcome.candidate.kind;
        tracing::info!(file = %path.display(), %kind, "processing");

        let record = match self.prepare(outcome) {
            Ok(record) => record,
            Err(error) => {
                tracing::error!(file = %path.display(), %error, "file rejected");
                let stop = matches!(error, PipelineError::Upload { .. })
                    || !self.policy.continue_after_failure(&path, &error);
                outcome.state = FileState::Failed(error);
                return if stop { Next::Stop } else { Next::Continue };
            }
        };

        if self.dry_run {
            return Next::Continue;
        }

        if let Err(error) = self.upload(&record) {
            tracing::error!(file = %path.display(), %error, "upload failed");
            outcome.state = FileState::Failed(error);
            return Next::Stop;
        }
        outcome.state = FileState::Uploaded;

        let entry = InventoryEntry::new(outcome.candidate.identity.clone(), &path, kind);
        match inventory.add(&entry) {
            Ok(_) => {
                outcome.state = FileState::Recorded;
                Next::Continue
            }
            Err(e) => {
                tracing::error!(file = %path.display(), "uploaded but not recorded: {}", e);
                outcome.state = FileState::Failed(PipelineError::upload(Stage::Record, e));
                Next::Stop
            }
        }
    }

    /// Parse, compute and build; leaves the outcome at `Computed`
    fn prepare(&self, outcome: &mut FileOutcome) -> Result<UploadRecord, PipelineError> {
        let kind = outcome.candidate.kind;
        let survey = self.parser.parse(&outcome.candidate.path)?;
        outcome.component_id = Some(survey.metadata.component_id.clone());
        outcome.state = FileState::Parsed;

        let renderer = self.renderer(kind);
        let builder = RecordBuilder::new(self.engine, self.trays, &renderer as &dyn PlotRenderer);

        let offsets = builder.measure(kind, &survey, self.policy)?;
        outcome.offsets = offsets;

        let record = builder
            .build(kind, &survey, offsets.as_ref(), self.db)
            .map_err(|e| PipelineError::upload(Stage::Compute, e))?;
        outcome.state = FileState::Computed;
        Ok(record)
    }

    /// Linked insert, falling back to an unlinked one when the operator agrees
    fn upload(&self, record: &UploadRecord) -> Result<(), PipelineError> {
        let name = record.component_name().unwrap_or_default().to_string();
        let link_error = match self.db.link_and_update(record) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if !matches!(link_error, UploadError::NotRegistered { .. })
            || !self.policy.upload_without_link(&name, &link_error)
        {
            return Err(PipelineError::upload(Stage::Upload, link_error));
        }

        tracing::warn!(component = %name, "uploading without component number");
        self.db
            .upload_record(record)
            .map_err(|e| PipelineError::upload(Stage::Upload, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::database::SqliteClient;
    use crate::core::policy::FixedPolicy;
    use crate::core::tray::DirTrayStore;
    use crate::parser::OgpTextParser;
    use std::fs;
    use tempfile::TempDir;

    const TRAY: &str = "p1_center_pin_xy: [100.0, 100.0]\np1O_xy: [200.0, 100.0]\n";

    fn survey_text(component: &str, fd1_x: f64) -> String {
        format!(
            "\
Runtime: 06:03:24 09:30:00
Component ID: {component}
Operator: alice
Geometry: Full
Density: HD
Flatness: 0.05
Position ID: 1
TrayNo: 1
---
Circle FD1
Point {fd1_x} 100.0 1.50
Circle FD2
Point 100.02 130.0 1.60
Circle FD3
Point 70.02 100.0 1.70
Circle FD4
Point 100.02 70.0 1.60
"
        )
    }

    struct Fixture {
        dir: TempDir,
        engine: AlignmentEngine,
        trays: DirTrayStore,
        db: SqliteClient,
        inventory: Inventory,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::create_dir_all(dir.path().join("trays")).unwrap();
            fs::write(dir.path().join("trays/001.yaml"), TRAY).unwrap();
            fs::create_dir_all(dir.path().join("surveys/protomodules")).unwrap();
            let trays = DirTrayStore::new(dir.path().join("trays"));
            Self {
                dir,
                engine: AlignmentEngine::standard().unwrap(),
                trays,
                db: SqliteClient::open_in_memory().unwrap(),
                inventory: Inventory::open_in_memory().unwrap(),
            }
        }

        fn add_survey(&self, file: &str, text: &str) {
            fs::write(self.dir.path().join("surveys/protomodules").join(file), text).unwrap();
        }

        fn discover(&self) -> Vec<Candidate> {
            discover(&self.dir.path().join("surveys"), &ComponentKind::ALL, &self.inventory).unwrap()
        }

        fn run(&mut self, policy: &FixedPolicy, dry_run: bool) -> RunSummary {
            let candidates = self.discover();
            let parser = OgpTextParser::new();
            let pipeline = Pipeline::new(&parser, &self.engine, &self.trays, &self.db, policy)
                .with_dry_run(dry_run);
            pipeline.run(candidates, &mut self.inventory).unwrap()
        }
    }

    #[test]
    fn test_second_run_uploads_nothing() {
        let mut fx = Fixture::new();
        fx.add_survey("a.txt", &survey_text("PM1", 130.02));
        fx.add_survey("b.txt", &survey_text("PM2", 130.02));
        fx.db.register(ComponentKind::Protomodule, "PM1").unwrap();
        fx.db.register(ComponentKind::Protomodule, "PM2").unwrap();

        let first = fx.run(&FixedPolicy::decline_all(), false);
        assert!(first.all_succeeded);
        assert_eq!(first.last_success_index, Some(1));
        assert_eq!(first.outcomes[0].grade(), Some(Grade::A));
        assert_eq!(fx.db.inspection_count(ComponentKind::Protomodule).unwrap(), 2);

        let second = fx.run(&FixedPolicy::decline_all(), false);
        assert!(second.outcomes.is_empty());
        assert!(second.all_succeeded);
        assert_eq!(fx.db.inspection_count(ComponentKind::Protomodule).unwrap(), 2);
        assert_eq!(fx.inventory.list_all().unwrap().len(), 2);
    }

    #[test]
    fn test_failed_file_is_retried_on_next_run() {
        let mut fx = Fixture::new();
        fx.add_survey("a.txt", &survey_text("PM1", 130.02));
        fx.add_survey("b.txt", "Operator: alice\n---\n");
        fx.add_survey("c.txt", &survey_text("PM3", 130.02));
        fx.db.register(ComponentKind::Protomodule, "PM1").unwrap();
        fx.db.register(ComponentKind::Protomodule, "PM3").unwrap();

        let summary = fx.run(&FixedPolicy::decline_all(), false);
        assert!(!summary.all_succeeded);
        assert!(summary.aborted);
        assert_eq!(summary.last_success_index, Some(0));
        assert!(matches!(
            &summary.outcomes[1].state,
            FileState::Failed(PipelineError::InputData { stage: Stage::Parse, .. })
        ));
        assert_eq!(summary.outcomes[2].state, FileState::Discovered);

        let remaining: Vec<String> = fx
            .discover()
            .iter()
            .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(remaining, vec!["b.txt", "c.txt"]);

        // Continuing past the bad file picks up the rest
        let summary = fx.run(&FixedPolicy::accept_all(), false);
        assert!(!summary.all_succeeded);
        assert_eq!(summary.last_success_index, Some(1));
        assert_eq!(fx.inventory.list_all().unwrap().len(), 2);
    }

    #[test]
    fn test_range_error_is_reported() {
        let mut fx = Fixture::new();
        fx.add_survey("a.txt", &survey_text("PM1", 190.0));
        let summary = fx.run(&FixedPolicy::accept_all(), false);
        assert!(matches!(
            &summary.outcomes[0].state,
            FileState::Failed(PipelineError::Range { stage: Stage::Compute, .. })
        ));
        assert_eq!(summary.last_success_index, None);
        assert!(fx.inventory.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_three_fiducials_fail_before_compute() {
        let mut fx = Fixture::new();
        let text = survey_text("PM1", 130.02).replace("Circle FD4\nPoint 100.02 70.0 1.60\n", "");
        fx.add_survey("a.txt", &text);
        fx.db.register(ComponentKind::Protomodule, "PM1").unwrap();

        let summary = fx.run(&FixedPolicy::accept_all(), false);
        assert!(!summary.all_succeeded);
        match &summary.outcomes[0].state {
            FileState::Failed(PipelineError::InputData { stage, message }) => {
                assert_eq!(*stage, Stage::Compute);
                assert!(message.contains("measured 3 fiducial points"), "{message}");
            }
            other => panic!("unexpected state: {other:?}"),
        }
        assert!(summary.outcomes[0].offsets.is_none());
        assert_eq!(fx.db.inspection_count(ComponentKind::Protomodule).unwrap(), 0);
        assert!(fx.inventory.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_declined_unlinked_upload_stops_batch() {
        let mut fx = Fixture::new();
        fx.add_survey("a.txt", &survey_text("PM1", 130.02));
        fx.add_survey("b.txt", &survey_text("PM2", 130.02));

        let summary = fx.run(&FixedPolicy::decline_all(), false);
        assert!(summary.aborted);
        assert!(matches!(
            &summary.outcomes[0].state,
            FileState::Failed(PipelineError::Upload { stage: Stage::Upload, .. })
        ));
        assert_eq!(fx.db.inspection_count(ComponentKind::Protomodule).unwrap(), 0);
        assert!(fx.inventory.list_all().unwrap().is_empty());

        let summary = fx.run(&FixedPolicy::accept_all(), false);
        assert!(summary.all_succeeded);
        assert_eq!(fx.db.inspection_count(ComponentKind::Protomodule).unwrap(), 2);
    }

    #[test]
    fn test_dry_run_records_nothing() {
        let mut fx = Fixture::new();
        fx.add_survey("a.txt", &survey_text("PM1", 130.02));
        let summary = fx.run(&FixedPolicy::accept_all(), true);
        assert!(summary.all_succeeded);
        assert_eq!(summary.outcomes[0].state, FileState::Computed);
        assert_eq!(fx.db.inspection_count(ComponentKind::Protomodule).unwrap(), 0);
        assert_eq!(fx.discover().len(), 1);
    }

    #[test]
    fn test_discover_skips_duplicate_contents_and_other_files() {
        let fx = Fixture::new();
        fx.add_survey("a.txt", &survey_text("PM1", 130.02));
        fx.add_survey("copy.txt", &survey_text("PM1", 130.02));
        fx.add_survey("notes.md", "not a survey");
        fs::create_dir_all(fx.dir.path().join("surveys/baseplates")).unwrap();
        fs::write(fx.dir.path().join("surveys/baseplates/z.txt"), "bp").unwrap();

        let candidates = fx.discover();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].kind, ComponentKind::Baseplate);
        assert_eq!(candidates[1].path.file_name().unwrap(), "a.txt");
    }
}
