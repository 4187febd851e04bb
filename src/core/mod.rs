//! Core module - configuration, persistence and the batch pipeline

pub mod config;
pub mod database;
pub mod inventory;
pub mod pipeline;
pub mod policy;
pub mod tray;

pub use config::{Config, ConfigIssue};
pub use database::{DatabaseClient, FieldValue, SqliteClient, UploadError, UploadRecord};
pub use inventory::{FileIdentity, Inventory, InventoryEntry, InventoryStats};
pub use pipeline::{discover, Candidate, FileOutcome, FileState, Pipeline, PipelineError, RunSummary, Stage};
pub use policy::{DecisionPolicy, FixedPolicy, InteractivePolicy};
pub use tray::{DirTrayStore, TrayError, TrayReferences, TrayStore};
