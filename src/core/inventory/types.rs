//! Inventory type definitions

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::entities::ComponentKind;

/// Content identity of a survey file (SHA-256 of its bytes, hex)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FileIdentity(String);

impl FileIdentity {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        FileIdentity(format!("{:x}", hasher.finalize()))
    }

    pub fn of_file(path: &Path) -> std::io::Result<Self> {
        Ok(Self::of_bytes(&std::fs::read(path)?))
    }

    /// Wrap an identity read back from storage
    pub fn from_hex(hex: impl Into<String>) -> Self {
        FileIdentity(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First characters of the hash, for display
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl std::fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A survey file whose upload was confirmed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryEntry {
    pub identity: FileIdentity,
    /// Where the file was when it was processed; display only
    pub path: PathBuf,
    pub kind: ComponentKind,
    pub processed_at: DateTime<Utc>,
}

impl InventoryEntry {
    pub fn new(identity: FileIdentity, path: impl Into<PathBuf>, kind: ComponentKind) -> Self {
        Self {
            identity,
            path: path.into(),
            kind,
            processed_at: Utc::now(),
        }
    }
}

/// Inventory statistics
#[derive(Debug, Default)]
pub struct InventoryStats {
    pub total: usize,
    pub by_kind: BTreeMap<ComponentKind, usize>,
    pub db_size_bytes: u64,
}
