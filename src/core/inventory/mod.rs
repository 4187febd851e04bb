//! SQLite-backed inventory of uploaded survey files
//!
//! The inventory is the only record of which surveys are done:
//! - An entry is added only after the upload was confirmed
//! - Files are identified by the SHA-256 of their contents, so a replaced
//!   file is picked up again even if its name and timestamp did not change
//! - Entries are removed only by an explicit clear

mod schema;
mod types;

pub use types::*;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use miette::{IntoDiagnostic, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::entities::ComponentKind;

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

/// The inventory backed by SQLite
pub struct Inventory {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Inventory {
    /// Open or create the inventory at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).into_diagnostic()?;
            }
        }

        let conn = Connection::open(path).into_diagnostic()?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .into_diagnostic()?;

        let mut inventory = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        inventory.prepare()?;
        Ok(inventory)
    }

    /// Inventory that lives only as long as the value
    pub fn open_in_memory() -> Result<Self> {
        let mut inventory = Self {
            conn: Connection::open_in_memory().into_diagnostic()?,
            path: None,
        };
        inventory.prepare()?;
        Ok(inventory)
    }

    fn prepare(&mut self) -> Result<()> {
        // Entries are the record of completed uploads, so a newer schema is
        // never dropped and rebuilt
        let stored = self.stored_schema_version();
        if stored > SCHEMA_VERSION {
            return Err(miette::miette!(
                help = "upgrade ogp to a version that understands this inventory",
                "Inventory schema version {} is newer than supported version {}",
                stored,
                SCHEMA_VERSION
            ));
        }
        self.init_schema()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether a file with this identity was already uploaded
    pub fn contains(&self, identity: &FileIdentity) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM processed_files WHERE file_hash = ?1",
                params![identity.as_str()],
                |row| row.get(0),
            )
            .optional()
            .into_diagnostic()?;
        Ok(found.is_some())
    }

    /// Record a confirmed upload; adding a known identity again keeps the first entry
    pub fn add(&mut self, entry: &InventoryEntry) -> Result<bool> {
        let inserted = self
            .conn
            .execute(
                r#"INSERT OR IGNORE INTO processed_files (file_hash, file_path, kind, processed_at)
                   VALUES (?1, ?2, ?3, ?4)"#,
                params![
                    entry.identity.as_str(),
                    entry.path.to_string_lossy().into_owned(),
                    entry.kind.as_str(),
                    entry.processed_at.to_rfc3339(),
                ],
            )
            .into_diagnostic()?;
        Ok(inserted > 0)
    }

    /// Remove all entries, returning how many were removed
    pub fn clear(&mut self) -> Result<usize> {
        self.conn
            .execute("DELETE FROM processed_files", [])
            .into_diagnostic()
    }

    /// All entries, oldest first
    pub fn list_all(&self) -> Result<Vec<InventoryEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"SELECT file_hash, file_path, kind, processed_at
                   FROM processed_files
                   ORDER BY processed_at, file_path"#,
            )
            .into_diagnostic()?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .into_diagnostic()?;

        let mut entries = Vec::new();
        for row in rows {
            let (hash, path, kind, processed_at) = row.into_diagnostic()?;
            let kind: ComponentKind = kind.parse().map_err(|e: String| miette::miette!(e))?;
            entries.push(InventoryEntry {
                identity: FileIdentity::from_hex(hash),
                path: PathBuf::from(path),
                kind,
                processed_at: parse_datetime(&processed_at),
            });
        }
        Ok(entries)
    }

    /// Get inventory statistics
    pub fn statistics(&self) -> Result<InventoryStats> {
        let mut stats = InventoryStats::default();
        for entry in self.list_all()? {
            stats.total += 1;
            *stats.by_kind.entry(entry.kind).or_insert(0) += 1;
        }
        stats.db_size_bytes = self
            .path
            .as_ref()
            .and_then(|p| fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0);
        Ok(stats)
    }
}

/// Parse a stored timestamp, falling back to the epoch
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(content: &[u8], name: &str) -> InventoryEntry {
        InventoryEntry::new(
            FileIdentity::of_bytes(content),
            format!("protomodules/{}", name),
            ComponentKind::Protomodule,
        )
    }

    #[test]
    fn test_add_and_contains() {
        let mut inv = Inventory::open_in_memory().unwrap();
        let e = entry(b"survey one", "a.txt");

        assert!(!inv.contains(&e.identity).unwrap());
        assert!(inv.add(&e).unwrap());
        assert!(inv.contains(&e.identity).unwrap());

        // Second add is a no-op
        assert!(!inv.add(&e).unwrap());
        assert_eq!(inv.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_identity_follows_content() {
        let a = FileIdentity::of_bytes(b"same bytes");
        let b = FileIdentity::of_bytes(b"same bytes");
        let c = FileIdentity::of_bytes(b"same bytes, edited");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_clear() {
        let mut inv = Inventory::open_in_memory().unwrap();
        inv.add(&entry(b"1", "a.txt")).unwrap();
        inv.add(&entry(b"2", "b.txt")).unwrap();
        assert_eq!(inv.clear().unwrap(), 2);
        assert!(inv.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("inventory.db");
        let e = entry(b"persisted", "p.txt");
        {
            let mut inv = Inventory::open(&path).unwrap();
            inv.add(&e).unwrap();
        }
        let inv = Inventory::open(&path).unwrap();
        assert!(inv.contains(&e.identity).unwrap());

        let listed = inv.list_all().unwrap();
        assert_eq!(listed[0].kind, ComponentKind::Protomodule);
        assert_eq!(listed[0].path, PathBuf::from("protomodules/p.txt"));

        let stats = inv.statistics().unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.by_kind.get(&ComponentKind::Protomodule), Some(&1));
    }
}
