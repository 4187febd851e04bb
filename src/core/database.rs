//! Relational store of component inspections
//!
//! Each component kind has a mother table holding registered components and
//! an inspection table receiving one row per uploaded survey. Linking an
//! inspection means resolving `<prefix>_no` from the mother table by name.

use std::collections::BTreeMap;
use std::path::Path;

use miette::Diagnostic;
use rusqlite::types::{ToSql, ToSqlOutput, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use thiserror::Error;

use crate::entities::{ComponentKind, KindParams, OffsetTriple};

/// Current schema version of the relational store
const SCHEMA_VERSION: i32 = 1;

#[derive(Debug, Error, Diagnostic)]
pub enum UploadError {
    #[error("{component_id} is not registered in the {table} table")]
    #[diagnostic(
        code(ogp::upload),
        help("register the component first, or upload without linking")
    )]
    NotRegistered { table: String, component_id: String },

    #[error("record for {table} has no '{column}' field")]
    #[diagnostic(code(ogp::upload))]
    MissingName { table: String, column: String },

    #[error("invalid column name '{0}'")]
    #[diagnostic(code(ogp::upload))]
    InvalidColumn(String),

    #[error("database error: {0}")]
    #[diagnostic(code(ogp::upload))]
    Sqlite(#[from] rusqlite::Error),
}

/// One column value of an upload record
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    /// Stored as a JSON array
    Reals(Vec<f64>),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Real(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Null => write!(f, "-"),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Real(v) => write!(f, "{}", v),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Blob(b) => write!(f, "<{} bytes>", b.len()),
            FieldValue::Reals(v) => write!(f, "[{} values]", v.len()),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Real(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Blob(v)
    }
}

impl From<Vec<f64>> for FieldValue {
    fn from(v: Vec<f64>) -> Self {
        FieldValue::Reals(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Owned(Value::Null),
            FieldValue::Integer(v) => ToSqlOutput::from(*v),
            FieldValue::Real(v) => ToSqlOutput::from(*v),
            FieldValue::Text(s) => ToSqlOutput::from(s.as_str()),
            FieldValue::Blob(b) => ToSqlOutput::from(b.as_slice()),
            FieldValue::Reals(v) => {
                let json = serde_json::to_string(v)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                ToSqlOutput::from(json)
            }
        })
    }
}

/// Column → value mapping for one inspection row
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRecord {
    kind: ComponentKind,
    fields: BTreeMap<String, FieldValue>,
}

impl UploadRecord {
    pub fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn params(&self) -> KindParams {
        self.kind.params()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Value of the `<prefix>_name` column
    pub fn component_name(&self) -> Option<&str> {
        self.get(&self.name_column()).and_then(FieldValue::as_str)
    }

    pub fn name_column(&self) -> String {
        format!("{}_name", self.params().prefix)
    }
}

/// Operations the pipeline needs from the relational store
pub trait DatabaseClient {
    /// Insert the record without linking it to a registered component
    fn upload_record(&self, record: &UploadRecord) -> Result<(), UploadError>;

    /// Resolve the registered component and insert the linked record
    fn link_and_update(&self, record: &UploadRecord) -> Result<(), UploadError>;

    /// Offsets of the protomodule a module was built from, if uploaded
    fn fetch_prior_offsets(&self, module_name: &str) -> Result<Option<OffsetTriple>, UploadError>;
}

/// SQLite implementation of [`DatabaseClient`]
pub struct SqliteClient {
    conn: Connection,
}

impl SqliteClient {
    /// Open or create the store at `path`
    pub fn open(path: &Path) -> Result<Self, UploadError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let client = Self { conn };
        client.init_schema()?;
        Ok(client)
    }

    pub fn open_in_memory() -> Result<Self, UploadError> {
        let client = Self {
            conn: Connection::open_in_memory()?,
        };
        client.init_schema()?;
        Ok(client)
    }

    fn init_schema(&self) -> Result<(), UploadError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            -- Registered components
            CREATE TABLE IF NOT EXISTS baseplate (
                bp_no INTEGER PRIMARY KEY AUTOINCREMENT,
                bp_name TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS hexaboard (
                hxb_no INTEGER PRIMARY KEY AUTOINCREMENT,
                hxb_name TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS protomodule (
                proto_no INTEGER PRIMARY KEY AUTOINCREMENT,
                proto_name TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS module (
                module_no INTEGER PRIMARY KEY AUTOINCREMENT,
                module_name TEXT NOT NULL UNIQUE,
                proto_name TEXT
            );

            -- Inspections
            CREATE TABLE IF NOT EXISTS bp_inspect (
                bp_row_no INTEGER PRIMARY KEY AUTOINCREMENT,
                bp_no INTEGER REFERENCES baseplate(bp_no),
                bp_name TEXT NOT NULL,
                flatness REAL,
                thickness REAL,
                x_points TEXT,
                y_points TEXT,
                z_points TEXT,
                hexplot BLOB,
                inspector TEXT,
                comment TEXT,
                date_inspect TEXT,
                time_inspect TEXT
            );
            CREATE TABLE IF NOT EXISTS hxb_inspect (
                hxb_row_no INTEGER PRIMARY KEY AUTOINCREMENT,
                hxb_no INTEGER REFERENCES hexaboard(hxb_no),
                hxb_name TEXT NOT NULL,
                flatness REAL,
                thickness REAL,
                x_points TEXT,
                y_points TEXT,
                z_points TEXT,
                hexplot BLOB,
                inspector TEXT,
                comment TEXT,
                date_inspect TEXT,
                time_inspect TEXT
            );
            CREATE TABLE IF NOT EXISTS proto_inspect (
                proto_row_no INTEGER PRIMARY KEY AUTOINCREMENT,
                proto_no INTEGER REFERENCES protomodule(proto_no),
                proto_name TEXT NOT NULL,
                x_offset_mu INTEGER,
                y_offset_mu INTEGER,
                ang_offset_deg REAL,
                weight REAL,
                max_thickness REAL,
                avg_thickness REAL,
                grade TEXT,
                offsetplot BLOB,
                x_points TEXT,
                y_points TEXT,
                z_points TEXT,
                hexplot BLOB,
                inspector TEXT,
                comment TEXT,
                date_inspect TEXT,
                time_inspect TEXT
            );
            CREATE TABLE IF NOT EXISTS module_inspect (
                module_row_no INTEGER PRIMARY KEY AUTOINCREMENT,
                module_no INTEGER REFERENCES module(module_no),
                module_name TEXT NOT NULL,
                x_offset_mu INTEGER,
                y_offset_mu INTEGER,
                ang_offset_deg REAL,
                weight REAL,
                max_thickness REAL,
                avg_thickness REAL,
                grade TEXT,
                offsetplot BLOB,
                x_points TEXT,
                y_points TEXT,
                z_points TEXT,
                hexplot BLOB,
                inspector TEXT,
                comment TEXT,
                date_inspect TEXT,
                time_inspect TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_proto_inspect_name ON proto_inspect(proto_name);
            CREATE INDEX IF NOT EXISTS idx_module_inspect_name ON module_inspect(module_name);
            "#,
        )?;

        self.conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Register a component in its mother table, returning its number
    pub fn register(&self, kind: ComponentKind, name: &str) -> Result<i64, UploadError> {
        let p = kind.params();
        self.conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {} ({}_name) VALUES (?1)",
                p.mother_table, p.prefix
            ),
            params![name],
        )?;
        self.component_number(p, name)?
            .ok_or_else(|| UploadError::NotRegistered {
                table: p.mother_table.to_string(),
                component_id: name.to_string(),
            })
    }

    /// Register a module together with the protomodule it was assembled from
    pub fn register_module(&self, name: &str, proto_name: &str) -> Result<i64, UploadError> {
        let number = self.register(ComponentKind::Module, name)?;
        self.conn.execute(
            "UPDATE module SET proto_name = ?1 WHERE module_no = ?2",
            params![proto_name, number],
        )?;
        Ok(number)
    }

    /// Number of inspection rows stored for a kind
    pub fn inspection_count(&self, kind: ComponentKind) -> Result<usize, UploadError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", kind.params().table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn component_number(&self, p: KindParams, name: &str) -> Result<Option<i64>, UploadError> {
        let number = self
            .conn
            .query_row(
                &format!(
                    "SELECT {prefix}_no FROM {table} WHERE {prefix}_name = ?1",
                    prefix = p.prefix,
                    table = p.mother_table
                ),
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(number)
    }

    fn insert(&self, table: &str, fields: &BTreeMap<String, FieldValue>) -> Result<(), UploadError> {
        if let Some(bad) = fields.keys().find(|k| !is_identifier(k)) {
            return Err(UploadError::InvalidColumn(bad.clone()));
        }

        let columns: Vec<&str> = fields.keys().map(String::as_str).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        );

        let inserted = self.conn.execute(&sql, params_from_iter(fields.values()))?;
        tracing::debug!(table, inserted, "inserted inspection row");
        Ok(())
    }
}

impl DatabaseClient for SqliteClient {
    fn upload_record(&self, record: &UploadRecord) -> Result<(), UploadError> {
        let p = record.params();
        self.insert(p.table, record.fields())
    }

    fn link_and_update(&self, record: &UploadRecord) -> Result<(), UploadError> {
        let p = record.params();
        let name = record
            .component_name()
            .ok_or_else(|| UploadError::MissingName {
                table: p.table.to_string(),
                column: record.name_column(),
            })?;

        let number = self
            .component_number(p, name)?
            .ok_or_else(|| UploadError::NotRegistered {
                table: p.mother_table.to_string(),
                component_id: name.to_string(),
            })?;

        let mut fields = record.fields().clone();
        fields.insert(format!("{}_no", p.prefix), FieldValue::Integer(number));
        self.insert(p.table, &fields)
    }

    fn fetch_prior_offsets(&self, module_name: &str) -> Result<Option<OffsetTriple>, UploadError> {
        let triple = self
            .conn
            .query_row(
                r#"
                SELECT p.x_offset_mu, p.y_offset_mu, p.ang_offset_deg
                FROM module m
                JOIN proto_inspect p ON p.proto_name = m.proto_name
                WHERE m.module_name = ?1
                ORDER BY p.proto_row_no DESC
                LIMIT 1
                "#,
                params![module_name],
                |row| {
                    Ok(OffsetTriple {
                        x_um: row.get::<_, Option<f64>>(0)?.unwrap_or(0.0),
                        y_um: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                        angle_deg: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                    })
                },
            )
            .optional()?;
        Ok(triple)
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !s.starts_with(|c: char| c.is_ascii_digit())
}
