//! Target schema metadata.
//!
//! A [`SchemaSnapshot`] is immutable once built. The external schema watcher
//! publishes new snapshots through a [`SchemaHandle`], which swaps the whole
//! snapshot at once so readers never see a mix of old and new columns.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{ReplayError, Result};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Column name.
    pub name: String,

    /// Data type (e.g., "integer", "jsonb", "timestamp with time zone").
    #[serde(default)]
    pub data_type: String,

    /// Ordinal position (1-based). Zero means "position in the document".
    #[serde(default)]
    pub position: i32,

    /// Whether the column allows NULL.
    #[serde(default = "default_true")]
    pub nullable: bool,

    /// Whether the target computes the column itself.
    #[serde(default)]
    pub is_generated: bool,

    /// Whether the column is part of the primary key.
    #[serde(default)]
    pub is_primary_key: bool,
}

fn default_true() -> bool {
    true
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, position: i32) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            position,
            nullable: true,
            is_generated: false,
            is_primary_key: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    pub fn generated(mut self) -> Self {
        self.is_generated = true;
        self
    }
}

/// Serialized table definition, as found in schema documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDef {
    /// Schema name.
    pub schema: String,

    /// Table name.
    pub name: String,

    /// Column definitions.
    pub columns: Vec<ColumnMeta>,
}

/// Table metadata with a name index.
#[derive(Debug, Clone)]
pub struct TableSchema {
    schema: String,
    name: String,
    columns: Vec<ColumnMeta>,
    by_name: HashMap<String, usize>,
}

impl TableSchema {
    /// Build a table from its column list.
    ///
    /// Columns are stored in position order. A position of 0 means "use the
    /// list index". Duplicate names and duplicate positions are rejected.
    pub fn new(
        schema: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<ColumnMeta>,
    ) -> Result<Self> {
        let schema = schema.into();
        let name = name.into();

        let mut columns: Vec<ColumnMeta> = columns
            .into_iter()
            .enumerate()
            .map(|(i, mut c)| {
                if c.position <= 0 {
                    c.position = i as i32 + 1;
                }
                c
            })
            .collect();
        columns.sort_by_key(|c| c.position);
        if let Some(pair) = columns.windows(2).find(|w| w[0].position == w[1].position) {
            return Err(ReplayError::Config(format!(
                "table {}.{}: columns '{}' and '{}' share position {}",
                schema, name, pair[0].name, pair[1].name, pair[0].position
            )));
        }

        let mut by_name = HashMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            if by_name.insert(col.name.clone(), i).is_some() {
                return Err(ReplayError::Config(format!(
                    "table {}.{} declares column '{}' twice",
                    schema, name, col.name
                )));
            }
        }

        Ok(Self {
            schema,
            name,
            columns,
            by_name,
        })
    }

    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.by_name.get(name).map(|&i| &self.columns[i])
    }

    /// Columns in target position order.
    pub fn ordered_columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Primary key columns in position order.
    pub fn primary_key(&self) -> Vec<&ColumnMeta> {
        self.columns.iter().filter(|c| c.is_primary_key).collect()
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        self.columns.iter().any(|c| c.is_primary_key)
    }

    fn to_def(&self) -> TableDef {
        TableDef {
            schema: self.schema.clone(),
            name: self.name.clone(),
            columns: self.columns.clone(),
        }
    }
}

/// Schema document loaded from YAML or JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub tables: Vec<TableDef>,
}

/// Immutable per-table metadata lookup.
#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    tables: HashMap<String, Arc<TableSchema>>,
}

impl SchemaSnapshot {
    /// Build a snapshot from table definitions.
    pub fn from_tables(defs: Vec<TableDef>) -> Result<Self> {
        let mut tables = HashMap::with_capacity(defs.len());
        for def in defs {
            let table = TableSchema::new(def.schema, def.name, def.columns)?;
            let key = table.full_name();
            if tables.insert(key.clone(), Arc::new(table)).is_some() {
                return Err(ReplayError::Config(format!(
                    "table {} is defined twice",
                    key
                )));
            }
        }
        Ok(Self { tables })
    }

    /// Parse a snapshot from a YAML (or JSON) schema document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let doc: SchemaDocument = serde_yaml::from_str(yaml)?;
        Self::from_tables(doc.tables)
    }

    /// Load a snapshot from a schema document file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Columns of `schema.table`, or `None` for an unknown table.
    pub fn columns_for(&self, qualified_table: &str) -> Option<&TableSchema> {
        self.tables.get(qualified_table).map(|t| t.as_ref())
    }

    /// Number of tables in the snapshot.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// SHA256 digest of the snapshot contents, independent of insertion order.
    pub fn fingerprint(&self) -> String {
        let mut keys: Vec<&String> = self.tables.keys().collect();
        keys.sort();

        let mut hasher = Sha256::new();
        for key in keys {
            let def = self.tables[key].to_def();
            let encoded = serde_json::to_vec(&def).unwrap_or_default();
            hasher.update(&encoded);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Source of the current schema snapshot.
///
/// Implemented by [`SchemaHandle`]; the schema watcher that refreshes it
/// lives outside this crate.
pub trait SchemaProvider: Send + Sync {
    fn current(&self) -> Arc<SchemaSnapshot>;
}

/// Shared, hot-swappable handle to the current snapshot.
#[derive(Debug, Clone)]
pub struct SchemaHandle {
    inner: Arc<RwLock<Arc<SchemaSnapshot>>>,
}

impl SchemaHandle {
    pub fn new(snapshot: SchemaSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    /// Publish a new snapshot, returning the one it replaced.
    ///
    /// Invocations that already hold the previous snapshot keep using it
    /// until they finish.
    pub fn replace(&self, snapshot: SchemaSnapshot) -> Arc<SchemaSnapshot> {
        let next = Arc::new(snapshot);
        info!(
            "Schema snapshot replaced: {} tables, fingerprint {}",
            next.len(),
            &next.fingerprint()[..12]
        );
        std::mem::replace(&mut *self.inner.write(), next)
    }
}

impl SchemaProvider for SchemaHandle {
    fn current(&self) -> Arc<SchemaSnapshot> {
        self.inner.read().clone()
    }
}
