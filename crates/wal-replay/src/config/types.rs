//! Configuration type definitions.

use serde::{Deserialize, Serialize};

use crate::adapter::CopyFormat;
use crate::dispatch::OnConflict;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Normalization strictness.
    #[serde(default)]
    pub adapter: AdapterConfig,

    /// Row/bulk dispatch behavior.
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Target database (PostgreSQL) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database type (always "postgres" for now).
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Pool size (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// How the adapters treat schema drift and unknown types.
///
/// Everything defaults to lenient: drifted tables and columns are dropped
/// with a warning, unknown types pass through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Fail on events for tables missing from the schema snapshot.
    #[serde(default)]
    pub strict_tables: bool,

    /// Fail on columns missing from the target table.
    #[serde(default)]
    pub strict_columns: bool,

    /// Fail on declared types without a normalization rule.
    #[serde(default)]
    pub strict_types: bool,
}

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Minimum insert batch size that switches to COPY. 0 disables bulk mode.
    #[serde(default = "default_bulk_threshold")]
    pub bulk_threshold: usize,

    /// COPY payload format for bulk mode.
    #[serde(default)]
    pub bulk_format: CopyFormat,

    /// Row-mode INSERT conflict handling.
    #[serde(default)]
    pub on_conflict: OnConflict,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            bulk_threshold: default_bulk_threshold(),
            bulk_format: CopyFormat::default(),
            on_conflict: OnConflict::default(),
        }
    }
}

// Default value functions for serde
fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_max_connections() -> usize {
    4
}

fn default_bulk_threshold() -> usize {
    500
}
