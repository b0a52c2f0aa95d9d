//! # wal-replay
//!
//! Write path for replaying change-data-capture events into PostgreSQL.
//!
//! Decoded change events carry column values in whatever shape the upstream
//! decoder produced: decoded JSON structures, plain scalars, or payloads that
//! an earlier stage already serialized. This library turns them into one
//! canonical value per target type and writes them out:
//!
//! - **Normalization** of JSON-family columns without double encoding
//! - **Row mode** with parameterized INSERT/UPDATE/DELETE statements
//! - **Bulk mode** using the PostgreSQL COPY protocol (text or binary)
//! - **Schema snapshots** that can be swapped while adapters are running
//!
//! ## Example
//!
//! ```rust
//! use wal_replay::adapter::RowAdapter;
//! use wal_replay::core::{ChangeColumn, ColumnValue, SchemaSnapshot};
//!
//! let snapshot = SchemaSnapshot::from_yaml(r#"
//! tables:
//!   - schema: public
//!     name: users
//!     columns:
//!       - { name: id, data_type: integer, is_primary_key: true }
//!       - { name: data, data_type: jsonb }
//! "#).unwrap();
//!
//! let columns = vec![
//!     ChangeColumn::new("id", "integer", ColumnValue::Int(1)),
//!     ChangeColumn::new("data", "jsonb", ColumnValue::Json(serde_json::json!({"a": 1}))),
//! ];
//!
//! let row = RowAdapter::default().adapt("public.users", &columns, &snapshot).unwrap();
//! assert_eq!(row.names, vec!["id", "data"]);
//! assert_eq!(row.values[1].as_json_bytes(), Some(&br#"{"a":1}"#[..]));
//! ```

pub mod adapter;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod drivers;
pub mod error;
pub mod normalize;

// Re-exports for convenient access
pub use adapter::{AdaptedRow, BulkAdapter, CopyEncoder, CopyFormat, RowAdapter, Strictness};
pub use config::{AdapterConfig, Config, DispatchConfig, TargetConfig};
pub use crate::core::{ChangeColumn, ChangeEvent, ColumnValue, SchemaHandle, SchemaSnapshot, SqlValue};
pub use dispatch::{BatchStats, StorageDriver, WriteDispatcher, WriteMode};
pub use drivers::PostgresDriver;
pub use error::{ReplayError, Result};
pub use normalize::{JsonEncoder, ValueNormalizer};
