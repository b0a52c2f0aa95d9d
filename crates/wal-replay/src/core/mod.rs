//! Core data model shared by the normalizer, adapters and dispatcher.
//!
//! - [`event`]: change events and dynamically-typed change columns
//! - [`schema`]: immutable target schema snapshots and the swap handle
//! - [`value`]: canonical SQL values handed to the storage layer

pub mod event;
pub mod schema;
pub mod value;

pub use event::{Action, ChangeColumn, ChangeEvent, ColumnValue, DeclaredType, EncodedPayload};
pub use schema::{
    ColumnMeta, SchemaDocument, SchemaHandle, SchemaProvider, SchemaSnapshot, TableDef,
    TableSchema,
};
pub use value::{JsonKind, SqlNullType, SqlValue};
