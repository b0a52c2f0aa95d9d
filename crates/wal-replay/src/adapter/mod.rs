//! Row and bulk adapters.
//!
//! Both adapters share one selection step (schema lookup, generated and
//! unknown column filtering, duplicate detection) and one
//! [`ValueNormalizer`]. They differ only in output order: the row adapter
//! keeps the change event's column order, the bulk adapter reorders by
//! target position. Wire formatting for COPY lives in [`copy`] and runs on
//! canonical values only.

pub mod bulk;
pub mod copy;
pub mod row;

pub use bulk::{BulkAdapter, BulkRow};
pub use copy::{CopyEncoder, CopyFormat};
pub use row::RowAdapter;

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::config::AdapterConfig;
use crate::core::{ChangeColumn, ColumnMeta, SchemaSnapshot, SqlValue};
use crate::error::{ReplayError, Result};
use crate::normalize::{NormalizeWarning, ValueNormalizer};

/// How schema drift and unknown types are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Strictness {
    /// Fail on tables missing from the snapshot instead of skipping the row.
    pub tables: bool,
    /// Fail on columns missing from the table instead of dropping them.
    pub columns: bool,
    /// Fail on declared types without a normalization rule.
    pub types: bool,
}

impl Strictness {
    /// Everything fails hard.
    pub fn strict() -> Self {
        Self {
            tables: true,
            columns: true,
            types: true,
        }
    }
}

impl From<&AdapterConfig> for Strictness {
    fn from(config: &AdapterConfig) -> Self {
        Self {
            tables: config.strict_tables,
            columns: config.strict_columns,
            types: config.strict_types,
        }
    }
}

/// Adapted column set for one change event.
///
/// `names`, `declared_types` and `values` are parallel and of equal length.
/// Names and borrowed values point into the change columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdaptedRow<'a> {
    pub names: Vec<&'a str>,
    pub declared_types: Vec<&'a str>,
    pub values: Vec<SqlValue<'a>>,
    pub warnings: Vec<NormalizeWarning>,
}

impl<'a> AdaptedRow<'a> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Canonical value of a column, by name.
    pub fn value(&self, name: &str) -> Option<&SqlValue<'a>> {
        self.names
            .iter()
            .position(|n| *n == name)
            .map(|i| &self.values[i])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnOrder {
    Input,
    Schema,
}

/// Shared filter + normalize step behind both adapters.
fn adapt_columns<'a>(
    normalizer: &ValueNormalizer,
    strictness: Strictness,
    table: &str,
    columns: &'a [ChangeColumn],
    snapshot: &SchemaSnapshot,
    order: ColumnOrder,
) -> Result<AdaptedRow<'a>> {
    let Some(schema) = snapshot.columns_for(table) else {
        if strictness.tables {
            return Err(ReplayError::UnknownTable(table.to_string()));
        }
        warn!("Skipping change for {}: table not in schema snapshot", table);
        return Ok(AdaptedRow::default());
    };

    let mut seen: HashSet<&str> = HashSet::with_capacity(columns.len());
    let mut selected: Vec<(&ColumnMeta, &'a ChangeColumn)> = Vec::with_capacity(columns.len());

    for column in columns {
        if !seen.insert(column.name.as_str()) {
            return Err(ReplayError::DuplicateColumn {
                table: table.to_string(),
                column: column.name.clone(),
            });
        }

        match schema.column(&column.name) {
            Some(meta) if meta.is_generated => {
                debug!("Dropping generated column {}.{}", table, column.name);
            }
            Some(meta) => selected.push((meta, column)),
            None if strictness.columns => {
                return Err(ReplayError::UnknownColumn {
                    table: table.to_string(),
                    column: column.name.clone(),
                });
            }
            None => {
                warn!("Dropping column {}.{}: not in target schema", table, column.name);
            }
        }
    }

    if order == ColumnOrder::Schema {
        // Positions are unique per table.
        selected.sort_unstable_by_key(|(meta, _)| meta.position);
    }

    let mut row = AdaptedRow {
        names: Vec::with_capacity(selected.len()),
        declared_types: Vec::with_capacity(selected.len()),
        values: Vec::with_capacity(selected.len()),
        warnings: Vec::new(),
    };

    for (_, column) in selected {
        let normalized = normalizer.normalize(table, column)?;
        if let Some(warning) = normalized.warning {
            warn!("{}: {}", table, warning);
            row.warnings.push(warning);
        }
        row.names.push(column.name.as_str());
        row.declared_types.push(column.declared_type.as_str());
        row.values.push(normalized.value);
    }

    debug!("Adapted {} of {} columns for {}", row.len(), columns.len(), table);
    Ok(row)
}


#[cfg(test)]
mod tests {
    use super::test_support::users_snapshot;
    use super::*;
    use crate::core::{ColumnValue, EncodedPayload};
    use serde_json::json;

    fn event_columns() -> Vec<ChangeColumn> {
        vec![
            ChangeColumn::new(
                "data",
                "jsonb",
                ColumnValue::Json(json!({"name": "A 🏳️‍🌈", "tags": ["x"]})),
            ),
            ChangeColumn::new("unknown", "text", ColumnValue::Text("drift".into())),
            ChangeColumn::new("search", "tsvector", ColumnValue::Text("'a'".into())),
            ChangeColumn::new(
                "created_at",
                "timestamp with time zone",
                ColumnValue::Text("2024-05-01 10:00:00+00".into()),
            ),
            ChangeColumn::new("id", "integer", ColumnValue::Int(1)),
            ChangeColumn::new(
                "name",
                "text",
                ColumnValue::Encoded(EncodedPayload::Text("said \"hi\"".into())),
            ),
        ]
    }

    fn sorted_debug(values: &[SqlValue<'_>]) -> Vec<String> {
        let mut out: Vec<String> = values.iter().map(|v| format!("{:?}", v.clone().into_owned())).collect();
        out.sort();
        out
    }

    #[test]
    fn test_cross_adapter_values_equal() {
        let snapshot = users_snapshot();
        let columns = event_columns();
        let normalizer = ValueNormalizer::default();

        let row = RowAdapter::new(normalizer.clone(), Strictness::default())
            .adapt("public.users", &columns, &snapshot)
            .unwrap();
        let bulk = BulkAdapter::new(normalizer, Strictness::default())
            .adapt("public.users", &columns, &snapshot)
            .unwrap();

        assert_eq!(row.len(), bulk.len());
        assert_eq!(sorted_debug(&row.values), sorted_debug(&bulk.values));
        for name in &row.names {
            assert_eq!(row.value(name), bulk.value(name));
        }
    }

    #[test]
    fn test_schema_filtering_both_adapters() {
        let snapshot = users_snapshot();
        let columns = event_columns();
        let row = RowAdapter::default()
            .adapt("public.users", &columns, &snapshot)
            .unwrap();
        let bulk = BulkAdapter::default()
            .adapt("public.users", &columns, &snapshot)
            .unwrap();

        for adapted in [&row, &bulk] {
            assert!(!adapted.names.contains(&"unknown"));
            assert!(!adapted.names.contains(&"search"));
            assert_eq!(adapted.len(), 4);
            let unique: HashSet<&&str> = adapted.names.iter().collect();
            assert_eq!(unique.len(), adapted.names.len());
        }
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let snapshot = users_snapshot();
        let columns = vec![
            ChangeColumn::new("id", "integer", ColumnValue::Int(1)),
            ChangeColumn::new("id", "integer", ColumnValue::Int(2)),
        ];
        let err = RowAdapter::default()
            .adapt("public.users", &columns, &snapshot)
            .unwrap_err();
        assert!(matches!(err, ReplayError::DuplicateColumn { .. }));
    }

    #[test]
    fn test_strictness_from_config() {
        let config = AdapterConfig {
            strict_tables: true,
            strict_columns: false,
            strict_types: true,
        };
        let s = Strictness::from(&config);
        assert!(s.tables && !s.columns && s.types);
        assert_eq!(Strictness::strict(), Strictness { tables: true, columns: true, types: true });
    }
}
