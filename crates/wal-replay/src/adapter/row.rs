//! Row adapter for parameterized INSERT/UPDATE/DELETE statements.

use crate::core::{ChangeColumn, SchemaSnapshot};
use crate::error::Result;
use crate::normalize::ValueNormalizer;

use super::{adapt_columns, AdaptedRow, ColumnOrder, Strictness};

/// Filters and normalizes change columns, keeping input order.
///
/// Statements bind by name, so the output is not re-sorted.
#[derive(Debug, Clone, Default)]
pub struct RowAdapter {
    normalizer: ValueNormalizer,
    strictness: Strictness,
}

impl RowAdapter {
    pub fn new(normalizer: ValueNormalizer, strictness: Strictness) -> Self {
        let normalizer = normalizer.with_strict_types(strictness.types);
        Self {
            normalizer,
            strictness,
        }
    }

    /// Adapt the columns of one change event on `table` (`schema.table`).
    ///
    /// All-or-nothing: either every eligible column is normalized or an
    /// error is returned.
    pub fn adapt<'a>(
        &self,
        table: &str,
        columns: &'a [ChangeColumn],
        snapshot: &SchemaSnapshot,
    ) -> Result<AdaptedRow<'a>> {
        adapt_columns(
            &self.normalizer,
            self.strictness,
            table,
            columns,
            snapshot,
            ColumnOrder::Input,
        )
    }
}
