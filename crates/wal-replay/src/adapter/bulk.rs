//! Bulk adapter for positional COPY loads.

use crate::core::{ChangeColumn, SchemaSnapshot};
use crate::error::Result;
use crate::normalize::ValueNormalizer;

use super::{adapt_columns, AdaptedRow, ColumnOrder, Strictness};

/// Bulk output shares the row shape; only column order differs.
pub type BulkRow<'a> = AdaptedRow<'a>;

/// Filters and normalizes change columns in target column order.
///
/// Canonicalization is the row adapter's; only the order differs. COPY
/// escaping is applied afterwards by [`super::CopyEncoder`].
#[derive(Debug, Clone, Default)]
pub struct BulkAdapter {
    normalizer: ValueNormalizer,
    strictness: Strictness,
}

impl BulkAdapter {
    pub fn new(normalizer: ValueNormalizer, strictness: Strictness) -> Self {
        let normalizer = normalizer.with_strict_types(strictness.types);
        Self {
            normalizer,
            strictness,
        }
    }

    /// Adapt the columns of one change event, ordered by schema position.
    pub fn adapt<'a>(
        &self,
        table: &str,
        columns: &'a [ChangeColumn],
        snapshot: &SchemaSnapshot,
    ) -> Result<BulkRow<'a>> {
        adapt_columns(
            &self.normalizer,
            self.strictness,
            table,
            columns,
            snapshot,
            ColumnOrder::Schema,
        )
    }
}
