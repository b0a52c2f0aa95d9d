//! Write dispatcher: picks row or bulk mode per batch and drives a
//! [`StorageDriver`].
//!
//! A batch is fully adapted before anything is sent, so an adaptation error
//! leaves the target untouched. Statements run one at a time in event order;
//! there is no enclosing transaction.

pub mod dml;

pub use dml::{DmlBuilder, OnConflict, Statement};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::adapter::copy::copy_statement;
use crate::adapter::{AdaptedRow, BulkAdapter, CopyEncoder, RowAdapter, Strictness};
use crate::config::{Config, DispatchConfig};
use crate::core::{Action, ChangeEvent, DeclaredType, SchemaProvider, SchemaSnapshot, SqlValue, TableSchema};
use crate::error::{ReplayError, Result};
use crate::normalize::ValueNormalizer;

/// Target store seen by the dispatcher.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Run one parameterized statement, returning affected rows.
    async fn execute(&self, sql: &str, params: &[SqlValue<'_>]) -> Result<u64>;

    /// Stream a complete COPY FROM STDIN payload, returning loaded rows.
    async fn copy_in(&self, sql: &str, payload: Bytes) -> Result<u64>;

    /// Get the database type identifier.
    fn db_type(&self) -> &str;
}

/// Which path a batch took.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    #[default]
    Row,
    Bulk,
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteMode::Row => write!(f, "row"),
            WriteMode::Bulk => write!(f, "bulk"),
        }
    }
}

/// Outcome of one [`WriteDispatcher::write_batch`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub mode: WriteMode,
    pub events: usize,
    /// Statements or COPY streams sent.
    pub statements: usize,
    pub rows_written: u64,
    /// Events dropped because their table is not in the snapshot.
    pub skipped: usize,
    pub warnings: usize,
}

/// Routes batches of change events to the storage driver.
pub struct WriteDispatcher {
    driver: Arc<dyn StorageDriver>,
    schema: Arc<dyn SchemaProvider>,
    rows: RowAdapter,
    bulk: BulkAdapter,
    dml: DmlBuilder,
    strictness: Strictness,
    dispatch: DispatchConfig,
}

impl WriteDispatcher {
    pub fn new(
        driver: Arc<dyn StorageDriver>,
        schema: Arc<dyn SchemaProvider>,
        normalizer: ValueNormalizer,
        strictness: Strictness,
        dispatch: DispatchConfig,
    ) -> Self {
        Self {
            rows: RowAdapter::new(normalizer.clone(), strictness),
            bulk: BulkAdapter::new(normalizer, strictness),
            dml: DmlBuilder::new(dispatch.on_conflict),
            driver,
            schema,
            strictness,
            dispatch,
        }
    }

    pub fn from_config(
        driver: Arc<dyn StorageDriver>,
        schema: Arc<dyn SchemaProvider>,
        config: &Config,
    ) -> Self {
        Self::new(
            driver,
            schema,
            ValueNormalizer::default(),
            Strictness::from(&config.adapter),
            config.dispatch.clone(),
        )
    }

    /// Adapt and write one batch.
    pub async fn write_batch(&self, events: &[ChangeEvent]) -> Result<BatchStats> {
        let snapshot = self.schema.current();
        let mode = self.select_mode(events, &snapshot);
        debug!(
            "Dispatching {} events in {} mode via {}",
            events.len(),
            mode,
            self.driver.db_type()
        );

        let stats = match mode {
            WriteMode::Bulk => self.write_bulk(events, &snapshot).await?,
            WriteMode::Row => self.write_rows(events, &snapshot).await?,
        };

        info!(
            "Batch done: {} events, {} statements, {} rows, {} skipped ({} mode)",
            stats.events, stats.statements, stats.rows_written, stats.skipped, stats.mode
        );
        Ok(stats)
    }

    /// Bulk needs a homogeneous batch of non-empty inserts at or above the
    /// threshold on a known table with no array-form JSON columns.
    pub fn select_mode(&self, events: &[ChangeEvent], snapshot: &SchemaSnapshot) -> WriteMode {
        let threshold = self.dispatch.bulk_threshold;
        if threshold == 0 || events.len() < threshold {
            return WriteMode::Row;
        }
        let Some(first) = events.first() else {
            return WriteMode::Row;
        };
        // Column-less inserts need DEFAULT VALUES, which COPY cannot express.
        let homogeneous = events.iter().all(|e| {
            e.action == Action::Insert
                && !e.columns.is_empty()
                && e.schema == first.schema
                && e.table == first.table
        });
        if !homogeneous {
            return WriteMode::Row;
        }

        let table = first.qualified_table();
        match snapshot.columns_for(&table) {
            Some(schema) if !has_array_json(schema) => WriteMode::Bulk,
            Some(_) => {
                debug!("{} has array-form JSON columns, using row mode", table);
                WriteMode::Row
            }
            None => WriteMode::Row,
        }
    }

    async fn write_bulk(&self, events: &[ChangeEvent], snapshot: &SchemaSnapshot) -> Result<BatchStats> {
        let mut stats = BatchStats {
            mode: WriteMode::Bulk,
            events: events.len(),
            ..BatchStats::default()
        };
        let Some(first) = events.first() else {
            return Ok(stats);
        };
        let table = first.qualified_table();
        let Some(schema) = snapshot.columns_for(&table) else {
            return Ok(stats);
        };

        let format = self.dispatch.bulk_format;
        let mut groups: Vec<(Vec<&str>, CopyEncoder)> = Vec::new();
        for event in events {
            let row = self.bulk.adapt(&table, &event.columns, snapshot)?;
            stats.warnings += row.warnings.len();
            if row.is_empty() {
                stats.skipped += 1;
                continue;
            }
            let index = match groups.iter().position(|(names, _)| *names == row.names) {
                Some(i) => i,
                None => {
                    groups.push((row.names.clone(), CopyEncoder::new(format)));
                    groups.len() - 1
                }
            };
            groups[index].1.push_row(&row)?;
        }

        for (names, encoder) in groups {
            let sql = copy_statement(schema.schema(), schema.name(), &names, format);
            let expected = encoder.rows();
            let written = self.driver.copy_in(&sql, encoder.finish()).await?;
            if written != expected {
                warn!("{}: COPY reported {} rows, sent {}", table, written, expected);
            }
            stats.statements += 1;
            stats.rows_written += written;
        }
        Ok(stats)
    }

    async fn write_rows(&self, events: &[ChangeEvent], snapshot: &SchemaSnapshot) -> Result<BatchStats> {
        let mut stats = BatchStats {
            mode: WriteMode::Row,
            events: events.len(),
            ..BatchStats::default()
        };

        let mut adapted = Vec::with_capacity(events.len());
        for event in events {
            let table = event.qualified_table();
            let row = self.rows.adapt(&table, &event.columns, snapshot)?;
            let identity = self.rows.adapt(&table, &event.identity, snapshot)?;
            stats.warnings += row.warnings.len() + identity.warnings.len();
            adapted.push((event, row, identity));
        }

        let mut statements: Vec<Statement<'_>> = Vec::with_capacity(adapted.len());
        for (event, row, identity) in &adapted {
            let table = event.qualified_table();
            let Some(schema) = snapshot.columns_for(&table) else {
                if self.strictness.tables {
                    return Err(ReplayError::UnknownTable(table));
                }
                stats.skipped += 1;
                continue;
            };
            if event.action == Action::Insert && row.is_empty() && !event.columns.is_empty() {
                warn!("{}: no insert columns left after schema filtering, skipping", table);
                stats.skipped += 1;
                continue;
            }
            match self.render(event.action, schema, row, identity)? {
                Some(statement) => statements.push(statement),
                None => stats.skipped += 1,
            }
        }

        for statement in &statements {
            debug!("Executing: {}", statement.sql);
            stats.rows_written += self.driver.execute(&statement.sql, &statement.params).await?;
            stats.statements += 1;
        }
        Ok(stats)
    }

    fn render<'a>(
        &self,
        action: Action,
        schema: &TableSchema,
        row: &AdaptedRow<'a>,
        identity: &AdaptedRow<'a>,
    ) -> Result<Option<Statement<'a>>> {
        Ok(match action {
            Action::Insert => Some(self.dml.insert(schema, row)?),
            Action::Update => self.dml.update(schema, row, identity)?,
            Action::Delete => Some(self.dml.delete(schema, row, identity)?),
            Action::Truncate => Some(Statement {
                sql: self.dml.truncate(schema),
                params: Vec::new(),
            }),
        })
    }
}

fn has_array_json(table: &TableSchema) -> bool {
    table.ordered_columns().iter().any(|c| {
        matches!(DeclaredType::parse(&c.data_type), DeclaredType::Json(kind) if kind.is_array())
    })
}
