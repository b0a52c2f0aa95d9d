//! Parameterized DML rendering for row mode.

use serde::{Deserialize, Serialize};

use crate::adapter::AdaptedRow;
use crate::core::{JsonKind, SqlValue, TableSchema};
use crate::error::{ReplayError, Result};

/// Quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Qualify a table name with schema.
pub fn qualify_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// What an INSERT does when the row already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnConflict {
    /// Plain INSERT; conflicts surface as target errors.
    #[default]
    None,
    /// `ON CONFLICT DO NOTHING`.
    Nothing,
    /// `ON CONFLICT (pk) DO UPDATE SET ...`.
    Update,
}

/// A rendered statement and its bind parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement<'a> {
    pub sql: String,
    pub params: Vec<SqlValue<'a>>,
}

/// Builds row-mode statements against one target table.
#[derive(Debug, Clone, Copy, Default)]
pub struct DmlBuilder {
    on_conflict: OnConflict,
}

impl DmlBuilder {
    pub fn new(on_conflict: OnConflict) -> Self {
        Self { on_conflict }
    }

    pub fn on_conflict(&self) -> OnConflict {
        self.on_conflict
    }

    /// INSERT of `row`. An empty row renders `DEFAULT VALUES`; callers skip
    /// inserts whose columns were all filtered out.
    pub fn insert<'a>(&self, table: &TableSchema, row: &AdaptedRow<'a>) -> Result<Statement<'a>> {
        let target = qualify_table(table.schema(), table.name());
        if row.is_empty() {
            return Ok(Statement {
                sql: format!("INSERT INTO {} DEFAULT VALUES", target),
                params: Vec::new(),
            });
        }

        let mut params = Params::default();
        let cols: Vec<String> = row.names.iter().map(|c| quote_ident(c)).collect();
        let placeholders: Vec<String> = row.values.iter().map(|v| params.push(v)).collect();

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            target,
            cols.join(", "),
            placeholders.join(", ")
        );

        match self.on_conflict {
            OnConflict::None => {}
            OnConflict::Nothing => sql.push_str(" ON CONFLICT DO NOTHING"),
            OnConflict::Update => {
                let pk: Vec<&str> = table.primary_key().iter().map(|c| c.name.as_str()).collect();
                if pk.is_empty() {
                    return Err(ReplayError::MissingIdentity(table.full_name()));
                }
                let pk_list: Vec<String> = pk.iter().map(|c| quote_ident(c)).collect();
                let update_cols: Vec<String> = row
                    .names
                    .iter()
                    .filter(|c| !pk.contains(*c))
                    .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
                    .collect();
                if update_cols.is_empty() {
                    sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", pk_list.join(", ")));
                } else {
                    sql.push_str(&format!(
                        " ON CONFLICT ({}) DO UPDATE SET {}",
                        pk_list.join(", "),
                        update_cols.join(", ")
                    ));
                }
            }
        }

        Ok(Statement {
            sql,
            params: params.into_values(),
        })
    }

    /// UPDATE with new values from `row`, keyed by `identity` or, when that
    /// is empty, by the primary-key columns of `row`.
    ///
    /// Returns `None` when there is nothing to set.
    pub fn update<'a>(
        &self,
        table: &TableSchema,
        row: &AdaptedRow<'a>,
        identity: &AdaptedRow<'a>,
    ) -> Result<Option<Statement<'a>>> {
        if row.is_empty() {
            return Ok(None);
        }
        let key = resolve_key(table, row, identity)?;

        let mut params = Params::default();
        let sets: Vec<String> = row
            .names
            .iter()
            .zip(&row.values)
            .map(|(name, value)| format!("{} = {}", quote_ident(name), params.push(value)))
            .collect();
        let predicate = render_predicate(&key, &mut params);

        Ok(Some(Statement {
            sql: format!(
                "UPDATE {} SET {} WHERE {}",
                qualify_table(table.schema(), table.name()),
                sets.join(", "),
                predicate
            ),
            params: params.into_values(),
        }))
    }

    pub fn delete<'a>(
        &self,
        table: &TableSchema,
        row: &AdaptedRow<'a>,
        identity: &AdaptedRow<'a>,
    ) -> Result<Statement<'a>> {
        let key = resolve_key(table, row, identity)?;
        let mut params = Params::default();
        let predicate = render_predicate(&key, &mut params);
        Ok(Statement {
            sql: format!(
                "DELETE FROM {} WHERE {}",
                qualify_table(table.schema(), table.name()),
                predicate
            ),
            params: params.into_values(),
        })
    }

    pub fn truncate(&self, table: &TableSchema) -> String {
        format!("TRUNCATE {}", qualify_table(table.schema(), table.name()))
    }
}

/// Collects bind values and hands out placeholders.
#[derive(Default)]
struct Params<'a> {
    values: Vec<SqlValue<'a>>,
}

impl<'a> Params<'a> {
    fn push(&mut self, value: &SqlValue<'a>) -> String {
        self.values.push(value.clone());
        placeholder(self.values.len(), value)
    }

    fn into_values(self) -> Vec<SqlValue<'a>> {
        self.values
    }
}

/// Array-form JSON travels as one JSON array document and is split into
/// `json[]`/`jsonb[]` server-side.
fn placeholder(n: usize, value: &SqlValue<'_>) -> String {
    match value {
        SqlValue::Json(JsonKind::JsonbArray, _) => format!(
            "CASE WHEN ${n}::jsonb IS NULL THEN NULL ELSE ARRAY(SELECT jsonb_array_elements(${n}::jsonb)) END"
        ),
        SqlValue::Json(JsonKind::JsonArray, _) => format!(
            "CASE WHEN ${n}::json IS NULL THEN NULL ELSE ARRAY(SELECT json_array_elements(${n}::json)) END"
        ),
        _ => format!("${n}"),
    }
}

fn render_predicate<'a>(key: &[(&str, &SqlValue<'a>)], params: &mut Params<'a>) -> String {
    key.iter()
        .map(|(name, value)| {
            if value.is_null() {
                format!("{} IS NULL", quote_ident(name))
            } else {
                format!("{} = {}", quote_ident(name), params.push(value))
            }
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn resolve_key<'r, 'a>(
    table: &TableSchema,
    row: &'r AdaptedRow<'a>,
    identity: &'r AdaptedRow<'a>,
) -> Result<Vec<(&'r str, &'r SqlValue<'a>)>> {
    if !identity.is_empty() {
        return Ok(identity
            .names
            .iter()
            .copied()
            .zip(identity.values.iter())
            .collect());
    }

    let pk = table.primary_key();
    if pk.is_empty() {
        return Err(ReplayError::MissingIdentity(table.full_name()));
    }
    let mut key = Vec::with_capacity(pk.len());
    for column in pk {
        let index = row
            .names
            .iter()
            .position(|n| *n == column.name)
            .ok_or_else(|| ReplayError::MissingIdentity(table.full_name()))?;
        key.push((row.names[index], &row.values[index]));
    }
    Ok(key)
}
