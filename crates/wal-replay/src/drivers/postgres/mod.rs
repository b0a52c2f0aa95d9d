//! PostgreSQL driver.
//!
//! - [`PostgresDriver`]: [`StorageDriver`](crate::dispatch::StorageDriver)
//!   over a deadpool-postgres pool
//! - `params`: `ToSql` for [`SqlValue`](crate::core::SqlValue)

mod params;
mod writer;

pub use writer::PostgresDriver;
