//! Storage driver implementations.

pub mod postgres;

pub use postgres::PostgresDriver;
