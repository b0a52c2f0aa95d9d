//! PostgreSQL storage driver.
//!
//! Uses deadpool-postgres for connection pooling. Row-mode statements bind
//! canonical values directly; bulk payloads are streamed with COPY FROM STDIN.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use futures::SinkExt;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::SqlValue;
use crate::dispatch::StorageDriver;
use crate::error::{ReplayError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// PostgreSQL storage driver.
pub struct PostgresDriver {
    pool: Pool,
}

impl PostgresDriver {
    /// Create the pool and verify one connection.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("wal-replay");

        // Connection options for reliability
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(POOL_CONNECTION_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(config.max_connections)
            .build()
            .map_err(|e| ReplayError::pool(e, "creating PostgreSQL target pool"))?;

        // Test connection
        let client = pool
            .get()
            .await
            .map_err(|e| ReplayError::pool(e, "testing PostgreSQL target connection"))?;
        client.simple_query("SELECT 1").await?;

        info!("Connected to PostgreSQL target: {}", config.display_name());

        Ok(Self { pool })
    }
}

/// Target of a `COPY <target> (...)` statement, for error context.
fn copy_target(sql: &str) -> &str {
    sql.strip_prefix("COPY ")
        .and_then(|rest| rest.split(" (").next())
        .unwrap_or(sql)
}

#[async_trait]
impl StorageDriver for PostgresDriver {
    async fn execute(&self, sql: &str, params: &[SqlValue<'_>]) -> Result<u64> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| ReplayError::pool(e, "getting PostgreSQL connection"))?;

        let param_refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let rows = client.execute(sql, &param_refs).await?;
        debug!("{} rows affected", rows);
        Ok(rows)
    }

    async fn copy_in(&self, sql: &str, payload: Bytes) -> Result<u64> {
        let target = copy_target(sql);
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| ReplayError::pool(e, "getting PostgreSQL connection"))?;

        let sink = client
            .copy_in(sql)
            .await
            .map_err(|e| ReplayError::write(target, format!("COPY init: {}", e)))?;
        tokio::pin!(sink);

        let size = payload.len();
        sink.send(payload)
            .await
            .map_err(|e| ReplayError::write(target, format!("COPY send: {}", e)))?;

        let rows = sink
            .as_mut()
            .finish()
            .await
            .map_err(|e| ReplayError::write(target, format!("COPY finish: {}", e)))?;

        debug!("COPY into {}: {} rows, {} bytes", target, rows, size);
        Ok(rows)
    }

    fn db_type(&self) -> &str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_target() {
        assert_eq!(
            copy_target(r#"COPY "public"."users" ("id") FROM STDIN WITH (FORMAT TEXT)"#),
            r#""public"."users""#
        );
        assert_eq!(copy_target("SELECT 1"), "SELECT 1");
    }
}
