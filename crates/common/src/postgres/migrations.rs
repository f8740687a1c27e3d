use crate::postgres::PostgresClient;
use anyhow::{Context, Result};
use tracing::{debug, info};

/// A schema migration embedded in the binary
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

/// All migrations, in application order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "directory",
        sql: include_str!("../../migrations/0001_directory.sql"),
    },
    Migration {
        version: 2,
        name: "devices",
        sql: include_str!("../../migrations/0002_devices.sql"),
    },
    Migration {
        version: 3,
        name: "service_requests",
        sql: include_str!("../../migrations/0003_service_requests.sql"),
    },
    Migration {
        version: 4,
        name: "chat_messages",
        sql: include_str!("../../migrations/0004_chat_messages.sql"),
    },
];

// Arbitrary key for pg_advisory_xact_lock so concurrent instances migrate one at a time
const MIGRATION_LOCK_KEY: i64 = 0x6661_726d;

/// Apply every pending migration. Each one runs in its own transaction
/// together with its bookkeeping row.
pub async fn run_migrations(client: &PostgresClient) -> Result<usize> {
    let mut conn = client.get_connection().await?;

    conn.batch_execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
             version     BIGINT PRIMARY KEY,
             name        TEXT NOT NULL,
             applied_at  TIMESTAMPTZ NOT NULL DEFAULT now()
         )",
    )
    .await
    .context("failed to create schema_migrations table")?;

    let mut applied = 0;
    for migration in MIGRATIONS {
        let transaction = conn
            .transaction()
            .await
            .context("failed to start migration transaction")?;

        transaction
            .execute("SELECT pg_advisory_xact_lock($1)", &[&MIGRATION_LOCK_KEY])
            .await
            .context("failed to take migration lock")?;

        let already = transaction
            .query_opt(
                "SELECT version FROM schema_migrations WHERE version = $1",
                &[&migration.version],
            )
            .await?;
        if already.is_some() {
            debug!(version = migration.version, "migration already applied");
            continue;
        }

        transaction
            .batch_execute(migration.sql)
            .await
            .with_context(|| format!("migration {} ({}) failed", migration.version, migration.name))?;
        transaction
            .execute(
                "INSERT INTO schema_migrations (version, name) VALUES ($1, $2)",
                &[&migration.version, &migration.name],
            )
            .await?;
        transaction.commit().await?;

        info!(version = migration.version, name = migration.name, "applied migration");
        applied += 1;
    }

    Ok(applied)
}
