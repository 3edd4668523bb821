use log::{debug, error, info};
use sqlx::SqlitePool;

use crate::errors::{DbError, DbResult};
use crate::ffi::error::FFIResult;
use crate::globals;

// Embed all migration SQL files at compile time
const MIGRATION_FAMILY_CONTENT: &str = include_str!("../migrations/20250601000000_family_content.sql");
const MIGRATION_EXPORT_JOBS: &str = include_str!("../migrations/20250601000001_create_export_jobs.sql");

// Applied in order; names are recorded in the `migrations` table
const MIGRATIONS: &[(&str, &str)] = &[
    ("20250601000000_family_content.sql", MIGRATION_FAMILY_CONTENT),
    ("20250601000001_create_export_jobs.sql", MIGRATION_EXPORT_JOBS),
];

/// Run pending migrations against the global pool
pub async fn initialize_database() -> FFIResult<()> {
    let pool = globals::get_db_pool()?;
    run_migrations(&pool).await?;
    Ok(())
}

/// Bring `pool` up to the latest schema. Safe to call repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Starting database migration");

    create_migrations_table(pool).await?;

    let last_migration = get_last_migration(pool).await?;
    match &last_migration {
        Some(name) => debug!("Last applied migration: {}", name),
        None => debug!("No migrations applied yet"),
    }

    apply_pending_migrations(pool, last_migration).await
}

async fn create_migrations_table(pool: &SqlitePool) -> DbResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| DbError::Migration(format!("Failed to create migrations table: {}", e)))?;

    Ok(())
}

async fn get_last_migration(pool: &SqlitePool) -> DbResult<Option<String>> {
    sqlx::query_scalar::<_, String>("SELECT name FROM migrations ORDER BY id DESC LIMIT 1")
        .fetch_optional(pool)
        .await
        .map_err(|e| DbError::Migration(format!("Failed to get last migration: {}", e)))
}

async fn apply_pending_migrations(pool: &SqlitePool, last_migration: Option<String>) -> DbResult<()> {
    let pending = get_pending_migrations(last_migration.as_deref());
    if pending.is_empty() {
        info!("Database schema is up to date");
        return Ok(());
    }

    info!("Applying {} pending migration(s)", pending.len());

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| DbError::Migration(format!("Failed to begin transaction: {}", e)))?;

    for (migration_name, migration_sql) in pending {
        debug!("Applying migration {}", migration_name);

        // Files hold several statements
        sqlx::raw_sql(migration_sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Migration {} failed: {}", migration_name, e);
                DbError::Migration(format!("Failed to apply migration {}: {}", migration_name, e))
            })?;

        sqlx::query("INSERT INTO migrations (name, applied_at) VALUES (?, ?)")
            .bind(migration_name)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Migration(format!("Failed to record migration {}: {}", migration_name, e)))?;
    }

    tx.commit()
        .await
        .map_err(|e| DbError::Migration(format!("Failed to commit migrations: {}", e)))?;

    info!("All migrations applied");
    Ok(())
}

/// Migrations listed after `last_migration`, or all of them when nothing ran yet.
fn get_pending_migrations(last_migration: Option<&str>) -> Vec<(&'static str, &'static str)> {
    let mut pending = Vec::new();
    let mut should_include = last_migration.is_none();

    for &(migration_name, migration_sql) in MIGRATIONS {
        if should_include {
            pending.push((migration_name, migration_sql));
        } else if Some(migration_name) == last_migration {
            should_include = true;
        }
    }

    pending
}

/// Fresh in-memory database with the full schema applied.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    // One connection that never recycles, so the in-memory database lives as long as the pool
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    run_migrations(&pool).await.expect("migrations");
    pool
}
