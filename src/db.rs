use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, SqlxPostgresConnector, Statement, TransactionTrait,
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::fs;

use crate::retry::{Backoff, with_backoff};

pub type DbPool = PgPool;
pub type OrmConn = DatabaseConnection;

pub const MIGRATIONS_DIR: &str = "migrations";

/// Connects the sqlx pool, retrying while the database comes up.
pub async fn create_pool(database_url: &str) -> Result<DbPool> {
    let pool = with_backoff(&Backoff::default(), "database connect", || {
        PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(database_url)
    })
    .await
    .context("failed to connect to the database")?;
    Ok(pool)
}

/// SeaORM connection sharing the sqlx pool.
pub fn orm_from_pool(pool: &DbPool) -> OrmConn {
    SqlxPostgresConnector::from_sqlx_postgres_pool(pool.clone())
}

/// Executes the `.sql` files in `dir` in filename order, skipping files already
/// recorded in `schema_migrations`. Returns the names applied by this run.
pub async fn run_migrations(conn: &OrmConn, dir: impl AsRef<Path>) -> Result<Vec<String>> {
    let backend = conn.get_database_backend();
    conn.execute(Statement::from_string(
        backend,
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            name TEXT PRIMARY KEY,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    ))
    .await?;

    let mut applied = Vec::new();
    for file in migration_files(dir.as_ref()).await? {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .context("migration file name is not UTF-8")?;

        let done = conn
            .query_one(Statement::from_sql_and_values(
                backend,
                "SELECT name FROM schema_migrations WHERE name = $1",
                [name.clone().into()],
            ))
            .await?;
        if done.is_some() {
            continue;
        }

        let sql = fs::read_to_string(&file)
            .await
            .with_context(|| format!("reading {}", file.display()))?;

        let txn = conn.begin().await?;
        // Postgres prepared statements cannot contain multiple commands.
        for stmt in split_statements(&sql) {
            txn.execute(Statement::from_string(backend, stmt))
                .await
                .with_context(|| format!("migration {name} failed"))?;
        }
        txn.execute(Statement::from_sql_and_values(
            backend,
            "INSERT INTO schema_migrations (name) VALUES ($1)",
            [name.clone().into()],
        ))
        .await?;
        txn.commit().await?;

        tracing::info!(migration = %name, "migration applied");
        applied.push(name);
    }

    Ok(applied)
}

async fn migration_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("reading {}", dir.display()))?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn split_statements(sql: &str) -> Vec<String> {
    sql.lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
        .split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(|stmt| format!("{stmt};"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::split_statements;

    #[test]
    fn splits_and_drops_comments() {
        let sql = "-- users\nCREATE TABLE a (id INT);\n\n-- idx; with semicolon\nCREATE INDEX i ON a (id);\n";
        assert_eq!(
            split_statements(sql),
            vec!["CREATE TABLE a (id INT);", "CREATE INDEX i ON a (id);"]
        );
    }
}
