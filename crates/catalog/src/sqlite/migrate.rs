//! Schema migrations for the catalog database.
//!
//! The schema version lives in SQLite's own `user_version` pragma, which
//! makes it part of the on-disk format rather than of any one tool's
//! bookkeeping table. Migrations form a flat ordered list; each step is
//! idempotent on both fresh and legacy databases, and the version counter
//! advances after each successful step. Never rewrite history; always add.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::SqlitePool;
use tracing::instrument;

/// The schema version this build expects. Bump together with a new
/// [`MIGRATIONS`] entry whenever the schema changes.
pub(crate) const CURRENT_SCHEMA_VERSION: i64 = 1;

/// A single schema migration step.
struct Migration {
    version: i64,
    /// Additive column adds for legacy databases created before these
    /// columns existed and before versioning. They run ahead of the main
    /// batch so the batch's indexes can rely on the columns; on a fresh
    /// database the table does not exist yet and the failures are expected.
    additive: &'static [&'static str],
    /// Idempotent statement batch; `CREATE … IF NOT EXISTS` keeps it safe
    /// on databases that predate versioning.
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    additive: &[
        "ALTER TABLE books ADD COLUMN added_at     INTEGER NOT NULL DEFAULT 0",
        "ALTER TABLE books ADD COLUMN series_total TEXT    NOT NULL DEFAULT ''",
        "ALTER TABLE books ADD COLUMN rating       INTEGER NOT NULL DEFAULT 0",
    ],
    sql: "\
CREATE TABLE IF NOT EXISTS books (
    id            TEXT PRIMARY KEY,
    title         TEXT NOT NULL DEFAULT '',
    summary       TEXT NOT NULL DEFAULT '',
    language      TEXT NOT NULL DEFAULT '',
    publisher     TEXT NOT NULL DEFAULT '',
    published_at  INTEGER,
    updated_at    INTEGER NOT NULL,
    added_at      INTEGER NOT NULL DEFAULT 0,
    series        TEXT NOT NULL DEFAULT '',
    series_index  TEXT NOT NULL DEFAULT '',
    series_total  TEXT NOT NULL DEFAULT '',
    is_read       INTEGER NOT NULL DEFAULT 0,
    rating        INTEGER NOT NULL DEFAULT 0,
    cover_url     TEXT NOT NULL DEFAULT '',
    thumbnail_url TEXT NOT NULL DEFAULT '',
    file_path     TEXT NOT NULL,
    file_mime     TEXT NOT NULL DEFAULT '',
    file_size     INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS book_authors (
    book_id     TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
    author_name TEXT NOT NULL,
    author_uri  TEXT NOT NULL DEFAULT '',
    position    INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (book_id, author_name)
);

CREATE TABLE IF NOT EXISTS book_tags (
    book_id TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
    tag     TEXT NOT NULL,
    PRIMARY KEY (book_id, tag)
);

CREATE INDEX IF NOT EXISTS idx_book_authors_name ON book_authors(author_name);
CREATE INDEX IF NOT EXISTS idx_book_tags_tag     ON book_tags(tag);
CREATE INDEX IF NOT EXISTS idx_books_added_at    ON books(added_at DESC);
",
}];

/// Reads the persisted schema version and applies every outstanding
/// migration in order, advancing `user_version` after each one. Existing
/// rows are never dropped or rewritten.
#[instrument(skip(pool))]
pub(crate) async fn run(pool: &SqlitePool) -> Result<()> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
        .or_raise(|| ErrorKind::Migration)?;
    if version < CURRENT_SCHEMA_VERSION {
        tracing::info!(from = version, to = CURRENT_SCHEMA_VERSION, "applying schema migrations");
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > version) {
        for &alter in migration.additive {
            if let Err(err) = sqlx::query(alter).execute(pool).await {
                tracing::debug!(statement = alter, error = %err, "additive column not applicable");
            }
        }
        sqlx::raw_sql(migration.sql).execute(pool).await.or_raise(|| ErrorKind::Migration)?;
        // The pragma does not accept bind placeholders.
        sqlx::query(&format!("PRAGMA user_version = {}", migration.version))
            .execute(pool)
            .await
            .or_raise(|| ErrorKind::Migration)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqliteConnectOptions;

    async fn pool(dir: &std::path::Path) -> SqlitePool {
        let options = SqliteConnectOptions::new()
            .filename(dir.join(".catalog.db"))
            .create_if_missing(true)
            .foreign_keys(true);
        SqlitePool::connect_with(options).await.unwrap()
    }

    #[tokio::test]
    async fn test_fresh_database_reaches_current_version() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(dir.path()).await;
        run(&pool).await.unwrap();
        let version: i64 = sqlx::query_scalar("PRAGMA user_version").fetch_one(&pool).await.unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(dir.path()).await;
        run(&pool).await.unwrap();
        run(&pool).await.unwrap();
        pool.close().await;
    }

    #[tokio::test]
    async fn test_legacy_database_is_upgraded_without_data_loss() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(dir.path()).await;
        // A database from before versioning: user_version 0, books table
        // missing the later added_at / series_total / rating columns.
        sqlx::raw_sql(
            "CREATE TABLE books (
                id            TEXT PRIMARY KEY,
                title         TEXT NOT NULL DEFAULT '',
                summary       TEXT NOT NULL DEFAULT '',
                language      TEXT NOT NULL DEFAULT '',
                publisher     TEXT NOT NULL DEFAULT '',
                published_at  INTEGER,
                updated_at    INTEGER NOT NULL,
                series        TEXT NOT NULL DEFAULT '',
                series_index  TEXT NOT NULL DEFAULT '',
                is_read       INTEGER NOT NULL DEFAULT 0,
                cover_url     TEXT NOT NULL DEFAULT '',
                thumbnail_url TEXT NOT NULL DEFAULT '',
                file_path     TEXT NOT NULL,
                file_mime     TEXT NOT NULL DEFAULT '',
                file_size     INTEGER NOT NULL DEFAULT 0
            );
            INSERT INTO books (id, title, updated_at, file_path)
                VALUES ('legacy01', 'Pre-Versioning Book', 1600000000, '/library/old.epub');",
        )
        .execute(&pool)
        .await
        .unwrap();

        run(&pool).await.unwrap();

        let version: i64 = sqlx::query_scalar("PRAGMA user_version").fetch_one(&pool).await.unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
        // The pre-existing row is intact and the added columns have their
        // defaults.
        let (title, added_at, rating): (String, i64, i64) =
            sqlx::query_as("SELECT title, added_at, rating FROM books WHERE id = 'legacy01'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(title, "Pre-Versioning Book");
        assert_eq!(added_at, 0);
        assert_eq!(rating, 0);
        pool.close().await;
    }
}
