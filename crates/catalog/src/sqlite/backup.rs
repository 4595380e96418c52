//! Live database snapshots.
//!
//! `VACUUM INTO` produces a self-contained, defragmented copy while the
//! database stays online; WAL readers are not blocked beyond SQLite's own
//! guarantees. Snapshot names embed a local-time stamp so plain name order
//! is chronological order, which is what pruning relies on.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::instrument;

/// Writes `catalog-YYYYMMDD-HHMMSS.db` into `dest_dir` and prunes all but
/// the newest `keep` backups (`keep == 0` keeps everything). Pruning
/// failures are logged but never fail the backup that just succeeded.
#[instrument(skip(pool))]
pub(crate) async fn backup(pool: &SqlitePool, dest_dir: &Path, keep: usize) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dest_dir).await.or_raise(|| ErrorKind::Storage)?;

    let dest = dest_dir.join(format!("catalog-{}.db", timestamp()));
    sqlx::query("VACUUM INTO ?")
        .bind(dest.to_string_lossy().into_owned())
        .execute(pool)
        .await
        .or_raise(|| ErrorKind::Storage)?;

    if keep > 0
        && let Err(err) = prune(dest_dir, keep).await
    {
        tracing::warn!(dir = %dest_dir.display(), error = %err, "backup pruning failed");
    }
    Ok(dest)
}

/// Local wall-clock stamp, `YYYYMMDD-HHMMSS`. Falls back to UTC when the
/// local offset cannot be determined.
fn timestamp() -> String {
    let format = format_description!("[year][month][day]-[hour][minute][second]");
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&format).unwrap_or_else(|_| "00000000-000000".to_string())
}

/// Removes the oldest `catalog-*.db` files so at most `keep` remain.
async fn prune(dir: &Path, keep: usize) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut backups = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("catalog-") && name.ends_with(".db") && entry.file_type().await?.is_file() {
            backups.push(entry.path());
        }
    }
    backups.sort();
    if backups.len() > keep {
        let excess = backups.len() - keep;
        for old in &backups[..excess] {
            if let Err(err) = tokio::fs::remove_file(old).await {
                tracing::warn!(path = %old.display(), error = %err, "could not remove old backup");
            }
        }
    }
    Ok(())
}
