//! Background tasks: periodic catalog refresh and the nightly backup.
//!
//! Both loops are fire-and-forget `tokio::spawn` tasks owned by the host;
//! failures are logged and the loops continue. Neither holds any catalog
//! state between iterations.

use crate::contract::Catalog;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Default backup destination when the host configures none: a hidden
/// directory next to the books.
pub fn default_backup_dir(root: &std::path::Path) -> PathBuf {
    root.join(".backups")
}

/// Spawns the periodic refresh task.
///
/// Returns `None` when `every` is zero (refresh disabled) or the backend
/// does not expose the refresh capability.
pub fn spawn_refresh_ticker(catalog: Arc<dyn Catalog>, every: Duration) -> Option<JoinHandle<()>> {
    if every.is_zero() || catalog.as_refresher().is_none() {
        return None;
    }
    info!(interval = ?every, "background catalog refresh enabled");
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately; the
        // catalog already scanned at open, so skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(refresher) = catalog.as_refresher() else {
                return;
            };
            match refresher.refresh().await {
                Ok(()) => info!("catalog refreshed"),
                Err(err) => warn!(error = %err, "background catalog refresh failed"),
            }
        }
    }))
}

/// Spawns the nightly backup task: sleep until the next local midnight,
/// back up, then repeat on a 24 hour cadence.
///
/// Returns `None` when the backend cannot produce backups.
pub fn spawn_nightly_backup(catalog: Arc<dyn Catalog>, dest_dir: PathBuf, keep: usize) -> Option<JoinHandle<()>> {
    catalog.as_backupper()?;
    info!(dir = %dest_dir.display(), keep, "nightly catalog backup enabled");
    Some(tokio::spawn(async move {
        loop {
            tokio::time::sleep(until_next_midnight()).await;
            let Some(backupper) = catalog.as_backupper() else {
                return;
            };
            match backupper.backup(&dest_dir, keep).await {
                Ok(path) => info!(path = %path.display(), "nightly backup created"),
                Err(err) => warn!(error = %err, "nightly backup failed"),
            }
        }
    }))
}

/// Duration until the next local midnight (UTC when the local offset
/// cannot be determined).
fn until_next_midnight() -> Duration {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let Some(tomorrow) = now.date().next_day() else {
        return Duration::from_secs(24 * 60 * 60);
    };
    let next = tomorrow.midnight().assume_offset(now.offset());
    Duration::from_secs((next - now).whole_seconds().max(1) as u64)
}
