use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::observability::WAL_COMPACTIONS_TOTAL;
use crate::store::WalStore;

const CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Background task that compacts the WAL once `threshold` appends pile up.
/// A threshold of zero disables compaction and returns immediately.
pub async fn run_compactor(store: Arc<WalStore>, threshold: u64) {
    if threshold == 0 {
        debug!("WAL compaction disabled");
        return;
    }
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&store, threshold).await;
    }
}

/// One compactor pass. Returns whether a compaction ran and succeeded.
pub async fn compact_if_due(store: &WalStore, threshold: u64) -> bool {
    let appends = store.appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            metrics::counter!(WAL_COMPACTIONS_TOTAL, "outcome" => "ok").increment(1);
            info!("compacted {} after {appends} appends", store.path().display());
            true
        }
        Err(e) => {
            metrics::counter!(WAL_COMPACTIONS_TOTAL, "outcome" => "error").increment(1);
            warn!("compaction of {} failed: {e}", store.path().display());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::store::AppointmentStore;
    use crate::timestamp;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("slotbook_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let store = WalStore::open(path).unwrap();
        for hour in 11..14 {
            let start = timestamp::parse(&format!("2024-06-03T{hour}:00")).unwrap();
            store
                .insert(NewAppointment {
                    client_name: "Ana".into(),
                    client_email: "ana@example.com".into(),
                    service_id: 1,
                    start_time: StartTime::at(start),
                    status: AppointmentStatus::Pending,
                    created_via: Origin::Anonymous,
                })
                .await
                .unwrap();
        }

        assert!(!compact_if_due(&store, 4).await);
        assert_eq!(store.appends_since_compact().await, 3);

        assert!(compact_if_due(&store, 3).await);
        assert_eq!(store.appends_since_compact().await, 0);
        assert_eq!(store.list_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn zero_threshold_returns_immediately() {
        let path = test_wal_path("disabled.wal");
        let store = Arc::new(WalStore::open(path).unwrap());
        run_compactor(store, 0).await;
    }
}
