use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::info;
use ulid::Ulid;

use crate::model::*;

use super::memory::InMemoryStore;
use super::wal::Wal;
use super::{AppointmentStore, DayFilter, StoreError};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued behind it.
/// 3. One flush_sync for the whole batch, then answer every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch = match cmd {
            WalCommand::Append { event, response } => vec![(event, response)],
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let append_err = batch
        .iter()
        .find_map(|(event, _)| wal.append_buffered(event).err());
    // Flush even after a failed append so the partial bytes don't ride along
    // with the next batch.
    let flush_err = wal.flush_sync().err();
    match append_err.or(flush_err) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Appointment store that survives restarts: the in-memory index, with every
/// mutation written to the WAL before it is applied.
///
/// Must be opened inside a tokio runtime; the WAL writer runs as a task.
pub struct WalStore {
    index: InMemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Held shared by every append+apply, exclusively by compaction, so a
    /// snapshot never misses an event already written to the old log.
    compaction_gate: RwLock<()>,
    path: PathBuf,
}

impl WalStore {
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let events = Wal::replay(&path)?;
        let wal = Wal::open(&path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let index = InMemoryStore::new();
        for event in &events {
            index.apply_event(event);
        }
        info!(
            "opened appointment log {} ({} events, {} appointments)",
            path.display(),
            events.len(),
            index.len()
        );
        Ok(Self {
            index,
            wal_tx,
            compaction_gate: RwLock::new(()),
            path,
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Unavailable("WAL writer shut down"))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("WAL writer dropped response"))?
            .map_err(StoreError::Io)
    }

    /// WAL-append, then apply to the index.
    async fn persist_and_apply(&self, event: Event) -> Result<(), StoreError> {
        let _gate = self.compaction_gate.read().await;
        self.wal_append(&event).await?;
        self.index.apply_event(&event);
        Ok(())
    }

    pub async fn register_contact(&self, contact: PrivilegedContact) -> Result<(), StoreError> {
        self.persist_and_apply(Event::ContactRegistered { contact }).await
    }

    /// Rewrite the WAL with only the events needed to recreate the current state.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _gate = self.compaction_gate.write().await;
        let events = self.index.snapshot_events();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Unavailable("WAL writer shut down"))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("WAL writer dropped response"))?
            .map_err(StoreError::Io)
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl AppointmentStore for WalStore {
    async fn insert(&self, new: NewAppointment) -> Result<AppointmentId, StoreError> {
        let id = Ulid::new();
        self.persist_and_apply(Event::booked(id, new)).await?;
        Ok(id)
    }

    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError> {
        Ok(self.index.get_cloned(&id))
    }

    async fn list_by_day(
        &self,
        day: NaiveDate,
        filter: DayFilter,
    ) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.index.day_cloned(day, filter))
    }

    async fn list_all(&self) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.index.all_cloned())
    }

    async fn list_by_email(&self, email: &str) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.index.by_email_cloned(email))
    }

    async fn update(&self, id: AppointmentId, change: AppointmentChange) -> Result<bool, StoreError> {
        if !self.index.contains(&id) {
            return Ok(false);
        }
        self.persist_and_apply(Event::AppointmentChanged { id, change }).await?;
        Ok(true)
    }

    async fn delete(&self, id: AppointmentId) -> Result<bool, StoreError> {
        if !self.index.contains(&id) {
            return Ok(false);
        }
        self.persist_and_apply(Event::AppointmentDeleted { id }).await?;
        Ok(true)
    }

    async fn privileged_contacts(&self) -> Result<Vec<PrivilegedContact>, StoreError> {
        Ok(self.index.contacts_cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("slotbook_test_durable");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn new_appt(start: &str) -> NewAppointment {
        NewAppointment {
            client_name: "Ana".into(),
            client_email: "ana@example.com".into(),
            service_id: 1,
            start_time: StartTime::at(timestamp::parse(start).unwrap()),
            status: AppointmentStatus::Pending,
            created_via: Origin::Anonymous,
        }
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let path = test_wal_path("reopen.wal");
        let (kept, gone) = {
            let store = WalStore::open(path.clone()).unwrap();
            let kept = store.insert(new_appt("2024-06-03T11:00")).await.unwrap();
            let gone = store.insert(new_appt("2024-06-03T13:00")).await.unwrap();
            store
                .update(kept, AppointmentChange::status(AppointmentStatus::Confirmed))
                .await
                .unwrap();
            store.delete(gone).await.unwrap();
            (kept, gone)
        };

        let store = WalStore::open(path).unwrap();
        let appt = store.get(kept).await.unwrap().unwrap();
        assert_eq!(appt.status, AppointmentStatus::Confirmed);
        assert!(store.get(gone).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn compaction_keeps_live_records() {
        let path = test_wal_path("compaction.wal");
        let store = WalStore::open(path.clone()).unwrap();
        store
            .register_contact(PrivilegedContact {
                name: None,
                phone: Some("555-0100".into()),
                role: Role::Owner,
            })
            .await
            .unwrap();
        let mut ids = Vec::new();
        for hour in 11..16 {
            ids.push(store.insert(new_appt(&format!("2024-06-03T{hour}:00"))).await.unwrap());
        }
        for id in &ids[..3] {
            store.delete(*id).await.unwrap();
        }
        assert_eq!(store.appends_since_compact().await, 9);

        store.compact().await.unwrap();
        assert_eq!(store.appends_since_compact().await, 0);
        drop(store);

        let reopened = WalStore::open(path).unwrap();
        let all = reopened.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(ids[3..].iter().all(|id| all.iter().any(|a| a.id == *id)));
        assert_eq!(reopened.privileged_contacts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_of_unknown_id_writes_nothing() {
        let path = test_wal_path("unknown_update.wal");
        let store = WalStore::open(path).unwrap();
        let found = store
            .update(Ulid::new(), AppointmentChange::status(AppointmentStatus::Rejected))
            .await
            .unwrap();
        assert!(!found);
        assert_eq!(store.appends_since_compact().await, 0);
    }
}
