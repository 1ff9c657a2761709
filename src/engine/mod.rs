mod cancellation;
mod conflict;
mod error;
mod lifecycle;
mod mutations;
mod queries;
mod slot;

pub use cancellation::{authorize_cancellation, pick_contact, requester_email};
pub use conflict::{find_conflict, Candidate};
pub use error::EngineError;
pub use lifecycle::{check_client_cancel, parse_status, reactivates};
pub use slot::{check_slot, validate_slot};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, NaiveDateTime};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::config::SchedulePolicy;
use crate::limits::MAX_SERVICE_DURATION_MIN;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability::{OPERATIONS_TOTAL, OPERATION_DURATION_SECONDS, REJECTIONS_TOTAL};
use crate::store::{AppointmentStore, DayFilter, ServiceCatalog};

/// Guards for every day an operation touches, held until it commits.
pub(super) type DayGuards = Vec<OwnedMutexGuard<()>>;

pub struct Engine {
    store: Arc<dyn AppointmentStore>,
    catalog: Arc<dyn ServiceCatalog>,
    policy: SchedulePolicy,
    pub notify: Arc<NotifyHub>,
    /// One mutex per calendar day. Conflict check and write happen under it.
    day_locks: DashMap<NaiveDate, Arc<Mutex<()>>>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        catalog: Arc<dyn ServiceCatalog>,
        notify: Arc<NotifyHub>,
        policy: SchedulePolicy,
    ) -> Self {
        Self {
            store,
            catalog,
            policy,
            notify,
            day_locks: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &SchedulePolicy {
        &self.policy
    }

    /// Lock each distinct day in ascending order.
    pub(super) async fn lock_days(&self, days: &[NaiveDate]) -> DayGuards {
        let mut days = days.to_vec();
        days.sort_unstable();
        days.dedup();
        let mut guards = Vec::with_capacity(days.len());
        for day in days {
            let lock = self.day_locks.entry(day).or_default().clone();
            guards.push(lock.lock_owned().await);
        }
        guards
    }

    /// Lock the day the appointment currently sits on (plus `also`) and
    /// return the record as read under those locks.
    pub(super) async fn lock_appointment(
        &self,
        id: AppointmentId,
        also: Option<NaiveDate>,
    ) -> Result<(Appointment, DayGuards), EngineError> {
        loop {
            let seen = self.store.get(id).await?.ok_or(EngineError::NotFound(id))?;
            let mut days = vec![seen.start_time.day];
            days.extend(also);
            let guards = self.lock_days(&days).await;
            let current = self.store.get(id).await?.ok_or(EngineError::NotFound(id))?;
            // Moved to another day while we waited: lock that one instead.
            if current.start_time.day == seen.start_time.day {
                return Ok((current, guards));
            }
        }
    }

    pub(super) async fn resolve_service(&self, id: ServiceId) -> Result<Service, EngineError> {
        let service = self
            .catalog
            .get_service(id)
            .await?
            .ok_or(EngineError::UnknownService(id))?;
        if service.duration_min == 0 || service.duration_min > MAX_SERVICE_DURATION_MIN {
            return Err(EngineError::InvalidInput("service duration out of range"));
        }
        Ok(service)
    }

    /// The day's slot-holding appointments with their slots resolved as far as possible.
    async fn day_candidates(&self, day: NaiveDate) -> Result<Vec<Candidate>, EngineError> {
        let appointments = self.store.list_by_day(day, DayFilter::ExcludeCancelled).await?;
        let mut durations: HashMap<ServiceId, Option<u32>> = HashMap::new();
        let mut candidates = Vec::with_capacity(appointments.len());
        for appt in appointments {
            let duration_min = match durations.get(&appt.service_id) {
                Some(d) => *d,
                None => {
                    let d = self
                        .catalog
                        .get_service(appt.service_id)
                        .await?
                        .map(|s| s.duration_min);
                    durations.insert(appt.service_id, d);
                    d
                }
            };
            candidates.push(Candidate {
                id: appt.id,
                status: appt.status,
                start: appt.start_time.parse(),
                duration_min,
            });
        }
        Ok(candidates)
    }

    /// Caller must hold the lock for `start`'s day.
    pub(super) async fn ensure_slot_free(
        &self,
        start: NaiveDateTime,
        duration_min: u32,
        exclude: Option<AppointmentId>,
    ) -> Result<(), EngineError> {
        let candidates = self.day_candidates(start.date()).await?;
        match find_conflict(start, duration_min, &candidates, exclude) {
            Some(other) => Err(EngineError::SlotConflict(other)),
            None => Ok(()),
        }
    }
}

/// Count and time one engine operation.
pub(super) fn record_outcome<T>(op: &'static str, started: Instant, result: &Result<T, EngineError>) {
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    };
    metrics::counter!(OPERATIONS_TOTAL, "op" => op, "outcome" => outcome).increment(1);
    if let Err(e) = result
        && *e != EngineError::StorageFailure
    {
        metrics::counter!(REJECTIONS_TOTAL, "code" => e.code()).increment(1);
        debug!("{op} rejected: {e}");
    }
}
