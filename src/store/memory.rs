use std::sync::RwLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use ulid::Ulid;

use crate::limits::MAX_SERVICE_DURATION_MIN;
use crate::model::*;

use super::{AppointmentStore, DayFilter, ServiceCatalog, StoreError};

/// Appointment records plus a calendar-day index. Every mutation goes through
/// [`InMemoryStore::apply_event`], so the durable store can replay into it.
pub struct InMemoryStore {
    records: DashMap<AppointmentId, Appointment>,
    by_day: DashMap<NaiveDate, Vec<AppointmentId>>,
    contacts: RwLock<Vec<PrivilegedContact>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            by_day: DashMap::new(),
            contacts: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &AppointmentId) -> bool {
        self.records.contains_key(id)
    }

    pub fn register_contact(&self, contact: PrivilegedContact) {
        self.apply_event(&Event::ContactRegistered { contact });
    }

    // ── Day index ────────────────────────────────────────────

    fn index(&self, day: NaiveDate, id: AppointmentId) {
        self.by_day.entry(day).or_default().push(id);
    }

    fn unindex(&self, day: NaiveDate, id: &AppointmentId) {
        if let Some(mut ids) = self.by_day.get_mut(&day) {
            ids.retain(|i| i != id);
        }
    }

    // ── Event application ────────────────────────────────────

    /// Apply an event. Changes and deletes of unknown ids are ignored.
    pub fn apply_event(&self, event: &Event) {
        match event {
            Event::AppointmentBooked {
                id,
                client_name,
                client_email,
                service_id,
                start_time,
                status,
                created_via,
            } => {
                let appointment = Appointment {
                    id: *id,
                    client_name: client_name.clone(),
                    client_email: client_email.clone(),
                    service_id: *service_id,
                    start_time: start_time.clone(),
                    status: *status,
                    created_via: *created_via,
                };
                if let Some(previous) = self.records.insert(*id, appointment) {
                    self.unindex(previous.start_time.day, id);
                }
                self.index(start_time.day, *id);
            }
            Event::AppointmentChanged { id, change } => {
                let moved = match self.records.get_mut(id) {
                    Some(mut record) => {
                        let old_day = record.start_time.day;
                        change.apply_to(&mut record);
                        let new_day = record.start_time.day;
                        (old_day != new_day).then_some((old_day, new_day))
                    }
                    None => return,
                };
                if let Some((old_day, new_day)) = moved {
                    self.unindex(old_day, id);
                    self.index(new_day, *id);
                }
            }
            Event::AppointmentDeleted { id } => {
                if let Some((_, removed)) = self.records.remove(id) {
                    self.unindex(removed.start_time.day, id);
                }
            }
            Event::ContactRegistered { contact } => {
                let mut contacts = self.contacts.write().unwrap_or_else(|e| e.into_inner());
                contacts.push(contact.clone());
            }
        }
    }

    /// Events that recreate the current state from nothing.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut records: Vec<Appointment> = self.records.iter().map(|e| e.value().clone()).collect();
        records.sort_by_key(|a| a.id);
        let contacts = self.contacts.read().unwrap_or_else(|e| e.into_inner()).clone();

        let mut events: Vec<Event> = contacts
            .into_iter()
            .map(|contact| Event::ContactRegistered { contact })
            .collect();
        events.extend(records.iter().map(Event::snapshot));
        events
    }

    pub(super) fn get_cloned(&self, id: &AppointmentId) -> Option<Appointment> {
        self.records.get(id).map(|e| e.value().clone())
    }

    pub(super) fn day_cloned(&self, day: NaiveDate, filter: DayFilter) -> Vec<Appointment> {
        let ids = match self.by_day.get(&day) {
            Some(ids) => ids.value().clone(),
            None => return Vec::new(),
        };
        ids.iter()
            .filter_map(|id| self.get_cloned(id))
            .filter(|a| filter.admits(a.status))
            .collect()
    }

    pub(super) fn all_cloned(&self) -> Vec<Appointment> {
        self.records.iter().map(|e| e.value().clone()).collect()
    }

    pub(super) fn by_email_cloned(&self, email: &str) -> Vec<Appointment> {
        self.records
            .iter()
            .filter(|e| same_email(&e.value().client_email, email))
            .map(|e| e.value().clone())
            .collect()
    }

    pub(super) fn contacts_cloned(&self) -> Vec<PrivilegedContact> {
        self.contacts.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryStore {
    async fn insert(&self, new: NewAppointment) -> Result<AppointmentId, StoreError> {
        let id = Ulid::new();
        self.apply_event(&Event::booked(id, new));
        Ok(id)
    }

    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError> {
        Ok(self.get_cloned(&id))
    }

    async fn list_by_day(
        &self,
        day: NaiveDate,
        filter: DayFilter,
    ) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.day_cloned(day, filter))
    }

    async fn list_all(&self) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.all_cloned())
    }

    async fn list_by_email(&self, email: &str) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.by_email_cloned(email))
    }

    async fn update(&self, id: AppointmentId, change: AppointmentChange) -> Result<bool, StoreError> {
        if !self.contains(&id) {
            return Ok(false);
        }
        self.apply_event(&Event::AppointmentChanged { id, change });
        Ok(true)
    }

    async fn delete(&self, id: AppointmentId) -> Result<bool, StoreError> {
        if !self.contains(&id) {
            return Ok(false);
        }
        self.apply_event(&Event::AppointmentDeleted { id });
        Ok(true)
    }

    async fn privileged_contacts(&self) -> Result<Vec<PrivilegedContact>, StoreError> {
        Ok(self.contacts_cloned())
    }
}

/// Service catalog held in memory.
#[derive(Default)]
pub struct InMemoryCatalog {
    services: DashMap<ServiceId, Service>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a service. Durations must be positive and at most a day.
    pub fn upsert(&self, service: Service) -> Result<(), StoreError> {
        if service.duration_min == 0 {
            return Err(StoreError::Invalid("service duration must be positive"));
        }
        if service.duration_min > MAX_SERVICE_DURATION_MIN {
            return Err(StoreError::Invalid("service duration longer than a day"));
        }
        self.services.insert(service.id, service);
        Ok(())
    }

    pub fn remove(&self, id: ServiceId) -> Option<Service> {
        self.services.remove(&id).map(|(_, s)| s)
    }
}

#[async_trait]
impl ServiceCatalog for InMemoryCatalog {
    async fn get_service(&self, id: ServiceId) -> Result<Option<Service>, StoreError> {
        Ok(self.services.get(&id).map(|e| e.value().clone()))
    }
}
