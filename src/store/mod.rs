//! Collaborator contracts the engine consumes: where appointments live and
//! where service durations come from.

pub mod durable;
pub mod memory;
pub mod wal;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::*;

pub use durable::WalStore;
pub use memory::{InMemoryCatalog, InMemoryStore};

/// Failure inside a collaborator. Never shown to end users verbatim.
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    /// The background writer is gone or dropped the response.
    Unavailable(&'static str),
    Invalid(&'static str),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "I/O error: {e}"),
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            StoreError::Invalid(msg) => write!(f, "invalid record: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayFilter {
    All,
    ExcludeCancelled,
}

impl DayFilter {
    pub fn admits(&self, status: AppointmentStatus) -> bool {
        match self {
            DayFilter::All => true,
            DayFilter::ExcludeCancelled => status.occupies_slot(),
        }
    }
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Persist a new record and return its freshly assigned id.
    async fn insert(&self, new: NewAppointment) -> Result<AppointmentId, StoreError>;

    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError>;

    /// Records indexed under `day`.
    async fn list_by_day(
        &self,
        day: NaiveDate,
        filter: DayFilter,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn list_all(&self) -> Result<Vec<Appointment>, StoreError>;

    async fn list_by_email(&self, email: &str) -> Result<Vec<Appointment>, StoreError>;

    /// Returns `false` when no record has this id.
    async fn update(&self, id: AppointmentId, change: AppointmentChange) -> Result<bool, StoreError>;

    /// Hard delete. Returns `false` when no record has this id.
    async fn delete(&self, id: AppointmentId) -> Result<bool, StoreError>;

    async fn privileged_contacts(&self) -> Result<Vec<PrivilegedContact>, StoreError>;
}

#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    async fn get_service(&self, id: ServiceId) -> Result<Option<Service>, StoreError>;
}
