use chrono::Weekday;

use crate::model::{AppointmentId, AppointmentStatus, ServiceId};
use crate::store::StoreError;
use crate::timestamp::format_minutes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A required field is missing, blank or too long.
    InvalidInput(&'static str),
    InvalidTimestamp(String),
    ClosedDay(Weekday),
    BeforeOpening {
        opens_at: u32,
    },
    ClosesBeforeFinish {
        /// Minute-of-day the appointment would end at; may pass 24:00.
        ends_at: u32,
        closes_at: u32,
    },
    PastDate,
    PastTime,
    UnknownService(ServiceId),
    SlotConflict(AppointmentId),
    NotFound(AppointmentId),
    InvalidStatus(String),
    UnidentifiedRequester,
    NotOwner,
    AlreadyTerminal(AppointmentStatus),
    TooLateToCancel {
        remaining_minutes: i64,
    },
    /// A collaborator failed. The detail is logged, never shown.
    StorageFailure,
}

impl EngineError {
    /// Stable identifier for mapping onto a transport.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::InvalidTimestamp(_) => "invalid_timestamp",
            EngineError::ClosedDay(_) => "closed_day",
            EngineError::BeforeOpening { .. } => "before_opening",
            EngineError::ClosesBeforeFinish { .. } => "closes_before_finish",
            EngineError::PastDate => "past_date",
            EngineError::PastTime => "past_time",
            EngineError::UnknownService(_) => "unknown_service",
            EngineError::SlotConflict(_) => "slot_conflict",
            EngineError::NotFound(_) => "not_found",
            EngineError::InvalidStatus(_) => "invalid_status",
            EngineError::UnidentifiedRequester => "unidentified_requester",
            EngineError::NotOwner => "not_owner",
            EngineError::AlreadyTerminal(_) => "already_terminal",
            EngineError::TooLateToCancel { .. } => "too_late_to_cancel",
            EngineError::StorageFailure => "storage_failure",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::InvalidTimestamp(raw) => write!(f, "invalid timestamp: {raw:?}"),
            EngineError::ClosedDay(day) => write!(f, "closed on {day}"),
            EngineError::BeforeOpening { opens_at } => {
                write!(f, "starts before opening time {}", format_minutes(*opens_at))
            }
            EngineError::ClosesBeforeFinish { ends_at, closes_at } => write!(
                f,
                "would end at {}, after closing time {}",
                format_minutes(*ends_at),
                format_minutes(*closes_at)
            ),
            EngineError::PastDate => write!(f, "date is in the past"),
            EngineError::PastTime => write!(f, "time has already passed today"),
            EngineError::UnknownService(id) => write!(f, "unknown service: {id}"),
            EngineError::SlotConflict(id) => write!(f, "slot taken by appointment {id}"),
            EngineError::NotFound(id) => write!(f, "appointment not found: {id}"),
            EngineError::InvalidStatus(raw) => write!(f, "invalid status: {raw:?}"),
            EngineError::UnidentifiedRequester => write!(f, "requester could not be identified"),
            EngineError::NotOwner => write!(f, "appointment belongs to another client"),
            EngineError::AlreadyTerminal(status) => {
                write!(f, "appointment is already {status}")
            }
            EngineError::TooLateToCancel { remaining_minutes } => write!(
                f,
                "too late to cancel: {remaining_minutes} minutes before start"
            ),
            EngineError::StorageFailure => write!(f, "storage unavailable"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        tracing::error!("store failure: {e}");
        EngineError::StorageFailure
    }
}
