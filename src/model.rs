use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::timestamp;

/// Milliseconds of a business-local wall-clock instant, counted as if it were UTC.
pub type Ms = i64;

pub type AppointmentId = Ulid;

/// Key into the external service catalog.
pub type ServiceId = u32;

const MINUTE_MS: Ms = 60_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start <= end, "Span start must not be after end");
        Self { start, end }
    }

    /// The slot occupied by something starting at `start` and lasting `minutes`.
    pub fn slot(start: NaiveDateTime, minutes: u32) -> Self {
        let start = timestamp::to_ms(start);
        Self::new(start, start + Ms::from(minutes) * MINUTE_MS)
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Rejected,
        AppointmentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Rejected => "rejected",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    /// Accepts the English names and the legacy Spanish vocabulary, case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "pendiente" => Some(AppointmentStatus::Pending),
            "confirmed" | "confirmada" => Some(AppointmentStatus::Confirmed),
            "rejected" | "rechazada" => Some(AppointmentStatus::Rejected),
            "cancelled" | "canceled" | "cancelada" => Some(AppointmentStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal with respect to client-triggered transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Rejected | AppointmentStatus::Cancelled)
    }

    /// Cancelled appointments release their slot; every other status holds it.
    pub fn occupies_slot(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the booking request was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Client email was taken from a verified identity.
    Authenticated,
    Anonymous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Owner,
    Client,
}

impl Role {
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin | Role::Owner)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            "client" => Ok(Role::Client),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A caller as vouched for by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Role,
}

impl Identity {
    pub fn new(email: impl Into<String>, role: Role) -> Self {
        Self {
            email: Some(email.into()),
            name: None,
            role,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The email, if one is present and not blank.
    pub fn resolved_email(&self) -> Option<&str> {
        non_blank(self.email.as_deref())
    }

    pub fn resolved_name(&self) -> Option<&str> {
        non_blank(self.name.as_deref())
    }
}

pub(crate) fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Emails are compared trimmed and without regard to ASCII case.
pub fn same_email(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub duration_min: u32,
    pub price_cents: u64,
}

/// Persisted start time: the stored text plus the calendar-day key it is indexed under.
///
/// Rows written by the engine always carry canonical text whose date equals `day`.
/// Rows from elsewhere may carry text that no longer parses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartTime {
    pub raw: String,
    pub day: NaiveDate,
}

impl StartTime {
    pub fn at(start: NaiveDateTime) -> Self {
        Self {
            raw: timestamp::format(start),
            day: start.date(),
        }
    }

    pub fn parse(&self) -> Option<NaiveDateTime> {
        timestamp::parse(&self.raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub client_name: String,
    pub client_email: String,
    pub service_id: ServiceId,
    pub start_time: StartTime,
    pub status: AppointmentStatus,
    pub created_via: Origin,
}

/// Everything the store needs to create a record; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    pub client_name: String,
    pub client_email: String,
    pub service_id: ServiceId,
    pub start_time: StartTime,
    pub status: AppointmentStatus,
    pub created_via: Origin,
}

/// Partial overwrite of an appointment. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentChange {
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub service_id: Option<ServiceId>,
    pub start_time: Option<StartTime>,
    pub status: Option<AppointmentStatus>,
}

impl AppointmentChange {
    pub fn status(status: AppointmentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, appointment: &mut Appointment) {
        if let Some(name) = &self.client_name {
            appointment.client_name = name.clone();
        }
        if let Some(email) = &self.client_email {
            appointment.client_email = email.clone();
        }
        if let Some(service_id) = self.service_id {
            appointment.service_id = service_id;
        }
        if let Some(start_time) = &self.start_time {
            appointment.start_time = start_time.clone();
        }
        if let Some(status) = self.status {
            appointment.status = status;
        }
    }
}

/// Booking request as received from the caller. Missing fields are reported, not assumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BookingRequest {
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub start_time: Option<String>,
    pub service_id: Option<ServiceId>,
}

/// Admin full edit. All fields but `status` are required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EditRequest {
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub start_time: Option<String>,
    pub service_id: Option<ServiceId>,
    pub status: Option<String>,
}

/// A staff member who can be told about client cancellations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegedContact {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
}

/// Snapshot of a cancelled appointment, for relaying to staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelledAppointment {
    pub id: AppointmentId,
    pub client_name: String,
    pub client_email: String,
    pub service_name: Option<String>,
    pub start_time: String,
    pub price_cents: Option<u64>,
}

/// What a relay should send, and to whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactPayload {
    pub contact: PrivilegedContact,
    pub appointment: CancelledAppointment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelOutcome {
    pub status: AppointmentStatus,
    pub penalty_applied: bool,
    pub notify: Option<ContactPayload>,
}

/// Read model handed to callers of the listing operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppointmentView {
    pub id: AppointmentId,
    pub client_name: String,
    pub client_email: String,
    /// Canonical ISO text when the stored value parses, the stored text otherwise.
    pub start_time: String,
    pub end_time: Option<String>,
    pub status: AppointmentStatus,
    pub service_id: ServiceId,
    pub service_name: Option<String>,
    pub price_cents: Option<u64>,
    pub created_via: Origin,
}

/// Store mutations, one per WAL record. Flat so replay needs no lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AppointmentBooked {
        id: AppointmentId,
        client_name: String,
        client_email: String,
        service_id: ServiceId,
        start_time: StartTime,
        status: AppointmentStatus,
        created_via: Origin,
    },
    AppointmentChanged {
        id: AppointmentId,
        change: AppointmentChange,
    },
    AppointmentDeleted {
        id: AppointmentId,
    },
    ContactRegistered {
        contact: PrivilegedContact,
    },
}

impl Event {
    pub fn booked(id: AppointmentId, new: NewAppointment) -> Self {
        Event::AppointmentBooked {
            id,
            client_name: new.client_name,
            client_email: new.client_email,
            service_id: new.service_id,
            start_time: new.start_time,
            status: new.status,
            created_via: new.created_via,
        }
    }

    /// Snapshot event that recreates `appointment` as it is now.
    pub fn snapshot(appointment: &Appointment) -> Self {
        Event::AppointmentBooked {
            id: appointment.id,
            client_name: appointment.client_name.clone(),
            client_email: appointment.client_email.clone(),
            service_id: appointment.service_id,
            start_time: appointment.start_time.clone(),
            status: appointment.status,
            created_via: appointment.created_via,
        }
    }
}
