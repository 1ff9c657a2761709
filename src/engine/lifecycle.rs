use crate::model::AppointmentStatus;

use super::EngineError;

pub fn parse_status(raw: &str) -> Result<AppointmentStatus, EngineError> {
    AppointmentStatus::parse(raw).ok_or_else(|| EngineError::InvalidStatus(raw.to_string()))
}

/// Clients may only withdraw an appointment that is still live.
pub fn check_client_cancel(current: AppointmentStatus) -> Result<(), EngineError> {
    if current.is_terminal() {
        return Err(EngineError::AlreadyTerminal(current));
    }
    Ok(())
}

/// Whether moving `from -> to` makes the appointment claim its slot again.
pub fn reactivates(from: AppointmentStatus, to: AppointmentStatus) -> bool {
    !from.occupies_slot() && to.occupies_slot()
}
