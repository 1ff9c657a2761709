use chrono::{NaiveDateTime, TimeDelta};

use crate::config::CancellationRules;
use crate::model::*;

use super::lifecycle::check_client_cancel;
use super::EngineError;

/// The requester's email, or `UnidentifiedRequester` when there is none to check.
pub fn requester_email(requester: Option<&Identity>) -> Result<&str, EngineError> {
    requester
        .and_then(Identity::resolved_email)
        .ok_or(EngineError::UnidentifiedRequester)
}

/// Identity, ownership, status, then lead time.
pub fn authorize_cancellation(
    appointment: &Appointment,
    requester: Option<&Identity>,
    now: NaiveDateTime,
    rules: &CancellationRules,
) -> Result<(), EngineError> {
    let email = requester_email(requester)?;
    let privileged = requester.is_some_and(|r| r.role.is_privileged());
    if !privileged && !same_email(&appointment.client_email, email) {
        return Err(EngineError::NotOwner);
    }
    check_client_cancel(appointment.status)?;

    let start = appointment
        .start_time
        .parse()
        .ok_or_else(|| EngineError::InvalidTimestamp(appointment.start_time.raw.clone()))?;
    let lead = start - now;
    // A lead too large to represent can never be met.
    let required = TimeDelta::try_minutes(rules.min_lead_minutes).unwrap_or(TimeDelta::MAX);
    if lead < required {
        return Err(EngineError::TooLateToCancel {
            remaining_minutes: lead.num_milliseconds().div_euclid(60_000),
        });
    }
    Ok(())
}

/// Who to tell about a cancellation: the first admin with a phone, else the
/// first owner with one.
pub fn pick_contact(contacts: &[PrivilegedContact]) -> Option<&PrivilegedContact> {
    let reachable = |role: Role| {
        contacts
            .iter()
            .find(|c| c.role == role && non_blank(c.phone.as_deref()).is_some())
    };
    reachable(Role::Admin).or_else(|| reachable(Role::Owner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp;
    use ulid::Ulid;

    fn at(s: &str) -> NaiveDateTime {
        timestamp::parse(s).unwrap()
    }

    fn appointment(start: &str, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Ulid::new(),
            client_name: "Ana".into(),
            client_email: "ana@example.com".into(),
            service_id: 1,
            start_time: StartTime::at(at(start)),
            status,
            created_via: Origin::Authenticated,
        }
    }

    fn ana() -> Identity {
        Identity::new("ana@example.com", Role::Client)
    }

    fn authorize(appt: &Appointment, who: Option<&Identity>, now: &str) -> Result<(), EngineError> {
        authorize_cancellation(appt, who, at(now), &CancellationRules::default())
    }

    #[test]
    fn missing_or_blank_identity() {
        let appt = appointment("2024-06-03T12:00", AppointmentStatus::Pending);
        assert_eq!(
            authorize(&appt, None, "2024-06-03T09:00"),
            Err(EngineError::UnidentifiedRequester)
        );
        let blank = Identity::new(" ", Role::Admin);
        assert_eq!(
            authorize(&appt, Some(&blank), "2024-06-03T09:00"),
            Err(EngineError::UnidentifiedRequester)
        );
    }

    #[test]
    fn ownership_is_case_insensitive() {
        let appt = appointment("2024-06-03T12:00", AppointmentStatus::Pending);
        let shouty = Identity::new("ANA@Example.com", Role::Client);
        assert!(authorize(&appt, Some(&shouty), "2024-06-03T09:00").is_ok());

        let other = Identity::new("bea@example.com", Role::Client);
        assert_eq!(
            authorize(&appt, Some(&other), "2024-06-03T09:00"),
            Err(EngineError::NotOwner)
        );
        let admin = Identity::new("boss@example.com", Role::Admin);
        assert!(authorize(&appt, Some(&admin), "2024-06-03T09:00").is_ok());
    }

    #[test]
    fn terminal_states_refused() {
        let appt = appointment("2024-06-03T12:00", AppointmentStatus::Rejected);
        assert_eq!(
            authorize(&appt, Some(&ana()), "2024-06-03T09:00"),
            Err(EngineError::AlreadyTerminal(AppointmentStatus::Rejected))
        );
    }

    #[test]
    fn lead_time_boundaries() {
        let appt = appointment("2024-06-03T12:00", AppointmentStatus::Confirmed);
        assert!(authorize(&appt, Some(&ana()), "2024-06-03T10:59").is_ok());
        assert!(authorize(&appt, Some(&ana()), "2024-06-03T11:00").is_ok());
        assert_eq!(
            authorize(&appt, Some(&ana()), "2024-06-03T11:01"),
            Err(EngineError::TooLateToCancel { remaining_minutes: 59 })
        );
        // Already started: remaining rounds toward the past.
        assert_eq!(
            authorize(&appt, Some(&ana()), "2024-06-03T12:00:30"),
            Err(EngineError::TooLateToCancel { remaining_minutes: -1 })
        );
    }

    #[test]
    fn oversized_lead_refuses_instead_of_panicking() {
        let appt = appointment("2024-06-03T12:00", AppointmentStatus::Pending);
        let rules = CancellationRules {
            min_lead_minutes: i64::MAX,
        };
        assert_eq!(
            authorize_cancellation(&appt, Some(&ana()), at("2024-06-03T09:00"), &rules),
            Err(EngineError::TooLateToCancel { remaining_minutes: 180 })
        );
    }

    #[test]
    fn unparseable_start_cannot_be_lead_checked() {
        let mut appt = appointment("2024-06-03T12:00", AppointmentStatus::Pending);
        appt.start_time.raw = "mañana".into();
        assert_eq!(
            authorize(&appt, Some(&ana()), "2024-06-03T09:00"),
            Err(EngineError::InvalidTimestamp("mañana".into()))
        );
    }

    #[test]
    fn contact_prefers_reachable_admin() {
        let contact = |role, phone: Option<&str>| PrivilegedContact {
            name: None,
            phone: phone.map(String::from),
            role,
        };
        let contacts = vec![
            contact(Role::Owner, Some("555-0001")),
            contact(Role::Admin, None),
            contact(Role::Admin, Some("555-0002")),
        ];
        assert_eq!(
            pick_contact(&contacts).and_then(|c| c.phone.as_deref()),
            Some("555-0002")
        );
        assert_eq!(
            pick_contact(&contacts[..2]).map(|c| c.role),
            Some(Role::Owner)
        );
        assert!(pick_contact(&[contact(Role::Admin, Some("  "))]).is_none());
        assert!(pick_contact(&[]).is_none());
    }
}
