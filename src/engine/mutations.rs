use std::time::Instant;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::limits::*;
use crate::model::*;
use crate::observability::{BOOKINGS_TOTAL, CANCELLATIONS_TOTAL, DELETIONS_TOTAL, STATUS_CHANGES_TOTAL};
use crate::timestamp;

use super::cancellation::{authorize_cancellation, pick_contact, requester_email};
use super::lifecycle::{parse_status, reactivates};
use super::slot::validate_slot;
use super::{record_outcome, Engine, EngineError};

/// The fields every booking and full edit must carry, trimmed.
struct RequiredFields<'a> {
    name: &'a str,
    email: &'a str,
    start: &'a str,
    service_id: ServiceId,
}

fn required_text<'a>(
    value: Option<&'a str>,
    max_len: usize,
    missing: &'static str,
    too_long: &'static str,
) -> Result<&'a str, EngineError> {
    let value = non_blank(value).ok_or(EngineError::InvalidInput(missing))?;
    if value.len() > max_len {
        return Err(EngineError::InvalidInput(too_long));
    }
    Ok(value)
}

fn required_fields<'a>(
    name: Option<&'a str>,
    email: Option<&'a str>,
    start: Option<&'a str>,
    service_id: Option<ServiceId>,
) -> Result<RequiredFields<'a>, EngineError> {
    Ok(RequiredFields {
        name: required_text(name, MAX_NAME_LEN, "client_name is required", "client_name too long")?,
        email: required_text(email, MAX_EMAIL_LEN, "client_email is required", "client_email too long")?,
        start: required_text(start, MAX_TIMESTAMP_LEN, "start_time is required", "start_time too long")?,
        service_id: service_id.ok_or(EngineError::InvalidInput("service_id is required"))?,
    })
}

impl Engine {
    /// Book a new `pending` appointment. A verified identity supplies the
    /// client email and, when the request has none, the name.
    pub async fn book(
        &self,
        request: BookingRequest,
        identity: Option<&Identity>,
        now: NaiveDateTime,
    ) -> Result<AppointmentId, EngineError> {
        let started = Instant::now();
        let result = self.book_inner(&request, identity, now).await;
        record_outcome("book", started, &result);
        result
    }

    async fn book_inner(
        &self,
        request: &BookingRequest,
        identity: Option<&Identity>,
        now: NaiveDateTime,
    ) -> Result<AppointmentId, EngineError> {
        let verified = identity.and_then(|who| who.resolved_email().map(|email| (who, email)));
        let (name, email, created_via) = match verified {
            Some((who, email)) => (
                non_blank(request.client_name.as_deref()).or(who.resolved_name()),
                Some(email),
                Origin::Authenticated,
            ),
            None => (
                request.client_name.as_deref(),
                request.client_email.as_deref(),
                Origin::Anonymous,
            ),
        };
        let fields = required_fields(name, email, request.start_time.as_deref(), request.service_id)?;
        let service = self.resolve_service(fields.service_id).await?;
        let start = validate_slot(fields.start, service.duration_min, now, &self.policy.hours)?;

        let _guards = self.lock_days(&[start.date()]).await;
        self.ensure_slot_free(start, service.duration_min, None).await?;
        let id = self
            .store
            .insert(NewAppointment {
                client_name: fields.name.to_string(),
                client_email: fields.email.to_string(),
                service_id: service.id,
                start_time: StartTime::at(start),
                status: AppointmentStatus::Pending,
                created_via,
            })
            .await?;

        metrics::counter!(BOOKINGS_TOTAL).increment(1);
        info!(
            "booked {id}: service {} at {} ({} min)",
            service.id,
            timestamp::format(start),
            service.duration_min
        );
        Ok(id)
    }

    /// Admin status change. Leaving `cancelled` re-claims the slot, so the
    /// conflict check runs again for it.
    pub async fn change_status(
        &self,
        id: AppointmentId,
        new_status: &str,
    ) -> Result<AppointmentStatus, EngineError> {
        let started = Instant::now();
        let result = self.change_status_inner(id, new_status).await;
        record_outcome("change_status", started, &result);
        result
    }

    async fn change_status_inner(
        &self,
        id: AppointmentId,
        new_status: &str,
    ) -> Result<AppointmentStatus, EngineError> {
        let status = parse_status(new_status)?;
        let (current, _guards) = self.lock_appointment(id, None).await?;

        if reactivates(current.status, status) {
            let start = current.start_time.parse();
            let service = self.catalog.get_service(current.service_id).await?;
            match (start, service) {
                (Some(start), Some(service)) => {
                    self.ensure_slot_free(start, service.duration_min, Some(id))
                        .await?;
                }
                _ => warn!("reactivating {id} without a conflict check: unresolvable slot"),
            }
        }

        if !self.store.update(id, AppointmentChange::status(status)).await? {
            return Err(EngineError::NotFound(id));
        }
        metrics::counter!(STATUS_CHANGES_TOTAL, "status" => status.as_str()).increment(1);
        info!("appointment {id}: {} -> {status}", current.status);
        Ok(status)
    }

    /// Client self-cancellation. On success the chosen staff contact, if
    /// any, is returned and published on the notify hub.
    pub async fn cancel(
        &self,
        id: AppointmentId,
        identity: Option<&Identity>,
        now: NaiveDateTime,
    ) -> Result<CancelOutcome, EngineError> {
        let started = Instant::now();
        let result = self.cancel_inner(id, identity, now).await;
        record_outcome("cancel", started, &result);
        result
    }

    async fn cancel_inner(
        &self,
        id: AppointmentId,
        identity: Option<&Identity>,
        now: NaiveDateTime,
    ) -> Result<CancelOutcome, EngineError> {
        requester_email(identity)?;
        let (appt, _guards) = self.lock_appointment(id, None).await?;
        if let Err(e) = authorize_cancellation(&appt, identity, now, &self.policy.cancellation) {
            warn!("cancellation of {id} refused: {e}");
            return Err(e);
        }

        // Gathered before the write so a lookup failure leaves the appointment untouched.
        let contacts = self.store.privileged_contacts().await?;
        let service = self.catalog.get_service(appt.service_id).await?;
        let notify = pick_contact(&contacts).map(|contact| ContactPayload {
            contact: contact.clone(),
            appointment: CancelledAppointment {
                id,
                client_name: appt.client_name.clone(),
                client_email: appt.client_email.clone(),
                service_name: service.as_ref().map(|s| s.name.clone()),
                start_time: timestamp::normalize(&appt.start_time.raw),
                price_cents: service.as_ref().map(|s| s.price_cents),
            },
        });

        let status = AppointmentStatus::Cancelled;
        if !self.store.update(id, AppointmentChange::status(status)).await? {
            return Err(EngineError::NotFound(id));
        }
        metrics::counter!(CANCELLATIONS_TOTAL).increment(1);
        info!("appointment {id} cancelled by client");

        match &notify {
            Some(payload) => self.notify.send(payload),
            None => warn!("no reachable staff contact for cancellation of {id}"),
        }
        // TODO: tiered cancellation fees for cancellations inside 24h; until then no penalty.
        Ok(CancelOutcome {
            status,
            penalty_applied: false,
            notify,
        })
    }

    /// Admin full edit: overwrite name, email, start, service and optionally
    /// status, re-validating the slot against everything but itself.
    pub async fn edit_appointment(
        &self,
        id: AppointmentId,
        request: EditRequest,
        now: NaiveDateTime,
    ) -> Result<(), EngineError> {
        let started = Instant::now();
        let result = self.edit_inner(id, &request, now).await;
        record_outcome("edit", started, &result);
        result
    }

    async fn edit_inner(
        &self,
        id: AppointmentId,
        request: &EditRequest,
        now: NaiveDateTime,
    ) -> Result<(), EngineError> {
        let fields = required_fields(
            request.client_name.as_deref(),
            request.client_email.as_deref(),
            request.start_time.as_deref(),
            request.service_id,
        )?;
        let status = non_blank(request.status.as_deref())
            .map(parse_status)
            .transpose()?;
        if self.store.get(id).await?.is_none() {
            return Err(EngineError::NotFound(id));
        }
        let service = self.resolve_service(fields.service_id).await?;
        let start = validate_slot(fields.start, service.duration_min, now, &self.policy.hours)?;

        let (previous, _guards) = self.lock_appointment(id, Some(start.date())).await?;
        self.ensure_slot_free(start, service.duration_min, Some(id))
            .await?;
        let change = AppointmentChange {
            client_name: Some(fields.name.to_string()),
            client_email: Some(fields.email.to_string()),
            service_id: Some(service.id),
            start_time: Some(StartTime::at(start)),
            status,
        };
        if !self.store.update(id, change).await? {
            return Err(EngineError::NotFound(id));
        }
        info!(
            "appointment {id} edited: {} -> {} (service {})",
            previous.start_time.raw,
            timestamp::format(start),
            service.id
        );
        Ok(())
    }

    /// Hard delete. Deleting an id that is already gone succeeds.
    pub async fn delete_appointment(&self, id: AppointmentId) -> Result<(), EngineError> {
        let started = Instant::now();
        let result = self.delete_inner(id).await;
        record_outcome("delete", started, &result);
        result
    }

    async fn delete_inner(&self, id: AppointmentId) -> Result<(), EngineError> {
        let _guards = match self.lock_appointment(id, None).await {
            Ok((_, guards)) => guards,
            Err(EngineError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        if self.store.delete(id).await? {
            metrics::counter!(DELETIONS_TOTAL).increment(1);
            info!("appointment {id} deleted");
        }
        Ok(())
    }
}
