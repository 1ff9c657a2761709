use std::collections::HashMap;
use std::time::Instant;

use chrono::TimeDelta;

use crate::model::*;
use crate::timestamp;

use super::{record_outcome, Engine, EngineError};

/// Read model for one appointment. `service` is `None` once the catalog
/// no longer knows the service.
pub(super) fn build_view(appt: Appointment, service: Option<&Service>) -> AppointmentView {
    let start = appt.start_time.parse();
    let end_time = start
        .zip(service)
        .map(|(s, svc)| timestamp::format(s + TimeDelta::minutes(i64::from(svc.duration_min))));
    AppointmentView {
        id: appt.id,
        start_time: start.map(timestamp::format).unwrap_or(appt.start_time.raw),
        end_time,
        client_name: appt.client_name,
        client_email: appt.client_email,
        status: appt.status,
        service_id: appt.service_id,
        service_name: service.map(|s| s.name.clone()),
        price_cents: service.map(|s| s.price_cents),
        created_via: appt.created_via,
    }
}

impl Engine {
    /// Admins see every appointment; everyone else sees their own and must
    /// say who they are. Ordered by start, unparseable starts last.
    pub async fn list_appointments(
        &self,
        role: Role,
        email: Option<&str>,
    ) -> Result<Vec<AppointmentView>, EngineError> {
        let started = Instant::now();
        let result = self.list_inner(role, email).await;
        record_outcome("list", started, &result);
        result
    }

    async fn list_inner(
        &self,
        role: Role,
        email: Option<&str>,
    ) -> Result<Vec<AppointmentView>, EngineError> {
        let appointments = if role == Role::Admin {
            self.store.list_all().await?
        } else {
            let email = non_blank(email).ok_or(EngineError::UnidentifiedRequester)?;
            self.store.list_by_email(email).await?
        };

        let mut services: HashMap<ServiceId, Option<Service>> = HashMap::new();
        let mut keyed = Vec::with_capacity(appointments.len());
        for appt in appointments {
            if !services.contains_key(&appt.service_id) {
                let service = self.catalog.get_service(appt.service_id).await?;
                services.insert(appt.service_id, service);
            }
            let service = services.get(&appt.service_id).and_then(Option::as_ref);
            let key = appt.start_time.parse();
            let id = appt.id;
            keyed.push(((key.is_none(), key, id), build_view(appt, service)));
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(keyed.into_iter().map(|(_, view)| view).collect())
    }

    pub async fn get_appointment(&self, id: AppointmentId) -> Result<AppointmentView, EngineError> {
        let started = Instant::now();
        let result = self.get_inner(id).await;
        record_outcome("get", started, &result);
        result
    }

    async fn get_inner(&self, id: AppointmentId) -> Result<AppointmentView, EngineError> {
        let appt = self.store.get(id).await?.ok_or(EngineError::NotFound(id))?;
        let service = self.catalog.get_service(appt.service_id).await?;
        Ok(build_view(appt, service.as_ref()))
    }
}
