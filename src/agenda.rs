/// Appointment, patient and plan operations for one professional.
///
/// The [`Agenda`] validates input before touching the store, applies the
/// status state machine, and turns store failures into [`AgendaError`]s.
/// It holds no local copy of any row, so a failed call leaves nothing
/// half-applied. Reads are retried on transient store failures; writes
/// are attempted exactly once.

use crate::config::RetryPolicy;
use crate::dates::{end_of_week, is_today, parse_time, start_of_week, CalendarDate, Clock};
use crate::error::{AgendaError, Result};
use crate::models::{
    validate_value, Appointment, AppointmentDraft, AppointmentPatch, AppointmentStatus,
    BillingType, OwnerId, Patient, PatientDraft, PatientPatch, Plan, PlanPatch, WorkingHours,
};
use crate::slots::WeekGrid;
use crate::status::validate_transition;
use crate::store::{AgendaStore, StoreResult};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct Agenda<S: AgendaStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl<S: AgendaStore> Clone for Agenda<S> {
    fn clone(&self) -> Self {
        Agenda {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            retry: self.retry,
        }
    }
}

impl<S: AgendaStore> Agenda<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Agenda {
            store,
            clock,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run a read, retrying transient failures with doubling backoff.
    async fn read<T, F, Fut>(&self, what: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let err = AgendaError::from(err);
                    if attempt >= self.retry.attempts || !err.is_transient() {
                        warn!(what, attempt, error = %err, "read failed");
                        return Err(err);
                    }
                    attempt += 1;
                    let delay = self.retry.delay_before(attempt);
                    warn!(what, attempt, ?delay, error = %err, "read failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    // ---- appointments ----

    /// All appointments of `owner`, ordered by date then time.
    pub async fn list_appointments(&self, owner: OwnerId) -> Result<Vec<Appointment>> {
        let mut appointments = self
            .read("list appointments", || self.store.list_appointments(owner))
            .await?;
        appointments.sort_by_key(|a| (a.date, a.time));
        Ok(appointments)
    }

    pub async fn list_today_appointments(&self, owner: OwnerId) -> Result<Vec<Appointment>> {
        let clock = self.clock();
        Ok(self
            .list_appointments(owner)
            .await?
            .into_iter()
            .filter(|a| is_today(a.date, clock))
            .collect())
    }

    /// Appointments dated within `[from, to]`, ordered.
    pub async fn list_appointments_between(
        &self,
        owner: OwnerId,
        from: CalendarDate,
        to: CalendarDate,
    ) -> Result<Vec<Appointment>> {
        Ok(self
            .list_appointments(owner)
            .await?
            .into_iter()
            .filter(|a| a.date >= from && a.date <= to)
            .collect())
    }

    pub async fn get_appointment(&self, owner: OwnerId, id: Uuid) -> Result<Appointment> {
        self.read("get appointment", || self.store.get_appointment(owner, id))
            .await?
            .ok_or(AgendaError::NotFound {
                entity: "appointment",
                id,
            })
    }

    /// Book a consultation in the `agendado` state.
    pub async fn create_appointment(&self, owner: OwnerId, draft: AppointmentDraft) -> Result<Appointment> {
        let patient_id = draft
            .patient_id
            .ok_or_else(|| AgendaError::validation("Patient is required"))?;
        let date = draft
            .date
            .ok_or_else(|| AgendaError::validation("Date is required"))?;
        let time = draft
            .time
            .ok_or_else(|| AgendaError::validation("Time is required"))?;

        let value = match (draft.value, draft.plan_id) {
            (Some(value), _) => Some(value),
            (None, Some(plan_id)) => Some(self.plan_value(owner, plan_id).await?),
            (None, None) => None,
        };
        if let Some(value) = value {
            validate_value(value)?;
        }
        self.get_patient(owner, patient_id).await?;

        let billing = draft.billing.unwrap_or(if draft.plan_id.is_some() {
            BillingType::Plano
        } else {
            BillingType::Particular
        });

        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id,
            date,
            time,
            billing,
            status: AppointmentStatus::Agendado,
            value,
            notes: non_empty(draft.notes),
            owner_id: owner,
        };

        let appointment = self.store.insert_appointment(appointment).await?;
        info!(
            id = %appointment.id,
            date = %appointment.storage_date(),
            time = %appointment.time_label(),
            "appointment created"
        );
        Ok(appointment)
    }

    /// Write only the fields present in `patch`.
    pub async fn update_appointment(
        &self,
        owner: OwnerId,
        id: Uuid,
        patch: AppointmentPatch,
    ) -> Result<Appointment> {
        if patch.is_empty() {
            return self.get_appointment(owner, id).await;
        }

        if let Some(status) = patch.status {
            let current = self.get_appointment(owner, id).await?;
            if let Err(err) = validate_transition(current.status, status) {
                warn!(%id, from = %current.status, to = %status, "status change rejected");
                return Err(err);
            }
        }
        if let Some(patient_id) = patch.patient_id {
            self.get_patient(owner, patient_id).await?;
        }
        if let Some(Some(value)) = patch.value {
            validate_value(value)?;
        }

        let mut patch = patch;
        if let Some(notes) = patch.notes.take() {
            patch.notes = Some(non_empty(notes));
        }

        let updated = self
            .store
            .update_appointment(owner, id, &patch)
            .await?
            .ok_or(AgendaError::NotFound {
                entity: "appointment",
                id,
            })?;
        info!(%id, status = %updated.status, "appointment updated");
        Ok(updated)
    }

    pub async fn set_status(&self, owner: OwnerId, id: Uuid, status: AppointmentStatus) -> Result<Appointment> {
        self.update_appointment(owner, id, AppointmentPatch::status(status))
            .await
    }

    /// Move an appointment into the (date, slot) cell it was dropped on.
    ///
    /// Occupants of the target cell are not checked.
    pub async fn reschedule(
        &self,
        owner: OwnerId,
        id: Uuid,
        cell_date: CalendarDate,
        slot_label: &str,
    ) -> Result<Appointment> {
        let time = parse_time(slot_label)?;
        debug!(%id, date = %cell_date, slot = slot_label, "rescheduling");
        self.update_appointment(owner, id, AppointmentPatch::move_to(cell_date, time))
            .await
    }

    pub async fn delete_appointment(&self, owner: OwnerId, id: Uuid) -> Result<()> {
        if !self.store.delete_appointment(owner, id).await? {
            return Err(AgendaError::NotFound {
                entity: "appointment",
                id,
            });
        }
        info!(%id, "appointment deleted");
        Ok(())
    }

    /// Slot grid of the week containing `anchor`.
    pub async fn week_grid(&self, owner: OwnerId, anchor: CalendarDate, hours: &WorkingHours) -> Result<WeekGrid> {
        let appointments = self
            .list_appointments_between(owner, start_of_week(anchor), end_of_week(anchor))
            .await?;
        Ok(WeekGrid::build(anchor, hours, &appointments))
    }

    // ---- patients ----

    pub async fn create_patient(&self, owner: OwnerId, draft: PatientDraft) -> Result<Patient> {
        let mut patient = Patient::new(owner, &draft.name)?;
        patient.phone = non_empty(draft.phone);
        patient.email = non_empty(draft.email);
        patient.notes = non_empty(draft.notes);

        let patient = self.store.insert_patient(patient).await?;
        info!(id = %patient.id, "patient created");
        Ok(patient)
    }

    /// Patients of `owner`, by name.
    pub async fn list_patients(&self, owner: OwnerId) -> Result<Vec<Patient>> {
        let mut patients = self
            .read("list patients", || self.store.list_patients(owner))
            .await?;
        patients.sort_by_key(|p| p.name.to_lowercase());
        Ok(patients)
    }

    pub async fn get_patient(&self, owner: OwnerId, id: Uuid) -> Result<Patient> {
        self.read("get patient", || self.store.get_patient(owner, id))
            .await?
            .ok_or(AgendaError::NotFound { entity: "patient", id })
    }

    pub async fn update_patient(&self, owner: OwnerId, id: Uuid, patch: PatientPatch) -> Result<Patient> {
        patch.validate()?;
        let patient = self
            .store
            .update_patient(owner, id, &patch)
            .await?
            .ok_or(AgendaError::NotFound { entity: "patient", id })?;
        info!(%id, "patient updated");
        Ok(patient)
    }

    /// Delete a patient that no appointment references.
    pub async fn delete_patient(&self, owner: OwnerId, id: Uuid) -> Result<()> {
        self.get_patient(owner, id).await?;

        let count = self
            .read("count patient appointments", || {
                self.store.count_patient_appointments(owner, id)
            })
            .await?;
        if count > 0 {
            warn!(%id, count, "patient still has appointments");
            return Err(AgendaError::PatientHasAppointments { patient: id, count });
        }

        if !self.store.delete_patient(owner, id).await? {
            return Err(AgendaError::NotFound { entity: "patient", id });
        }
        info!(%id, "patient deleted");
        Ok(())
    }

    // ---- plans ----

    pub async fn create_plan(&self, owner: OwnerId, name: &str, value: f64) -> Result<Plan> {
        let plan = self.store.insert_plan(Plan::new(owner, name, value)?).await?;
        info!(id = %plan.id, value = plan.value, "plan created");
        Ok(plan)
    }

    pub async fn list_plans(&self, owner: OwnerId) -> Result<Vec<Plan>> {
        let mut plans = self
            .read("list plans", || self.store.list_plans(owner))
            .await?;
        plans.sort_by_key(|p| p.name.to_lowercase());
        Ok(plans)
    }

    pub async fn get_plan(&self, owner: OwnerId, id: Uuid) -> Result<Plan> {
        self.read("get plan", || self.store.get_plan(owner, id))
            .await?
            .ok_or(AgendaError::NotFound { entity: "plan", id })
    }

    /// Value a form pre-fills when `plan_id` is selected.
    pub async fn plan_value(&self, owner: OwnerId, plan_id: Uuid) -> Result<f64> {
        Ok(self.get_plan(owner, plan_id).await?.value)
    }

    pub async fn update_plan(&self, owner: OwnerId, id: Uuid, patch: PlanPatch) -> Result<Plan> {
        patch.validate()?;
        let plan = self
            .store
            .update_plan(owner, id, &patch)
            .await?
            .ok_or(AgendaError::NotFound { entity: "plan", id })?;
        info!(%id, "plan updated");
        Ok(plan)
    }

    /// Appointments keep the value they copied; nothing cascades.
    pub async fn delete_plan(&self, owner: OwnerId, id: Uuid) -> Result<()> {
        if !self.store.delete_plan(owner, id).await? {
            return Err(AgendaError::NotFound { entity: "plan", id });
        }
        info!(%id, "plan deleted");
        Ok(())
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}
