/// Storage seam for the agenda.
///
/// The hosted relational store is reached through [`AgendaStore`]. Every
/// method is one atomic call scoped to an owner: rows belonging to another
/// owner are invisible, exactly as row-level security makes them upstream.
/// There is no concurrency token, so the last write wins.

use crate::models::{
    Appointment, AppointmentPatch, OwnerId, Patient, PatientPatch, Plan, PlanPatch,
};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Failure reported by the store itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached or timed out.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the operation.
    #[error("Store rejected the operation: {0}")]
    Rejected(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait AgendaStore: Send + Sync {
    async fn list_appointments(&self, owner: OwnerId) -> StoreResult<Vec<Appointment>>;

    async fn get_appointment(&self, owner: OwnerId, id: Uuid) -> StoreResult<Option<Appointment>>;

    async fn insert_appointment(&self, appointment: Appointment) -> StoreResult<Appointment>;

    /// Apply `patch` to one row. `None` when no such row is visible.
    async fn update_appointment(
        &self,
        owner: OwnerId,
        id: Uuid,
        patch: &AppointmentPatch,
    ) -> StoreResult<Option<Appointment>>;

    async fn delete_appointment(&self, owner: OwnerId, id: Uuid) -> StoreResult<bool>;

    async fn count_patient_appointments(&self, owner: OwnerId, patient_id: Uuid) -> StoreResult<usize>;

    async fn list_patients(&self, owner: OwnerId) -> StoreResult<Vec<Patient>>;

    async fn get_patient(&self, owner: OwnerId, id: Uuid) -> StoreResult<Option<Patient>>;

    async fn insert_patient(&self, patient: Patient) -> StoreResult<Patient>;

    async fn update_patient(
        &self,
        owner: OwnerId,
        id: Uuid,
        patch: &PatientPatch,
    ) -> StoreResult<Option<Patient>>;

    async fn delete_patient(&self, owner: OwnerId, id: Uuid) -> StoreResult<bool>;

    async fn list_plans(&self, owner: OwnerId) -> StoreResult<Vec<Plan>>;

    async fn get_plan(&self, owner: OwnerId, id: Uuid) -> StoreResult<Option<Plan>>;

    async fn insert_plan(&self, plan: Plan) -> StoreResult<Plan>;

    async fn update_plan(&self, owner: OwnerId, id: Uuid, patch: &PlanPatch) -> StoreResult<Option<Plan>>;

    async fn delete_plan(&self, owner: OwnerId, id: Uuid) -> StoreResult<bool>;
}

/// In-process store, one map per table.
#[derive(Debug, Default)]
pub struct MemoryStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
    patients: RwLock<HashMap<Uuid, Patient>>,
    plans: RwLock<HashMap<Uuid, Plan>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn owned<T: Clone>(row: Option<&T>, owner: OwnerId, owner_of: impl Fn(&T) -> OwnerId) -> Option<T> {
    row.filter(|r| owner_of(r) == owner).cloned()
}

#[async_trait]
impl AgendaStore for MemoryStore {
    async fn list_appointments(&self, owner: OwnerId) -> StoreResult<Vec<Appointment>> {
        let rows = self.appointments.read().await;
        Ok(rows.values().filter(|a| a.owner_id == owner).cloned().collect())
    }

    async fn get_appointment(&self, owner: OwnerId, id: Uuid) -> StoreResult<Option<Appointment>> {
        let rows = self.appointments.read().await;
        Ok(owned(rows.get(&id), owner, |a| a.owner_id))
    }

    async fn insert_appointment(&self, appointment: Appointment) -> StoreResult<Appointment> {
        let mut rows = self.appointments.write().await;
        if rows.contains_key(&appointment.id) {
            return Err(StoreError::Rejected(format!("duplicate appointment id {}", appointment.id)));
        }
        debug!(id = %appointment.id, "insert appointment row");
        rows.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn update_appointment(
        &self,
        owner: OwnerId,
        id: Uuid,
        patch: &AppointmentPatch,
    ) -> StoreResult<Option<Appointment>> {
        let mut rows = self.appointments.write().await;
        match rows.get_mut(&id).filter(|a| a.owner_id == owner) {
            Some(row) => {
                patch.apply_to(row);
                Ok(Some(row.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_appointment(&self, owner: OwnerId, id: Uuid) -> StoreResult<bool> {
        let mut rows = self.appointments.write().await;
        if rows.get(&id).map_or(false, |a| a.owner_id == owner) {
            rows.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn count_patient_appointments(&self, owner: OwnerId, patient_id: Uuid) -> StoreResult<usize> {
        let rows = self.appointments.read().await;
        Ok(rows
            .values()
            .filter(|a| a.owner_id == owner && a.patient_id == patient_id)
            .count())
    }

    async fn list_patients(&self, owner: OwnerId) -> StoreResult<Vec<Patient>> {
        let rows = self.patients.read().await;
        Ok(rows.values().filter(|p| p.owner_id == owner).cloned().collect())
    }

    async fn get_patient(&self, owner: OwnerId, id: Uuid) -> StoreResult<Option<Patient>> {
        let rows = self.patients.read().await;
        Ok(owned(rows.get(&id), owner, |p| p.owner_id))
    }

    async fn insert_patient(&self, patient: Patient) -> StoreResult<Patient> {
        let mut rows = self.patients.write().await;
        if rows.contains_key(&patient.id) {
            return Err(StoreError::Rejected(format!("duplicate patient id {}", patient.id)));
        }
        rows.insert(patient.id, patient.clone());
        Ok(patient)
    }

    async fn update_patient(
        &self,
        owner: OwnerId,
        id: Uuid,
        patch: &PatientPatch,
    ) -> StoreResult<Option<Patient>> {
        let mut rows = self.patients.write().await;
        match rows.get_mut(&id).filter(|p| p.owner_id == owner) {
            Some(row) => {
                patch.apply_to(row);
                Ok(Some(row.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_patient(&self, owner: OwnerId, id: Uuid) -> StoreResult<bool> {
        let mut rows = self.patients.write().await;
        if rows.get(&id).map_or(false, |p| p.owner_id == owner) {
            rows.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn list_plans(&self, owner: OwnerId) -> StoreResult<Vec<Plan>> {
        let rows = self.plans.read().await;
        Ok(rows.values().filter(|p| p.owner_id == owner).cloned().collect())
    }

    async fn get_plan(&self, owner: OwnerId, id: Uuid) -> StoreResult<Option<Plan>> {
        let rows = self.plans.read().await;
        Ok(owned(rows.get(&id), owner, |p| p.owner_id))
    }

    async fn insert_plan(&self, plan: Plan) -> StoreResult<Plan> {
        let mut rows = self.plans.write().await;
        if rows.contains_key(&plan.id) {
            return Err(StoreError::Rejected(format!("duplicate plan id {}", plan.id)));
        }
        rows.insert(plan.id, plan.clone());
        Ok(plan)
    }

    async fn update_plan(&self, owner: OwnerId, id: Uuid, patch: &PlanPatch) -> StoreResult<Option<Plan>> {
        let mut rows = self.plans.write().await;
        match rows.get_mut(&id).filter(|p| p.owner_id == owner) {
            Some(row) => {
                patch.apply_to(row);
                Ok(Some(row.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_plan(&self, owner: OwnerId, id: Uuid) -> StoreResult<bool> {
        let mut rows = self.plans.write().await;
        if rows.get(&id).map_or(false, |p| p.owner_id == owner) {
            rows.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }
}
