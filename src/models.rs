/// Data models for the clinic agenda.
///
/// This module defines the core data structures used throughout the system:
/// - AppointmentStatus / BillingType: enums stored on each appointment
/// - Appointment: a booked consultation
/// - Patient: someone the professional sees
/// - Plan: a named fixed-price billing category
/// - WorkingHours: the professional's day layout, used to derive slots
/// - Drafts and patches: the inputs of create and update operations

use crate::dates::{format_for_storage, format_time_label};
use crate::error::{AgendaError, Result};
use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of the authenticated professional owning every row.
pub type OwnerId = Uuid;

/// Appointment lifecycle states, in their stored spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    #[serde(rename = "agendado")]
    Agendado,
    #[serde(rename = "em-andamento")]
    EmAndamento,
    #[serde(rename = "concluido")]
    Concluido,
    #[serde(rename = "cancelado")]
    Cancelado,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Agendado,
        AppointmentStatus::EmAndamento,
        AppointmentStatus::Concluido,
        AppointmentStatus::Cancelado,
    ];

    /// Stored spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Agendado => "agendado",
            AppointmentStatus::EmAndamento => "em-andamento",
            AppointmentStatus::Concluido => "concluido",
            AppointmentStatus::Cancelado => "cancelado",
        }
    }

    /// Label shown to the professional.
    pub fn name(&self) -> &'static str {
        match self {
            AppointmentStatus::Agendado => "Agendado",
            AppointmentStatus::EmAndamento => "Em andamento",
            AppointmentStatus::Concluido => "Concluído",
            AppointmentStatus::Cancelado => "Cancelado",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AgendaError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().trim() {
            "agendado" => Ok(AppointmentStatus::Agendado),
            "em-andamento" => Ok(AppointmentStatus::EmAndamento),
            "concluido" => Ok(AppointmentStatus::Concluido),
            "cancelado" => Ok(AppointmentStatus::Cancelado),
            _ => Err(AgendaError::validation(format!(
                "Invalid status: '{}'. Must be one of: agendado, em-andamento, concluido, cancelado",
                value
            ))),
        }
    }
}

/// How the consultation is paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingType {
    /// Self-pay.
    Particular,
    /// Covered by one of the professional's plans.
    Plano,
}

impl BillingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingType::Particular => "particular",
            BillingType::Plano => "plano",
        }
    }
}

impl fmt::Display for BillingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingType {
    type Err = AgendaError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().trim() {
            "particular" => Ok(BillingType::Particular),
            "plano" => Ok(BillingType::Plano),
            _ => Err(AgendaError::validation(format!(
                "Invalid billing type: '{}'. Must be one of: particular, plano",
                value
            ))),
        }
    }
}

/// Represents a booked consultation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(rename = "type")]
    pub billing: BillingType,
    pub status: AppointmentStatus,
    pub value: Option<f64>,
    pub notes: Option<String>,
    #[serde(rename = "user_id")]
    pub owner_id: OwnerId,
}

impl Appointment {
    /// `HH:MM` label of the start time, as matched against slot cells.
    pub fn time_label(&self) -> String {
        format_time_label(self.time)
    }

    pub fn storage_date(&self) -> String {
        format_for_storage(self.date)
    }

    pub fn is_active(&self) -> bool {
        self.status != AppointmentStatus::Cancelado
    }
}

/// Input for booking a consultation, as collected from a form.
///
/// Patient, date and time are optional here so that a missing field is a
/// validation error rather than a construction-time impossibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppointmentDraft {
    pub patient_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub billing: Option<BillingType>,
    /// Plan to copy the value from when `value` is not given. Not stored.
    pub plan_id: Option<Uuid>,
    pub value: Option<f64>,
    pub notes: Option<String>,
}

/// Partial update of an appointment.
///
/// Only fields set to `Some` are written. For the nullable columns the inner
/// `Option` is the new value, so `Some(None)` clears the column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentPatch {
    pub patient_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub billing: Option<BillingType>,
    pub status: Option<AppointmentStatus>,
    pub value: Option<Option<f64>>,
    pub notes: Option<Option<String>>,
}

impl AppointmentPatch {
    pub fn status(status: AppointmentStatus) -> Self {
        AppointmentPatch {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn move_to(date: NaiveDate, time: NaiveTime) -> Self {
        AppointmentPatch {
            date: Some(date),
            time: Some(time),
            ..Default::default()
        }
    }

    /// Minimal patch turning `before` into `after`.
    ///
    /// Edit forms hold a full copy of the row; diffing keeps stale form
    /// state from overwriting columns the user never touched.
    pub fn between(before: &Appointment, after: &Appointment) -> Self {
        fn changed<T: PartialEq + Clone>(a: &T, b: &T) -> Option<T> {
            if a != b {
                Some(b.clone())
            } else {
                None
            }
        }

        AppointmentPatch {
            patient_id: changed(&before.patient_id, &after.patient_id),
            date: changed(&before.date, &after.date),
            time: changed(&before.time, &after.time),
            billing: changed(&before.billing, &after.billing),
            status: changed(&before.status, &after.status),
            value: changed(&before.value, &after.value),
            notes: changed(&before.notes, &after.notes),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == AppointmentPatch::default()
    }

    /// Write the present fields onto `appointment`.
    pub fn apply_to(&self, appointment: &mut Appointment) {
        if let Some(patient_id) = self.patient_id {
            appointment.patient_id = patient_id;
        }
        if let Some(date) = self.date {
            appointment.date = date;
        }
        if let Some(time) = self.time {
            appointment.time = time;
        }
        if let Some(billing) = self.billing {
            appointment.billing = billing;
        }
        if let Some(status) = self.status {
            appointment.status = status;
        }
        if let Some(value) = self.value {
            appointment.value = value;
        }
        if let Some(notes) = &self.notes {
            appointment.notes = notes.clone();
        }
    }
}

/// Represents a patient of the professional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
    #[serde(rename = "user_id")]
    pub owner_id: OwnerId,
}

impl Patient {
    /// Create a new patient with validation.
    pub fn new(owner_id: OwnerId, name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AgendaError::validation("Patient name cannot be empty"));
        }

        Ok(Patient {
            id: Uuid::new_v4(),
            name: name.to_string(),
            phone: None,
            email: None,
            notes: None,
            owner_id,
        })
    }
}

/// Input for registering a patient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientDraft {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
}

/// Partial update of a patient; same conventions as [`AppointmentPatch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientPatch {
    pub name: Option<String>,
    pub phone: Option<Option<String>>,
    pub email: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

impl PatientPatch {
    pub fn validate(&self) -> Result<()> {
        match &self.name {
            Some(name) if name.trim().is_empty() => {
                Err(AgendaError::validation("Patient name cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    pub fn apply_to(&self, patient: &mut Patient) {
        if let Some(name) = &self.name {
            patient.name = name.trim().to_string();
        }
        if let Some(phone) = &self.phone {
            patient.phone = phone.clone();
        }
        if let Some(email) = &self.email {
            patient.email = email.clone();
        }
        if let Some(notes) = &self.notes {
            patient.notes = notes.clone();
        }
    }
}

/// A named billing category with a fixed consultation value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub value: f64,
    #[serde(rename = "user_id")]
    pub owner_id: OwnerId,
}

impl Plan {
    /// Create a new plan with validation.
    pub fn new(owner_id: OwnerId, name: &str, value: f64) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AgendaError::validation("Plan name cannot be empty"));
        }
        validate_value(value)?;

        Ok(Plan {
            id: Uuid::new_v4(),
            name: name.to_string(),
            value,
            owner_id,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanPatch {
    pub name: Option<String>,
    pub value: Option<f64>,
}

impl PlanPatch {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(AgendaError::validation("Plan name cannot be empty"));
            }
        }
        if let Some(value) = self.value {
            validate_value(value)?;
        }
        Ok(())
    }

    pub fn apply_to(&self, plan: &mut Plan) {
        if let Some(name) = &self.name {
            plan.name = name.trim().to_string();
        }
        if let Some(value) = self.value {
            plan.value = value;
        }
    }
}

pub(crate) fn validate_value(value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(AgendaError::validation(format!(
            "Value must be a non-negative amount, got {}",
            value
        )));
    }
    Ok(())
}

/// A candidate session length; exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDuration {
    pub minutes: u32,
    pub active: bool,
}

/// The professional's working-day layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// Single optional blocked interval, `[start, end)`.
    pub block: Option<(NaiveTime, NaiveTime)>,
    pub durations: Vec<SessionDuration>,
    pub days: Vec<Weekday>,
}

impl WorkingHours {
    /// Length of the active session, if one is marked active.
    pub fn session_minutes(&self) -> Option<u32> {
        self.durations.iter().find(|d| d.active).map(|d| d.minutes)
    }

    /// Mark `minutes` as the active duration, adding it as a candidate if new.
    pub fn activate_duration(&mut self, minutes: u32) {
        let mut found = false;
        for duration in &mut self.durations {
            duration.active = duration.minutes == minutes;
            found |= duration.active;
        }
        if !found {
            self.durations.push(SessionDuration { minutes, active: true });
        }
    }

    pub fn works_on(&self, day: Weekday) -> bool {
        self.days.contains(&day)
    }
}

impl Default for WorkingHours {
    fn default() -> Self {
        let at = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap_or(NaiveTime::MIN);
        WorkingHours {
            start: at(8),
            end: at(18),
            block: Some((at(12), at(13))),
            durations: vec![
                SessionDuration { minutes: 30, active: false },
                SessionDuration { minutes: 50, active: true },
                SessionDuration { minutes: 60, active: false },
            ],
            days: vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2024, 5, 14).unwrap(),
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            billing: BillingType::Particular,
            status: AppointmentStatus::Agendado,
            value: Some(200.0),
            notes: Some("first visit".to_string()),
            owner_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn status_parses_stored_spelling() {
        for status in AppointmentStatus::ALL {
            assert_eq!(status.as_str().parse::<AppointmentStatus>().unwrap(), status);
        }
        assert!("done".parse::<AppointmentStatus>().is_err());
    }

    #[test]
    fn serializes_with_row_column_names() {
        let appointment = sample();
        let json = serde_json::to_value(&appointment).unwrap();
        assert_eq!(json["type"], "particular");
        assert_eq!(json["status"], "agendado");
        assert_eq!(json["date"], "2024-05-14");
        assert!(json.get("user_id").is_some());

        let em = serde_json::to_value(AppointmentStatus::EmAndamento).unwrap();
        assert_eq!(em, "em-andamento");
    }

    #[test]
    fn patch_between_only_carries_changes() {
        let before = sample();
        let mut after = before.clone();
        after.time = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        after.notes = None;

        let patch = AppointmentPatch::between(&before, &after);
        assert_eq!(patch.time, Some(after.time));
        assert_eq!(patch.notes, Some(None));
        assert_eq!(patch.date, None);
        assert_eq!(patch.value, None);

        let mut target = before.clone();
        patch.apply_to(&mut target);
        assert_eq!(target, after);

        assert!(AppointmentPatch::between(&before, &before).is_empty());
    }

    #[test]
    fn patient_name_is_required() {
        let owner = Uuid::new_v4();
        assert!(Patient::new(owner, "   ").is_err());
        let patient = Patient::new(owner, "  Ana Souza ").unwrap();
        assert_eq!(patient.name, "Ana Souza");

        let patch = PatientPatch {
            name: Some(String::new()),
            ..Default::default()
        };
        assert!(patch.validate().is_err());

        let mut edited = patient.clone();
        let patch = PatientPatch {
            phone: Some(Some("11 99999-0000".to_string())),
            ..Default::default()
        };
        patch.validate().unwrap();
        patch.apply_to(&mut edited);
        assert_eq!(edited.name, patient.name);
        assert_eq!(edited.phone.as_deref(), Some("11 99999-0000"));
    }

    #[test]
    fn plan_value_must_be_non_negative() {
        let owner = Uuid::new_v4();
        assert!(Plan::new(owner, "Unimed", -1.0).is_err());
        assert!(Plan::new(owner, "Unimed", f64::NAN).is_err());
        assert_eq!(Plan::new(owner, "Unimed", 150.0).unwrap().value, 150.0);
        assert!(PlanPatch { value: Some(-5.0), ..Default::default() }.validate().is_err());
    }

    #[test]
    fn one_active_session_duration() {
        let mut hours = WorkingHours::default();
        assert_eq!(hours.session_minutes(), Some(50));
        hours.activate_duration(30);
        assert_eq!(hours.session_minutes(), Some(30));
        assert_eq!(hours.durations.iter().filter(|d| d.active).count(), 1);
        hours.activate_duration(45);
        assert_eq!(hours.session_minutes(), Some(45));
        assert_eq!(hours.durations.len(), 4);
    }
}
