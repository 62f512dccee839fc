/// Error types for the clinic agenda.
///
/// Every failure a caller can observe is one of these variants. Validation
/// problems are detected before the store is touched; store failures carry
/// the message reported by the backend.

use crate::models::AppointmentStatus;
use crate::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AgendaError {
    #[error("Invalid date: '{0}'. Expected YYYY-MM-DD")]
    MalformedDate(String),

    #[error("Invalid time: '{0}'. Expected HH:MM or HH:MM:SS")]
    MalformedTime(String),

    #[error("{0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Cannot change status from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Patient {patient} cannot be deleted: {count} appointment(s) still reference it")]
    PatientHasAppointments { patient: Uuid, count: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AgendaError {
    pub fn validation(message: impl Into<String>) -> Self {
        AgendaError::Validation(message.into())
    }

    /// Whether a read that failed this way is worth attempting again.
    pub fn is_transient(&self) -> bool {
        matches!(self, AgendaError::Store(StoreError::Unavailable(_)))
    }
}

pub type Result<T> = std::result::Result<T, AgendaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_readable() {
        let err = AgendaError::InvalidTransition {
            from: AppointmentStatus::Concluido,
            to: AppointmentStatus::Cancelado,
        };
        assert_eq!(err.to_string(), "Cannot change status from concluido to cancelado");

        let err = AgendaError::MalformedDate("2024/01/01".to_string());
        assert!(err.to_string().contains("2024/01/01"));
    }

    #[test]
    fn only_unavailable_store_errors_are_transient() {
        assert!(AgendaError::from(StoreError::Unavailable("timeout".into())).is_transient());
        assert!(!AgendaError::from(StoreError::Rejected("denied".into())).is_transient());
        assert!(!AgendaError::validation("missing").is_transient());
    }
}
