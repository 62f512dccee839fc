/// Appointment status state machine.
///
/// ```text
/// agendado ──> em-andamento ──> concluido
///    │  ^                          │
///    v  │                          │ (manual correction)
/// cancelado          agendado <────┘
/// ```
///
/// Transitions are always user initiated. Nothing here moves an appointment
/// because time has passed; late appointments only surface as notifications.

use crate::error::{AgendaError, Result};
use crate::models::AppointmentStatus;

/// Statuses reachable from `from` in one step.
pub fn allowed_transitions(from: AppointmentStatus) -> &'static [AppointmentStatus] {
    use AppointmentStatus::*;
    match from {
        Agendado => &[EmAndamento, Cancelado],
        EmAndamento => &[Concluido],
        Cancelado => &[Agendado],
        Concluido => &[Agendado],
    }
}

pub fn can_transition(from: AppointmentStatus, to: AppointmentStatus) -> bool {
    from == to || allowed_transitions(from).contains(&to)
}

/// Check a requested change. Re-applying the current status is accepted.
pub fn validate_transition(from: AppointmentStatus, to: AppointmentStatus) -> Result<()> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(AgendaError::InvalidTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AppointmentStatus::*;

    #[test]
    fn forward_flow() {
        assert!(validate_transition(Agendado, EmAndamento).is_ok());
        assert!(validate_transition(EmAndamento, Concluido).is_ok());
    }

    #[test]
    fn cancel_and_restore() {
        assert!(validate_transition(Agendado, Cancelado).is_ok());
        assert!(validate_transition(Cancelado, Agendado).is_ok());
    }

    #[test]
    fn completed_can_be_corrected_back() {
        assert!(validate_transition(Concluido, Agendado).is_ok());
        assert!(validate_transition(Concluido, Cancelado).is_err());
        assert!(validate_transition(Concluido, EmAndamento).is_err());
    }

    #[test]
    fn rejects_skipping_states() {
        assert_eq!(
            validate_transition(Agendado, Concluido),
            Err(AgendaError::InvalidTransition { from: Agendado, to: Concluido })
        );
        assert!(validate_transition(Cancelado, Concluido).is_err());
        assert!(validate_transition(EmAndamento, Cancelado).is_err());
    }

    #[test]
    fn same_status_is_a_no_op() {
        for status in AppointmentStatus::ALL {
            assert!(can_transition(status, status));
        }
    }
}
