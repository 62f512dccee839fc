/// Period summaries for the reports screen.

use crate::dates::CalendarDate;
use crate::error::{AgendaError, Result};
use crate::models::{Appointment, AppointmentStatus, BillingType};
use chrono::Duration;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodReport {
    pub from: CalendarDate,
    pub to: CalendarDate,
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub particular: usize,
    pub plano: usize,
    /// Sum of values of every appointment not cancelled.
    pub expected_revenue: f64,
    /// Sum of values of completed appointments.
    pub realized_revenue: f64,
    /// One entry per day of the range, zero-filled.
    pub per_day: Vec<(CalendarDate, usize)>,
}

impl PeriodReport {
    /// Summarize the appointments dated within `[from, to]`.
    pub fn build(appointments: &[Appointment], from: CalendarDate, to: CalendarDate) -> Result<Self> {
        if from > to {
            return Err(AgendaError::validation(format!(
                "Report range is inverted: {} is after {}",
                from, to
            )));
        }

        let mut by_status: BTreeMap<String, usize> = AppointmentStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut per_day: BTreeMap<CalendarDate, usize> = BTreeMap::new();
        let mut day = from;
        while day <= to {
            per_day.insert(day, 0);
            day += Duration::days(1);
        }

        let mut report = PeriodReport {
            from,
            to,
            total: 0,
            by_status: BTreeMap::new(),
            particular: 0,
            plano: 0,
            expected_revenue: 0.0,
            realized_revenue: 0.0,
            per_day: Vec::new(),
        };

        for appointment in appointments.iter().filter(|a| a.date >= from && a.date <= to) {
            report.total += 1;
            *by_status.entry(appointment.status.as_str().to_string()).or_insert(0) += 1;
            *per_day.entry(appointment.date).or_insert(0) += 1;

            match appointment.billing {
                BillingType::Particular => report.particular += 1,
                BillingType::Plano => report.plano += 1,
            }

            let value = appointment.value.unwrap_or(0.0);
            if appointment.is_active() {
                report.expected_revenue += value;
            }
            if appointment.status == AppointmentStatus::Concluido {
                report.realized_revenue += value;
            }
        }

        report.by_status = by_status;
        report.per_day = per_day.into_iter().collect();
        Ok(report)
    }

    pub fn count(&self, status: AppointmentStatus) -> usize {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }

    /// Share of non-cancelled appointments already completed, in percent.
    pub fn completion_rate(&self) -> f64 {
        let active = self.total - self.count(AppointmentStatus::Cancelado);
        if active == 0 {
            return 0.0;
        }
        (self.count(AppointmentStatus::Concluido) as f64 / active as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use uuid::Uuid;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn appointment(day: u32, status: AppointmentStatus, billing: BillingType, value: Option<f64>) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            date: d(day),
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            billing,
            status,
            value,
            notes: None,
            owner_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn summarizes_range() {
        let list = vec![
            appointment(13, AppointmentStatus::Concluido, BillingType::Particular, Some(200.0)),
            appointment(13, AppointmentStatus::Cancelado, BillingType::Plano, Some(150.0)),
            appointment(14, AppointmentStatus::Agendado, BillingType::Plano, Some(150.0)),
            appointment(15, AppointmentStatus::Agendado, BillingType::Particular, None),
            appointment(20, AppointmentStatus::Concluido, BillingType::Particular, Some(999.0)),
        ];

        let report = PeriodReport::build(&list, d(13), d(16)).unwrap();
        assert_eq!(report.total, 4);
        assert_eq!(report.count(AppointmentStatus::Agendado), 2);
        assert_eq!(report.count(AppointmentStatus::EmAndamento), 0);
        assert_eq!(report.particular, 2);
        assert_eq!(report.plano, 2);
        assert_eq!(report.expected_revenue, 350.0);
        assert_eq!(report.realized_revenue, 200.0);
        assert_eq!(report.per_day, vec![(d(13), 2), (d(14), 1), (d(15), 1), (d(16), 0)]);
        assert!((report.completion_rate() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_period_is_not_an_error() {
        let report = PeriodReport::build(&[], d(1), d(1)).unwrap();
        assert_eq!(report.total, 0);
        assert_eq!(report.completion_rate(), 0.0);
        assert_eq!(report.per_day, vec![(d(1), 0)]);
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(PeriodReport::build(&[], d(10), d(1)).is_err());
    }
}
