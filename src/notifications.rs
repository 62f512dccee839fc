/// Read-time notifications.
///
/// Notifications are never stored. Each poll derives them afresh from the
/// current appointments and the clock, so one appointment can move from a
/// reminder to a "starting soon" alert as time passes. Read flags live only
/// in the in-memory [`NotificationFeed`] and are gone after a restart.

use crate::agenda::Agenda;
use crate::dates::{format_time_label, local_instant, Clock};
use crate::error::Result;
use crate::models::{Appointment, AppointmentStatus, OwnerId, Patient};
use crate::store::AgendaStore;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

const SOON_MINUTES: i64 = 30;
const REMINDER_MINUTES: i64 = 120;
const MISSED_AFTER_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low = 1,
    Medium = 2,
    High = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Starts within half an hour.
    Soon,
    /// Starts within two hours.
    Reminder,
    /// More than fifteen minutes late and still `agendado`.
    Missed,
    /// Dated tomorrow.
    Tomorrow,
}

impl NotificationKind {
    pub fn priority(&self) -> NotificationPriority {
        match self {
            NotificationKind::Soon | NotificationKind::Missed => NotificationPriority::High,
            NotificationKind::Reminder => NotificationPriority::Medium,
            NotificationKind::Tomorrow => NotificationPriority::Low,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Soon => "soon",
            NotificationKind::Reminder => "reminder",
            NotificationKind::Missed => "missed",
            NotificationKind::Tomorrow => "tomorrow",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Stable for a given (kind, appointment) pair across polls.
    pub id: String,
    pub kind: NotificationKind,
    pub priority: NotificationPriority,
    pub appointment_id: Uuid,
    pub patient_name: String,
    pub title: String,
    pub message: String,
    /// Scheduled start of the appointment.
    pub at: DateTime<Tz>,
    pub read: bool,
}

impl Notification {
    fn new(kind: NotificationKind, appointment: &Appointment, patient_name: &str, at: DateTime<Tz>, minutes: i64) -> Self {
        let time = format_time_label(appointment.time);
        let (title, message) = match kind {
            NotificationKind::Soon => (
                "Consulta em breve".to_string(),
                format!("{} às {} (em {} min)", patient_name, time, minutes),
            ),
            NotificationKind::Reminder => (
                "Lembrete de consulta".to_string(),
                format!("{} às {} (em {}h{:02})", patient_name, time, minutes / 60, minutes % 60),
            ),
            NotificationKind::Missed => (
                "Consulta não iniciada".to_string(),
                format!("{} estava agendado para {} ({} min de atraso)", patient_name, time, -minutes),
            ),
            NotificationKind::Tomorrow => (
                "Consulta amanhã".to_string(),
                format!("{} amanhã às {}", patient_name, time),
            ),
        };

        Notification {
            id: format!("{}-{}", kind.as_str(), appointment.id),
            kind,
            priority: kind.priority(),
            appointment_id: appointment.id,
            patient_name: patient_name.to_string(),
            title,
            message,
            at,
            read: false,
        }
    }
}

/// Derive the current notifications, highest priority first and, within a
/// priority, most recent first.
pub fn derive_notifications(appointments: &[Appointment], patients: &[Patient], clock: &dyn Clock) -> Vec<Notification> {
    let now = clock.now();
    let tz = now.timezone();
    let today = now.date_naive();
    let tomorrow = today + ChronoDuration::days(1);
    let end_of_today = local_instant(tz, tomorrow, NaiveTime::MIN);
    let end_of_tomorrow = local_instant(tz, tomorrow + ChronoDuration::days(1), NaiveTime::MIN);

    let names: HashMap<Uuid, &str> = patients.iter().map(|p| (p.id, p.name.as_str())).collect();

    let mut notifications = Vec::new();
    for appointment in appointments {
        if appointment.status != AppointmentStatus::Agendado {
            continue;
        }
        if appointment.date != today && appointment.date != tomorrow {
            continue;
        }

        let name = names.get(&appointment.patient_id).copied().unwrap_or("Paciente");
        let start = local_instant(tz, appointment.date, appointment.time);
        let seconds = (start - now).num_seconds();
        // Whole minutes for display only; a partial minute ahead counts as one.
        let minutes = if seconds > 0 { (seconds + 59) / 60 } else { seconds / 60 };
        let mut emit = |kind| notifications.push(Notification::new(kind, appointment, name, start, minutes));

        if seconds > 0 && seconds <= SOON_MINUTES * 60 {
            emit(NotificationKind::Soon);
        } else if seconds > SOON_MINUTES * 60 && seconds <= REMINDER_MINUTES * 60 {
            emit(NotificationKind::Reminder);
        }
        if seconds < -MISSED_AFTER_MINUTES * 60 {
            emit(NotificationKind::Missed);
        }
        if start >= end_of_today && start < end_of_tomorrow {
            emit(NotificationKind::Tomorrow);
        }
    }

    notifications.sort_by(|a, b| b.priority.cmp(&a.priority).then(b.at.cmp(&a.at)));
    notifications
}

/// Latest derived notifications plus client-side read state.
#[derive(Debug, Default)]
pub struct NotificationFeed {
    items: Vec<Notification>,
    read: HashSet<String>,
    refreshed_at: Option<DateTime<Tz>>,
}

impl NotificationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached list, keeping read flags of surviving ids.
    pub fn refresh(&mut self, fresh: Vec<Notification>, at: DateTime<Tz>) {
        let ids: HashSet<&str> = fresh.iter().map(|n| n.id.as_str()).collect();
        self.read.retain(|id| ids.contains(id.as_str()));

        self.items = fresh;
        for item in &mut self.items {
            item.read = self.read.contains(&item.id);
        }
        self.refreshed_at = Some(at);
    }

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Tz>> {
        self.refreshed_at
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count()
    }

    pub fn mark_as_read(&mut self, id: &str) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(item) => {
                item.read = true;
                self.read.insert(item.id.clone());
                true
            }
            None => false,
        }
    }

    pub fn mark_all_as_read(&mut self) {
        for item in &mut self.items {
            item.read = true;
            self.read.insert(item.id.clone());
        }
    }
}

/// One poll: fetch rows for `owner` and derive notifications from them.
pub async fn poll_once<S: AgendaStore>(agenda: &Agenda<S>, owner: OwnerId) -> Result<Vec<Notification>> {
    let appointments = agenda.list_appointments(owner).await?;
    let patients = agenda.list_patients(owner).await?;
    Ok(derive_notifications(&appointments, &patients, agenda.clock()))
}

/// Refresh `feed` every `every`, starting immediately.
///
/// A failed poll keeps the previous list. The task runs until aborted.
pub fn spawn_poller<S>(
    agenda: Agenda<S>,
    owner: OwnerId,
    feed: Arc<Mutex<NotificationFeed>>,
    every: Duration,
) -> JoinHandle<()>
where
    S: AgendaStore + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match poll_once(&agenda, owner).await {
                Ok(fresh) => {
                    debug!(count = fresh.len(), "notifications refreshed");
                    let now = agenda.clock().now();
                    feed.lock().await.refresh(fresh, now);
                }
                Err(err) => warn!(error = %err, "notification poll failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::{FixedClock, DEFAULT_TIMEZONE};
    use crate::models::BillingType;
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 14).unwrap()
    }

    fn clock_at(h: u32, m: u32) -> FixedClock {
        FixedClock::at(DEFAULT_TIMEZONE, today(), NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    fn clock_at_secs(h: u32, m: u32, sec: u32) -> FixedClock {
        FixedClock::at(DEFAULT_TIMEZONE, today(), NaiveTime::from_hms_opt(h, m, sec).unwrap())
    }

    fn appointment(date: NaiveDate, h: u32, m: u32, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            date,
            time: NaiveTime::from_hms_opt(h, m, 0).unwrap(),
            billing: BillingType::Particular,
            status,
            value: None,
            notes: None,
            owner_id: Uuid::new_v4(),
        }
    }

    fn kinds(notifications: &[Notification]) -> Vec<NotificationKind> {
        notifications.iter().map(|n| n.kind).collect()
    }

    #[test]
    fn ten_minutes_ahead_is_soon_only() {
        let a = appointment(today(), 10, 10, AppointmentStatus::Agendado);
        let found = derive_notifications(&[a], &[], &clock_at(10, 0));
        assert_eq!(kinds(&found), vec![NotificationKind::Soon]);
        assert_eq!(found[0].priority, NotificationPriority::High);
    }

    #[test]
    fn an_hour_ahead_is_a_reminder() {
        let a = appointment(today(), 11, 0, AppointmentStatus::Agendado);
        let found = derive_notifications(&[a.clone()], &[], &clock_at(10, 0));
        assert_eq!(kinds(&found), vec![NotificationKind::Reminder]);
        assert_eq!(found[0].priority, NotificationPriority::Medium);

        // Exactly thirty minutes out still counts as soon.
        let found = derive_notifications(&[a], &[], &clock_at(10, 30));
        assert_eq!(kinds(&found), vec![NotificationKind::Soon]);
    }

    #[test]
    fn missed_needs_more_than_fifteen_minutes() {
        let a = appointment(today(), 10, 0, AppointmentStatus::Agendado);
        assert!(derive_notifications(&[a.clone()], &[], &clock_at(10, 10)).is_empty());
        assert!(derive_notifications(&[a.clone()], &[], &clock_at(10, 15)).is_empty());

        let found = derive_notifications(&[a], &[], &clock_at(10, 16));
        assert_eq!(kinds(&found), vec![NotificationKind::Missed]);
    }

    #[test]
    fn partial_minutes_are_not_dropped() {
        let a = appointment(today(), 10, 0, AppointmentStatus::Agendado);

        let found = derive_notifications(&[a.clone()], &[], &clock_at_secs(10, 15, 30));
        assert_eq!(kinds(&found), vec![NotificationKind::Missed]);
        let found = derive_notifications(&[a.clone()], &[], &clock_at_secs(10, 15, 59));
        assert_eq!(kinds(&found), vec![NotificationKind::Missed]);

        let found = derive_notifications(&[a.clone()], &[], &clock_at_secs(9, 59, 30));
        assert_eq!(kinds(&found), vec![NotificationKind::Soon]);
        assert!(found[0].message.contains("em 1 min"));

        let found = derive_notifications(&[a.clone()], &[], &clock_at_secs(9, 29, 30));
        assert_eq!(kinds(&found), vec![NotificationKind::Reminder]);

        let found = derive_notifications(&[a.clone()], &[], &clock_at_secs(7, 59, 59));
        assert!(found.is_empty());
        let found = derive_notifications(&[a], &[], &clock_at_secs(8, 0, 0));
        assert_eq!(kinds(&found), vec![NotificationKind::Reminder]);
    }

    #[test]
    fn only_agendado_counts() {
        let list = vec![
            appointment(today(), 10, 10, AppointmentStatus::Cancelado),
            appointment(today(), 9, 0, AppointmentStatus::EmAndamento),
            appointment(today(), 8, 0, AppointmentStatus::Concluido),
        ];
        assert!(derive_notifications(&list, &[], &clock_at(10, 0)).is_empty());
    }

    #[test]
    fn tomorrow_is_low_priority() {
        let tomorrow = today() + ChronoDuration::days(1);
        let a = appointment(tomorrow, 15, 0, AppointmentStatus::Agendado);
        let found = derive_notifications(&[a], &[], &clock_at(10, 0));
        assert_eq!(kinds(&found), vec![NotificationKind::Tomorrow]);
        assert_eq!(found[0].priority, NotificationPriority::Low);

        let later = appointment(today() + ChronoDuration::days(2), 9, 0, AppointmentStatus::Agendado);
        assert!(derive_notifications(&[later], &[], &clock_at(10, 0)).is_empty());
    }

    #[test]
    fn near_midnight_one_appointment_yields_two() {
        let tomorrow = today() + ChronoDuration::days(1);
        let a = appointment(tomorrow, 0, 10, AppointmentStatus::Agendado);
        let found = derive_notifications(&[a], &[], &clock_at(23, 50));
        assert_eq!(kinds(&found), vec![NotificationKind::Soon, NotificationKind::Tomorrow]);
    }

    #[test]
    fn sorted_by_priority_then_recency() {
        let list = vec![
            appointment(today() + ChronoDuration::days(1), 9, 0, AppointmentStatus::Agendado),
            appointment(today(), 11, 0, AppointmentStatus::Agendado),
            appointment(today(), 8, 0, AppointmentStatus::Agendado),
            appointment(today(), 7, 0, AppointmentStatus::Agendado),
            appointment(today(), 10, 20, AppointmentStatus::Agendado),
        ];
        let found = derive_notifications(&list, &[], &clock_at(10, 0));
        let priorities: Vec<NotificationPriority> = found.iter().map(|n| n.priority).collect();
        assert_eq!(
            priorities,
            vec![
                NotificationPriority::High,
                NotificationPriority::High,
                NotificationPriority::High,
                NotificationPriority::Medium,
                NotificationPriority::Low,
            ]
        );
        // Among the high ones the latest start comes first.
        assert_eq!(found[0].kind, NotificationKind::Soon);
        assert!(found[1].at > found[2].at);
    }

    #[test]
    fn messages_use_patient_names() {
        let owner = Uuid::new_v4();
        let patient = Patient::new(owner, "Ana Souza").unwrap();
        let mut a = appointment(today(), 10, 10, AppointmentStatus::Agendado);
        a.patient_id = patient.id;
        let found = derive_notifications(&[a], &[patient], &clock_at(10, 0));
        assert_eq!(found[0].patient_name, "Ana Souza");
        assert!(found[0].message.contains("10:10"));
    }

    #[test]
    fn read_state_is_kept_in_memory_only() {
        let a = appointment(today(), 10, 10, AppointmentStatus::Agendado);
        let b = appointment(today(), 11, 0, AppointmentStatus::Agendado);
        let clock = clock_at(10, 0);
        let first = derive_notifications(&[a.clone(), b.clone()], &[], &clock);
        let soon_id = first[0].id.clone();

        let mut feed = NotificationFeed::new();
        feed.refresh(first, clock.now());
        assert_eq!(feed.unread_count(), 2);
        assert!(feed.mark_as_read(&soon_id));
        assert!(!feed.mark_as_read("missing"));
        assert_eq!(feed.unread_count(), 1);

        // The next poll keeps the flag for the same notification.
        feed.refresh(derive_notifications(&[a.clone(), b.clone()], &[], &clock), clock.now());
        assert_eq!(feed.unread_count(), 1);

        feed.mark_all_as_read();
        assert_eq!(feed.unread_count(), 0);

        // A fresh feed, as after a reload, starts unread again.
        let mut reloaded = NotificationFeed::new();
        reloaded.refresh(derive_notifications(&[a, b], &[], &clock), clock.now());
        assert_eq!(reloaded.unread_count(), 2);
    }
}
