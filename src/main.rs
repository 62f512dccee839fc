/// Command-line interface for the clinic agenda.
///
/// This module provides an interactive menu for registering patients and
/// plans, booking and moving appointments, viewing the weekly slot grid,
/// reading notifications and printing period reports.

use anyhow::Context;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike};
use clinicagenda::agenda::Agenda;
use clinicagenda::config::AgendaConfig;
use clinicagenda::dates::{format_for_storage, format_time_label, parse_date, parse_time, Clock, SystemClock};
use clinicagenda::models::{
    Appointment, AppointmentDraft, AppointmentStatus, BillingType, OwnerId, Patient, PatientDraft,
    WorkingHours,
};
use clinicagenda::notifications::{spawn_poller, NotificationFeed};
use clinicagenda::reports::PeriodReport;
use clinicagenda::slots::SlotKind;
use clinicagenda::status::allowed_transitions;
use clinicagenda::store::MemoryStore;
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

struct AgendaCli {
    agenda: Agenda<MemoryStore>,
    owner: OwnerId,
    hours: WorkingHours,
    feed: Arc<Mutex<NotificationFeed>>,
    running: bool,
}

impl AgendaCli {
    fn new(agenda: Agenda<MemoryStore>, config: &AgendaConfig, feed: Arc<Mutex<NotificationFeed>>) -> Self {
        AgendaCli {
            agenda,
            owner: config.owner_id,
            hours: config.working_hours.clone(),
            feed,
            running: true,
        }
    }

    fn print_header(&self) {
        println!("\n{}", "=".repeat(60));
        println!("       CLINIC AGENDA");
        println!("{}", "=".repeat(60));
    }

    fn print_menu(&self) {
        println!("\n--- Main Menu ---");
        println!(" 1. Register patient");
        println!(" 2. Register plan");
        println!(" 3. Book appointment");
        println!(" 4. List appointments");
        println!(" 5. Today's agenda");
        println!(" 6. Week grid");
        println!(" 7. Change status");
        println!(" 8. Reschedule to slot");
        println!(" 9. Delete appointment");
        println!("10. Delete patient");
        println!("11. Notifications");
        println!("12. Period report");
        println!("13. Export appointments (JSON)");
        println!("14. Load demo data");
        println!(" 0. Exit");
        println!("{}", "-".repeat(20));
    }

    fn get_input(&mut self, prompt: &str, default: Option<&str>) -> String {
        if let Some(def) = default {
            print!("{} [{}]: ", prompt, def);
        } else {
            print!("{}: ", prompt);
        }
        io::stdout().flush().ok();

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) | Err(_) => {
                self.running = false;
                return default.unwrap_or("").to_string();
            }
            Ok(_) => {}
        }
        let input = input.trim();

        if input.is_empty() {
            default.unwrap_or("").to_string()
        } else {
            input.to_string()
        }
    }

    fn get_int_input(&mut self, prompt: &str, default: Option<i32>) -> i32 {
        loop {
            let default_str = default.map(|d| d.to_string());
            let input = self.get_input(prompt, default_str.as_deref());

            if let Ok(value) = input.parse::<i32>() {
                return value;
            }
            if !self.running {
                return default.unwrap_or(0);
            }
            println!("Please enter a valid number");
        }
    }

    fn get_date_input(&mut self, prompt: &str, default: NaiveDate) -> Option<NaiveDate> {
        let input = self.get_input(prompt, Some(format_for_storage(default).as_str()));
        match parse_date(&input) {
            Ok(date) => Some(date),
            Err(e) => {
                println!("{}", e);
                None
            }
        }
    }

    fn get_time_input(&mut self, prompt: &str, default: &str) -> Option<NaiveTime> {
        let input = self.get_input(prompt, Some(default));
        match parse_time(&input) {
            Ok(time) => Some(time),
            Err(e) => {
                println!("{}", e);
                None
            }
        }
    }

    fn today(&self) -> NaiveDate {
        self.agenda.clock().today()
    }

    async fn patient_names(&self) -> HashMap<Uuid, String> {
        match self.agenda.list_patients(self.owner).await {
            Ok(patients) => patients.into_iter().map(|p| (p.id, p.name)).collect(),
            Err(e) => {
                println!("Could not load patients: {}", e);
                HashMap::new()
            }
        }
    }

    async fn pick_patient(&mut self) -> Option<Patient> {
        let patients = match self.agenda.list_patients(self.owner).await {
            Ok(patients) => patients,
            Err(e) => {
                println!("\nError loading patients: {}", e);
                return None;
            }
        };
        if patients.is_empty() {
            println!("\nNo patients registered yet (option 1)");
            return None;
        }

        println!("\nPatients:");
        for (i, patient) in patients.iter().enumerate() {
            println!("  {}. {}", i + 1, patient.name);
        }
        let choice = self.get_int_input("Select patient (0 to go back)", Some(0));
        if choice <= 0 || choice as usize > patients.len() {
            return None;
        }
        patients.into_iter().nth(choice as usize - 1)
    }

    async fn pick_appointment(&mut self) -> Option<Appointment> {
        let appointments = match self.agenda.list_appointments(self.owner).await {
            Ok(appointments) => appointments,
            Err(e) => {
                println!("\nError loading appointments: {}", e);
                return None;
            }
        };
        if appointments.is_empty() {
            println!("\nNo appointments");
            return None;
        }

        let names = self.patient_names().await;
        println!("\nAppointments:");
        for (i, apt) in appointments.iter().enumerate() {
            println!("  {}. {}", i + 1, describe(apt, &names));
        }
        let choice = self.get_int_input("Select appointment (0 to go back)", Some(0));
        if choice <= 0 || choice as usize > appointments.len() {
            return None;
        }
        appointments.into_iter().nth(choice as usize - 1)
    }

    async fn register_patient(&mut self) {
        println!("\n--- Register Patient ---");
        let name = self.get_input("Name", None);
        let phone = self.get_input("Phone (optional)", Some(""));
        let email = self.get_input("Email (optional)", Some(""));
        let notes = self.get_input("Notes (optional)", Some(""));

        let draft = PatientDraft {
            name,
            phone: Some(phone),
            email: Some(email),
            notes: Some(notes),
        };
        match self.agenda.create_patient(self.owner, draft).await {
            Ok(patient) => println!("\nPatient {} registered", patient.name),
            Err(e) => println!("\nError registering patient: {}", e),
        }
    }

    async fn register_plan(&mut self) {
        println!("\n--- Register Plan ---");
        let name = self.get_input("Plan name", None);
        let value = self.get_input("Consultation value", Some("0"));
        let value: f64 = match value.replace(',', ".").parse() {
            Ok(v) => v,
            Err(_) => {
                println!("Invalid value: '{}'", value);
                return;
            }
        };

        match self.agenda.create_plan(self.owner, &name, value).await {
            Ok(plan) => println!("\nPlan {} registered ({:.2})", plan.name, plan.value),
            Err(e) => println!("\nError registering plan: {}", e),
        }
    }

    async fn book_appointment(&mut self) {
        println!("\n--- Book Appointment ---");
        let patient = match self.pick_patient().await {
            Some(p) => p,
            None => return,
        };
        let today = self.today();
        let date = match self.get_date_input("Date (YYYY-MM-DD)", today) {
            Some(d) => d,
            None => return,
        };
        let time = match self.get_time_input("Time (HH:MM)", "09:00") {
            Some(t) => t,
            None => return,
        };

        let mut draft = AppointmentDraft {
            patient_id: Some(patient.id),
            date: Some(date),
            time: Some(time),
            ..Default::default()
        };

        println!("\nBilling:");
        println!("  1. Particular");
        println!("  2. Plano");
        if self.get_int_input("Select billing", Some(1)) == 2 {
            draft.billing = Some(BillingType::Plano);
            let plans = match self.agenda.list_plans(self.owner).await {
                Ok(plans) => plans,
                Err(e) => {
                    println!("\nError loading plans: {}", e);
                    return;
                }
            };
            for (i, plan) in plans.iter().enumerate() {
                println!("  {}. {} ({:.2})", i + 1, plan.name, plan.value);
            }
            let choice = self.get_int_input("Select plan (0 for none)", Some(0));
            if choice > 0 && (choice as usize) <= plans.len() {
                draft.plan_id = Some(plans[choice as usize - 1].id);
            }
        } else {
            draft.billing = Some(BillingType::Particular);
        }

        if draft.plan_id.is_none() {
            let value = self.get_input("Value (optional)", Some(""));
            if !value.is_empty() {
                match value.replace(',', ".").parse::<f64>() {
                    Ok(v) => draft.value = Some(v),
                    Err(_) => {
                        println!("Invalid value: '{}'", value);
                        return;
                    }
                }
            }
        }
        let notes = self.get_input("Notes (optional)", Some(""));
        draft.notes = Some(notes);

        match self.agenda.create_appointment(self.owner, draft).await {
            Ok(apt) => println!(
                "\nAppointment booked for {} on {} at {}",
                patient.name,
                apt.storage_date(),
                apt.time_label()
            ),
            Err(e) => println!("\nError booking appointment: {}", e),
        }
    }

    async fn list_appointments(&self) {
        let appointments = match self.agenda.list_appointments(self.owner).await {
            Ok(a) => a,
            Err(e) => {
                println!("\nError loading appointments: {}", e);
                return;
            }
        };
        if appointments.is_empty() {
            println!("\nNo appointments");
            return;
        }

        let names = self.patient_names().await;
        println!("\n--- Appointments ({}) ---", appointments.len());
        let mut current_date = None;
        for apt in &appointments {
            if Some(apt.date) != current_date {
                current_date = Some(apt.date);
                println!("\n{}:", apt.date.format("%A, %Y-%m-%d"));
            }
            println!("  {}", describe(apt, &names));
        }
    }

    async fn view_today(&self) {
        let appointments = match self.agenda.list_today_appointments(self.owner).await {
            Ok(a) => a,
            Err(e) => {
                println!("\nError loading today's agenda: {}", e);
                return;
            }
        };
        println!("\n--- Today {} ---", format_for_storage(self.today()));
        if appointments.is_empty() {
            println!("Nothing scheduled today");
            return;
        }
        let names = self.patient_names().await;
        for apt in &appointments {
            println!("  {}", describe(apt, &names));
        }
    }

    async fn view_week(&mut self) {
        let today = self.today();
        let anchor = match self.get_date_input("Any date in the week", today) {
            Some(d) => d,
            None => return,
        };
        let grid = match self.agenda.week_grid(self.owner, anchor, &self.hours).await {
            Ok(grid) => grid,
            Err(e) => {
                println!("\nError building week: {}", e);
                return;
            }
        };

        if grid.rows.is_empty() {
            println!("\nNo slots: check working hours and session duration");
            return;
        }

        print!("\n{:>6}", "");
        for date in &grid.dates {
            print!(" {:>9}", format!("{} {:02}/{:02}", weekday_short(date.weekday()), date.day(), date.month()));
        }
        println!();
        for (row, slot) in grid.rows.iter().enumerate() {
            print!("{:>6}", slot.label);
            for cell in &grid.cells[row] {
                let mark = match (cell.appointments.len(), cell.kind) {
                    (0, SlotKind::Working) => ".".to_string(),
                    (0, SlotKind::Blocked) => "x".to_string(),
                    (0, SlotKind::Closed) => "-".to_string(),
                    (n, _) => format!("[{}]", n),
                };
                print!(" {:>9}", mark);
            }
            println!();
        }
        println!("\n  . free   x blocked   - closed   [n] booked");
        if !grid.unplaced.is_empty() {
            println!("  {} appointment(s) outside the slot grid this week", grid.unplaced.len());
        }
    }

    async fn change_status(&mut self) {
        println!("\n--- Change Status ---");
        let apt = match self.pick_appointment().await {
            Some(a) => a,
            None => return,
        };
        let options = allowed_transitions(apt.status);
        println!("\nCurrent status: {}", apt.status.name());
        for (i, status) in options.iter().enumerate() {
            println!("  {}. {}", i + 1, status.name());
        }
        let choice = self.get_int_input("New status (0 to go back)", Some(0));
        if choice <= 0 || choice as usize > options.len() {
            return;
        }
        let status = options[choice as usize - 1];

        match self.agenda.set_status(self.owner, apt.id, status).await {
            Ok(updated) => println!("\nStatus changed to {}", updated.status.name()),
            Err(e) => println!("\nError changing status: {}", e),
        }
    }

    async fn reschedule(&mut self) {
        println!("\n--- Reschedule ---");
        let apt = match self.pick_appointment().await {
            Some(a) => a,
            None => return,
        };
        let date = match self.get_date_input("Target date", apt.date) {
            Some(d) => d,
            None => return,
        };
        let label = self.get_input("Target slot (HH:MM)", Some(apt.time_label().as_str()));

        match self.agenda.reschedule(self.owner, apt.id, date, &label).await {
            Ok(moved) => println!("\nMoved to {} at {}", moved.storage_date(), moved.time_label()),
            Err(e) => println!("\nError rescheduling: {}", e),
        }
    }

    async fn delete_appointment(&mut self) {
        println!("\n--- Delete Appointment ---");
        let apt = match self.pick_appointment().await {
            Some(a) => a,
            None => return,
        };
        let confirm = self.get_input("Delete permanently? (y/n)", Some("n"));
        if confirm.to_lowercase() != "y" {
            return;
        }
        match self.agenda.delete_appointment(self.owner, apt.id).await {
            Ok(()) => println!("\nAppointment deleted"),
            Err(e) => println!("\nError deleting appointment: {}", e),
        }
    }

    async fn delete_patient(&mut self) {
        println!("\n--- Delete Patient ---");
        let patient = match self.pick_patient().await {
            Some(p) => p,
            None => return,
        };
        match self.agenda.delete_patient(self.owner, patient.id).await {
            Ok(()) => println!("\nPatient {} deleted", patient.name),
            Err(e) => println!("\nError deleting patient: {}", e),
        }
    }

    async fn view_notifications(&mut self) {
        let items = {
            let feed = self.feed.lock().await;
            println!("\n--- Notifications ({} unread) ---", feed.unread_count());
            feed.items().to_vec()
        };
        if items.is_empty() {
            println!("Nothing to report");
            return;
        }

        for (i, n) in items.iter().enumerate() {
            let flag = if n.read { " " } else { "*" };
            println!("  {}{}. [{:?}] {}: {}", flag, i + 1, n.priority, n.title, n.message);
        }
        let choice = self.get_int_input("Mark as read (number, -1 for all, 0 to go back)", Some(0));
        let mut feed = self.feed.lock().await;
        if choice == -1 {
            feed.mark_all_as_read();
        } else if choice > 0 && (choice as usize) <= items.len() {
            feed.mark_as_read(&items[choice as usize - 1].id);
        }
    }

    async fn view_report(&mut self) {
        println!("\n--- Period Report ---");
        let today = self.today();
        let first = today.with_day(1).unwrap_or(today);
        let from = match self.get_date_input("From", first) {
            Some(d) => d,
            None => return,
        };
        let to = match self.get_date_input("To", today) {
            Some(d) => d,
            None => return,
        };

        let appointments = match self.agenda.list_appointments_between(self.owner, from, to).await {
            Ok(a) => a,
            Err(e) => {
                println!("\nError loading appointments: {}", e);
                return;
            }
        };
        let report = match PeriodReport::build(&appointments, from, to) {
            Ok(r) => r,
            Err(e) => {
                println!("\n{}", e);
                return;
            }
        };

        println!("\n  Appointments: {}", report.total);
        for status in AppointmentStatus::ALL {
            println!("    {:<14} {}", status.name(), report.count(status));
        }
        println!("  Particular: {}   Plano: {}", report.particular, report.plano);
        println!("  Expected revenue: {:.2}", report.expected_revenue);
        println!("  Realized revenue: {:.2}", report.realized_revenue);
        println!("  Completion rate: {:.1}%", report.completion_rate());
    }

    async fn export_json(&self) {
        match self.agenda.list_appointments(self.owner).await {
            Ok(appointments) => match serde_json::to_string_pretty(&appointments) {
                Ok(json) => println!("{}", json),
                Err(e) => println!("\nError serializing appointments: {}", e),
            },
            Err(e) => println!("\nError loading appointments: {}", e),
        }
    }

    async fn load_demo(&mut self) {
        println!("\n--- Loading Demo Data ---");
        if let Err(e) = self.try_load_demo().await {
            println!("Error loading demo data: {}", e);
        }
    }

    async fn try_load_demo(&self) -> clinicagenda::Result<()> {
        let owner = self.owner;
        let today = self.today();
        let now = self.agenda.clock().now();
        let at = |h: u32, m: u32| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);

        let plan = self.agenda.create_plan(owner, "Unimed", 180.0).await?;
        let ana = self
            .agenda
            .create_patient(owner, PatientDraft { name: "Ana Souza".into(), phone: Some("11 98888-1111".into()), ..Default::default() })
            .await?;
        let bruno = self
            .agenda
            .create_patient(owner, PatientDraft { name: "Bruno Lima".into(), ..Default::default() })
            .await?;

        let soon = now + Duration::minutes(20);
        let demo = [
            (ana.id, soon.date_naive(), at(soon.hour(), soon.minute()), Some(plan.id)),
            (bruno.id, today, at(8, 0), None),
            (bruno.id, today + Duration::days(1), at(14, 0), Some(plan.id)),
        ];
        for (patient_id, date, time, plan_id) in demo {
            let draft = AppointmentDraft {
                patient_id: Some(patient_id),
                date: Some(date),
                time: Some(time),
                plan_id,
                value: if plan_id.is_none() { Some(250.0) } else { None },
                ..Default::default()
            };
            let apt = self.agenda.create_appointment(owner, draft).await?;
            println!("  booked {} {}", apt.storage_date(), apt.time_label());
        }
        println!("Demo data loaded: 2 patients, 1 plan, 3 appointments");
        Ok(())
    }

    async fn run(&mut self) {
        self.print_header();

        while self.running {
            self.print_menu();

            let choice = self.get_int_input("Enter choice", Some(0));
            if !self.running {
                break;
            }

            match choice {
                1 => self.register_patient().await,
                2 => self.register_plan().await,
                3 => self.book_appointment().await,
                4 => self.list_appointments().await,
                5 => self.view_today().await,
                6 => self.view_week().await,
                7 => self.change_status().await,
                8 => self.reschedule().await,
                9 => self.delete_appointment().await,
                10 => self.delete_patient().await,
                11 => self.view_notifications().await,
                12 => self.view_report().await,
                13 => self.export_json().await,
                14 => self.load_demo().await,
                0 => {
                    self.running = false;
                    println!("\nGoodbye!");
                }
                _ => println!("Invalid choice"),
            }
        }
    }
}

fn describe(apt: &Appointment, names: &HashMap<Uuid, String>) -> String {
    let name = names.get(&apt.patient_id).map(String::as_str).unwrap_or("?");
    let value = apt.value.map(|v| format!(" {:.2}", v)).unwrap_or_default();
    format!(
        "{} {} - {} ({}, {}{})",
        apt.storage_date(),
        format_time_label(apt.time),
        name,
        apt.status.name(),
        apt.billing,
        value
    )
}

fn weekday_short(day: chrono::Weekday) -> &'static str {
    match day {
        chrono::Weekday::Sun => "Dom",
        chrono::Weekday::Mon => "Seg",
        chrono::Weekday::Tue => "Ter",
        chrono::Weekday::Wed => "Qua",
        chrono::Weekday::Thu => "Qui",
        chrono::Weekday::Fri => "Sex",
        chrono::Weekday::Sat => "Sáb",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,clinicagenda=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = AgendaConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(owner = %config.owner_id, timezone = %config.timezone, "starting clinic agenda");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.timezone));
    let agenda = Agenda::new(Arc::new(MemoryStore::new()), clock).with_retry(config.retry);

    let feed = Arc::new(Mutex::new(NotificationFeed::new()));
    let poller = spawn_poller(agenda.clone(), config.owner_id, Arc::clone(&feed), config.poll_interval);

    let mut cli = AgendaCli::new(agenda, &config, feed);
    cli.run().await;

    poller.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinicagenda::dates::DEFAULT_TIMEZONE;
    use clinicagenda::notifications::{poll_once, NotificationKind};
    use clinicagenda::FixedClock;

    fn cli_at(date: NaiveDate, h: u32, m: u32) -> AgendaCli {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::at(
            DEFAULT_TIMEZONE,
            date,
            NaiveTime::from_hms_opt(h, m, 0).unwrap(),
        ));
        let agenda = Agenda::new(Arc::new(MemoryStore::new()), clock);
        AgendaCli::new(agenda, &AgendaConfig::default(), Arc::new(Mutex::new(NotificationFeed::new())))
    }

    #[tokio::test]
    async fn demo_near_midnight_books_the_soon_slot_tomorrow() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 14).unwrap();
        let cli = cli_at(today, 23, 50);
        cli.try_load_demo().await.unwrap();

        let appointments = cli.agenda.list_appointments(cli.owner).await.unwrap();
        assert_eq!(appointments.len(), 3);
        let tomorrow = today + Duration::days(1);
        assert!(appointments
            .iter()
            .any(|a| a.date == tomorrow && a.time == NaiveTime::from_hms_opt(0, 10, 0).unwrap()));

        let found = poll_once(&cli.agenda, cli.owner).await.unwrap();
        assert!(found.iter().any(|n| n.kind == NotificationKind::Soon));
        let soon = found.iter().find(|n| n.kind == NotificationKind::Soon).unwrap();
        assert!(!found
            .iter()
            .any(|n| n.kind == NotificationKind::Missed && n.appointment_id == soon.appointment_id));
    }

    #[tokio::test]
    async fn demo_during_the_day_books_the_soon_slot_today() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 14).unwrap();
        let cli = cli_at(today, 9, 0);
        cli.try_load_demo().await.unwrap();

        let appointments = cli.agenda.list_appointments(cli.owner).await.unwrap();
        assert!(appointments
            .iter()
            .any(|a| a.date == today && a.time == NaiveTime::from_hms_opt(9, 20, 0).unwrap()));
    }
}
