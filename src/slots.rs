/// Slot grid for the weekly calendar.
///
/// A professional's working window and active session length are turned
/// into a discrete list of bookable start times. Each (date, slot) pair is a
/// cell; appointments land in the cell whose date and `HH:MM` label match.
/// Several appointments may share a cell: overlapping bookings are allowed.

use crate::dates::{format_time_label, minute_of_day, time_from_minutes, week_dates, CalendarDate};
use crate::models::{Appointment, WorkingHours};
use chrono::{Datelike, NaiveTime};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    Working,
    Blocked,
    Closed,
}

/// Represents one bookable start time on the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub start: NaiveTime,
    pub label: String,
    pub kind: SlotKind,
}

/// Start minutes `start, start + d, start + 2d, ...` strictly before `end`.
///
/// A non-positive duration or an empty window yields no slots.
pub fn slot_starts(start_minute: u32, end_minute: u32, duration_minutes: i64) -> Vec<u32> {
    if duration_minutes <= 0 || start_minute >= end_minute {
        return Vec::new();
    }

    let step = duration_minutes as u64;
    let mut starts = Vec::new();
    let mut current = start_minute as u64;
    while current < end_minute as u64 {
        starts.push(current as u32);
        current += step;
    }
    starts
}

/// Slot labels for a working window, e.g. `["08:00", "09:00"]`.
pub fn generate_slots(start: NaiveTime, end: NaiveTime, duration_minutes: i64) -> Vec<String> {
    slot_starts(minute_of_day(start), minute_of_day(end), duration_minutes)
        .into_iter()
        .filter_map(time_from_minutes)
        .map(format_time_label)
        .collect()
}

/// Classify a start time against the working window and blocked interval.
pub fn classify(hours: &WorkingHours, time: NaiveTime) -> SlotKind {
    let minute = minute_of_day(time);
    if minute < minute_of_day(hours.start) || minute >= minute_of_day(hours.end) {
        return SlotKind::Closed;
    }
    if let Some((block_start, block_end)) = hours.block {
        if minute >= minute_of_day(block_start) && minute < minute_of_day(block_end) {
            return SlotKind::Blocked;
        }
    }
    SlotKind::Working
}

/// Classified slots of one working day. Empty without an active duration.
pub fn day_slots(hours: &WorkingHours) -> Vec<Slot> {
    let duration = match hours.session_minutes() {
        Some(minutes) => minutes as i64,
        None => return Vec::new(),
    };

    slot_starts(minute_of_day(hours.start), minute_of_day(hours.end), duration)
        .into_iter()
        .filter_map(time_from_minutes)
        .map(|start| Slot {
            start,
            label: format_time_label(start),
            kind: classify(hours, start),
        })
        .collect()
}

/// Appointments displayed in the (date, label) cell.
pub fn appointments_in_cell<'a>(
    appointments: &'a [Appointment],
    date: CalendarDate,
    label: &str,
) -> Vec<&'a Appointment> {
    appointments
        .iter()
        .filter(|a| a.is_active() && a.date == date && a.time_label() == label)
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct GridCell {
    pub date: CalendarDate,
    pub label: String,
    pub kind: SlotKind,
    pub appointments: Vec<Appointment>,
}

/// Sunday-first week laid out as slot rows by day columns.
#[derive(Debug, Clone, Serialize)]
pub struct WeekGrid {
    pub dates: [CalendarDate; 7],
    pub rows: Vec<Slot>,
    /// `cells[row][column]`, one column per entry of `dates`.
    pub cells: Vec<Vec<GridCell>>,
    /// Active appointments of the week whose time matches no row.
    pub unplaced: Vec<Appointment>,
}

impl WeekGrid {
    pub fn build(anchor: CalendarDate, hours: &WorkingHours, appointments: &[Appointment]) -> Self {
        let dates = week_dates(anchor);
        let rows = day_slots(hours);

        let cells = rows
            .iter()
            .map(|slot| {
                dates
                    .iter()
                    .map(|&date| GridCell {
                        date,
                        label: slot.label.clone(),
                        kind: if hours.works_on(date.weekday()) {
                            slot.kind
                        } else {
                            SlotKind::Closed
                        },
                        appointments: appointments_in_cell(appointments, date, &slot.label)
                            .into_iter()
                            .cloned()
                            .collect(),
                    })
                    .collect()
            })
            .collect();

        let unplaced = appointments
            .iter()
            .filter(|a| a.is_active() && dates.contains(&a.date))
            .filter(|a| {
                let label = a.time_label();
                !rows.iter().any(|slot| slot.label == label)
            })
            .cloned()
            .collect();

        WeekGrid {
            dates,
            rows,
            cells,
            unplaced,
        }
    }

    pub fn cell(&self, date: CalendarDate, label: &str) -> Option<&GridCell> {
        let column = self.dates.iter().position(|d| *d == date)?;
        let row = self.rows.iter().position(|slot| slot.label == label)?;
        self.cells.get(row).and_then(|cells| cells.get(column))
    }

    pub fn booked_count(&self) -> usize {
        self.cells
            .iter()
            .flatten()
            .map(|cell| cell.appointments.len())
            .sum()
    }
}
