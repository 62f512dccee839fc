//! Clinic agenda for a single professional.
//!
//! Patients, plans and appointments are kept in an [`store::AgendaStore`];
//! the [`agenda::Agenda`] service validates and applies every change. On top
//! of that sit the weekly slot grid, the status state machine, read-time
//! notifications and period reports.

pub mod agenda;
pub mod config;
pub mod dates;
pub mod error;
pub mod models;
pub mod notifications;
pub mod reports;
pub mod slots;
pub mod status;
pub mod store;

pub use agenda::Agenda;
pub use config::{AgendaConfig, RetryPolicy};
pub use dates::{Clock, FixedClock, SystemClock};
pub use error::{AgendaError, Result};
pub use store::{AgendaStore, MemoryStore, StoreError};
