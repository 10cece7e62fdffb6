//! Persistence ports for accounts and the booking ledger.
//!
//! Uniqueness rules (one account per username, one live appointment per
//! doctor/date/time slot) are enforced by the store itself, atomically with
//! the insert. Callers may pre-check for a friendlier error, but correctness
//! never depends on that read.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{
    Account, Appointment, AppointmentListing, AppointmentStatus, DoctorSummary, NewAccount,
    NewAppointment, TimeSlot,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("username already exists")]
    DuplicateUsername,
    #[error("slot already booked")]
    SlotTaken,
    #[error("{0}")]
    Backend(String),
}

/// Outcome of a compare-and-set status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Updated(Appointment),
    /// The row exists but its status was no longer the expected one.
    Stale(Appointment),
    NotFound,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert_account(&self, new: NewAccount) -> Result<Account, StoreError>;

    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Exact, case-sensitive match.
    async fn find_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Account>, StoreError>;

    async fn list_doctors(&self) -> Result<Vec<DoctorSummary>, StoreError>;

    /// Returns the stored flag, or `None` when `doctor_id` is not a doctor.
    async fn set_doctor_availability(
        &self,
        doctor_id: Uuid,
        is_available: bool,
    ) -> Result<Option<bool>, StoreError>;
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Fails with [`StoreError::SlotTaken`] when a non-cancelled appointment
    /// already holds the same doctor/date/time.
    async fn insert_appointment(&self, new: NewAppointment) -> Result<Appointment, StoreError>;

    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;

    /// Any non-cancelled appointment holding the slot.
    async fn find_live_appointment_for_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: TimeSlot,
    ) -> Result<Option<Appointment>, StoreError>;

    /// Ordered by date, time, then creation.
    async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<AppointmentListing>, StoreError>;

    /// Ordered by date, time, then creation.
    async fn list_for_patient(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<AppointmentListing>, StoreError>;

    /// Sets `next` only if the current status is still `expected`.
    async fn update_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<StatusUpdate, StoreError>;
}

#[async_trait]
pub trait Store: AccountStore + AppointmentStore {
    /// Cheap liveness probe for the health endpoint.
    async fn ping(&self) -> bool;
}
