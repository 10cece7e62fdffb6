use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::auth::TokenKeys;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub tokens: TokenKeys,
}

/* -------------------------
   Roles
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum Role {
    Patient = 0,
    Doctor = 1,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            _ => Err(()),
        }
    }
}

/* -------------------------
   Accounts
--------------------------*/

pub const DEFAULT_SPECIALIZATION: &str = "General Medicine";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctorProfile {
    pub specialization: String,
    pub is_available: bool,
}

/// Role-specific part of an account. Doctor-only fields exist only on the
/// `Doctor` variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountKind {
    Patient,
    Doctor(DoctorProfile),
}

impl AccountKind {
    pub fn role(&self) -> Role {
        match self {
            AccountKind::Patient => Role::Patient,
            AccountKind::Doctor(_) => Role::Doctor,
        }
    }
}

/// Stored account, including the credential hash. Never serialized; callers
/// get an [`AccountView`] instead.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub name: String,
    pub age: i16,
    pub pincode: String,
    pub kind: AccountKind,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn role(&self) -> Role {
        self.kind.role()
    }

    pub fn view(&self) -> AccountView {
        match &self.kind {
            AccountKind::Patient => AccountView::Patient {
                id: self.id,
                username: self.username.clone(),
                name: self.name.clone(),
                age: self.age,
                pincode: self.pincode.clone(),
                created_at: self.created_at,
            },
            AccountKind::Doctor(profile) => AccountView::Doctor {
                id: self.id,
                username: self.username.clone(),
                name: self.name.clone(),
                age: self.age,
                pincode: self.pincode.clone(),
                specialization: profile.specialization.clone(),
                is_available: profile.is_available,
                created_at: self.created_at,
            },
        }
    }
}

/// Account data ready for insertion. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password_hash: String,
    pub name: String,
    pub age: i16,
    pub pincode: String,
    pub kind: AccountKind,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum AccountView {
    Patient {
        id: Uuid,
        username: String,
        name: String,
        age: i16,
        pincode: String,
        created_at: DateTime<Utc>,
    },
    Doctor {
        id: Uuid,
        username: String,
        name: String,
        age: i16,
        pincode: String,
        specialization: String,
        is_available: bool,
        created_at: DateTime<Utc>,
    },
}

/// Public directory entry for a doctor.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DoctorSummary {
    pub id: Uuid,
    pub name: String,
    pub specialization: String,
    pub is_available: bool,
}

/* -------------------------
   Appointments
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[repr(i16)]
pub enum AppointmentStatus {
    Scheduled = 0,
    InProgress = 1,
    Completed = 2,
    Cancelled = 3,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::InProgress => "in-progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    /// scheduled -> {in-progress, completed, cancelled}
    /// in-progress -> {completed, cancelled}
    /// completed, cancelled: terminal
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Scheduled, InProgress)
                | (Scheduled, Completed)
                | (Scheduled, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "in-progress" => Ok(AppointmentStatus::InProgress),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            _ => Err(()),
        }
    }
}

/// A bookable time slot label, `HH:MM` on the 24h clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type)]
#[sqlx(transparent)]
pub struct TimeSlot(NaiveTime);

impl TimeSlot {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        // Exactly HH:MM, nothing finer than a minute.
        if s.len() != 5 {
            return None;
        }
        NaiveTime::parse_from_str(s, "%H:%M").ok().map(TimeSlot)
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl Serialize for TimeSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub time: TimeSlot,
    pub reason: String,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.doctor_id == user_id || self.patient_id == user_id
    }
}

/// An appointment as shown in a party's list, with both sides named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct AppointmentListing {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub appointment: Appointment,
    pub doctor_name: String,
    pub doctor_username: String,
    pub patient_name: String,
    pub patient_username: String,
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub time: TimeSlot,
    pub reason: String,
}

/* -------------------------
   Response envelope
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}
