use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AccountStore, AppointmentStore, StatusUpdate, Store, StoreError};
use crate::models::{
    Account, AccountKind, Appointment, AppointmentListing, AppointmentStatus, DoctorSummary,
    NewAccount, NewAppointment, TimeSlot,
};

/// In-process store. Every check-and-insert happens under one write lock, so
/// the uniqueness rules hold the same way the Postgres indexes hold them.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, Account>,
    usernames: HashMap<String, Uuid>,
    appointments: HashMap<Uuid, Appointment>,
}

impl Inner {
    fn live_for_slot(&self, doctor_id: Uuid, date: NaiveDate, time: TimeSlot) -> Option<&Appointment> {
        self.appointments.values().find(|a| {
            a.doctor_id == doctor_id
                && a.date == date
                && a.time == time
                && a.status != AppointmentStatus::Cancelled
        })
    }

    /// Name and username of an account. No foreign keys here, so an unknown
    /// id lists with blanks.
    fn party(&self, id: Uuid) -> (String, String) {
        self.accounts
            .get(&id)
            .map(|a| (a.name.clone(), a.username.clone()))
            .unwrap_or_default()
    }

    fn listed(&self, keep: impl Fn(&Appointment) -> bool) -> Vec<AppointmentListing> {
        let mut found: Vec<&Appointment> =
            self.appointments.values().filter(|&a| keep(a)).collect();
        found.sort_by(|a, b| {
            (a.date, a.time, a.created_at, a.id).cmp(&(b.date, b.time, b.created_at, b.id))
        });

        found
            .into_iter()
            .map(|a| {
                let (doctor_name, doctor_username) = self.party(a.doctor_id);
                let (patient_name, patient_username) = self.party(a.patient_id);
                AppointmentListing {
                    appointment: a.clone(),
                    doctor_name,
                    doctor_username,
                    patient_name,
                    patient_username,
                }
            })
            .collect()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(&self, new: NewAccount) -> Result<Account, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.usernames.contains_key(&new.username) {
            return Err(StoreError::DuplicateUsername);
        }

        let account = Account {
            id: Uuid::new_v4(),
            username: new.username,
            password_hash: new.password_hash,
            name: new.name,
            age: new.age,
            pincode: new.pincode,
            kind: new.kind,
            created_at: Utc::now(),
        };
        inner.usernames.insert(account.username.clone(), account.id);
        inner.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.inner.read().await.accounts.get(&id).cloned())
    }

    async fn find_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Account>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .usernames
            .get(username)
            .and_then(|id| inner.accounts.get(id))
            .cloned())
    }

    async fn list_doctors(&self) -> Result<Vec<DoctorSummary>, StoreError> {
        let inner = self.inner.read().await;
        let mut doctors: Vec<DoctorSummary> = inner
            .accounts
            .values()
            .filter_map(|a| match &a.kind {
                AccountKind::Doctor(profile) => Some(DoctorSummary {
                    id: a.id,
                    name: a.name.clone(),
                    specialization: profile.specialization.clone(),
                    is_available: profile.is_available,
                }),
                AccountKind::Patient => None,
            })
            .collect();
        doctors.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(doctors)
    }

    async fn set_doctor_availability(
        &self,
        doctor_id: Uuid,
        is_available: bool,
    ) -> Result<Option<bool>, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.accounts.get_mut(&doctor_id).map(|a| &mut a.kind) {
            Some(AccountKind::Doctor(profile)) => {
                profile.is_available = is_available;
                Ok(Some(profile.is_available))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl AppointmentStore for MemoryStore {
    async fn insert_appointment(&self, new: NewAppointment) -> Result<Appointment, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.live_for_slot(new.doctor_id, new.date, new.time).is_some() {
            return Err(StoreError::SlotTaken);
        }

        let appointment = Appointment {
            id: Uuid::new_v4(),
            doctor_id: new.doctor_id,
            patient_id: new.patient_id,
            date: new.date,
            time: new.time,
            reason: new.reason,
            status: AppointmentStatus::Scheduled,
            created_at: Utc::now(),
        };
        inner.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.inner.read().await.appointments.get(&id).cloned())
    }

    async fn find_live_appointment_for_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: TimeSlot,
    ) -> Result<Option<Appointment>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .live_for_slot(doctor_id, date, time)
            .cloned())
    }

    async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<AppointmentListing>, StoreError> {
        Ok(self.inner.read().await.listed(|a| a.doctor_id == doctor_id))
    }

    async fn list_for_patient(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<AppointmentListing>, StoreError> {
        Ok(self.inner.read().await.listed(|a| a.patient_id == patient_id))
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<StatusUpdate, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(appt) = inner.appointments.get_mut(&id) else {
            return Ok(StatusUpdate::NotFound);
        };
        if appt.status != expected {
            return Ok(StatusUpdate::Stale(appt.clone()));
        }
        appt.status = next;
        Ok(StatusUpdate::Updated(appt.clone()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::DoctorProfile;

    fn new_account(username: &str, kind: AccountKind) -> NewAccount {
        NewAccount {
            username: username.into(),
            password_hash: "hash".into(),
            name: username.into(),
            age: 30,
            pincode: "123456".into(),
            kind,
        }
    }

    fn slot(date: &str, time: &str, doctor_id: Uuid, patient_id: Uuid) -> NewAppointment {
        NewAppointment {
            doctor_id,
            patient_id,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            time: TimeSlot::parse(time).unwrap(),
            reason: "checkup".into(),
        }
    }

    #[tokio::test]
    async fn test_username_is_unique_and_case_sensitive() {
        let store = MemoryStore::new();
        store
            .insert_account(new_account("alice", AccountKind::Patient))
            .await
            .unwrap();

        let dup = store
            .insert_account(new_account("alice", AccountKind::Patient))
            .await;
        assert_eq!(dup.unwrap_err(), StoreError::DuplicateUsername);

        assert!(store
            .insert_account(new_account("Alice", AccountKind::Patient))
            .await
            .is_ok());
        assert!(store.find_account_by_username("ALICE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_slot_can_be_rebooked() {
        let store = MemoryStore::new();
        let doctor = Uuid::new_v4();
        let patient = Uuid::new_v4();

        let first = store
            .insert_appointment(slot("2025-06-01", "10:00", doctor, patient))
            .await
            .unwrap();
        assert_eq!(
            store
                .insert_appointment(slot("2025-06-01", "10:00", doctor, patient))
                .await
                .unwrap_err(),
            StoreError::SlotTaken
        );

        store
            .update_status(first.id, AppointmentStatus::Scheduled, AppointmentStatus::Cancelled)
            .await
            .unwrap();
        assert!(store
            .insert_appointment(slot("2025-06-01", "10:00", doctor, patient))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_status_update_is_compare_and_set() {
        let store = MemoryStore::new();
        let appt = store
            .insert_appointment(slot("2025-06-01", "10:00", Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();

        let first = store
            .update_status(appt.id, AppointmentStatus::Scheduled, AppointmentStatus::Completed)
            .await
            .unwrap();
        assert!(matches!(first, StatusUpdate::Updated(a) if a.status == AppointmentStatus::Completed));

        let second = store
            .update_status(appt.id, AppointmentStatus::Scheduled, AppointmentStatus::Cancelled)
            .await
            .unwrap();
        assert!(matches!(second, StatusUpdate::Stale(a) if a.status == AppointmentStatus::Completed));

        let missing = store
            .update_status(Uuid::new_v4(), AppointmentStatus::Scheduled, AppointmentStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(missing, StatusUpdate::NotFound);
    }

    #[tokio::test]
    async fn test_availability_only_for_doctors() {
        let store = MemoryStore::new();
        let patient = store
            .insert_account(new_account("alice", AccountKind::Patient))
            .await
            .unwrap();
        let doctor = store
            .insert_account(new_account(
                "drbob",
                AccountKind::Doctor(DoctorProfile {
                    specialization: "Cardiology".into(),
                    is_available: false,
                }),
            ))
            .await
            .unwrap();

        assert_eq!(
            store.set_doctor_availability(doctor.id, true).await.unwrap(),
            Some(true)
        );
        assert_eq!(
            store.set_doctor_availability(patient.id, true).await.unwrap(),
            None
        );

        let doctors = store.list_doctors().await.unwrap();
        assert_eq!(doctors.len(), 1);
        assert!(doctors[0].is_available);
    }

    #[tokio::test]
    async fn test_listing_names_both_parties() {
        let store = MemoryStore::new();
        let patient = store
            .insert_account(new_account("alice", AccountKind::Patient))
            .await
            .unwrap();
        let doctor = store
            .insert_account(new_account(
                "drbob",
                AccountKind::Doctor(DoctorProfile {
                    specialization: "Cardiology".into(),
                    is_available: true,
                }),
            ))
            .await
            .unwrap();
        store
            .insert_appointment(slot("2025-06-02", "09:00", doctor.id, patient.id))
            .await
            .unwrap();
        store
            .insert_appointment(slot("2025-06-01", "11:00", doctor.id, patient.id))
            .await
            .unwrap();

        let listed = store.list_for_patient(patient.id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].appointment.date.to_string(), "2025-06-01");
        assert_eq!(listed[0].doctor_username, "drbob");
        assert_eq!(listed[0].patient_username, "alice");
        assert_eq!(store.list_for_doctor(doctor.id).await.unwrap(), listed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_keep_one_live_appointment() {
        let store = Arc::new(MemoryStore::new());
        let doctor = Uuid::new_v4();

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .insert_appointment(slot("2025-06-01", "10:00", doctor, Uuid::new_v4()))
                        .await
                })
            })
            .collect();

        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert_eq!(e, StoreError::SlotTaken),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(store.list_for_doctor(doctor).await.unwrap().len(), 1);
    }
}
