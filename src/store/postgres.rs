use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{AccountStore, AppointmentStore, StatusUpdate, Store, StoreError};
use crate::models::{
    Account, AccountKind, Appointment, AppointmentListing, AppointmentStatus, DoctorProfile,
    DoctorSummary, NewAccount, NewAppointment, Role, TimeSlot, DEFAULT_SPECIALIZATION,
};

const USERNAME_CONSTRAINT: &str = "account_username_key";
const LIVE_SLOT_CONSTRAINT: &str = "appointment_live_slot_idx";

const APPOINTMENT_COLUMNS: &str = r#"
    id, doctor_id, patient_id,
    slot_date AS "date", slot_time AS "time",
    reason, status, created_at
"#;

const LISTING_SELECT: &str = r#"
    SELECT a.id, a.doctor_id, a.patient_id,
           a.slot_date AS "date", a.slot_time AS "time",
           a.reason, a.status, a.created_at,
           d.name AS doctor_name, d.username AS doctor_username,
           p.name AS patient_name, p.username AS patient_username
    FROM appointment a
    JOIN account d ON d.id = a.doctor_id
    JOIN account p ON p.id = a.patient_id
"#;

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    username: String,
    password_hash: String,
    name: String,
    age: i16,
    pincode: String,
    role: Role,
    specialization: Option<String>,
    is_available: bool,
    created_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        let kind = match row.role {
            Role::Patient => AccountKind::Patient,
            Role::Doctor => AccountKind::Doctor(DoctorProfile {
                specialization: row
                    .specialization
                    .unwrap_or_else(|| DEFAULT_SPECIALIZATION.to_string()),
                is_available: row.is_available,
            }),
        };
        Account {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            name: row.name,
            age: row.age,
            pincode: row.pincode,
            kind,
            created_at: row.created_at,
        }
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Map a unique violation on `constraint` to `on_conflict`; anything else is
/// a backend failure.
fn map_unique(e: sqlx::Error, constraint: &str, on_conflict: StoreError) -> StoreError {
    if let Some(dbe) = e.as_database_error() {
        if dbe.is_unique_violation() && dbe.constraint() == Some(constraint) {
            return on_conflict;
        }
    }
    db_error(e)
}

#[async_trait]
impl AccountStore for PgStore {
    async fn insert_account(&self, new: NewAccount) -> Result<Account, StoreError> {
        let role = new.kind.role();
        let (specialization, is_available) = match &new.kind {
            AccountKind::Patient => (None, false),
            AccountKind::Doctor(p) => (Some(p.specialization.as_str()), p.is_available),
        };

        let row: AccountRow = sqlx::query_as::<_, AccountRow>(
            r#"
            INSERT INTO account
                (id, username, password_hash, name, age, pincode, role, specialization, is_available)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, username, password_hash, name, age, pincode, role,
                      specialization, is_available, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.username)
        .bind(&new.password_hash)
        .bind(&new.name)
        .bind(new.age)
        .bind(&new.pincode)
        .bind(role)
        .bind(specialization)
        .bind(is_available)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_unique(e, USERNAME_CONSTRAINT, StoreError::DuplicateUsername))?;

        Ok(row.into())
    }

    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, username, password_hash, name, age, pincode, role,
                   specialization, is_available, created_at
            FROM account
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(db_error)?;

        Ok(row.map(Account::from))
    }

    async fn find_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, username, password_hash, name, age, pincode, role,
                   specialization, is_available, created_at
            FROM account
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await
        .map_err(db_error)?;

        Ok(row.map(Account::from))
    }

    async fn list_doctors(&self) -> Result<Vec<DoctorSummary>, StoreError> {
        let rows: Vec<(Uuid, String, Option<String>, bool)> = sqlx::query_as(
            r#"
            SELECT id, name, specialization, is_available
            FROM account
            WHERE role = $1
            ORDER BY name ASC, id ASC
            "#,
        )
        .bind(Role::Doctor)
        .fetch_all(&self.db)
        .await
        .map_err(db_error)?;

        Ok(rows
            .into_iter()
            .map(|(id, name, specialization, is_available)| DoctorSummary {
                id,
                name,
                specialization: specialization
                    .unwrap_or_else(|| DEFAULT_SPECIALIZATION.to_string()),
                is_available,
            })
            .collect())
    }

    async fn set_doctor_availability(
        &self,
        doctor_id: Uuid,
        is_available: bool,
    ) -> Result<Option<bool>, StoreError> {
        sqlx::query_scalar::<_, bool>(
            r#"
            UPDATE account
            SET is_available = $2
            WHERE id = $1
              AND role = $3
            RETURNING is_available
            "#,
        )
        .bind(doctor_id)
        .bind(is_available)
        .bind(Role::Doctor)
        .fetch_optional(&self.db)
        .await
        .map_err(db_error)
    }
}

#[async_trait]
impl AppointmentStore for PgStore {
    async fn insert_appointment(&self, new: NewAppointment) -> Result<Appointment, StoreError> {
        // The partial unique index decides; two racing inserts cannot both land.
        let sql = format!(
            r#"
            INSERT INTO appointment
                (id, doctor_id, patient_id, slot_date, slot_time, reason, status)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Appointment>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.doctor_id)
            .bind(new.patient_id)
            .bind(new.date)
            .bind(new.time)
            .bind(&new.reason)
            .bind(AppointmentStatus::Scheduled)
            .fetch_one(&self.db)
            .await
            .map_err(|e| map_unique(e, LIVE_SLOT_CONSTRAINT, StoreError::SlotTaken))
    }

    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointment WHERE id = $1");
        sqlx::query_as::<_, Appointment>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(db_error)
    }

    async fn find_live_appointment_for_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: TimeSlot,
    ) -> Result<Option<Appointment>, StoreError> {
        let sql = format!(
            r#"
            SELECT {APPOINTMENT_COLUMNS}
            FROM appointment
            WHERE doctor_id = $1
              AND slot_date = $2
              AND slot_time = $3
              AND status <> $4
            "#
        );
        sqlx::query_as::<_, Appointment>(&sql)
            .bind(doctor_id)
            .bind(date)
            .bind(time)
            .bind(AppointmentStatus::Cancelled)
            .fetch_optional(&self.db)
            .await
            .map_err(db_error)
    }

    async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<AppointmentListing>, StoreError> {
        let sql = format!(
            "{LISTING_SELECT} WHERE a.doctor_id = $1 \
             ORDER BY a.slot_date ASC, a.slot_time ASC, a.created_at ASC"
        );
        sqlx::query_as::<_, AppointmentListing>(&sql)
            .bind(doctor_id)
            .fetch_all(&self.db)
            .await
            .map_err(db_error)
    }

    async fn list_for_patient(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<AppointmentListing>, StoreError> {
        let sql = format!(
            "{LISTING_SELECT} WHERE a.patient_id = $1 \
             ORDER BY a.slot_date ASC, a.slot_time ASC, a.created_at ASC"
        );
        sqlx::query_as::<_, AppointmentListing>(&sql)
            .bind(patient_id)
            .fetch_all(&self.db)
            .await
            .map_err(db_error)
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<StatusUpdate, StoreError> {
        let sql = format!(
            r#"
            UPDATE appointment
            SET status = $3
            WHERE id = $1
              AND status = $2
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, Appointment>(&sql)
            .bind(id)
            .bind(expected)
            .bind(next)
            .fetch_optional(&self.db)
            .await
            .map_err(db_error)?;

        match updated {
            Some(appt) => Ok(StatusUpdate::Updated(appt)),
            None => match self.find_appointment(id).await? {
                Some(current) => Ok(StatusUpdate::Stale(current)),
                None => Ok(StatusUpdate::NotFound),
            },
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.db).await.is_ok()
    }
}

/// These run against a real server. Point `TEST_DATABASE_URL` at a Postgres
/// role allowed to create databases; each test gets its own database.
#[cfg(test)]
mod tests {
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
    use sqlx::{Connection, Executor, PgConnection};

    use super::*;

    struct TestDb {
        admin_url: String,
        name: String,
        store: PgStore,
    }

    impl TestDb {
        async fn drop_db(self) {
            self.store.db.close().await;
            let mut admin = PgConnection::connect(&self.admin_url)
                .await
                .expect("reconnect for cleanup");
            let sql = format!(r#"DROP DATABASE IF EXISTS "{}" WITH (FORCE)"#, self.name);
            admin
                .execute(sql.as_str())
                .await
                .expect("drop test database");
        }
    }

    async fn test_db() -> Option<TestDb> {
        let Ok(admin_url) = std::env::var("TEST_DATABASE_URL") else {
            eprintln!("SKIP-TEST-DATABASE: TEST_DATABASE_URL is not set");
            return None;
        };
        let name = format!("docai_test_{}", Uuid::new_v4().simple());

        let mut admin = PgConnection::connect(&admin_url)
            .await
            .expect("connect to TEST_DATABASE_URL");
        admin
            .execute(format!(r#"CREATE DATABASE "{name}""#).as_str())
            .await
            .expect("create test database");
        admin.close().await.expect("close admin connection");

        let options = admin_url
            .parse::<PgConnectOptions>()
            .expect("parse TEST_DATABASE_URL")
            .database(&name);
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .expect("connect to test database");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("run migrations");

        Some(TestDb {
            admin_url,
            name,
            store: PgStore::new(pool),
        })
    }

    fn new_account(username: &str, kind: AccountKind) -> NewAccount {
        NewAccount {
            username: username.into(),
            password_hash: "$argon2id$test".into(),
            name: format!("{username} name"),
            age: 30,
            pincode: "123456".into(),
            kind,
        }
    }

    fn doctor_kind() -> AccountKind {
        AccountKind::Doctor(DoctorProfile {
            specialization: "Cardiology".into(),
            is_available: false,
        })
    }

    fn slot(doctor_id: Uuid, patient_id: Uuid, date: &str, time: &str) -> NewAppointment {
        NewAppointment {
            doctor_id,
            patient_id,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            time: TimeSlot::parse(time).unwrap(),
            reason: "checkup".into(),
        }
    }

    async fn doctor_and_patient(store: &PgStore) -> (Account, Account) {
        let doctor = store
            .insert_account(new_account("drbob", doctor_kind()))
            .await
            .unwrap();
        let patient = store
            .insert_account(new_account("alice", AccountKind::Patient))
            .await
            .unwrap();
        (doctor, patient)
    }

    #[tokio::test]
    async fn test_username_constraint_maps_to_duplicate() {
        let Some(db) = test_db().await else { return };
        let store = &db.store;

        let alice = store
            .insert_account(new_account("alice", AccountKind::Patient))
            .await
            .unwrap();
        let found = store.find_account_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found.id, alice.id);
        assert_eq!(found.password_hash, "$argon2id$test");

        let dup = store
            .insert_account(new_account("alice", doctor_kind()))
            .await
            .unwrap_err();
        assert_eq!(dup, StoreError::DuplicateUsername);

        // Case-sensitive, like the in-memory store.
        assert!(store
            .insert_account(new_account("Alice", AccountKind::Patient))
            .await
            .is_ok());

        db.drop_db().await;
    }

    #[tokio::test]
    async fn test_doctor_round_trip_and_availability() {
        let Some(db) = test_db().await else { return };
        let store = &db.store;
        let (doctor, patient) = doctor_and_patient(store).await;

        let loaded = store.find_account(doctor.id).await.unwrap().unwrap();
        assert!(matches!(
            loaded.kind,
            AccountKind::Doctor(ref p) if p.specialization == "Cardiology" && !p.is_available
        ));

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
        assert_eq!(doctors[0].id, doctor.id);
        assert!(doctors[0].is_available);

        db.drop_db().await;
    }

    #[tokio::test]
    async fn test_live_slot_index_maps_to_slot_taken() {
        let Some(db) = test_db().await else { return };
        let store = &db.store;
        let (doctor, patient) = doctor_and_patient(store).await;

        let first = store
            .insert_appointment(slot(doctor.id, patient.id, "2025-06-01", "10:00"))
            .await
            .unwrap();
        assert_eq!(first.status, AppointmentStatus::Scheduled);
        assert_eq!(first.time.to_string(), "10:00");

        let taken = store
            .insert_appointment(slot(doctor.id, patient.id, "2025-06-01", "10:00"))
            .await
            .unwrap_err();
        assert_eq!(taken, StoreError::SlotTaken);

        let live = store
            .find_live_appointment_for_slot(doctor.id, first.date, first.time)
            .await
            .unwrap();
        assert_eq!(live.map(|a| a.id), Some(first.id));

        // Cancelling releases the slot; the cancelled row stays.
        store
            .update_status(first.id, AppointmentStatus::Scheduled, AppointmentStatus::Cancelled)
            .await
            .unwrap();
        assert!(store
            .find_live_appointment_for_slot(doctor.id, first.date, first.time)
            .await
            .unwrap()
            .is_none());
        let rebooked = store
            .insert_appointment(slot(doctor.id, patient.id, "2025-06-01", "10:00"))
            .await
            .unwrap();
        assert_ne!(rebooked.id, first.id);
        assert_eq!(store.list_for_doctor(doctor.id).await.unwrap().len(), 2);

        db.drop_db().await;
    }

    #[tokio::test]
    async fn test_status_update_is_compare_and_set() {
        let Some(db) = test_db().await else { return };
        let store = &db.store;
        let (doctor, patient) = doctor_and_patient(store).await;
        let appt = store
            .insert_appointment(slot(doctor.id, patient.id, "2025-06-01", "10:00"))
            .await
            .unwrap();

        let first = store
            .update_status(appt.id, AppointmentStatus::Scheduled, AppointmentStatus::InProgress)
            .await
            .unwrap();
        assert!(matches!(
            first,
            StatusUpdate::Updated(a) if a.status == AppointmentStatus::InProgress
        ));

        let stale = store
            .update_status(appt.id, AppointmentStatus::Scheduled, AppointmentStatus::Cancelled)
            .await
            .unwrap();
        assert!(matches!(
            stale,
            StatusUpdate::Stale(a) if a.status == AppointmentStatus::InProgress
        ));

        let missing = store
            .update_status(
                Uuid::new_v4(),
                AppointmentStatus::Scheduled,
                AppointmentStatus::Cancelled,
            )
            .await
            .unwrap();
        assert_eq!(missing, StatusUpdate::NotFound);

        db.drop_db().await;
    }

    #[tokio::test]
    async fn test_listing_joins_names_in_slot_order() {
        let Some(db) = test_db().await else { return };
        let store = &db.store;
        let (doctor, patient) = doctor_and_patient(store).await;

        let slots = [
            ("2025-06-02", "09:00"),
            ("2025-06-01", "11:00"),
            ("2025-06-01", "09:30"),
        ];
        for (date, time) in slots {
            store
                .insert_appointment(slot(doctor.id, patient.id, date, time))
                .await
                .unwrap();
        }

        let listed = store.list_for_patient(patient.id).await.unwrap();
        let order: Vec<String> = listed
            .iter()
            .map(|l| format!("{} {}", l.appointment.date, l.appointment.time))
            .collect();
        assert_eq!(
            order,
            ["2025-06-01 09:30", "2025-06-01 11:00", "2025-06-02 09:00"]
        );
        assert!(listed.iter().all(|l| l.doctor_username == "drbob"
            && l.doctor_name == "drbob name"
            && l.patient_username == "alice"));
        assert_eq!(store.list_for_doctor(doctor.id).await.unwrap(), listed);

        db.drop_db().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_hit_unique_index() {
        let Some(db) = test_db().await else { return };
        let (doctor, patient) = doctor_and_patient(&db.store).await;
        let (doctor_id, patient_id) = (doctor.id, patient.id);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = db.store.clone();
                tokio::spawn(async move {
                    store
                        .insert_appointment(slot(doctor_id, patient_id, "2025-06-01", "10:00"))
                        .await
                })
            })
            .collect();

        let mut winners = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => winners += 1,
                Err(e) => assert_eq!(e, StoreError::SlotTaken),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(db.store.list_for_doctor(doctor.id).await.unwrap().len(), 1);

        db.drop_db().await;
    }
}
