// src/routes/appointment_routes.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use axum_extra::extract::WithRejection;
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{
        AccountKind, ApiOk, AppState, Appointment, AppointmentListing, AppointmentStatus,
        NewAppointment, Role, TimeSlot,
    },
    routes::{JsonBody, PathParam},
    store::StatusUpdate,
};

const MAX_REASON_LEN: usize = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(book_appointment))
        .route(
            "/appointments/{appointment_id}",
            get(get_appointment).put(update_appointment_status),
        )
}

fn ensure_patient(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.is_patient() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only patients can book appointments"))
    }
}

/* ============================================================
   Request DTOs
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Option<Uuid>,
    /// YYYY-MM-DD
    pub date: Option<String>,
    /// HH:MM
    pub time: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

struct ValidBooking {
    doctor_id: Uuid,
    date: NaiveDate,
    time: TimeSlot,
    reason: String,
}

fn validate_booking(req: BookAppointmentRequest) -> Result<ValidBooking, ApiError> {
    let (Some(doctor_id), Some(date), Some(time), Some(reason)) =
        (req.doctor_id, req.date, req.time, req.reason)
    else {
        return Err(ApiError::invalid_field(
            "doctor_id, date, time and reason are required",
        ));
    };

    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::invalid_field("date must be YYYY-MM-DD"))?;
    let time = TimeSlot::parse(&time).ok_or_else(|| ApiError::invalid_field("time must be HH:MM"))?;

    let reason = reason.trim().to_string();
    if reason.is_empty() {
        return Err(ApiError::invalid_field("reason is required"));
    }
    if reason.chars().count() > MAX_REASON_LEN {
        return Err(ApiError::invalid_field(format!(
            "reason must be at most {MAX_REASON_LEN} characters"
        )));
    }

    Ok(ValidBooking {
        doctor_id,
        date,
        time,
        reason,
    })
}

/* ============================================================
   POST /appointments (book)
   ============================================================ */

pub async fn book_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Json(req), _): JsonBody<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<ApiOk<Appointment>>), ApiError> {
    ensure_patient(&auth)?;
    let booking = validate_booking(req)?;

    // Doctor must exist and be taking bookings.
    let doctor = state.store.find_account(booking.doctor_id).await?;
    match doctor.map(|a| a.kind) {
        Some(AccountKind::Doctor(profile)) => {
            if !profile.is_available {
                return Err(ApiError::DoctorUnavailable);
            }
        }
        _ => return Err(ApiError::not_found("Doctor not found")),
    }

    // Early answer for the common case; the store rejects racing inserts on its own.
    if state
        .store
        .find_live_appointment_for_slot(booking.doctor_id, booking.date, booking.time)
        .await?
        .is_some()
    {
        tracing::warn!(doctor_id = %booking.doctor_id, date = %booking.date, time = %booking.time, "slot already booked");
        return Err(ApiError::SlotConflict);
    }

    let appointment = state
        .store
        .insert_appointment(NewAppointment {
            doctor_id: booking.doctor_id,
            patient_id: auth.user_id,
            date: booking.date,
            time: booking.time,
            reason: booking.reason,
        })
        .await?;

    tracing::info!(
        appointment_id = %appointment.id,
        doctor_id = %appointment.doctor_id,
        patient_id = %appointment.patient_id,
        username = %auth.username,
        "appointment booked"
    );
    Ok((StatusCode::CREATED, Json(ApiOk { data: appointment })))
}

/* ============================================================
   GET /appointments (caller's own)
   ============================================================ */

pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<AppointmentListing>>>, ApiError> {
    let appointments = match auth.role {
        Role::Doctor => state.store.list_for_doctor(auth.user_id).await?,
        Role::Patient => state.store.list_for_patient(auth.user_id).await?,
    };
    Ok(Json(ApiOk { data: appointments }))
}

/* ============================================================
   GET /appointments/{id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Path(appointment_id), _): PathParam<Uuid>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let appointment = state
        .store
        .find_appointment(appointment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("appointment not found"))?;

    if !appointment.involves(auth.user_id) {
        return Err(ApiError::forbidden(
            "You can only view your own appointments",
        ));
    }
    Ok(Json(ApiOk { data: appointment }))
}

/* ============================================================
   PUT /appointments/{id} (status transition)
   ============================================================ */

pub async fn update_appointment_status(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Path(appointment_id), _): PathParam<Uuid>,
    WithRejection(Json(req), _): JsonBody<UpdateStatusRequest>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let current = state
        .store
        .find_appointment(appointment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("appointment not found"))?;

    // Only the assigned doctor moves the status; patients only read.
    if !(auth.is_doctor() && current.doctor_id == auth.user_id) {
        return Err(ApiError::forbidden(
            "Only the assigned doctor can update this appointment",
        ));
    }

    let requested = req.status.trim();
    let next = match requested.parse::<AppointmentStatus>() {
        Ok(next) if current.status.can_transition_to(next) => next,
        _ => {
            tracing::warn!(appointment_id = %appointment_id, from = %current.status, to = requested, "invalid status transition");
            return Err(ApiError::InvalidTransition {
                from: current.status,
                to: requested.to_string(),
            });
        }
    };

    match state
        .store
        .update_status(appointment_id, current.status, next)
        .await?
    {
        StatusUpdate::Updated(appointment) => {
            tracing::info!(
                appointment_id = %appointment.id,
                username = %auth.username,
                from = %current.status,
                to = %next,
                "appointment status changed"
            );
            Ok(Json(ApiOk { data: appointment }))
        }
        // Someone else moved it first; judge the request against where it is now.
        StatusUpdate::Stale(now) => Err(ApiError::InvalidTransition {
            from: now.status,
            to: requested.to_string(),
        }),
        StatusUpdate::NotFound => Err(ApiError::not_found("appointment not found")),
    }
}
