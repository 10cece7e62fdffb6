use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{AccountKind, ApiOk, AppState, AppointmentListing, DoctorSummary},
    routes::{JsonBody, PathParam},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/doctors", get(list_doctors))
        .route(
            "/doctors/{doctor_id}/availability",
            get(get_availability).put(set_availability),
        )
        .route("/doctors/{doctor_id}/appointments", get(doctor_appointments))
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Availability {
    pub is_available: bool,
}

/// Only the doctor themself may flip their own flag.
fn ensure_self_doctor(auth: &AuthContext, doctor_id: Uuid) -> Result<(), ApiError> {
    if !auth.is_doctor() {
        return Err(ApiError::forbidden("Only doctors can update availability"));
    }
    if auth.user_id != doctor_id {
        return Err(ApiError::forbidden(
            "Cannot update another doctor's availability",
        ));
    }
    Ok(())
}

/* ============================================================
   GET /doctors  (public directory)
   ============================================================ */

pub async fn list_doctors(
    State(state): State<AppState>,
) -> Result<Json<ApiOk<Vec<DoctorSummary>>>, ApiError> {
    let doctors = state.store.list_doctors().await?;
    Ok(Json(ApiOk { data: doctors }))
}

/* ============================================================
   GET /doctors/{id}/availability
   ============================================================ */

pub async fn get_availability(
    State(state): State<AppState>,
    _auth: AuthContext,
    WithRejection(Path(doctor_id), _): PathParam<Uuid>,
) -> Result<Json<ApiOk<Availability>>, ApiError> {
    let account = state.store.find_account(doctor_id).await?;
    match account.map(|a| a.kind) {
        Some(AccountKind::Doctor(profile)) => Ok(Json(ApiOk {
            data: Availability {
                is_available: profile.is_available,
            },
        })),
        _ => Err(ApiError::not_found("Doctor not found")),
    }
}

/* ============================================================
   PUT /doctors/{id}/availability
   ============================================================ */

pub async fn set_availability(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Path(doctor_id), _): PathParam<Uuid>,
    WithRejection(Json(req), _): JsonBody<Availability>,
) -> Result<Json<ApiOk<Availability>>, ApiError> {
    ensure_self_doctor(&auth, doctor_id)?;

    // Existing bookings are left untouched.
    let is_available = state
        .store
        .set_doctor_availability(doctor_id, req.is_available)
        .await?
        .ok_or_else(|| ApiError::not_found("Doctor not found"))?;

    tracing::info!(
        doctor_id = %doctor_id,
        username = %auth.username,
        is_available,
        "availability changed"
    );
    Ok(Json(ApiOk {
        data: Availability { is_available },
    }))
}

/* ============================================================
   GET /doctors/{id}/appointments  (that doctor's schedule)
   ============================================================ */

pub async fn doctor_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    WithRejection(Path(doctor_id), _): PathParam<Uuid>,
) -> Result<Json<ApiOk<Vec<AppointmentListing>>>, ApiError> {
    if !(auth.is_doctor() && auth.user_id == doctor_id) {
        return Err(ApiError::forbidden(
            "Doctors can only view their own schedule",
        ));
    }
    let appointments = state.store.list_for_doctor(doctor_id).await?;
    Ok(Json(ApiOk { data: appointments }))
}
