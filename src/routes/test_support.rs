//! Shared fixtures for handler tests: an in-memory `AppState` and helpers
//! that go through the real registration handler.

use std::marker::PhantomData;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use axum_extra::extract::WithRejection;

use crate::auth::TokenKeys;
use crate::middleware::auth_context::AuthContext;
use crate::models::AppState;
use crate::routes::auth_routes::{RegisterRequest, register};
use crate::routes::doctor_routes::{Availability, set_availability};
use crate::routes::{JsonBody, PathParam};
use crate::store::MemoryStore;

pub const PASSWORD: &str = "correct-horse";

pub fn test_state() -> AppState {
    AppState {
        store: Arc::new(MemoryStore::new()),
        tokens: TokenKeys::new(b"handler-test-secret-handler-test-secret", 24),
    }
}

pub fn json_body<T>(value: T) -> JsonBody<T> {
    WithRejection(Json(value), PhantomData)
}

pub fn path_param<T>(value: T) -> PathParam<T> {
    WithRejection(Path(value), PhantomData)
}

pub fn patient_req(username: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.into(),
        password: PASSWORD.into(),
        name: format!("{username} patient"),
        age: 30,
        role: "patient".into(),
        pincode: "123456".into(),
        specialization: None,
    }
}

pub fn doctor_req(username: &str, specialization: Option<&str>) -> RegisterRequest {
    RegisterRequest {
        username: username.into(),
        password: PASSWORD.into(),
        name: format!("Dr {username}"),
        age: 45,
        role: "doctor".into(),
        pincode: "654321".into(),
        specialization: specialization.map(str::to_string),
    }
}

async fn register_as(state: &AppState, req: RegisterRequest) -> AuthContext {
    let (_, Json(body)) = register(State(state.clone()), json_body(req))
        .await
        .expect("registration should succeed");
    state
        .tokens
        .verify(&body.data.access_token)
        .expect("issued token should verify")
        .into()
}

pub async fn register_patient(state: &AppState, username: &str) -> AuthContext {
    register_as(state, patient_req(username)).await
}

pub async fn register_doctor(state: &AppState, username: &str) -> AuthContext {
    register_as(state, doctor_req(username, Some("Cardiology"))).await
}

/// Registers a doctor who then switches their own availability on.
pub async fn available_doctor(state: &AppState, username: &str) -> AuthContext {
    let doctor = register_doctor(state, username).await;
    let Json(body) = set_availability(
        State(state.clone()),
        doctor.clone(),
        path_param(doctor.user_id),
        json_body(Availability { is_available: true }),
    )
    .await
    .expect("doctor sets own availability");
    assert!(body.data.is_available);
    doctor
}
