use crate::{error::ApiError, models::AppState};
use axum::{Json, Router, extract::Path};
use axum_extra::extract::WithRejection;

pub mod appointment_routes;
pub mod auth_routes;
pub mod doctor_routes;
pub mod health_routes;

#[cfg(test)]
pub mod test_support;

/// JSON body whose rejections answer in the API error envelope.
pub type JsonBody<T> = WithRejection<Json<T>, ApiError>;
/// Path parameters whose rejections answer in the API error envelope.
pub type PathParam<T> = WithRejection<Path<T>, ApiError>;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(doctor_routes::router())
        .merge(appointment_routes::router())
        .merge(health_routes::router());

    Router::new()
        .nest("/api/auth", auth_routes::router())
        .nest("/api", api)
        .with_state(state)
}
