use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{hash_password, verify_dummy_password, verify_password},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{
        Account, AccountKind, AccountView, ApiOk, AppState, DoctorProfile, NewAccount, Role,
        DEFAULT_SPECIALIZATION,
    },
    routes::JsonBody,
};

const MIN_PASSWORD_LEN: usize = 6;
const MAX_USERNAME_LEN: usize = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub name: String,
    pub age: i64,
    pub role: String,
    pub pincode: String,
    pub specialization: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct AuthData {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub account: AccountView,
}

/* -------------------------
   Validation
--------------------------*/

fn validate_username(username: &str) -> Result<(), ApiError> {
    let u = username.trim();
    if u.is_empty() {
        return Err(ApiError::invalid_field("username is required"));
    }
    if u.len() < 3 || u.len() > MAX_USERNAME_LEN {
        return Err(ApiError::invalid_field(format!(
            "username must be 3 to {MAX_USERNAME_LEN} characters"
        )));
    }
    if u.chars().any(char::is_whitespace) {
        return Err(ApiError::invalid_field("username must not contain spaces"));
    }
    Ok(())
}

fn validate_password(pw: &str) -> Result<(), ApiError> {
    if pw.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::invalid_field(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::invalid_field("name is required"));
    }
    Ok(())
}

fn validate_age(age: i64) -> Result<i16, ApiError> {
    if !(0..=120).contains(&age) {
        return Err(ApiError::invalid_field("age must be between 0 and 120"));
    }
    // range checked above
    Ok(age as i16)
}

fn validate_pincode(pincode: &str) -> Result<(), ApiError> {
    let p = pincode.trim();
    if p.len() != 6 || !p.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ApiError::invalid_field("pincode must be 6 digits"));
    }
    Ok(())
}

fn parse_role(role: &str) -> Result<Role, ApiError> {
    role.trim()
        .parse::<Role>()
        .map_err(|_| ApiError::invalid_field("role must be patient or doctor"))
}

fn issue_for(state: &AppState, account: &Account) -> Result<AuthData, ApiError> {
    let issued = state
        .tokens
        .issue(account.id, &account.username, account.role())
        .map_err(ApiError::Internal)?;

    Ok(AuthData {
        access_token: issued.token,
        token_type: "Bearer",
        expires_at: issued.expires_at,
        account: account.view(),
    })
}

/* -------------------------
   Handlers
--------------------------*/

pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(req), _): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiOk<AuthData>>), ApiError> {
    validate_username(&req.username)?;
    validate_password(&req.password)?;
    validate_name(&req.name)?;
    let age = validate_age(req.age)?;
    validate_pincode(&req.pincode)?;
    let role = parse_role(&req.role)?;

    let kind = match role {
        Role::Patient => AccountKind::Patient,
        Role::Doctor => {
            let specialization = req
                .specialization
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_SPECIALIZATION)
                .to_string();
            AccountKind::Doctor(DoctorProfile {
                specialization,
                is_available: false,
            })
        }
    };

    let username = req.username.trim().to_string();

    // Friendly early answer; the store's unique constraint is what guarantees it.
    if state.store.find_account_by_username(&username).await?.is_some() {
        return Err(ApiError::DuplicateUsername);
    }

    let password_hash = hash_password(&req.password).map_err(ApiError::Internal)?;

    let account = state
        .store
        .insert_account(NewAccount {
            username,
            password_hash,
            name: req.name.trim().to_string(),
            age,
            pincode: req.pincode.trim().to_string(),
            kind,
        })
        .await?;

    tracing::info!(account_id = %account.id, role = %account.role(), "account registered");

    let data = issue_for(&state, &account)?;
    Ok((StatusCode::CREATED, Json(ApiOk { data })))
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): JsonBody<LoginRequest>,
) -> Result<Json<ApiOk<AuthData>>, ApiError> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::invalid_field("username and password are required"));
    }
    let claimed_role = parse_role(&req.role)?;

    // 1) Load account
    let Some(account) = state.store.find_account_by_username(username).await? else {
        // Same Argon2 cost as a wrong password.
        verify_dummy_password(&req.password);
        return Err(ApiError::InvalidCredentials);
    };

    // 2) Verify password
    if !verify_password(&req.password, &account.password_hash) {
        return Err(ApiError::InvalidCredentials);
    }

    // 3) Password is good; tell the caller which role to retry with.
    if account.role() != claimed_role {
        tracing::warn!(account_id = %account.id, "login with wrong role");
        return Err(ApiError::RoleMismatch {
            actual: account.role(),
        });
    }

    tracing::info!(account_id = %account.id, "login");
    Ok(Json(ApiOk {
        data: issue_for(&state, &account)?,
    }))
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<AccountView>>, ApiError> {
    let account = state
        .store
        .find_account(auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("account not found"))?;

    Ok(Json(ApiOk {
        data: account.view(),
    }))
}
