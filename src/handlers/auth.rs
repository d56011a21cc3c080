use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{generate_jwt, hash_password, Claims};
use crate::error::ApiError;
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::subscription::{Subscription, SubscriptionStore};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub agency_name: String,
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub token: String,
    pub user: UserInfo,
    pub subscription: Subscription,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub agency_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
}

/// POST /auth/signup - provision an agency, its admin user, and a trial
/// subscription on the default plan.
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> ApiResult<SignupResponse> {
    if payload.agency_name.trim().is_empty() || payload.name.trim().is_empty() {
        return Err(ApiError::bad_request("Agency name and user name are required"));
    }
    if !payload.email.contains('@') {
        return Err(ApiError::bad_request("A valid email address is required"));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::bad_request("Password must be at least 8 characters"));
    }

    let (exists,): (bool,) =
        sqlx::query_as("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
            .bind(&payload.email)
            .fetch_one(&state.pool)
            .await?;
    if exists {
        return Err(ApiError::conflict("An account with this email already exists"));
    }

    let agency_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query("INSERT INTO agencies (id, name, email, created_at, updated_at) VALUES ($1, $2, $3, $4, $4)")
        .bind(agency_id)
        .bind(payload.agency_name.trim())
        .bind(&payload.email)
        .bind(now)
        .execute(&state.pool)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO users (id, agency_id, name, email, password_hash, role, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, 'admin', $6, $6)
        "#,
    )
    .bind(user_id)
    .bind(agency_id)
    .bind(payload.name.trim())
    .bind(&payload.email)
    .bind(hash_password(&payload.password))
    .bind(now)
    .execute(&state.pool)
    .await?;

    let subscription = state
        .store
        .create_trial(
            agency_id,
            &state.catalog.default_plan().name,
            now,
            state.config.subscription.trial_period_days,
        )
        .await?;

    let claims = Claims::new(
        agency_id,
        user_id,
        payload.email.clone(),
        "admin".to_string(),
        &state.config.security,
    );
    let token = generate_jwt(&claims, &state.config.security).map_err(|e| {
        tracing::error!("Failed to issue JWT at signup: {}", e);
        ApiError::internal_server_error("Failed to issue authentication token")
    })?;

    Ok(ApiResponse::created(SignupResponse {
        token,
        user: UserInfo {
            id: user_id,
            agency_id,
            name: payload.name.trim().to_string(),
            email: payload.email,
            role: "admin".to_string(),
        },
        subscription,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserInfo,
}

/// POST /auth/login - authenticate and receive a JWT. Subscription state is
/// deliberately not checked here; expired tenants must still be able to log
/// in to reach the upgrade surface.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let row: Option<(Uuid, Uuid, String, String, String)> = sqlx::query_as(
        r#"
        SELECT id, agency_id, name, role, password_hash
        FROM users
        WHERE email = $1 AND deleted_at IS NULL
        "#,
    )
    .bind(&payload.email)
    .fetch_optional(&state.pool)
    .await?;

    let Some((user_id, agency_id, name, role, password_hash)) = row else {
        return Err(ApiError::unauthorized("Invalid email or password"));
    };

    if hash_password(&payload.password) != password_hash {
        tracing::warn!("Failed login attempt for {}", payload.email);
        return Err(ApiError::unauthorized("Invalid email or password"));
    }

    let claims = Claims::new(
        agency_id,
        user_id,
        payload.email.clone(),
        role.clone(),
        &state.config.security,
    );
    let token = generate_jwt(&claims, &state.config.security).map_err(|e| {
        tracing::error!("Failed to issue JWT at login: {}", e);
        ApiError::internal_server_error("Failed to issue authentication token")
    })?;

    Ok(ApiResponse::success(LoginResponse {
        token,
        user: UserInfo {
            id: user_id,
            agency_id,
            name,
            email: payload.email,
            role,
        },
    }))
}
