// Thin collaborator routes that sit behind the subscription gate. They keep
// the CRM surface minimal on purpose: one parameterized insert or select per
// handler, with the gate's attached context echoed back to the client.
use axum::extract::State;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::hash_password;
use crate::error::ApiError;
use crate::middleware::auth::AuthUser;
use crate::middleware::gate::UsageContext;
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::subscription::UsageSnapshot;

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Lead {
    pub id: Uuid,
    pub agency_id: Uuid,
    pub assigned_to: Option<Uuid>,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub source: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLead {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Created<T> {
    #[serde(flatten)]
    pub record: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSnapshot>,
}

pub async fn lead_create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    usage: Option<Extension<UsageContext>>,
    Json(payload): Json<CreateLead>,
) -> ApiResult<Created<Lead>> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::bad_request("Lead name is required"));
    }

    let lead = sqlx::query_as::<_, Lead>(
        r#"
        INSERT INTO leads (id, agency_id, assigned_to, name, phone, email, source)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, agency_id, assigned_to, name, phone, email, source, status, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth.agency_id)
    .bind(auth.user_id)
    .bind(payload.name.trim())
    .bind(&payload.phone)
    .bind(&payload.email)
    .bind(&payload.source)
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::created(Created {
        record: lead,
        usage: usage.map(|Extension(UsageContext(snapshot))| snapshot),
    }))
}

pub async fn lead_list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Vec<Lead>> {
    let leads = sqlx::query_as::<_, Lead>(
        r#"
        SELECT id, agency_id, assigned_to, name, phone, email, source, status, created_at
        FROM leads
        WHERE agency_id = $1 AND deleted_at IS NULL
        ORDER BY created_at DESC
        LIMIT 100
        "#,
    )
    .bind(auth.agency_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(leads))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Property {
    pub id: Uuid,
    pub agency_id: Uuid,
    pub listed_by: Option<Uuid>,
    pub title: String,
    pub address: Option<String>,
    pub price: Option<Decimal>,
    pub property_type: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProperty {
    pub title: String,
    pub address: Option<String>,
    pub price: Option<Decimal>,
    pub property_type: Option<String>,
}

pub async fn property_create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    usage: Option<Extension<UsageContext>>,
    Json(payload): Json<CreateProperty>,
) -> ApiResult<Created<Property>> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::bad_request("Property title is required"));
    }

    let property = sqlx::query_as::<_, Property>(
        r#"
        INSERT INTO properties (id, agency_id, listed_by, title, address, price, property_type)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, agency_id, listed_by, title, address, price, property_type, status, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth.agency_id)
    .bind(auth.user_id)
    .bind(payload.title.trim())
    .bind(&payload.address)
    .bind(payload.price)
    .bind(&payload.property_type)
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::created(Created {
        record: property,
        usage: usage.map(|Extension(UsageContext(snapshot))| snapshot),
    }))
}

pub async fn property_list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Vec<Property>> {
    let properties = sqlx::query_as::<_, Property>(
        r#"
        SELECT id, agency_id, listed_by, title, address, price, property_type, status, created_at
        FROM properties
        WHERE agency_id = $1 AND deleted_at IS NULL
        ORDER BY created_at DESC
        LIMIT 100
        "#,
    )
    .bind(auth.agency_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(properties))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct TeamMember {
    pub id: Uuid,
    pub agency_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTeamMember {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
}

pub async fn team_create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    usage: Option<Extension<UsageContext>>,
    Json(payload): Json<CreateTeamMember>,
) -> ApiResult<Created<TeamMember>> {
    if auth.role != "admin" {
        return Err(ApiError::unauthorized("Only admins can add team members"));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::bad_request("Password must be at least 8 characters"));
    }

    let member = sqlx::query_as::<_, TeamMember>(
        r#"
        INSERT INTO users (id, agency_id, name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, agency_id, name, email, role, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth.agency_id)
    .bind(payload.name.trim())
    .bind(&payload.email)
    .bind(hash_password(&payload.password))
    .bind(payload.role.as_deref().unwrap_or("agent"))
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        if e.as_database_error().map_or(false, |d| d.is_unique_violation()) {
            ApiError::conflict("An account with this email already exists")
        } else {
            ApiError::from(e)
        }
    })?;

    Ok(ApiResponse::created(Created {
        record: member,
        usage: usage.map(|Extension(UsageContext(snapshot))| snapshot),
    }))
}

pub async fn team_list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Vec<TeamMember>> {
    let members = sqlx::query_as::<_, TeamMember>(
        r#"
        SELECT id, agency_id, name, email, role, created_at
        FROM users
        WHERE agency_id = $1 AND deleted_at IS NULL
        ORDER BY created_at ASC
        "#,
    )
    .bind(auth.agency_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(members))
}

#[derive(Debug, Deserialize)]
pub struct WhatsappMessage {
    pub phone: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct WhatsappQueued {
    pub phone: String,
    pub queued: bool,
}

/// POST /api/whatsapp/send - feature-gated. Delivery itself is handled by an
/// external integration; this endpoint only validates and accepts.
pub async fn whatsapp_send(
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<WhatsappMessage>,
) -> ApiResult<WhatsappQueued> {
    if payload.phone.trim().is_empty() || payload.message.trim().is_empty() {
        return Err(ApiError::bad_request("Phone and message are required"));
    }

    tracing::info!(
        "WhatsApp message queued by user {} for {}",
        auth.user_id,
        payload.phone
    );
    Ok(ApiResponse::with_status(
        WhatsappQueued {
            phone: payload.phone,
            queued: true,
        },
        axum::http::StatusCode::ACCEPTED,
    ))
}
