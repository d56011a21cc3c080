use axum::extract::State;
use axum::Extension;
use chrono::Utc;
use serde::Serialize;

use crate::error::ApiError;
use crate::middleware::auth::AuthUser;
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::subscription::{AccessDecision, Plan, ResourceType, UsageSnapshot};

/// GET /api/subscription/plans - public listing of subscribable tiers,
/// ordered by ascending price.
pub async fn plan_list(State(state): State<AppState>) -> ApiResult<Vec<Plan>> {
    let plans: Vec<Plan> = state.catalog.list_active().into_iter().cloned().collect();
    Ok(ApiResponse::success(plans))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub subscription: AccessDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Vec<UsageSnapshot>>,
    pub upgrade_url: String,
}

/// GET /api/subscription/status - authenticated but exempt from the gate so
/// expired and past-due tenants can still see where they stand. Note this
/// runs a full evaluation, so a lapsed trial is transitioned here too.
pub async fn status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<StatusResponse> {
    let decision = state
        .evaluator
        .evaluate(auth.agency_id, Utc::now())
        .await
        .map_err(ApiError::from)?;

    let usage = if decision.authorized {
        let mut snapshots = Vec::new();
        for resource in [ResourceType::Leads, ResourceType::Users, ResourceType::Properties] {
            let check = state
                .usage
                .check_limit(auth.agency_id, resource, &decision.resolved_limits)
                .await?;
            snapshots.push(check.usage);
        }
        Some(snapshots)
    } else {
        None
    };

    Ok(ApiResponse::success(StatusResponse {
        subscription: decision,
        usage,
        upgrade_url: state.config.subscription.upgrade_url(),
    }))
}
