use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::error::ApiError;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;
use crate::subscription::{AccessDecision, DenialReason, Feature, ResourceType, UsageSnapshot};

/// The access decision resolved for this request, attached for downstream
/// handlers. Present only when the gate authorized the request.
#[derive(Clone, Debug)]
pub struct SubscriptionContext(pub AccessDecision);

/// Usage snapshot attached by the limit gate on creation routes.
#[derive(Clone, Debug)]
pub struct UsageContext(pub UsageSnapshot);

/// The subscription gate: skips exempt prefixes, requires an authenticated
/// identity, evaluates the tenant's subscription and either short-circuits
/// with a structured denial or attaches the decision to the request.
///
/// Evaluation may persist a trial-to-expired transition as a side effect;
/// that write is conditional, so racing requests converge on one outcome.
pub async fn subscription_gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.config.subscription.is_exempt(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::no_token("Authentication required before subscription checks"))?;

    let decision = state
        .evaluator
        .evaluate(auth_user.agency_id, Utc::now())
        .await?;

    if !decision.authorized {
        return Err(denial_to_error(&state, decision));
    }

    request.extensions_mut().insert(SubscriptionContext(decision));
    Ok(next.run(request).await)
}

fn denial_to_error(state: &AppState, decision: AccessDecision) -> ApiError {
    let upgrade_url = state.config.subscription.upgrade_url();
    match decision.reason {
        Some(DenialReason::TrialExpired { trial_end_date }) => ApiError::TrialExpired {
            trial_end_date,
            upgrade_url,
        },
        Some(DenialReason::SubscriptionInactive { status }) => ApiError::SubscriptionInactive {
            status,
            upgrade_url,
        },
        Some(DenialReason::PaymentRequired) => ApiError::PaymentRequired { upgrade_url },
        Some(DenialReason::NoSubscription) | None => ApiError::NoSubscription,
    }
}

/// Per-route feature gate, layered inside the subscription gate. Denies with
/// FEATURE_NOT_AVAILABLE when the tenant's plan lacks the capability.
pub async fn require_feature(
    State((state, feature)): State<(AppState, Feature)>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let SubscriptionContext(decision) = request
        .extensions()
        .get::<SubscriptionContext>()
        .cloned()
        .ok_or_else(|| {
            ApiError::internal_server_error("Subscription gate must run before feature checks")
        })?;

    if !decision.resolved_features.available(feature) {
        tracing::debug!(
            "Feature '{}' denied for plan '{}'",
            feature,
            decision.current_plan.as_deref().unwrap_or("unknown")
        );
        return Err(ApiError::FeatureNotAvailable {
            feature,
            current_plan: decision.current_plan.unwrap_or_default(),
            upgrade_url: state.config.subscription.upgrade_url(),
        });
    }

    Ok(next.run(request).await)
}

/// Per-route usage-limit gate for resource creation endpoints. Counts the
/// tenant's current resources and denies with USAGE_LIMIT_EXCEEDED at the
/// boundary; otherwise attaches the snapshot for the handler's response.
pub async fn enforce_usage_limit(
    State((state, resource)): State<(AppState, ResourceType)>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::no_token("Authentication required before usage checks"))?;

    let SubscriptionContext(decision) = request
        .extensions()
        .get::<SubscriptionContext>()
        .cloned()
        .ok_or_else(|| {
            ApiError::internal_server_error("Subscription gate must run before usage checks")
        })?;

    let check = state
        .usage
        .check_limit(auth_user.agency_id, resource, &decision.resolved_limits)
        .await?;

    if !check.within_limit {
        tracing::debug!(
            "Usage limit hit for tenant {}: {} at {}/{:?}",
            auth_user.agency_id,
            resource,
            check.usage.current_count,
            check.usage.max_allowed
        );
        return Err(ApiError::UsageLimitExceeded {
            usage: check.usage,
            upgrade_url: state.config.subscription.upgrade_url(),
        });
    }

    request.extensions_mut().insert(UsageContext(check.usage));
    Ok(next.run(request).await)
}
