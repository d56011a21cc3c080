// HTTP API error types and the denial taxonomy
use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::subscription::{
    EvaluatorError, Feature, PlanError, StoreError, SubscriptionStatus, UsageSnapshot,
};

/// HTTP API error with appropriate status codes and client-friendly messages.
/// Subscription and entitlement denials carry remediation data (status, plan,
/// usage figures, upgrade link) so clients can act instead of guessing.
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    NoToken(String),
    InvalidToken(String),
    Unauthorized(String),

    // 402 Payment Required - access denial
    TrialExpired {
        trial_end_date: DateTime<Utc>,
        upgrade_url: String,
    },
    SubscriptionInactive {
        status: SubscriptionStatus,
        upgrade_url: String,
    },
    PaymentRequired {
        upgrade_url: String,
    },

    // 403 Forbidden - entitlement denial
    FeatureNotAvailable {
        feature: Feature,
        current_plan: String,
        upgrade_url: String,
    },
    UsageLimitExceeded {
        usage: UsageSnapshot,
        upgrade_url: String,
    },

    // 404 Not Found - tenant state errors
    UserNotFound(String),
    NoSubscription,
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NoToken(_) | ApiError::InvalidToken(_) | ApiError::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::TrialExpired { .. }
            | ApiError::SubscriptionInactive { .. }
            | ApiError::PaymentRequired { .. } => StatusCode::PAYMENT_REQUIRED,
            ApiError::FeatureNotAvailable { .. } | ApiError::UsageLimitExceeded { .. } => {
                StatusCode::FORBIDDEN
            }
            ApiError::UserNotFound(_) | ApiError::NoSubscription | ApiError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Machine-readable code for client handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NoToken(_) => "NO_TOKEN",
            ApiError::InvalidToken(_) => "INVALID_TOKEN",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::TrialExpired { .. } => "TRIAL_EXPIRED",
            ApiError::SubscriptionInactive { .. } => "SUBSCRIPTION_INACTIVE",
            ApiError::PaymentRequired { .. } => "PAYMENT_REQUIRED",
            ApiError::FeatureNotAvailable { .. } => "FEATURE_NOT_AVAILABLE",
            ApiError::UsageLimitExceeded { .. } => "USAGE_LIMIT_EXCEEDED",
            ApiError::UserNotFound(_) => "USER_NOT_FOUND",
            ApiError::NoSubscription => "NO_SUBSCRIPTION",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Client-safe human message.
    pub fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::NoToken(msg)
            | ApiError::InvalidToken(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::UserNotFound(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::InternalServerError(msg)
            | ApiError::ServiceUnavailable(msg) => msg.clone(),
            ApiError::TrialExpired { .. } => {
                "Your free trial has ended. Upgrade to a paid plan to continue.".to_string()
            }
            ApiError::SubscriptionInactive { status, .. } => {
                format!("Your subscription is {}. Upgrade to restore access.", status)
            }
            ApiError::PaymentRequired { .. } => {
                "Your last payment failed. Update your billing details to continue.".to_string()
            }
            ApiError::FeatureNotAvailable { feature, current_plan, .. } => format!(
                "The {} feature is not included in your '{}' plan.",
                feature, current_plan
            ),
            ApiError::UsageLimitExceeded { usage, .. } => format!(
                "You have reached your plan's {} limit.",
                usage.resource_type
            ),
            ApiError::NoSubscription => {
                "No subscription found for this account. Contact support.".to_string()
            }
        }
    }

    /// Remediation payload attached under `data`.
    fn data(&self) -> Option<Value> {
        match self {
            ApiError::TrialExpired {
                trial_end_date,
                upgrade_url,
            } => Some(json!({
                "trialEndDate": trial_end_date,
                "upgradeUrl": upgrade_url,
            })),
            ApiError::SubscriptionInactive {
                status,
                upgrade_url,
            } => Some(json!({
                "status": status,
                "upgradeUrl": upgrade_url,
            })),
            ApiError::PaymentRequired { upgrade_url } => Some(json!({
                "upgradeUrl": upgrade_url,
            })),
            ApiError::FeatureNotAvailable {
                feature,
                current_plan,
                upgrade_url,
            } => Some(json!({
                "feature": feature,
                "currentPlan": current_plan,
                "upgradeUrl": upgrade_url,
            })),
            ApiError::UsageLimitExceeded { usage, upgrade_url } => Some(json!({
                "resourceType": usage.resource_type,
                "currentCount": usage.current_count,
                "maxAllowed": usage.max_allowed,
                "upgradeUrl": upgrade_url,
            })),
            _ => None,
        }
    }

    /// Convert to the `{"success": false, ...}` response body.
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "success": false,
            "message": self.message(),
            "code": self.error_code(),
        });
        if let Some(data) = self.data() {
            body["data"] = data;
        }
        body
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn no_token(message: impl Into<String>) -> Self {
        ApiError::NoToken(message.into())
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        ApiError::InvalidToken(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn user_not_found(message: impl Into<String>) -> Self {
        ApiError::UserNotFound(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Domain errors fail closed: when subscription state cannot be determined the
// request is denied with a 5xx, never treated as authorized.
impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateSubscription(tenant_id) => {
                tracing::warn!("Duplicate trial attempt for tenant {}", tenant_id);
                ApiError::conflict("An active subscription already exists for this account")
            }
            StoreError::Database(e) => {
                tracing::error!("Subscription store error: {}", e);
                ApiError::service_unavailable("Subscription state temporarily unavailable")
            }
        }
    }
}

impl From<EvaluatorError> for ApiError {
    fn from(err: EvaluatorError) -> Self {
        match err {
            EvaluatorError::Store(e) => e.into(),
            EvaluatorError::Plan(e) => e.into(),
            EvaluatorError::MissingTrialWindow(id) => {
                tracing::error!("Subscription {} has inconsistent trial state", id);
                ApiError::internal_server_error("Subscription record is inconsistent")
            }
        }
    }
}

impl From<PlanError> for ApiError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::NotFound(name) => {
                ApiError::not_found(format!("Plan '{}' does not exist", name))
            }
            PlanError::UnknownFeature(name) => {
                ApiError::bad_request(format!("Unknown feature '{}'", name))
            }
            PlanError::InvalidDefinition { plan, message } => {
                tracing::error!("Invalid plan definition '{}': {}", plan, message);
                ApiError::internal_server_error("Plan catalog is misconfigured")
            }
            PlanError::Database(e) => {
                tracing::error!("Plan catalog query error: {}", e);
                ApiError::service_unavailable("Plan catalog temporarily unavailable")
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);
        ApiError::internal_server_error("An error occurred while processing your request")
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::{check_limit, LimitValue, PlanLimits, ResourceType};

    fn upgrade_url() -> String {
        "http://localhost:5173/subscription/upgrade".to_string()
    }

    #[test]
    fn status_mapping_follows_denial_taxonomy() {
        assert_eq!(
            ApiError::no_token("x").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::invalid_token("x").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::user_not_found("x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::TrialExpired {
                trial_end_date: Utc::now(),
                upgrade_url: upgrade_url(),
            }
            .status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ApiError::SubscriptionInactive {
                status: SubscriptionStatus::Expired,
                upgrade_url: upgrade_url(),
            }
            .status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ApiError::PaymentRequired {
                upgrade_url: upgrade_url()
            }
            .status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ApiError::FeatureNotAvailable {
                feature: Feature::Whatsapp,
                current_plan: "starter".to_string(),
                upgrade_url: upgrade_url(),
            }
            .status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn denial_body_has_success_false_code_and_data() {
        let limits = PlanLimits {
            max_leads: LimitValue::Limited(1000),
            max_users: LimitValue::Limited(3),
            max_properties: LimitValue::Limited(100),
        };
        let check = check_limit(ResourceType::Leads, 1000, &limits);
        let err = ApiError::UsageLimitExceeded {
            usage: check.usage,
            upgrade_url: upgrade_url(),
        };

        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        let body = err.to_json();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "USAGE_LIMIT_EXCEEDED");
        assert_eq!(body["data"]["resourceType"], "leads");
        assert_eq!(body["data"]["currentCount"], 1000);
        assert_eq!(body["data"]["maxAllowed"], 1000);
        assert_eq!(body["data"]["upgradeUrl"], upgrade_url());
    }

    #[test]
    fn feature_denial_names_feature_and_plan() {
        let err = ApiError::FeatureNotAvailable {
            feature: Feature::Whatsapp,
            current_plan: "starter".to_string(),
            upgrade_url: upgrade_url(),
        };
        let body = err.to_json();
        assert_eq!(body["code"], "FEATURE_NOT_AVAILABLE");
        assert_eq!(body["data"]["feature"], "whatsapp");
        assert_eq!(body["data"]["currentPlan"], "starter");
    }

    #[test]
    fn duplicate_subscription_maps_to_conflict() {
        let err: ApiError = StoreError::DuplicateSubscription(uuid::Uuid::new_v4()).into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
