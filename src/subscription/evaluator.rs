use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::plan::{FeatureSet, PlanCatalog, PlanError, PlanLimits};
use super::record::{StoreError, Subscription, SubscriptionStatus, SubscriptionStore};

#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("Subscription {0} is marked trial but has no trial end date")]
    MissingTrialWindow(Uuid),
}

/// Why a request was denied. Serialized into denial response bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum DenialReason {
    NoSubscription,
    TrialExpired { trial_end_date: DateTime<Utc> },
    SubscriptionInactive { status: SubscriptionStatus },
    PaymentRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialInfo {
    pub days_remaining: i64,
    pub is_expiring_soon: bool,
}

const EXPIRING_SOON_DAYS: i64 = 3;

impl TrialInfo {
    fn at(trial_end: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        // Ceiling division: any partial day still counts as a remaining day.
        let seconds_left = (trial_end - now).num_seconds().max(0);
        let days_remaining = (seconds_left + 86_399) / 86_400;
        Self {
            days_remaining,
            is_expiring_soon: days_remaining <= EXPIRING_SOON_DAYS,
        }
    }
}

/// The evaluator's verdict for one request: authorize/deny plus the
/// entitlements resolved from the tenant's plan at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    pub authorized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<SubscriptionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_plan: Option<String>,
    #[serde(default)]
    pub resolved_features: FeatureSet,
    #[serde(default)]
    pub resolved_limits: PlanLimits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_info: Option<TrialInfo>,
}

impl AccessDecision {
    fn granted(
        subscription: &Subscription,
        features: FeatureSet,
        limits: PlanLimits,
        trial_info: Option<TrialInfo>,
    ) -> Self {
        Self {
            authorized: true,
            reason: None,
            subscription_status: Some(subscription.status),
            current_plan: Some(subscription.plan_name.clone()),
            resolved_features: features,
            resolved_limits: limits,
            trial_info,
        }
    }

    fn denied(
        reason: DenialReason,
        status: Option<SubscriptionStatus>,
        current_plan: Option<String>,
    ) -> Self {
        Self {
            authorized: false,
            reason: Some(reason),
            subscription_status: status,
            current_plan,
            // Default-deny entitlements for unauthorized tenants.
            resolved_features: FeatureSet::default(),
            resolved_limits: PlanLimits::default(),
            trial_info: None,
        }
    }
}

/// The subscription state machine, evaluated lazily per request. Trial
/// expiry is detected here and persisted through an idempotent conditional
/// update before the denial is returned; there is no background sweeper.
pub struct AccessEvaluator {
    store: Arc<dyn SubscriptionStore>,
    catalog: Arc<PlanCatalog>,
    past_due_blocks: bool,
}

impl AccessEvaluator {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        catalog: Arc<PlanCatalog>,
        past_due_blocks: bool,
    ) -> Self {
        Self {
            store,
            catalog,
            past_due_blocks,
        }
    }

    pub async fn evaluate(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<AccessDecision, EvaluatorError> {
        let Some(subscription) = self.store.find_current(tenant_id).await? else {
            tracing::warn!("Access denied for tenant {}: no subscription on record", tenant_id);
            return Ok(AccessDecision::denied(DenialReason::NoSubscription, None, None));
        };

        match subscription.status {
            SubscriptionStatus::Trial => {
                let trial_end = subscription
                    .trial_end_date
                    .ok_or(EvaluatorError::MissingTrialWindow(subscription.id))?;

                if now > trial_end {
                    self.store.transition_to_expired(subscription.id).await?;
                    tracing::info!(
                        "Access denied for tenant {}: trial ended {}",
                        tenant_id,
                        trial_end
                    );
                    return Ok(AccessDecision::denied(
                        DenialReason::TrialExpired {
                            trial_end_date: trial_end,
                        },
                        Some(SubscriptionStatus::Expired),
                        Some(subscription.plan_name.clone()),
                    ));
                }

                let plan = self.catalog.get(&subscription.plan_name)?;
                Ok(AccessDecision::granted(
                    &subscription,
                    plan.features.clone(),
                    plan.limits,
                    Some(TrialInfo::at(trial_end, now)),
                ))
            }

            SubscriptionStatus::Active => {
                let plan = self.catalog.get(&subscription.plan_name)?;
                Ok(AccessDecision::granted(
                    &subscription,
                    plan.features.clone(),
                    plan.limits,
                    None,
                ))
            }

            SubscriptionStatus::Expired
            | SubscriptionStatus::Cancelled
            | SubscriptionStatus::Suspended => {
                tracing::debug!(
                    "Access denied for tenant {}: subscription is {}",
                    tenant_id,
                    subscription.status
                );
                Ok(AccessDecision::denied(
                    DenialReason::SubscriptionInactive {
                        status: subscription.status,
                    },
                    Some(subscription.status),
                    Some(subscription.plan_name.clone()),
                ))
            }

            SubscriptionStatus::PastDue => {
                if self.past_due_blocks {
                    return Ok(AccessDecision::denied(
                        DenialReason::PaymentRequired,
                        Some(SubscriptionStatus::PastDue),
                        Some(subscription.plan_name.clone()),
                    ));
                }
                // Grace period: access continues, status is surfaced so
                // handlers can prompt for payment.
                let plan = self.catalog.get(&subscription.plan_name)?;
                Ok(AccessDecision::granted(
                    &subscription,
                    plan.features.clone(),
                    plan.limits,
                    None,
                ))
            }
        }
    }
}
