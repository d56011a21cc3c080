use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use thiserror::Error;
use uuid::Uuid;

use super::plan::BillingCycle;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Tenant {0} already has an active or trial subscription")]
    DuplicateSubscription(Uuid),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Subscription lifecycle states. `trial` and `active` grant access;
/// `expired`, `cancelled` and `suspended` deny it; `past_due` is a soft
/// denial the client can resolve by paying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Cancelled,
    Expired,
    Suspended,
    PastDue,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::PastDue => "past_due",
        }
    }

    pub fn grants_access(&self) -> bool {
        matches!(self, SubscriptionStatus::Trial | SubscriptionStatus::Active)
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial" => Ok(SubscriptionStatus::Trial),
            "active" => Ok(SubscriptionStatus::Active),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            "expired" => Ok(SubscriptionStatus::Expired),
            "suspended" => Ok(SubscriptionStatus::Suspended),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            other => Err(format!("unknown subscription status '{}'", other)),
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tenant's relationship to a plan over time. Rows are never deleted;
/// history is retained for audit and billing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub plan_name: String,
    pub status: SubscriptionStatus,
    pub is_trial: bool,
    pub trial_start_date: Option<DateTime<Utc>>,
    pub trial_end_date: Option<DateTime<Utc>>,
    pub billing_cycle: BillingCycle,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub next_billing_date: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for Subscription {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = SubscriptionStatus::from_str(&status).map_err(|e| {
            sqlx::Error::ColumnDecode {
                index: "status".to_string(),
                source: e.into(),
            }
        })?;

        let billing_cycle: String = row.try_get("billing_cycle")?;
        let billing_cycle = BillingCycle::from_str(&billing_cycle).map_err(|e| {
            sqlx::Error::ColumnDecode {
                index: "billing_cycle".to_string(),
                source: Box::new(e),
            }
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            plan_name: row.try_get("plan_name")?,
            status,
            is_trial: row.try_get("is_trial")?,
            trial_start_date: row.try_get("trial_start_date")?,
            trial_end_date: row.try_get("trial_end_date")?,
            billing_cycle,
            current_period_start: row.try_get("current_period_start")?,
            current_period_end: row.try_get("current_period_end")?,
            next_billing_date: row.try_get("next_billing_date")?,
            cancelled_at: row.try_get("cancelled_at")?,
            cancelled_reason: row.try_get("cancelled_reason")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Data access for subscription records. The evaluator only ever talks to
/// this trait, so tests can swap in an in-memory store.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Most recent subscription for the tenant regardless of status. Used by
    /// evaluation so that expired/cancelled tenants get a precise denial
    /// instead of looking unprovisioned.
    async fn find_current(&self, tenant_id: Uuid) -> Result<Option<Subscription>, StoreError>;

    /// Most recent subscription whose status still grants access.
    async fn find_active(&self, tenant_id: Uuid) -> Result<Option<Subscription>, StoreError>;

    /// Create a trial subscription for the tenant. Rejects tenants that
    /// already hold a trial or active subscription, preventing double-trialing.
    async fn create_trial(
        &self,
        tenant_id: Uuid,
        plan_name: &str,
        now: DateTime<Utc>,
        trial_days: i64,
    ) -> Result<Subscription, StoreError>;

    /// Conditionally flip a trial to expired. Returns true when this call
    /// performed the transition, false when another evaluation already did.
    /// Safe to race: the update is a no-op unless the row is still `trial`.
    async fn transition_to_expired(&self, subscription_id: Uuid) -> Result<bool, StoreError>;
}

const SUBSCRIPTION_COLUMNS: &str = r#"
    id, tenant_id, plan_name, status, is_trial,
    trial_start_date, trial_end_date, billing_cycle,
    current_period_start, current_period_end, next_billing_date,
    cancelled_at, cancelled_reason, created_at, updated_at
"#;

#[derive(Clone)]
pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn find_current(&self, tenant_id: Uuid) -> Result<Option<Subscription>, StoreError> {
        let query = format!(
            "SELECT {} FROM subscriptions WHERE tenant_id = $1 ORDER BY created_at DESC LIMIT 1",
            SUBSCRIPTION_COLUMNS
        );
        let subscription = sqlx::query_as::<_, Subscription>(&query)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(subscription)
    }

    async fn find_active(&self, tenant_id: Uuid) -> Result<Option<Subscription>, StoreError> {
        let query = format!(
            r#"
            SELECT {} FROM subscriptions
            WHERE tenant_id = $1 AND status IN ('trial', 'active')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            SUBSCRIPTION_COLUMNS
        );
        let subscription = sqlx::query_as::<_, Subscription>(&query)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(subscription)
    }

    async fn create_trial(
        &self,
        tenant_id: Uuid,
        plan_name: &str,
        now: DateTime<Utc>,
        trial_days: i64,
    ) -> Result<Subscription, StoreError> {
        if self.find_active(tenant_id).await?.is_some() {
            return Err(StoreError::DuplicateSubscription(tenant_id));
        }

        let trial_end = now + Duration::days(trial_days);
        let query = format!(
            r#"
            INSERT INTO subscriptions
                (id, tenant_id, plan_name, status, is_trial,
                 trial_start_date, trial_end_date, billing_cycle,
                 current_period_start, current_period_end, next_billing_date,
                 created_at, updated_at)
            VALUES ($1, $2, $3, 'trial', true, $4, $5, 'monthly', $4, $5, $5, $4, $4)
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        );

        let subscription = sqlx::query_as::<_, Subscription>(&query)
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(plan_name)
            .bind(now)
            .bind(trial_end)
            .fetch_one(&self.pool)
            .await?;

        tracing::info!(
            "Created trial subscription {} for tenant {} on plan '{}' (ends {})",
            subscription.id,
            tenant_id,
            plan_name,
            trial_end
        );
        Ok(subscription)
    }

    async fn transition_to_expired(&self, subscription_id: Uuid) -> Result<bool, StoreError> {
        // Conditional update keyed on the current status. Two racing expiry
        // evaluations converge: one flips the row, the other matches nothing.
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'expired', is_trial = false, updated_at = NOW()
            WHERE id = $1 AND status = 'trial'
            "#,
        )
        .bind(subscription_id)
        .execute(&self.pool)
        .await?;

        let transitioned = result.rows_affected() > 0;
        if transitioned {
            tracing::info!("Trial subscription {} transitioned to expired", subscription_id);
        }
        Ok(transitioned)
    }
}
