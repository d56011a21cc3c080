use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::plan::{LimitValue, PlanLimits};

/// Countable resources subject to plan limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Leads,
    Users,
    Properties,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Leads => "leads",
            ResourceType::Users => "users",
            ResourceType::Properties => "properties",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request view of one resource's consumption against the plan limit.
/// Computed on demand, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub resource_type: ResourceType,
    pub current_count: i64,
    pub max_allowed: LimitValue,
    pub remaining: LimitValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitCheck {
    pub within_limit: bool,
    pub usage: UsageSnapshot,
}

/// Compare a current count against the resolved plan limits for a resource.
/// The boundary is exclusive: reaching the limit blocks the next creation.
pub fn check_limit(resource: ResourceType, current_count: i64, limits: &PlanLimits) -> LimitCheck {
    let max_allowed = limits.get(resource);
    LimitCheck {
        within_limit: max_allowed.allows(current_count),
        usage: UsageSnapshot {
            resource_type: resource,
            current_count,
            max_allowed,
            remaining: max_allowed.remaining(current_count),
        },
    }
}

/// Counts a tenant's resources in the durable store. Scoping is uniformly by
/// `agency_id`; assignment fields never widen the count.
#[derive(Clone)]
pub struct UsageCounter {
    pool: PgPool,
}

impl UsageCounter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self, tenant_id: Uuid, resource: ResourceType) -> Result<i64, sqlx::Error> {
        let sql = match resource {
            ResourceType::Leads => {
                "SELECT COUNT(*) FROM leads WHERE agency_id = $1 AND deleted_at IS NULL"
            }
            ResourceType::Users => {
                "SELECT COUNT(*) FROM users WHERE agency_id = $1 AND deleted_at IS NULL"
            }
            ResourceType::Properties => {
                "SELECT COUNT(*) FROM properties WHERE agency_id = $1 AND deleted_at IS NULL"
            }
        };

        let (count,): (i64,) = sqlx::query_as(sql).bind(tenant_id).fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Count current usage and compare it against the resolved limits.
    /// Read-then-decide: concurrent creations near the boundary may overshoot
    /// by a small margin, which is the documented soft-limit behavior.
    pub async fn check_limit(
        &self,
        tenant_id: Uuid,
        resource: ResourceType,
        limits: &PlanLimits,
    ) -> Result<LimitCheck, sqlx::Error> {
        let current_count = self.count(tenant_id, resource).await?;
        Ok(check_limit(resource, current_count, limits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_leads: LimitValue) -> PlanLimits {
        PlanLimits {
            max_leads,
            max_users: LimitValue::Limited(3),
            max_properties: LimitValue::Limited(100),
        }
    }

    #[test]
    fn at_limit_blocks_next_creation() {
        let check = check_limit(ResourceType::Leads, 1000, &limits(LimitValue::Limited(1000)));
        assert!(!check.within_limit);
        assert_eq!(check.usage.current_count, 1000);
        assert_eq!(check.usage.max_allowed, LimitValue::Limited(1000));
        assert_eq!(check.usage.remaining, LimitValue::Limited(0));
    }

    #[test]
    fn one_below_limit_is_within() {
        let check = check_limit(ResourceType::Leads, 999, &limits(LimitValue::Limited(1000)));
        assert!(check.within_limit);
        assert_eq!(check.usage.remaining, LimitValue::Limited(1));
    }

    #[test]
    fn unlimited_always_within_limit() {
        let check = check_limit(ResourceType::Leads, 5_000_000, &limits(LimitValue::Unlimited));
        assert!(check.within_limit);
        assert_eq!(check.usage.remaining, LimitValue::Unlimited);
    }

    #[test]
    fn remaining_never_negative_after_overshoot() {
        // Soft-limit overshoot from racing creations still reports zero left.
        let check = check_limit(ResourceType::Leads, 1002, &limits(LimitValue::Limited(1000)));
        assert!(!check.within_limit);
        assert_eq!(check.usage.remaining, LimitValue::Limited(0));
    }

    #[test]
    fn snapshot_serializes_with_wire_field_names() {
        let check = check_limit(ResourceType::Users, 2, &limits(LimitValue::Limited(1000)));
        let json = serde_json::to_value(check.usage).unwrap();
        assert_eq!(json["resourceType"], "users");
        assert_eq!(json["currentCount"], 2);
        assert_eq!(json["maxAllowed"], 3);
        assert_eq!(json["remaining"], 1);
    }
}
