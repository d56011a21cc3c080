use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::{PgPool, Row};
use thiserror::Error;

use super::usage::ResourceType;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Plan not found: {0}")]
    NotFound(String),

    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    #[error("Invalid plan definition for '{plan}': {message}")]
    InvalidDefinition { plan: String, message: String },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Supported billing cycles, ordered shortest to longest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Quarterly => "quarterly",
            BillingCycle::SemiAnnual => "semi_annual",
            BillingCycle::Annual => "annual",
        }
    }
}

impl FromStr for BillingCycle {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(BillingCycle::Monthly),
            "quarterly" => Ok(BillingCycle::Quarterly),
            "semi_annual" => Ok(BillingCycle::SemiAnnual),
            "annual" => Ok(BillingCycle::Annual),
            other => Err(PlanError::InvalidDefinition {
                plan: String::new(),
                message: format!("unknown billing cycle '{}'", other),
            }),
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of gateable capabilities. Plans may only reference these;
/// an unknown key fails plan deserialization rather than silently passing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Whatsapp,
    Analytics,
    BulkExport,
    EmailCampaigns,
    ApiAccess,
    CustomBranding,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::Whatsapp,
        Feature::Analytics,
        Feature::BulkExport,
        Feature::EmailCampaigns,
        Feature::ApiAccess,
        Feature::CustomBranding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Whatsapp => "whatsapp",
            Feature::Analytics => "analytics",
            Feature::BulkExport => "bulk_export",
            Feature::EmailCampaigns => "email_campaigns",
            Feature::ApiAccess => "api_access",
            Feature::CustomBranding => "custom_branding",
        }
    }
}

impl FromStr for Feature {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| PlanError::UnknownFeature(s.to_string()))
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plan's setting for one feature: either a plain on/off flag or a tier
/// string such as `analytics: "advanced"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Flag(bool),
    Tier(String),
}

impl FeatureValue {
    /// A feature is available when the flag is true or the tier is a
    /// non-empty string other than the "none" sentinel.
    pub fn is_available(&self) -> bool {
        match self {
            FeatureValue::Flag(enabled) => *enabled,
            FeatureValue::Tier(tier) => !tier.is_empty() && tier != "none",
        }
    }
}

/// Typed feature map for a plan. Lookup of a feature the plan never mentions
/// is a default-deny.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSet(BTreeMap<Feature, FeatureValue>);

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, feature: Feature, value: FeatureValue) -> Self {
        self.0.insert(feature, value);
        self
    }

    pub fn available(&self, feature: Feature) -> bool {
        self.0.get(&feature).map_or(false, FeatureValue::is_available)
    }

    pub fn get(&self, feature: Feature) -> Option<&FeatureValue> {
        self.0.get(&feature)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Feature, &FeatureValue)> {
        self.0.iter()
    }
}

/// A numeric resource cap; `-1` is the wire/storage sentinel for unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitValue {
    Limited(i64),
    Unlimited,
}

impl LimitValue {
    /// Whether one more resource may be created given the current count.
    /// The boundary is exclusive: a tenant at exactly the limit is blocked.
    pub fn allows(&self, current_count: i64) -> bool {
        match self {
            LimitValue::Unlimited => true,
            LimitValue::Limited(max) => current_count < *max,
        }
    }

    pub fn remaining(&self, current_count: i64) -> LimitValue {
        match self {
            LimitValue::Unlimited => LimitValue::Unlimited,
            LimitValue::Limited(max) => LimitValue::Limited((max - current_count).max(0)),
        }
    }
}

impl Serialize for LimitValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LimitValue::Limited(n) => serializer.serialize_i64(*n),
            LimitValue::Unlimited => serializer.serialize_i64(-1),
        }
    }
}

impl<'de> Deserialize<'de> for LimitValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let n = i64::deserialize(deserializer)?;
        match n {
            -1 => Ok(LimitValue::Unlimited),
            n if n >= 0 => Ok(LimitValue::Limited(n)),
            other => Err(serde::de::Error::custom(format!(
                "limit must be non-negative or the -1 unlimited sentinel, got {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlanLimits {
    pub max_leads: LimitValue,
    pub max_users: LimitValue,
    pub max_properties: LimitValue,
}

impl PlanLimits {
    pub fn get(&self, resource: ResourceType) -> LimitValue {
        match resource {
            ResourceType::Leads => self.max_leads,
            ResourceType::Users => self.max_users,
            ResourceType::Properties => self.max_properties,
        }
    }
}

impl Default for PlanLimits {
    /// Default-deny: a tenant with no resolvable plan can create nothing.
    fn default() -> Self {
        Self {
            max_leads: LimitValue::Limited(0),
            max_users: LimitValue::Limited(0),
            max_properties: LimitValue::Limited(0),
        }
    }
}

/// One subscription tier. `name` is the stable identifier referenced by
/// subscriptions and is immutable once seeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub pricing: BTreeMap<BillingCycle, Decimal>,
    pub limits: PlanLimits,
    pub features: FeatureSet,
    pub sort_order: i32,
    pub is_active: bool,
}

impl Plan {
    pub fn monthly_price(&self) -> Decimal {
        self.pricing
            .get(&BillingCycle::Monthly)
            .copied()
            .unwrap_or_default()
    }
}

/// In-memory registry of plans, loaded from `subscription_plans` at startup
/// after an idempotent seed of the builtin tiers.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: BTreeMap<String, Plan>,
    default_plan: String,
}

pub const DEFAULT_PLAN_NAME: &str = "starter";

impl PlanCatalog {
    /// The builtin tiers shipped with the product.
    pub fn builtin() -> Self {
        let mut plans = BTreeMap::new();
        for plan in builtin_plans() {
            plans.insert(plan.name.clone(), plan);
        }
        Self {
            plans,
            default_plan: DEFAULT_PLAN_NAME.to_string(),
        }
    }

    /// Seed builtin plans into the durable store and load every stored plan.
    /// Seeding uses `ON CONFLICT DO NOTHING`, so re-running at each startup
    /// neither duplicates nor overwrites existing rows.
    pub async fn initialize(pool: &PgPool) -> Result<Self, PlanError> {
        Self::seed(pool).await?;
        Self::load(pool).await
    }

    async fn seed(pool: &PgPool) -> Result<(), PlanError> {
        for plan in builtin_plans() {
            let pricing = serde_json::to_value(&plan.pricing)
                .map_err(|e| invalid(&plan.name, e))?;
            let limits = serde_json::to_value(plan.limits)
                .map_err(|e| invalid(&plan.name, e))?;
            let features = serde_json::to_value(&plan.features)
                .map_err(|e| invalid(&plan.name, e))?;

            sqlx::query(
                r#"
                INSERT INTO subscription_plans
                    (name, display_name, description, pricing, limits, features, sort_order, is_active)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (name) DO NOTHING
                "#,
            )
            .bind(&plan.name)
            .bind(&plan.display_name)
            .bind(&plan.description)
            .bind(pricing)
            .bind(limits)
            .bind(features)
            .bind(plan.sort_order)
            .bind(plan.is_active)
            .execute(pool)
            .await?;
        }
        tracing::info!("Plan catalog seeded ({} builtin plans)", builtin_plans().len());
        Ok(())
    }

    async fn load(pool: &PgPool) -> Result<Self, PlanError> {
        let rows = sqlx::query(
            r#"
            SELECT name, display_name, description, pricing, limits, features, sort_order, is_active
            FROM subscription_plans
            "#,
        )
        .fetch_all(pool)
        .await?;

        let mut plans = BTreeMap::new();
        for row in rows {
            let name: String = row.get("name");
            let pricing: serde_json::Value = row.get("pricing");
            let limits: serde_json::Value = row.get("limits");
            let features: serde_json::Value = row.get("features");

            let plan = Plan {
                name: name.clone(),
                display_name: row.get("display_name"),
                description: row.get("description"),
                pricing: serde_json::from_value(pricing).map_err(|e| invalid(&name, e))?,
                limits: serde_json::from_value(limits).map_err(|e| invalid(&name, e))?,
                features: serde_json::from_value(features).map_err(|e| invalid(&name, e))?,
                sort_order: row.get("sort_order"),
                is_active: row.get("is_active"),
            };
            plans.insert(name, plan);
        }

        if !plans.contains_key(DEFAULT_PLAN_NAME) {
            return Err(PlanError::NotFound(DEFAULT_PLAN_NAME.to_string()));
        }

        Ok(Self {
            plans,
            default_plan: DEFAULT_PLAN_NAME.to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Result<&Plan, PlanError> {
        self.plans
            .get(name)
            .ok_or_else(|| PlanError::NotFound(name.to_string()))
    }

    /// Active plans ordered by ascending monthly price, then sort order.
    pub fn list_active(&self) -> Vec<&Plan> {
        let mut active: Vec<&Plan> = self.plans.values().filter(|p| p.is_active).collect();
        active.sort_by(|a, b| {
            a.monthly_price()
                .cmp(&b.monthly_price())
                .then(a.sort_order.cmp(&b.sort_order))
        });
        active
    }

    /// The entry-level plan assigned at trial signup.
    pub fn default_plan(&self) -> &Plan {
        // The default plan's presence is checked at load time.
        &self.plans[&self.default_plan]
    }
}

fn invalid(plan: &str, err: serde_json::Error) -> PlanError {
    PlanError::InvalidDefinition {
        plan: plan.to_string(),
        message: err.to_string(),
    }
}

fn builtin_plans() -> Vec<Plan> {
    use Feature::*;
    use FeatureValue::{Flag, Tier};

    vec![
        Plan {
            name: "starter".to_string(),
            display_name: "Starter".to_string(),
            description: "For independent agents getting started".to_string(),
            pricing: pricing(999, 2697, 4995, 8990),
            limits: PlanLimits {
                max_leads: LimitValue::Limited(1000),
                max_users: LimitValue::Limited(3),
                max_properties: LimitValue::Limited(100),
            },
            features: FeatureSet::new()
                .with(Whatsapp, Flag(false))
                .with(Analytics, Tier("basic".to_string()))
                .with(BulkExport, Flag(false))
                .with(EmailCampaigns, Flag(false))
                .with(ApiAccess, Flag(false))
                .with(CustomBranding, Flag(false)),
            sort_order: 1,
            is_active: true,
        },
        Plan {
            name: "pro".to_string(),
            display_name: "Professional".to_string(),
            description: "For growing teams that need automation".to_string(),
            pricing: pricing(2999, 8097, 14995, 26990),
            limits: PlanLimits {
                max_leads: LimitValue::Limited(10_000),
                max_users: LimitValue::Limited(10),
                max_properties: LimitValue::Limited(1000),
            },
            features: FeatureSet::new()
                .with(Whatsapp, Flag(true))
                .with(Analytics, Tier("advanced".to_string()))
                .with(BulkExport, Flag(true))
                .with(EmailCampaigns, Flag(true))
                .with(ApiAccess, Flag(false))
                .with(CustomBranding, Flag(false)),
            sort_order: 2,
            is_active: true,
        },
        Plan {
            name: "agency".to_string(),
            display_name: "Agency".to_string(),
            description: "Unlimited usage for established agencies".to_string(),
            pricing: pricing(7999, 21597, 39995, 71990),
            limits: PlanLimits {
                max_leads: LimitValue::Unlimited,
                max_users: LimitValue::Unlimited,
                max_properties: LimitValue::Unlimited,
            },
            features: FeatureSet::new()
                .with(Whatsapp, Flag(true))
                .with(Analytics, Tier("advanced".to_string()))
                .with(BulkExport, Flag(true))
                .with(EmailCampaigns, Flag(true))
                .with(ApiAccess, Flag(true))
                .with(CustomBranding, Flag(true)),
            sort_order: 3,
            is_active: true,
        },
    ]
}

fn pricing(monthly: i64, quarterly: i64, semi_annual: i64, annual: i64) -> BTreeMap<BillingCycle, Decimal> {
    // Prices are stored in whole currency units with two decimal places.
    let mut map = BTreeMap::new();
    map.insert(BillingCycle::Monthly, Decimal::new(monthly, 2));
    map.insert(BillingCycle::Quarterly, Decimal::new(quarterly, 2));
    map.insert(BillingCycle::SemiAnnual, Decimal::new(semi_annual, 2));
    map.insert(BillingCycle::Annual, Decimal::new(annual, 2));
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_availability_follows_flag_and_tier_rules() {
        assert!(FeatureValue::Flag(true).is_available());
        assert!(!FeatureValue::Flag(false).is_available());
        assert!(FeatureValue::Tier("advanced".to_string()).is_available());
        assert!(!FeatureValue::Tier("none".to_string()).is_available());
        assert!(!FeatureValue::Tier(String::new()).is_available());
    }

    #[test]
    fn missing_feature_is_default_deny() {
        let features = FeatureSet::new().with(Feature::Whatsapp, FeatureValue::Flag(true));
        assert!(features.available(Feature::Whatsapp));
        assert!(!features.available(Feature::ApiAccess));
    }

    #[test]
    fn feature_resolution_is_deterministic() {
        let plan = PlanCatalog::builtin().get("starter").unwrap().clone();
        let first = plan.features.available(Feature::Whatsapp);
        for _ in 0..10 {
            assert_eq!(plan.features.available(Feature::Whatsapp), first);
        }
    }

    #[test]
    fn unknown_feature_key_rejected_at_definition_time() {
        let raw = serde_json::json!({ "whatsapp": true, "teleporter": true });
        let parsed: Result<FeatureSet, _> = serde_json::from_value(raw);
        assert!(parsed.is_err());
    }

    #[test]
    fn limit_sentinel_round_trips_as_minus_one() {
        let json = serde_json::to_value(LimitValue::Unlimited).unwrap();
        assert_eq!(json, serde_json::json!(-1));
        let back: LimitValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, LimitValue::Unlimited);

        let bounded: LimitValue = serde_json::from_value(serde_json::json!(1000)).unwrap();
        assert_eq!(bounded, LimitValue::Limited(1000));

        let negative: Result<LimitValue, _> = serde_json::from_value(serde_json::json!(-7));
        assert!(negative.is_err());
    }

    #[test]
    fn limit_boundary_is_exclusive() {
        let limit = LimitValue::Limited(1000);
        assert!(limit.allows(999));
        assert!(!limit.allows(1000));
        assert!(!limit.allows(1001));
        assert!(LimitValue::Unlimited.allows(i64::MAX - 1));
    }

    #[test]
    fn builtin_catalog_orders_plans_by_price() {
        let catalog = PlanCatalog::builtin();
        let names: Vec<&str> = catalog.list_active().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["starter", "pro", "agency"]);
        assert_eq!(catalog.default_plan().name, "starter");
    }

    #[test]
    fn plan_serde_round_trip() {
        let plan = PlanCatalog::builtin().get("pro").unwrap().clone();
        let json = serde_json::to_value(&plan).unwrap();
        let back: Plan = serde_json::from_value(json).unwrap();
        assert_eq!(back, plan);
    }
}
