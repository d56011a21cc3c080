pub mod evaluator;
pub mod plan;
pub mod record;
pub mod usage;

pub use evaluator::{AccessDecision, AccessEvaluator, DenialReason, EvaluatorError, TrialInfo};
pub use plan::{
    BillingCycle, Feature, FeatureSet, FeatureValue, LimitValue, Plan, PlanCatalog, PlanError,
    PlanLimits, DEFAULT_PLAN_NAME,
};
pub use record::{
    PgSubscriptionStore, StoreError, Subscription, SubscriptionStatus, SubscriptionStore,
};
pub use usage::{check_limit, LimitCheck, ResourceType, UsageCounter, UsageSnapshot};
