use std::sync::Arc;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::subscription::{AccessEvaluator, PgSubscriptionStore, PlanCatalog, UsageCounter};

/// Shared per-process services, built once in `main` and handed to the
/// router. Everything evaluation needs travels through here; nothing reads
/// ambient globals.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub catalog: Arc<PlanCatalog>,
    pub store: Arc<PgSubscriptionStore>,
    pub evaluator: Arc<AccessEvaluator>,
    pub usage: Arc<UsageCounter>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Arc<AppConfig>, catalog: Arc<PlanCatalog>) -> Self {
        let store = Arc::new(PgSubscriptionStore::new(pool.clone()));
        let evaluator = Arc::new(AccessEvaluator::new(
            store.clone(),
            catalog.clone(),
            config.subscription.past_due_blocks,
        ));
        let usage = Arc::new(UsageCounter::new(pool.clone()));
        Self {
            pool,
            config,
            catalog,
            store,
            evaluator,
            usage,
        }
    }
}
