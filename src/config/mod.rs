use serde::{Deserialize, Serialize};
use std::env;

/// Application configuration, built once in `main` and injected by `Arc`
/// through router state. Evaluation logic never reads the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub subscription: SubscriptionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Trial length granted at signup, in days.
    pub trial_period_days: i64,
    /// Base URL of the web app, used to build upgrade links in denials.
    pub frontend_url: String,
    /// Route prefixes the subscription gate skips entirely. Auth, health and
    /// the subscription surface itself must stay reachable for expired tenants.
    pub exempt_route_prefixes: Vec<String>,
    /// Whether `past_due` subscriptions are blocked outright. When false the
    /// tenant keeps access during the grace period and only sees a warning.
    pub past_due_blocks: bool,
}

impl SubscriptionConfig {
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_route_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Remediation link embedded in subscription and entitlement denials.
    pub fn upgrade_url(&self) -> String {
        format!(
            "{}/subscription/upgrade",
            self.frontend_url.trim_end_matches('/')
        )
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::defaults().with_env_overrides()
    }

    fn defaults() -> Self {
        Self {
            server: ServerConfig {
                port: 3000,
                enable_cors: true,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24 * 7,
            },
            subscription: SubscriptionConfig {
                trial_period_days: 14,
                frontend_url: "http://localhost:5173".to_string(),
                exempt_route_prefixes: vec![
                    "/auth".to_string(),
                    "/health".to_string(),
                    "/api/subscription".to_string(),
                ],
                past_due_blocks: true,
            },
        }
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("ENABLE_CORS") {
            self.server.enable_cors = v.parse().unwrap_or(self.server.enable_cors);
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("TRIAL_PERIOD_DAYS") {
            self.subscription.trial_period_days =
                v.parse().unwrap_or(self.subscription.trial_period_days);
        }
        if let Ok(v) = env::var("FRONTEND_URL") {
            self.subscription.frontend_url = v;
        }
        if let Ok(v) = env::var("EXEMPT_ROUTE_PREFIXES") {
            self.subscription.exempt_route_prefixes =
                v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("PAST_DUE_BLOCKS") {
            self.subscription.past_due_blocks =
                v.parse().unwrap_or(self.subscription.past_due_blocks);
        }
        self
    }
}
