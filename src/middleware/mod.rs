pub mod auth;
pub mod gate;
pub mod response;

pub use auth::{jwt_auth_middleware, AuthUser};
pub use gate::{enforce_usage_limit, require_feature, subscription_gate, SubscriptionContext, UsageContext};
pub use response::{ApiResponse, ApiResult};
