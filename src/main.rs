use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use estateflow_api::config::AppConfig;
use estateflow_api::database;
use estateflow_api::handlers::{auth, resources, subscription};
use estateflow_api::middleware::{
    enforce_usage_limit, jwt_auth_middleware, require_feature, subscription_gate,
};
use estateflow_api::state::AppState;
use estateflow_api::subscription::{Feature, PlanCatalog, ResourceType};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = Arc::new(AppConfig::from_env());
    tracing::info!(
        "Starting EstateFlow API (trial period: {} days)",
        config.subscription.trial_period_days
    );

    let pool = database::connect_lazy().expect("failed to create database pool");

    // Bootstrap is best-effort: without a reachable database the server still
    // starts, serves the builtin catalog, and reports degraded health.
    let catalog = match bootstrap(&pool).await {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::warn!("Database bootstrap failed, using builtin plan catalog: {}", e);
            PlanCatalog::builtin()
        }
    };

    let state = AppState::new(pool, config.clone(), Arc::new(catalog));
    let app = app(state);

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    println!("EstateFlow API listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}

async fn bootstrap(pool: &PgPool) -> Result<PlanCatalog, Box<dyn std::error::Error>> {
    database::ensure_schema(pool).await?;
    let catalog = PlanCatalog::initialize(pool).await?;
    Ok(catalog)
}

fn app(state: AppState) -> Router {
    let enable_cors = state.config.server.enable_cors;

    let public = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/api/subscription/plans", get(subscription::plan_list));

    // Authenticated, but exempt from the subscription gate so lapsed tenants
    // can still check where they stand.
    let status_routes = Router::new()
        .route("/api/subscription/status", get(subscription::status))
        .route_layer(from_fn_with_state(state.clone(), jwt_auth_middleware));

    // Creation endpoints carry a per-resource usage-limit gate.
    let lead_create = Router::new()
        .route("/api/leads", post(resources::lead_create))
        .route_layer(from_fn_with_state(
            (state.clone(), ResourceType::Leads),
            enforce_usage_limit,
        ));
    let property_create = Router::new()
        .route("/api/properties", post(resources::property_create))
        .route_layer(from_fn_with_state(
            (state.clone(), ResourceType::Properties),
            enforce_usage_limit,
        ));
    let team_create = Router::new()
        .route("/api/team", post(resources::team_create))
        .route_layer(from_fn_with_state(
            (state.clone(), ResourceType::Users),
            enforce_usage_limit,
        ));

    let whatsapp = Router::new()
        .route("/api/whatsapp/send", post(resources::whatsapp_send))
        .route_layer(from_fn_with_state(
            (state.clone(), Feature::Whatsapp),
            require_feature,
        ));

    // Gate pipeline, innermost first: JWT auth runs before the subscription
    // gate, which runs before any per-route feature/usage gate.
    let gated = Router::new()
        .route("/api/leads", get(resources::lead_list))
        .route("/api/properties", get(resources::property_list))
        .route("/api/team", get(resources::team_list))
        .merge(lead_create)
        .merge(property_create)
        .merge(team_create)
        .merge(whatsapp)
        .route_layer(from_fn_with_state(state.clone(), subscription_gate))
        .route_layer(from_fn_with_state(state.clone(), jwt_auth_middleware));

    let app = Router::new()
        .merge(public)
        .merge(status_routes)
        .merge(gated)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if enable_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "EstateFlow API",
            "version": version,
            "description": "Real-estate CRM backend with subscription-gated access",
            "endpoints": {
                "home": "/ (public)",
                "auth": "/auth/signup, /auth/login (public)",
                "plans": "/api/subscription/plans (public)",
                "status": "/api/subscription/status (authenticated)",
                "leads": "/api/leads (gated)",
                "properties": "/api/properties (gated)",
                "team": "/api/team (gated)",
                "whatsapp": "/api/whatsapp/send (gated, feature-flagged)",
            }
        }
    }))
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match database::health_check(&state.pool).await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "message": "database unavailable",
                "code": "SERVICE_UNAVAILABLE",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}
