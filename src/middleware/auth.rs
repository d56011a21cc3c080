use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::auth::{validate_jwt, Claims, JwtError};
use crate::error::ApiError;
use crate::state::AppState;

/// Authenticated identity extracted from JWT and injected into the request.
/// The subscription gate treats `agency_id` as the tenant.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub agency_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            agency_id: claims.agency_id,
            user_id: claims.user_id,
            email: claims.email,
            role: claims.role,
        }
    }
}

/// JWT authentication middleware that validates tokens and extracts the
/// caller's identity. Runs before the subscription gate.
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&headers)?;

    let claims = validate_jwt(&token, &state.config.security).map_err(|e| match e {
        JwtError::InvalidSecret => {
            tracing::error!("JWT secret not configured");
            ApiError::internal_server_error("Authentication is misconfigured")
        }
        other => ApiError::invalid_token(other.to_string()),
    })?;

    request.extensions_mut().insert(AuthUser::from(claims));
    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    let auth_header = headers
        .get("authorization")
        .ok_or_else(|| ApiError::no_token("Missing Authorization header"))?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| ApiError::invalid_token("Invalid Authorization header format"))?;

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.to_string()),
        Some(_) => Err(ApiError::no_token("Empty bearer token")),
        None => Err(ApiError::invalid_token(
            "Authorization header must use Bearer token format",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn missing_header_is_no_token() {
        let err = extract_bearer_token(&HeaderMap::new()).unwrap_err();
        assert_eq!(err.error_code(), "NO_TOKEN");
    }

    #[test]
    fn non_bearer_scheme_is_invalid_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc123"));
        let err = extract_bearer_token(&headers).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TOKEN");
    }

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer tok-123"));
        assert_eq!(extract_bearer_token(&headers).unwrap(), "tok-123");
    }
}
