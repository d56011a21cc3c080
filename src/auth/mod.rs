use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::config::SecurityConfig;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub agency_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(
        agency_id: Uuid,
        user_id: Uuid,
        email: String,
        role: String,
        security: &SecurityConfig,
    ) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(security.jwt_expiry_hours as i64)).timestamp();
        Self {
            agency_id,
            user_id,
            email,
            role,
            exp,
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT secret not configured")]
    InvalidSecret,

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("Invalid JWT token: {0}")]
    InvalidToken(String),
}

pub fn generate_jwt(claims: &Claims, security: &SecurityConfig) -> Result<String, JwtError> {
    if security.jwt_secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(security.jwt_secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key)
        .map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

pub fn validate_jwt(token: &str, security: &SecurityConfig) -> Result<Claims, JwtError> {
    if security.jwt_secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(security.jwt_secret.as_bytes());
    let token_data = decode::<Claims>(token, &decoding_key, &Validation::default())
        .map_err(|e| JwtError::InvalidToken(e.to_string()))?;
    Ok(token_data.claims)
}

/// Password digest used by the login/signup collaborators.
pub fn hash_password(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn security() -> SecurityConfig {
        SecurityConfig {
            jwt_secret: "test-secret".to_string(),
            jwt_expiry_hours: 24,
        }
    }

    #[test]
    fn jwt_round_trip_preserves_identity() {
        let agency_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let claims = Claims::new(
            agency_id,
            user_id,
            "agent@example.com".to_string(),
            "admin".to_string(),
            &security(),
        );

        let token = generate_jwt(&claims, &security()).unwrap();
        let decoded = validate_jwt(&token, &security()).unwrap();
        assert_eq!(decoded.agency_id, agency_id);
        assert_eq!(decoded.user_id, user_id);
        assert_eq!(decoded.role, "admin");
    }

    #[test]
    fn empty_secret_refuses_to_sign_or_verify() {
        let empty = SecurityConfig {
            jwt_secret: String::new(),
            jwt_expiry_hours: 24,
        };
        let claims = Claims::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "a@b.c".to_string(),
            "agent".to_string(),
            &security(),
        );
        assert!(matches!(
            generate_jwt(&claims, &empty),
            Err(JwtError::InvalidSecret)
        ));
        assert!(matches!(
            validate_jwt("whatever", &empty),
            Err(JwtError::InvalidSecret)
        ));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let claims = Claims::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "a@b.c".to_string(),
            "agent".to_string(),
            &security(),
        );
        let token = generate_jwt(&claims, &security()).unwrap();
        let other = SecurityConfig {
            jwt_secret: "different-secret".to_string(),
            jwt_expiry_hours: 24,
        };
        assert!(matches!(
            validate_jwt(&token, &other),
            Err(JwtError::InvalidToken(_))
        ));
    }

    #[test]
    fn password_hash_is_stable_hex() {
        let h = hash_password("hunter2");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_password("hunter2"));
        assert_ne!(h, hash_password("hunter3"));
    }
}
