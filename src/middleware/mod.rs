use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{config::JwtConfig, errors::ApiError, models::user, models::User};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

impl AuthUser {
    pub fn is_staff(&self) -> bool {
        self.role == user::ROLE_STAFF
    }
}

/// JWT payload issued on login.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub exp: i64,
}

pub fn issue_token(user: &User, jwt: &JwtConfig) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        role: user.role.clone(),
        exp: (Utc::now() + chrono::Duration::hours(jwt.expires_in_hours)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt.secret.as_bytes()),
    )
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        AuthUser {
            user_id: claims.sub,
            email: claims.email,
            first_name: claims.first_name,
            last_name: claims.last_name,
            role: claims.role,
        }
    }
}

// Bearer JWT with a Basic login:password fallback
impl FromRequestParts<Arc<crate::AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            let claims = decode_token(token, &state.config.jwt.secret)
                .map_err(|_| ApiError::Unauthorized)?;
            return Ok(claims.into());
        }

        let encoded = auth_header
            .strip_prefix("Basic ")
            .ok_or(ApiError::Unauthorized)?;

        let decoded = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| ApiError::Unauthorized)?;

        let credentials = String::from_utf8(decoded).map_err(|_| ApiError::Unauthorized)?;

        // login:password
        let mut parts = credentials.splitn(2, ':');
        let login = parts.next().ok_or(ApiError::Unauthorized)?;
        let password = parts.next().ok_or(ApiError::Unauthorized)?;

        let user = User::find_by_login(login, &state.db)
            .await?
            .ok_or(ApiError::Unauthorized)?;

        if !user.verify_password(password) {
            return Err(ApiError::Unauthorized);
        }

        // Throttled through Redis so hot clients do not hammer the row
        if state.cache.should_update_last_login(user.id).await {
            sqlx::query("UPDATE users SET last_logged_in = NOW() WHERE id = $1")
                .bind(user.id)
                .execute(&state.db.pool)
                .await
                .ok();
        }

        Ok(AuthUser {
            user_id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
        })
    }
}

/// Extractor for fleet and analytics endpoints: any authenticated principal
/// with the STAFF role.
#[derive(Debug, Clone)]
pub struct StaffUser(pub AuthUser);

impl FromRequestParts<Arc<crate::AppState>> for StaffUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_staff() {
            return Err(ApiError::Forbidden);
        }
        Ok(StaffUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn sample_user() -> User {
        User {
            id: 7,
            login: "jkowalski".into(),
            email: "jan@example.com".into(),
            password_hash: String::new(),
            first_name: "Jan".into(),
            last_name: "Kowalski".into(),
            phone_number: "555-0100".into(),
            role: user::ROLE_STAFF.into(),
            is_active: true,
            registered_at: chrono::NaiveDateTime::default(),
            last_logged_in: None,
        }
    }

    #[test]
    fn token_round_trips_claims() {
        let jwt = JwtConfig {
            secret: SECRET.into(),
            expires_in_hours: 24,
        };
        let token = issue_token(&sample_user(), &jwt).unwrap();
        let claims = decode_token(&token, SECRET).unwrap();

        assert_eq!(claims.sub, 7);
        assert_eq!(claims.email, "jan@example.com");
        assert_eq!(claims.role, user::ROLE_STAFF);

        let auth: AuthUser = claims.into();
        assert!(auth.is_staff());
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = Claims {
            sub: 7,
            email: "jan@example.com".into(),
            first_name: "Jan".into(),
            last_name: "Kowalski".into(),
            role: user::ROLE_CUSTOMER.into(),
            exp: (Utc::now() - chrono::Duration::hours(2)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(decode_token(&token, SECRET).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let jwt = JwtConfig {
            secret: SECRET.into(),
            expires_in_hours: 24,
        };
        let token = issue_token(&sample_user(), &jwt).unwrap();
        assert!(decode_token(&token, "other-secret").is_err());
    }
}
