use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::errors::{ApiError, ApiResult};
use crate::middleware::{issue_token, AuthUser};
use crate::models::{user, User};
use crate::AppState;

const RESET_TOKEN_TTL_SECS: u64 = 3600;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
}

/* ---------- helpers ---------- */

/// Reset tokens are stored hashed so a Redis dump does not leak usable links.
fn reset_token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn hash_password(password: &str) -> ApiResult<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::Other(anyhow::anyhow!("password hashing failed: {}", e)))
}

/* ---------- REGISTRATION / LOGIN ---------- */

// POST /api/auth/register
#[derive(Debug, Deserialize, Validate)]
struct RegisterRequest {
    #[serde(rename = "firstName")]
    #[validate(length(min = 1, max = 64))]
    first_name: String,
    #[serde(rename = "lastName")]
    #[validate(length(min = 1, max = 64))]
    last_name: String,
    #[validate(email)]
    email: String,
    #[serde(rename = "phoneNumber")]
    #[validate(length(min = 6, max = 20))]
    phone_number: String,
    #[validate(length(min = 3, max = 32))]
    login: String,
    #[validate(length(min = 8, max = 128))]
    password: String,
    #[serde(rename = "confirmPassword")]
    confirm_password: String,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    id: i64,
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    if req.password != req.confirm_password {
        return Err(ApiError::BadRequest("Passwords do not match".to_string()));
    }

    let login_taken =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE login = $1)")
            .bind(&req.login)
            .fetch_one(&state.db.pool)
            .await?;
    if login_taken {
        return Err(ApiError::Conflict("This login is already taken".to_string()));
    }

    let email_taken =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
            .bind(&req.email)
            .fetch_one(&state.db.pool)
            .await?;
    if email_taken {
        return Err(ApiError::Conflict(
            "An account with this email address already exists".to_string(),
        ));
    }

    let password_hash = hash_password(&req.password)?;

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO users
            (login, email, password_hash, first_name, last_name, phone_number, role)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(&req.login)
    .bind(&req.email)
    .bind(&password_hash)
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&req.phone_number)
    .bind(user::ROLE_CUSTOMER)
    .fetch_one(&state.db.pool)
    .await?;

    tracing::info!("User {} registered", id);

    Ok((StatusCode::CREATED, Json(RegisterResponse { id })))
}

// POST /api/auth/login
#[derive(Debug, Deserialize)]
struct LoginRequest {
    login: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
    user: LoginUser,
}

#[derive(Debug, Serialize)]
struct LoginUser {
    id: i64,
    email: String,
    #[serde(rename = "firstName")]
    first_name: String,
    #[serde(rename = "lastName")]
    last_name: String,
    role: String,
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let user = User::find_by_login(&req.login, &state.db)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    if !user.verify_password(&req.password) {
        return Err(ApiError::Unauthorized);
    }

    let token = issue_token(&user, &state.config.jwt)
        .map_err(|e| ApiError::Other(anyhow::anyhow!("token signing failed: {}", e)))?;

    if state.cache.should_update_last_login(user.id).await {
        sqlx::query("UPDATE users SET last_logged_in = NOW() WHERE id = $1")
            .bind(user.id)
            .execute(&state.db.pool)
            .await
            .ok();
    }

    Ok(Json(LoginResponse {
        token,
        user: LoginUser {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
        },
    }))
}

// GET /api/auth/me
async fn me(user: AuthUser) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "id": user.user_id,
        "email": user.email,
        "name": format!("{} {}", user.first_name, user.last_name),
        "role": user.role,
    }))
}

/* ---------- PASSWORD RESET ---------- */

// POST /api/auth/forgot-password
#[derive(Debug, Deserialize, Validate)]
struct ForgotPasswordRequest {
    #[validate(email)]
    email: String,
}

async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    // Same response whether or not the account exists
    if let Some(user) = User::find_by_email(&req.email, &state.db).await? {
        let token = Uuid::new_v4().to_string();
        let digest = reset_token_digest(&token);

        state
            .cache
            .store_reset_token(&digest, &user.email, RESET_TOKEN_TTL_SECS)
            .await;

        if state.config.features.enable_mailer {
            let mailer = state.mailer.clone();
            let email = user.email.clone();
            tokio::spawn(async move {
                if let Err(e) = mailer.send_password_reset(&email, &token).await {
                    tracing::warn!("password reset mail failed: {}", e);
                }
            });
        }
    }

    Ok(Json(serde_json::json!({
        "message": "If the address exists, a password reset link has been sent"
    })))
}

// POST /api/auth/reset-password
#[derive(Debug, Deserialize, Validate)]
struct ResetPasswordRequest {
    token: String,
    #[validate(length(min = 8, max = 128))]
    password: String,
    #[serde(rename = "confirmPassword")]
    confirm_password: String,
}

async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    if req.password != req.confirm_password {
        return Err(ApiError::BadRequest("Passwords do not match".to_string()));
    }

    let digest = reset_token_digest(&req.token);
    let email = state
        .cache
        .take_reset_token(&digest)
        .await
        .ok_or_else(|| ApiError::BadRequest("Reset link is invalid or has expired".to_string()))?;

    let password_hash = hash_password(&req.password)?;

    let updated = sqlx::query("UPDATE users SET password_hash = $1 WHERE email = $2")
        .bind(&password_hash)
        .bind(&email)
        .execute(&state.db.pool)
        .await?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::NotFound("User"));
    }

    tracing::info!("Password reset completed");

    Ok(Json(serde_json::json!({ "message": "Password successfully reset" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::faker::internet::en::SafeEmail;
    use fake::Fake;

    #[test]
    fn token_digest_is_deterministic_and_distinct() {
        let a = reset_token_digest("token-a");
        assert_eq!(a, reset_token_digest("token-a"));
        assert_ne!(a, reset_token_digest("token-b"));
        // sha256 hex
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn register_request_validation() {
        let email: String = SafeEmail().fake();
        let req = RegisterRequest {
            first_name: "Jan".into(),
            last_name: "Kowalski".into(),
            email,
            phone_number: "555-0100".into(),
            login: "jkowalski".into(),
            password: "s3cret-pass".into(),
            confirm_password: "s3cret-pass".into(),
        };
        assert!(req.validate().is_ok());

        let bad_email = RegisterRequest {
            email: "not-an-email".into(),
            ..req
        };
        assert!(bad_email.validate().is_err());
    }

    #[test]
    fn short_passwords_fail_validation() {
        let req = ResetPasswordRequest {
            token: "t".into(),
            password: "short".into(),
            confirm_password: "short".into(),
        };
        assert!(req.validate().is_err());
    }
}
