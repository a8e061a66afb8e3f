use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::errors::{ApiError, ApiResult};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/subscribe", post(subscribe))
        .route("/contact", post(send_contact_message))
}

// POST /api/subscribe
#[derive(Debug, Deserialize, Validate)]
struct SubscribeRequest {
    #[validate(email)]
    email: String,
}

async fn subscribe(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubscribeRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    if state.config.features.enable_mailer {
        state
            .mailer
            .send_subscription_confirmation(&req.email)
            .await
            .map_err(|e| {
                tracing::warn!("subscription mail failed: {}", e);
                ApiError::MailGateway
            })?;
    }

    Ok(Json(serde_json::json!({
        "message": "Thank you for subscribing! A confirmation email has been sent to your address"
    })))
}

// POST /api/contact
#[derive(Debug, Deserialize, Validate)]
struct ContactRequest {
    #[validate(length(min = 1, max = 128))]
    name: String,
    #[validate(email)]
    email: String,
    #[validate(length(min = 6, max = 20))]
    phone: String,
    #[validate(length(min = 1, max = 4000))]
    message: String,
}

async fn send_contact_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ContactRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    if state.config.features.enable_mailer {
        state
            .mailer
            .send_contact_message(&req.name, &req.email, &req.phone, &req.message)
            .await
            .map_err(|e| {
                tracing::warn!("contact mail failed: {}", e);
                ApiError::MailGateway
            })?;
    }

    Ok(Json(serde_json::json!({
        "message": "Your message has been sent successfully"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_request_requires_real_fields() {
        let req = ContactRequest {
            name: "Jan".into(),
            email: "jan@example.com".into(),
            phone: "555-0100".into(),
            message: "When does the Warsaw branch open?".into(),
        };
        assert!(req.validate().is_ok());

        let empty_message = ContactRequest {
            message: String::new(),
            ..req
        };
        assert!(empty_message.validate().is_err());
    }
}
