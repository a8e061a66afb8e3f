//! mailer.rs
//!
//! Service layer for the external transactional-mail gateway.
//!
//! Components:
//! 1.  **CircuitBreaker**: guards every network call so a dead mail provider
//!     does not tie up request handlers.
//! 2.  **MailerClient**: wraps the HTTP API of the gateway; all message kinds
//!     the application sends (password reset links, subscription
//!     confirmations, contact-form relays, booking confirmations) go through
//!     its single `send` path.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::{CircuitBreakerConfig, MailerConfig};

#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    /// Normal operation, requests allowed.
    Closed,
    /// Gateway considered down, requests blocked until the cooldown passes.
    Open,
    /// One probe request allowed to test whether the gateway recovered.
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: std::sync::RwLock<CircuitState>,
    failure_count: AtomicU32,
    /// Seconds since `started` at the moment of the last failure.
    last_failure_time: AtomicU64,
    started: Instant,
    failure_threshold: u32,
    timeout_duration: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout_seconds: u64) -> Self {
        Self {
            state: std::sync::RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            last_failure_time: AtomicU64::new(0),
            started: Instant::now(),
            failure_threshold,
            timeout_duration: Duration::from_secs(timeout_seconds),
        }
    }

    fn now_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn can_execute(&self) -> bool {
        let state = self.state.read().unwrap();

        match *state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let last_failure = self.last_failure_time.load(Ordering::Relaxed);

                if self.now_secs().saturating_sub(last_failure) >= self.timeout_duration.as_secs() {
                    drop(state);
                    *self.state.write().unwrap() = CircuitState::HalfOpen;
                    info!("Circuit breaker transitioning to HalfOpen state");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.write().unwrap();

        match *state {
            CircuitState::HalfOpen => {
                *state = CircuitState::Closed;
                self.failure_count.store(0, Ordering::Relaxed);
                info!("Circuit breaker recovered - transitioning to Closed state");
            }
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn record_failure(&self) {
        let failure_count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.last_failure_time.store(self.now_secs(), Ordering::Relaxed);

        let mut state = self.state.write().unwrap();

        match *state {
            CircuitState::Closed => {
                if failure_count >= self.failure_threshold {
                    *state = CircuitState::Open;
                    error!(
                        "Circuit breaker OPENED - {} failures reached threshold {}",
                        failure_count, self.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                warn!("Circuit breaker test failed - returning to Open state");
            }
            _ => {}
        }
    }

    pub fn get_state(&self) -> CircuitState {
        self.state.read().unwrap().clone()
    }
}

#[derive(Debug)]
pub enum MailerError {
    /// Circuit breaker is open, the request was never attempted.
    Open,
    /// The HTTP call to the gateway failed.
    Gateway(reqwest::Error),
}

impl std::fmt::Display for MailerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailerError::Open => {
                write!(f, "Circuit breaker is open - mail gateway temporarily unavailable")
            }
            MailerError::Gateway(e) => write!(f, "Mail gateway error: {}", e),
        }
    }
}

impl std::error::Error for MailerError {}

// --- Gateway API payloads ---

#[derive(Debug, Serialize)]
struct MailSendRequest {
    from: String,
    to: String,
    subject: String,
    text: String,
}

#[derive(Debug, Deserialize)]
pub struct MailSendResponse {
    pub id: Option<String>,
    pub message: Option<String>,
}

/// Client for the transactional-mail HTTP API.
#[derive(Clone)]
pub struct MailerClient {
    api_url: String,
    api_key: String,
    sender: String,
    contact_inbox: String,
    reset_url_base: String,
    http_client: reqwest::Client,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl MailerClient {
    pub fn from_config(config: &MailerConfig, breaker: &CircuitBreakerConfig) -> Self {
        let circuit_breaker = Arc::new(CircuitBreaker::new(
            breaker.failure_threshold,
            breaker.timeout_seconds,
        ));

        Self {
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            sender: config.sender.clone(),
            contact_inbox: config.contact_inbox.clone(),
            reset_url_base: config.reset_url_base.clone(),
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            circuit_breaker,
        }
    }

    async fn execute_with_circuit_breaker<F, T>(&self, operation: F) -> Result<T, MailerError>
    where
        F: std::future::Future<Output = Result<T, reqwest::Error>>,
    {
        if !self.circuit_breaker.can_execute() {
            warn!("Circuit breaker is OPEN - blocking mail gateway request");
            return Err(MailerError::Open);
        }

        match operation.await {
            Ok(result) => {
                self.circuit_breaker.record_success();
                Ok(result)
            }
            Err(e) => {
                error!("Mail gateway request failed: {:?}", e);
                self.circuit_breaker.record_failure();
                Err(MailerError::Gateway(e))
            }
        }
    }

    async fn send(&self, to: &str, subject: &str, text: &str) -> Result<MailSendResponse, MailerError> {
        let request = MailSendRequest {
            from: self.sender.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            text: text.to_string(),
        };

        info!("Sending mail with circuit breaker: subject={:?}", subject);

        let operation = async {
            self.http_client
                .post(format!("{}/messages", self.api_url))
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await?
                .error_for_status()?
                .json::<MailSendResponse>()
                .await
        };

        self.execute_with_circuit_breaker(operation).await
    }

    pub async fn send_password_reset(&self, email: &str, token: &str) -> Result<(), MailerError> {
        let link = format!("{}?token={}", self.reset_url_base, token);
        let body = format!(
            "A password reset was requested for your account.\n\n\
             Follow this link to choose a new password: {}\n\n\
             The link is valid for one hour. If you did not request a reset, ignore this message.",
            link
        );
        self.send(email, "Password reset", &body).await.map(|_| ())
    }

    pub async fn send_subscription_confirmation(&self, email: &str) -> Result<(), MailerError> {
        self.send(
            email,
            "Subscription confirmed",
            "Thank you for subscribing! You will now receive our fleet news and offers.",
        )
        .await
        .map(|_| ())
    }

    pub async fn send_contact_message(
        &self,
        name: &str,
        email: &str,
        phone: &str,
        message: &str,
    ) -> Result<(), MailerError> {
        let subject = format!("Message from {}", email);
        let body = format!(
            "Message: {}\n\nSent by {} ({}, {})",
            message, name, email, phone
        );
        self.send(&self.contact_inbox, &subject, &body).await.map(|_| ())
    }

    pub async fn send_booking_confirmation(
        &self,
        email: &str,
        car_label: &str,
        start: &str,
        end: &str,
        reference: &str,
    ) -> Result<(), MailerError> {
        let body = format!(
            "Your reservation {} is confirmed.\n\nCar: {}\nPickup: {}\nReturn: {}",
            reference, car_label, start, end
        );
        self.send(email, "Reservation confirmed", &body).await.map(|_| ())
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.circuit_breaker.get_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(api_url: &str, failure_threshold: u32) -> MailerClient {
        MailerClient::from_config(
            &MailerConfig {
                api_url: api_url.to_string(),
                api_key: "test-key".to_string(),
                sender: "no-reply@rental.test".to_string(),
                contact_inbox: "support@rental.test".to_string(),
                reset_url_base: "https://rental.test/reset-password".to_string(),
            },
            &CircuitBreakerConfig {
                failure_threshold,
                timeout_seconds: 60,
            },
        )
    }

    #[test]
    fn breaker_opens_after_threshold() {
        let breaker = CircuitBreaker::new(3, 60);
        assert_eq!(breaker.get_state(), CircuitState::Closed);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn breaker_probes_after_cooldown_and_closes_on_success() {
        let breaker = CircuitBreaker::new(1, 0);
        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Open);

        // Zero-second cooldown: next check moves to HalfOpen
        assert!(breaker.can_execute());
        assert_eq!(breaker.get_state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.get_state(), CircuitState::Closed);
    }

    #[test]
    fn failed_probe_reopens_the_breaker() {
        let breaker = CircuitBreaker::new(1, 0);
        breaker.record_failure();
        assert!(breaker.can_execute());
        assert_eq!(breaker.get_state(), CircuitState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Open);
    }

    #[test]
    fn success_resets_the_failure_count() {
        let breaker = CircuitBreaker::new(2, 60);
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn reset_mail_posts_to_the_gateway() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "to": "jan@example.com",
                "subject": "Password reset"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg-1",
                "message": "queued"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 5);
        client
            .send_password_reset("jan@example.com", "token123")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn gateway_failures_eventually_open_the_breaker() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 2);

        assert!(matches!(
            client.send_subscription_confirmation("a@b.test").await,
            Err(MailerError::Gateway(_))
        ));
        assert!(matches!(
            client.send_subscription_confirmation("a@b.test").await,
            Err(MailerError::Gateway(_))
        ));

        // Third attempt is blocked without touching the network
        assert!(matches!(
            client.send_subscription_confirmation("a@b.test").await,
            Err(MailerError::Open)
        ));
        assert_eq!(client.breaker_state(), CircuitState::Open);
    }
}
