use crate::cache::CacheService;
use tracing::info;

impl CacheService {
    /// Store a password-reset token digest with a TTL. Returns false when the
    /// digest is somehow already present.
    pub async fn store_reset_token(
        &self,
        token_digest: &str,
        email: &str,
        ttl_seconds: u64,
    ) -> bool {
        let key = format!("pwreset:{}", token_digest);
        let mut conn = self.redis.conn.clone();

        let result: Result<String, _> = redis::cmd("SET")
            .arg(&key)
            .arg(email)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await;

        result.is_ok()
    }

    /// Fetch and atomically consume a reset token, returning the email it was
    /// issued for. A token can be spent only once.
    pub async fn take_reset_token(&self, token_digest: &str) -> Option<String> {
        let key = format!("pwreset:{}", token_digest);
        let mut conn = self.redis.conn.clone();

        let email: Option<String> = redis::cmd("GETDEL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .unwrap_or(None);

        if email.is_some() {
            info!("Consumed password reset token");
        }
        email
    }

    /// Rate-limit last_logged_in writes to one per user per 15 minutes.
    pub async fn should_update_last_login(&self, user_id: i64) -> bool {
        let key = format!("last_login_update:{}", user_id);
        let mut conn = self.redis.conn.clone();
        let result: Result<String, _> = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(900)
            .query_async(&mut conn)
            .await;
        result.is_ok()
    }
}
