use crate::{database::Database, redis_client::RedisClient};
use tracing::info;

pub mod auth;
pub mod gallery;

#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
    db: Database,
}

impl CacheService {
    pub fn new(redis: RedisClient, db: Database) -> Self {
        Self { redis, db }
    }

    // Prime the gallery cache at startup: the unfiltered view plus one entry
    // per known city
    pub async fn warmup_cache(&self) {
        info!("Starting cache warmup...");

        let _ = self.get_gallery(None).await;

        if let Ok(locations) = crate::models::Location::list(&self.db).await {
            let warmups = locations
                .iter()
                .map(|location| self.get_gallery(Some(location.city.as_str())));
            futures::future::join_all(warmups).await;
            info!("Warmed gallery cache for {} cities", locations.len());
        }

        info!("Cache warmup done");
    }
}
