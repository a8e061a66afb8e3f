pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod search_client;
pub mod services;

use std::sync::Arc;
use tokio::task;

use services::{images::ImageStore, mailer::MailerClient};

// Shared state for the whole application
#[derive(Clone)]
pub struct AppState {
    pub db: database::Database,
    pub redis: redis_client::RedisClient,
    pub cache: cache::CacheService,
    pub config: config::Config,
    pub search_client: search_client::SearchClient,
    pub mailer: MailerClient,
    pub images: ImageStore,
}

impl AppState {
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let db = database::Database::new(&config.database.url, config.database.pool_size).await?;

        db.run_migrations().await?;

        let redis = redis_client::RedisClient::new(&config.redis.url).await?;
        let cache = cache::CacheService::new(redis.clone(), db.clone());
        let search_client = search_client::SearchClient::new(db.pool.clone());
        let mailer = MailerClient::from_config(&config.mailer, &config.circuit_breaker);
        let images = ImageStore::new(&config.fleet.image_dir);

        let state = Arc::new(Self {
            db,
            redis,
            cache,
            config,
            search_client,
            mailer,
            images,
        });

        let state_for_bg = state.clone();
        task::spawn(async move {
            // Warm the gallery cache in the background
            if state_for_bg.config.features.enable_gallery_cache {
                state_for_bg.cache.warmup_cache().await;
            }

            if let Err(e) = state_for_bg.search_client.initialize().await {
                tracing::error!("Search initialization failed: {:?}", e);
            }
        });

        Ok(state)
    }
}
