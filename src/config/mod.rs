use serde::Deserialize;
use std::env;

// Top-level configuration container for all settings
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub mailer: MailerConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub fleet: FleetConfig,
    pub features: FeatureFlags,
}

// Application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
}

// Database settings
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

// Redis settings
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

// JWT settings
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expires_in_hours: i64,
}

// Mail gateway settings
#[derive(Debug, Clone, Deserialize)]
pub struct MailerConfig {
    pub api_url: String,
    pub api_key: String,
    pub sender: String,
    pub contact_inbox: String,
    pub reset_url_base: String,
}

// Circuit breaker settings for the mail gateway
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

// Fleet lifecycle settings
#[derive(Debug, Clone, Deserialize)]
pub struct FleetConfig {
    pub image_dir: String,
    pub service_duration_secs: u64,
    pub sweep_interval_secs: u64,
}

// Feature flags to toggle functionality
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureFlags {
    pub enable_mailer: bool,
    pub enable_analytics: bool,
    pub enable_gallery_cache: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            app: AppConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .expect("PORT must be a valid number"),
                environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
                rust_log: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "rental_system=debug,tower_http=debug".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
                pool_size: env::var("DB_POOL_SIZE")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .expect("DB_POOL_SIZE must be a valid number"),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").expect("REDIS_URL must be set"),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
                expires_in_hours: env::var("JWT_EXPIRES_IN_HOURS")
                    .unwrap_or_else(|_| "24".to_string())
                    .parse()
                    .expect("JWT_EXPIRES_IN_HOURS must be a valid number"),
            },
            mailer: MailerConfig {
                api_url: env::var("MAIL_API_URL")
                    .unwrap_or_else(|_| "https://mail.example.com/api/v1".to_string()),
                api_key: env::var("MAIL_API_KEY").unwrap_or_default(),
                sender: env::var("MAIL_SENDER")
                    .unwrap_or_else(|_| "no-reply@rental.example.com".to_string()),
                contact_inbox: env::var("MAIL_CONTACT_INBOX")
                    .unwrap_or_else(|_| "support@rental.example.com".to_string()),
                reset_url_base: env::var("PASSWORD_RESET_URL_BASE")
                    .unwrap_or_else(|_| "https://rental.example.com/reset-password".to_string()),
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: env::var("CIRCUIT_BREAKER_FAILURE_THRESHOLD")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .expect("CIRCUIT_BREAKER_FAILURE_THRESHOLD must be a valid number"),
                timeout_seconds: env::var("CIRCUIT_BREAKER_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .expect("CIRCUIT_BREAKER_TIMEOUT_SECONDS must be a valid number"),
            },
            fleet: FleetConfig {
                image_dir: env::var("CAR_IMAGE_DIR")
                    .unwrap_or_else(|_| "./uploads/cars".to_string()),
                service_duration_secs: env::var("CAR_SERVICE_DURATION_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .expect("CAR_SERVICE_DURATION_SECS must be a valid number"),
                sweep_interval_secs: env::var("LIFECYCLE_SWEEP_INTERVAL_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .expect("LIFECYCLE_SWEEP_INTERVAL_SECS must be a valid number"),
            },
            features: FeatureFlags {
                enable_mailer: env::var("ENABLE_MAILER")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .expect("ENABLE_MAILER must be true or false"),
                enable_analytics: env::var("ENABLE_ANALYTICS")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .expect("ENABLE_ANALYTICS must be true or false"),
                enable_gallery_cache: env::var("ENABLE_GALLERY_CACHE")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .expect("ENABLE_GALLERY_CACHE must be true or false"),
            },
        }
    }
}
