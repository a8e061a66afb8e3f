use crate::cache::CacheService;
use crate::models::{car, CarSummary};
use redis::AsyncCommands;
use tracing::info;

const GALLERY_TTL_SECS: u64 = 3600;

fn gallery_key(city: Option<&str>) -> String {
    match city {
        Some(city) => format!("gallery:city:{}", city.to_lowercase()),
        None => "gallery:all".to_string(),
    }
}

impl CacheService {
    /// Unfiltered gallery for a city (or the whole fleet), cache-first with a
    /// database fallback.
    pub async fn get_gallery(&self, city: Option<&str>) -> Vec<CarSummary> {
        if let Ok(cars) = self.get_gallery_from_cache(city).await {
            return cars;
        }

        if let Ok(cars) = self.load_gallery_from_db(city).await {
            let _ = self.save_gallery_to_cache(city, &cars).await;
            return cars;
        }

        vec![]
    }

    /// Drop the cached gallery for a city and the unfiltered view. Called by
    /// every fleet mutation and lifecycle transition.
    pub async fn invalidate_gallery(&self, city: &str) {
        let mut conn = self.redis.conn.clone();
        let _: Result<(), _> = conn.del(gallery_key(Some(city))).await;
        let _: Result<(), _> = conn.del(gallery_key(None)).await;
        info!("Invalidated gallery cache for {}", city);
    }

    async fn load_gallery_from_db(&self, city: Option<&str>) -> Result<Vec<CarSummary>, sqlx::Error> {
        match city {
            Some(city) => {
                let query = format!("{} WHERE l.city = $1 ORDER BY m.name, c.model", car::SUMMARY_SELECT);
                sqlx::query_as::<_, CarSummary>(&query)
                    .bind(city)
                    .fetch_all(&self.db.pool)
                    .await
            }
            None => {
                let query = format!("{} ORDER BY m.name, c.model", car::SUMMARY_SELECT);
                sqlx::query_as::<_, CarSummary>(&query)
                    .fetch_all(&self.db.pool)
                    .await
            }
        }
    }

    async fn get_gallery_from_cache(
        &self,
        city: Option<&str>,
    ) -> Result<Vec<CarSummary>, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        let data: String = conn.get(gallery_key(city)).await?;
        let cars: Vec<CarSummary> = serde_json::from_str(&data).map_err(|_| {
            redis::RedisError::from((redis::ErrorKind::TypeError, "Parse error"))
        })?;
        Ok(cars)
    }

    async fn save_gallery_to_cache(
        &self,
        city: Option<&str>,
        cars: &[CarSummary],
    ) -> Result<(), redis::RedisError> {
        let data = serde_json::to_string(cars).map_err(|_| {
            redis::RedisError::from((redis::ErrorKind::TypeError, "Serialize error"))
        })?;
        let mut conn = self.redis.conn.clone();
        conn.set_ex(gallery_key(city), data, GALLERY_TTL_SECS).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_case_insensitive_per_city() {
        assert_eq!(gallery_key(Some("Warsaw")), "gallery:city:warsaw");
        assert_eq!(gallery_key(Some("warsaw")), "gallery:city:warsaw");
        assert_eq!(gallery_key(None), "gallery:all");
    }
}
