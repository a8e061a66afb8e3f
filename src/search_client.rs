use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;

/// Free-text search over the fleet (make and model).
#[derive(Clone)]
pub struct SearchClient {
    pool: PgPool,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct CarSearchResult {
    pub id: i64,
    pub make: String,
    pub model: String,
    pub year_of_production: i32,
    pub city: String,
    pub price_per_day: f64,
}

impl SearchClient {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn initialize(&self) -> Result<(), sqlx::Error> {
        info!("Search client initialized");
        Ok(())
    }

    pub async fn search_cars(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CarSearchResult>, sqlx::Error> {
        if query.is_empty() {
            // Fast path: the gallery listing without any text match
            self.fast_path_empty_query(limit, offset).await
        } else {
            self.text_search(query, limit, offset).await
        }
    }

    async fn fast_path_empty_query(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CarSearchResult>, sqlx::Error> {
        sqlx::query_as::<_, CarSearchResult>(
            r#"
            SELECT c.id, m.name AS make, c.model, c.year_of_production,
                   l.city, c.price_per_day
            FROM cars c
            JOIN car_makes m ON m.id = c.make_id
            JOIN locations l ON l.id = c.location_id
            WHERE c.status = 'READY_FOR_RENT'
            ORDER BY m.name, c.model
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    async fn text_search(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CarSearchResult>, sqlx::Error> {
        let pattern = format!("%{}%", Self::prepare_search_query(query));

        sqlx::query_as::<_, CarSearchResult>(
            r#"
            SELECT c.id, m.name AS make, c.model, c.year_of_production,
                   l.city, c.price_per_day
            FROM cars c
            JOIN car_makes m ON m.id = c.make_id
            JOIN locations l ON l.id = c.location_id
            WHERE (m.name ILIKE $1 OR c.model ILIKE $1 OR m.name || ' ' || c.model ILIKE $1)
            ORDER BY m.name, c.model
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Strips anything that is not alphanumeric, whitespace or a dash, and
    /// collapses whitespace runs.
    fn prepare_search_query(query: &str) -> String {
        query
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-')
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_query_is_sanitized() {
        assert_eq!(
            SearchClient::prepare_search_query("Alfa%_Romeo'; --"),
            "AlfaRomeo --"
        );
        assert_eq!(
            SearchClient::prepare_search_query("  e-tron \t GT "),
            "e-tron GT"
        );
        assert_eq!(SearchClient::prepare_search_query(""), "");
    }
}
