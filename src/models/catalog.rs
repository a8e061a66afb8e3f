//! Lookup entities referenced by cars: locations, makes and seat
//! configurations. Locations and makes are created on demand by fleet ops and
//! garbage-collected when the last car referencing them is deleted; seat
//! counts are a fixed table that only flips its `available` flag.

use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Location {
    pub id: i64,
    pub city: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CarMake {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SeatCount {
    pub id: i64,
    pub seats: i32,
    pub available: bool,
}

impl Location {
    pub async fn list(db: &crate::database::Database) -> Result<Vec<Location>, sqlx::Error> {
        sqlx::query_as::<_, Location>("SELECT id, city FROM locations ORDER BY city")
            .fetch_all(&db.pool)
            .await
    }
}

impl CarMake {
    pub async fn list(db: &crate::database::Database) -> Result<Vec<CarMake>, sqlx::Error> {
        sqlx::query_as::<_, CarMake>("SELECT id, name FROM car_makes ORDER BY name")
            .fetch_all(&db.pool)
            .await
    }
}

impl SeatCount {
    /// Configurations currently represented in the fleet, for the gallery
    /// filter dropdown.
    pub async fn list_available(
        db: &crate::database::Database,
    ) -> Result<Vec<SeatCount>, sqlx::Error> {
        sqlx::query_as::<_, SeatCount>(
            "SELECT id, seats, available FROM seat_counts WHERE available = true ORDER BY seats",
        )
        .fetch_all(&db.pool)
        .await
    }
}
