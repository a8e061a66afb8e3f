use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Operational state of a fleet car. Stored as TEXT in the `cars` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CarStatus {
    ReadyForRent,
    Rented,
    BeforeService,
    InService,
    Serviced,
}

impl CarStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarStatus::ReadyForRent => "READY_FOR_RENT",
            CarStatus::Rented => "RENTED",
            CarStatus::BeforeService => "BEFORE_SERVICE",
            CarStatus::InService => "IN_SERVICE",
            CarStatus::Serviced => "SERVICED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "READY_FOR_RENT" => Some(CarStatus::ReadyForRent),
            "RENTED" => Some(CarStatus::Rented),
            "BEFORE_SERVICE" => Some(CarStatus::BeforeService),
            "IN_SERVICE" => Some(CarStatus::InService),
            "SERVICED" => Some(CarStatus::Serviced),
            _ => None,
        }
    }

    /// Regular lifecycle edges. Staff overrides (force-ready) bypass this on
    /// purpose, matching the unconditional reset the fleet desk expects.
    pub fn can_transition_to(&self, next: CarStatus) -> bool {
        matches!(
            (*self, next),
            (CarStatus::ReadyForRent, CarStatus::Rented)
                | (CarStatus::Rented, CarStatus::BeforeService)
                | (CarStatus::BeforeService, CarStatus::InService)
                | (CarStatus::InService, CarStatus::Serviced)
                | (CarStatus::Serviced, CarStatus::ReadyForRent)
        )
    }
}

/// Raw `cars` row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Car {
    pub id: i64,
    pub make_id: i64,
    pub model: String,
    pub registration_number: String,
    pub vin: String,
    pub year_of_production: i32,
    pub chassis_type: String,
    pub gearbox_type: String,
    pub fuel_type: String,
    pub seat_count_id: i64,
    pub price_per_day: f64,
    pub location_id: i64,
    pub status: String,
    pub created_at: NaiveDateTime,
}

/// Car joined with its make, location and seat configuration. This is the
/// shape the gallery and fleet endpoints return.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CarSummary {
    pub id: i64,
    pub make: String,
    pub model: String,
    pub registration_number: String,
    pub vin: String,
    pub year_of_production: i32,
    pub chassis_type: String,
    pub gearbox_type: String,
    pub fuel_type: String,
    pub seats: i32,
    pub price_per_day: f64,
    pub city: String,
    pub status: String,
}

pub const SUMMARY_SELECT: &str = r#"
    SELECT c.id, m.name AS make, c.model, c.registration_number, c.vin,
           c.year_of_production, c.chassis_type, c.gearbox_type, c.fuel_type,
           sc.seats, c.price_per_day, l.city, c.status
    FROM cars c
    JOIN car_makes m ON m.id = c.make_id
    JOIN locations l ON l.id = c.location_id
    JOIN seat_counts sc ON sc.id = c.seat_count_id
"#;

impl CarSummary {
    pub async fn find_by_id(
        id: i64,
        db: &crate::database::Database,
    ) -> Result<Option<CarSummary>, sqlx::Error> {
        let query = format!("{SUMMARY_SELECT} WHERE c.id = $1");
        sqlx::query_as::<_, CarSummary>(&query)
            .bind(id)
            .fetch_optional(&db.pool)
            .await
    }
}

impl Car {
    pub async fn find_by_id(
        id: i64,
        db: &crate::database::Database,
    ) -> Result<Option<Car>, sqlx::Error> {
        sqlx::query_as::<_, Car>("SELECT * FROM cars WHERE id = $1")
            .bind(id)
            .fetch_optional(&db.pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            CarStatus::ReadyForRent,
            CarStatus::Rented,
            CarStatus::BeforeService,
            CarStatus::InService,
            CarStatus::Serviced,
        ] {
            assert_eq!(CarStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CarStatus::parse("SCRAPPED"), None);
    }

    #[test]
    fn lifecycle_follows_the_service_loop() {
        assert!(CarStatus::ReadyForRent.can_transition_to(CarStatus::Rented));
        assert!(CarStatus::Rented.can_transition_to(CarStatus::BeforeService));
        assert!(CarStatus::BeforeService.can_transition_to(CarStatus::InService));
        assert!(CarStatus::InService.can_transition_to(CarStatus::Serviced));
        assert!(CarStatus::Serviced.can_transition_to(CarStatus::ReadyForRent));
    }

    #[test]
    fn lifecycle_rejects_shortcuts() {
        assert!(!CarStatus::ReadyForRent.can_transition_to(CarStatus::Serviced));
        assert!(!CarStatus::Rented.can_transition_to(CarStatus::InService));
        assert!(!CarStatus::InService.can_transition_to(CarStatus::Rented));
        assert!(!CarStatus::Serviced.can_transition_to(CarStatus::BeforeService));
    }
}
