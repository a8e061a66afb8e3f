use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::errors::{ApiError, ApiResult};
use crate::middleware::StaffUser;
use crate::models::{car, Car, CarSummary, Reservation};
use crate::services::lifecycle::LifecycleService;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/fleet/cars", get(list_fleet))
        .route("/fleet/cars", post(add_car))
        .route("/fleet/cars/{id}", patch(update_car))
        .route("/fleet/cars/{id}", delete(delete_car))
        .route("/fleet/cars/{id}/ready", patch(set_car_ready))
        .route("/fleet/cars/{id}/service", post(send_car_to_service))
        .route("/fleet/cars/{id}/image", put(upload_car_image))
        .route("/fleet/lifecycle/stats", get(get_lifecycle_stats))
}

/* ---------- helpers ---------- */

const OLDEST_ACCEPTED_YEAR: i32 = 1900;

fn validate_production_year(year: i32, current_year: i32) -> Result<(), ApiError> {
    if year < OLDEST_ACCEPTED_YEAR || year > current_year {
        return Err(ApiError::BadRequest(format!(
            "Year of production must be between {} and {}",
            OLDEST_ACCEPTED_YEAR, current_year
        )));
    }
    Ok(())
}

/// Find-or-create a city row, returning its id.
async fn upsert_location(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    city: &str,
) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO locations (city) VALUES ($1)
         ON CONFLICT (city) DO UPDATE SET city = EXCLUDED.city
         RETURNING id",
    )
    .bind(city)
    .fetch_one(&mut **tx)
    .await
}

async fn upsert_make(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    name: &str,
) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO car_makes (name) VALUES ($1)
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
         RETURNING id",
    )
    .bind(name)
    .fetch_one(&mut **tx)
    .await
}

/* ---------- FLEET LISTING ---------- */

// GET /api/fleet/cars
async fn list_fleet(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
) -> ApiResult<Json<Vec<CarSummary>>> {
    let query = format!("{} ORDER BY c.id", car::SUMMARY_SELECT);
    let cars = sqlx::query_as::<_, CarSummary>(&query)
        .fetch_all(&state.db.pool)
        .await?;
    Ok(Json(cars))
}

/* ---------- ADD / UPDATE / DELETE ---------- */

// POST /api/fleet/cars
#[derive(Debug, Deserialize, Validate)]
struct CarAddRequest {
    #[validate(length(min = 1, max = 64))]
    make: String,
    #[validate(length(min = 1, max = 64))]
    model: String,
    #[serde(rename = "registrationNumber")]
    #[validate(length(min = 1, max = 16))]
    registration_number: String,
    #[validate(length(min = 11, max = 17))]
    vin: String,
    #[serde(rename = "yearOfProduction")]
    year_of_production: i32,
    #[serde(rename = "chassisType")]
    #[validate(length(min = 1, max = 32))]
    chassis_type: String,
    #[serde(rename = "gearboxType")]
    #[validate(length(min = 1, max = 32))]
    gearbox_type: String,
    #[serde(rename = "fuelType")]
    #[validate(length(min = 1, max = 32))]
    fuel_type: String,
    #[validate(range(min = 2, max = 9))]
    seats: i32,
    #[serde(rename = "pricePerDay")]
    #[validate(range(min = 0.01))]
    price_per_day: f64,
    #[validate(length(min = 1, max = 64))]
    city: String,
}

#[derive(Debug, Serialize)]
struct CarAddResponse {
    id: i64,
}

async fn add_car(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Json(req): Json<CarAddRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    validate_production_year(req.year_of_production, chrono::Utc::now().year())?;

    let mut tx = state.db.pool.begin().await?;

    let vin_taken = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM cars WHERE vin = $1)",
    )
    .bind(&req.vin)
    .fetch_one(&mut *tx)
    .await?;
    if vin_taken {
        return Err(ApiError::Conflict(
            "Car with the same VIN already exists".to_string(),
        ));
    }

    let registration_taken = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM cars WHERE registration_number = $1)",
    )
    .bind(&req.registration_number)
    .fetch_one(&mut *tx)
    .await?;
    if registration_taken {
        return Err(ApiError::Conflict(
            "Car with the same registration number already exists".to_string(),
        ));
    }

    let location_id = upsert_location(&mut tx, req.city.trim()).await?;
    let make_id = upsert_make(&mut tx, req.make.trim()).await?;

    // Seat configurations are a fixed catalogue; an unknown one is a client
    // mistake, not something to create on the fly
    let seat_count_id = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM seat_counts WHERE seats = $1",
    )
    .bind(req.seats)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::BadRequest(format!("Unknown seat configuration: {}", req.seats)))?;

    sqlx::query("UPDATE seat_counts SET available = true WHERE id = $1")
        .bind(seat_count_id)
        .execute(&mut *tx)
        .await?;

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO cars
            (make_id, model, registration_number, vin, year_of_production,
             chassis_type, gearbox_type, fuel_type, seat_count_id,
             price_per_day, location_id, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'READY_FOR_RENT')
        RETURNING id
        "#,
    )
    .bind(make_id)
    .bind(req.model.trim())
    .bind(&req.registration_number)
    .bind(&req.vin)
    .bind(req.year_of_production)
    .bind(&req.chassis_type)
    .bind(&req.gearbox_type)
    .bind(&req.fuel_type)
    .bind(seat_count_id)
    .bind(req.price_per_day)
    .bind(location_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    state.cache.invalidate_gallery(req.city.trim()).await;
    tracing::info!("Car {} added to the fleet", id);

    Ok((StatusCode::CREATED, Json(CarAddResponse { id })))
}

// PATCH /api/fleet/cars/{id}
#[derive(Debug, Deserialize, Validate)]
struct CarUpdateRequest {
    #[serde(rename = "registrationNumber")]
    #[validate(length(min = 1, max = 16))]
    registration_number: String,
    #[serde(rename = "pricePerDay")]
    #[validate(range(min = 0.01))]
    price_per_day: f64,
    #[validate(length(min = 1, max = 64))]
    city: Option<String>,
}

async fn update_car(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
    Json(req): Json<CarUpdateRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let car = Car::find_by_id(id, &state.db)
        .await?
        .ok_or(ApiError::NotFound("Car"))?;

    let registration_taken = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM cars WHERE registration_number = $1 AND id <> $2)",
    )
    .bind(&req.registration_number)
    .bind(id)
    .fetch_one(&state.db.pool)
    .await?;
    if registration_taken {
        return Err(ApiError::Conflict(
            "Car with the same registration number already exists".to_string(),
        ));
    }

    let old_city: String =
        sqlx::query_scalar("SELECT city FROM locations WHERE id = $1")
            .bind(car.location_id)
            .fetch_one(&state.db.pool)
            .await?;

    let mut tx = state.db.pool.begin().await?;

    let location_id = match req.city.as_deref() {
        Some(city) => upsert_location(&mut tx, city.trim()).await?,
        None => car.location_id,
    };

    sqlx::query(
        "UPDATE cars SET registration_number = $1, price_per_day = $2, location_id = $3
         WHERE id = $4",
    )
    .bind(&req.registration_number)
    .bind(req.price_per_day)
    .bind(location_id)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    state.cache.invalidate_gallery(&old_city).await;
    if let Some(city) = req.city.as_deref() {
        state.cache.invalidate_gallery(city.trim()).await;
    }

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "message": "Car updated" })),
    ))
}

// DELETE /api/fleet/cars/{id}
//
// Deleting a car garbage-collects its make and location when it was the last
// holder, and retires the seat configuration (flips available off, the row
// stays). All of it in one transaction.
async fn delete_car(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let car = Car::find_by_id(id, &state.db)
        .await?
        .ok_or(ApiError::NotFound("Car"))?;

    if Reservation::car_has_open(id, &state.db).await? {
        return Err(ApiError::Conflict(
            "Car cannot be deleted: it is rented now or booked for the future".to_string(),
        ));
    }

    let city: String = sqlx::query_scalar("SELECT city FROM locations WHERE id = $1")
        .bind(car.location_id)
        .fetch_one(&state.db.pool)
        .await?;

    let mut tx = state.db.pool.begin().await?;

    let cars_with_same_make: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM cars WHERE make_id = $1")
            .bind(car.make_id)
            .fetch_one(&mut *tx)
            .await?;
    let cars_in_same_location: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM cars WHERE location_id = $1")
            .bind(car.location_id)
            .fetch_one(&mut *tx)
            .await?;
    let cars_with_same_seats: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM cars WHERE seat_count_id = $1")
            .bind(car.seat_count_id)
            .fetch_one(&mut *tx)
            .await?;

    sqlx::query("DELETE FROM reservations WHERE car_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM cars WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if cars_with_same_make <= 1 {
        sqlx::query("DELETE FROM car_makes WHERE id = $1")
            .bind(car.make_id)
            .execute(&mut *tx)
            .await?;
    }
    if cars_in_same_location <= 1 {
        // A reservation of a car that has since moved cities can still point
        // at this location as its pickup point; keep the row in that case
        sqlx::query(
            "DELETE FROM locations WHERE id = $1
             AND NOT EXISTS (SELECT 1 FROM reservations WHERE pickup_location_id = $1)",
        )
        .bind(car.location_id)
        .execute(&mut *tx)
        .await?;
    }
    if cars_with_same_seats <= 1 {
        sqlx::query("UPDATE seat_counts SET available = false WHERE id = $1")
            .bind(car.seat_count_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    if let Err(e) = state.images.delete(id).await {
        tracing::warn!("failed to delete image for car {}: {}", id, e);
    }
    state.cache.invalidate_gallery(&city).await;
    tracing::info!("Car {} deleted from the fleet", id);

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "message": "Car deleted" })),
    ))
}

/* ---------- LIFECYCLE ---------- */

// PATCH /api/fleet/cars/{id}/ready
//
// Unconditional reset back into the rentable pool, used by the fleet desk
// after a workshop visit or a manual inspection.
async fn set_car_ready(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let city: Option<String> = sqlx::query_scalar(
        r#"
        UPDATE cars SET status = 'READY_FOR_RENT'
        WHERE id = $1
        RETURNING (SELECT city FROM locations WHERE id = cars.location_id)
        "#,
    )
    .bind(id)
    .fetch_optional(&state.db.pool)
    .await?;

    let city = city.ok_or(ApiError::NotFound("Car"))?;

    state.cache.invalidate_gallery(&city).await;
    tracing::info!("Car {} is ready for rent", id);

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "message": "Car is ready for rent" })),
    ))
}

// POST /api/fleet/cars/{id}/service
//
// Marks the car IN_SERVICE and schedules the SERVICED flip after the
// configured workshop duration.
async fn send_car_to_service(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let city: Option<String> = sqlx::query_scalar(
        r#"
        UPDATE cars SET status = 'IN_SERVICE'
        WHERE id = $1
        RETURNING (SELECT city FROM locations WHERE id = cars.location_id)
        "#,
    )
    .bind(id)
    .fetch_optional(&state.db.pool)
    .await?;

    let city = city.ok_or(ApiError::NotFound("Car"))?;

    LifecycleService::finish_service_later(state.clone(), id);

    state.cache.invalidate_gallery(&city).await;
    tracing::info!("Car {} sent to service", id);

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "message": "Car sent to service" })),
    ))
}

// GET /api/fleet/lifecycle/stats
async fn get_lifecycle_stats(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
) -> ApiResult<impl IntoResponse> {
    let stats = LifecycleService::new(state.clone()).get_sweep_stats().await;
    Ok(Json(serde_json::json!({
        "due_pickups": stats.due_pickups,
        "due_returns": stats.due_returns,
        "awaiting_service": stats.awaiting_service,
    })))
}

/* ---------- IMAGES ---------- */

// PUT /api/fleet/cars/{id}/image
async fn upload_car_image(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM cars WHERE id = $1)")
        .bind(id)
        .fetch_one(&state.db.pool)
        .await?;
    if !exists {
        return Err(ApiError::NotFound("Car"));
    }

    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {}", e)))?
        .ok_or_else(|| ApiError::BadRequest("image field is missing".to_string()))?;

    let data = field
        .bytes()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?;

    if data.is_empty() {
        return Err(ApiError::BadRequest("Uploaded image cannot be empty".to_string()));
    }

    state
        .images
        .save(id, data.to_vec())
        .await
        .map_err(|e| match e {
            crate::services::images::ImageStoreError::Invalid(_) => {
                ApiError::BadRequest("Uploaded data is not a valid image".to_string())
            }
            other => ApiError::Other(anyhow::anyhow!(other)),
        })?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "message": "Image stored" })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::faker::company::en::CompanyName;
    use fake::Fake;

    fn sample_request() -> CarAddRequest {
        CarAddRequest {
            make: CompanyName().fake(),
            model: "Model S".into(),
            registration_number: "WA 12345".into(),
            vin: "WAUZZZ4M0KD018683".into(),
            year_of_production: 2021,
            chassis_type: "SEDAN".into(),
            gearbox_type: "AUTOMATIC".into(),
            fuel_type: "PETROL".into(),
            seats: 5,
            price_per_day: 250.0,
            city: "Warsaw".into(),
        }
    }

    #[test]
    fn production_year_bounds() {
        assert!(validate_production_year(2021, 2026).is_ok());
        assert!(validate_production_year(1900, 2026).is_ok());
        assert!(validate_production_year(2026, 2026).is_ok());
        assert!(validate_production_year(1899, 2026).is_err());
        assert!(validate_production_year(2027, 2026).is_err());
    }

    #[test]
    fn add_request_validation_accepts_a_sane_car() {
        assert!(sample_request().validate().is_ok());
    }

    #[test]
    fn add_request_validation_rejects_bad_fields() {
        let mut req = sample_request();
        req.vin = "SHORT".into();
        assert!(req.validate().is_err());

        let mut req = sample_request();
        req.seats = 1;
        assert!(req.validate().is_err());

        let mut req = sample_request();
        req.price_per_day = 0.0;
        assert!(req.validate().is_err());

        let mut req = sample_request();
        req.model = String::new();
        assert!(req.validate().is_err());
    }
}
