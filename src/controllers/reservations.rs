use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::models::{reservation, Car, CarSummary};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reservations", get(get_user_reservations))
        .route("/reservations", post(create_reservation))
        .route("/reservations/cancel", patch(cancel_reservation))
}

/* ---------- helpers ---------- */

/// The availability check: the car is bookable and no open reservation
/// overlaps the requested window. Read-then-write; two simultaneous bookings
/// can still both pass, there is no serialization on the car row.
async fn car_is_available(
    pool: &sqlx::PgPool,
    car_id: i64,
    from: NaiveDateTime,
    to: NaiveDateTime,
) -> sqlx::Result<bool> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
          SELECT 1 FROM cars c
          WHERE c.id = $1
            AND c.status = 'READY_FOR_RENT'
            AND NOT EXISTS (
              SELECT 1 FROM reservations r
              WHERE r.car_id = c.id
                AND r.status IN ('PENDING', 'ACTIVE')
                AND r.reservation_end >= $2 AND r.reservation_start <= $3
            )
        )
        "#,
    )
    .bind(car_id)
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await
}

/* ---------- RESERVATIONS ---------- */

// POST /api/reservations
#[derive(Debug, Deserialize)]
struct CreateReservationRequest {
    #[serde(rename = "carId")]
    car_id: i64,
    #[serde(rename = "startDate")]
    start_date: NaiveDate,
    #[serde(rename = "endDate")]
    end_date: NaiveDate,
    #[serde(rename = "dropoffCity")]
    dropoff_city: String,
}

#[derive(Debug, Serialize)]
struct CreateReservationResponse {
    id: i64,
    reference: Uuid,
}

async fn create_reservation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateReservationRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.car_id <= 0 {
        return Err(ApiError::BadRequest("carId must be > 0".to_string()));
    }
    if req.start_date > req.end_date {
        return Err(ApiError::BadRequest(
            "startDate must not be after endDate".to_string(),
        ));
    }
    if req.start_date < Utc::now().date_naive() {
        return Err(ApiError::BadRequest(
            "startDate must not be in the past".to_string(),
        ));
    }
    if req.dropoff_city.trim().is_empty() {
        return Err(ApiError::BadRequest("dropoffCity must not be empty".to_string()));
    }

    let car = Car::find_by_id(req.car_id, &state.db)
        .await?
        .ok_or(ApiError::NotFound("Car"))?;

    let (from, to) = reservation::day_bounds(req.start_date, req.end_date);

    if !car_is_available(&state.db.pool, car.id, from, to).await? {
        return Err(ApiError::Conflict(
            "Car is not available for the requested dates".to_string(),
        ));
    }

    let reference = Uuid::new_v4();
    // Pickup is wherever the car currently lives
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO reservations
            (reference, car_id, user_id, reservation_start, reservation_end,
             status, pickup_location_id, dropoff_city)
        VALUES ($1, $2, $3, $4, $5, 'PENDING', $6, $7)
        RETURNING id
        "#,
    )
    .bind(reference)
    .bind(car.id)
    .bind(user.user_id)
    .bind(from)
    .bind(to)
    .bind(car.location_id)
    .bind(req.dropoff_city.trim())
    .fetch_one(&state.db.pool)
    .await?;

    if state.config.features.enable_mailer {
        let mailer = state.mailer.clone();
        let email = user.email.clone();
        let label = match CarSummary::find_by_id(car.id, &state.db).await {
            Ok(Some(summary)) => format!("{} {}", summary.make, summary.model),
            _ => format!("car #{}", car.id),
        };
        let (start, end) = (req.start_date.to_string(), req.end_date.to_string());
        tokio::spawn(async move {
            if let Err(e) = mailer
                .send_booking_confirmation(&email, &label, &start, &end, &reference.to_string())
                .await
            {
                tracing::warn!("booking confirmation mail failed: {}", e);
            }
        });
    }

    tracing::info!(
        "Reservation {} created for car {} by user {}",
        id,
        car.id,
        user.user_id
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateReservationResponse { id, reference }),
    ))
}

// GET /api/reservations
#[derive(Debug, Serialize, sqlx::FromRow)]
struct ReservationView {
    id: i64,
    reference: Uuid,
    car_id: i64,
    make: String,
    model: String,
    pickup_city: String,
    dropoff_city: String,
    reservation_start: NaiveDateTime,
    reservation_end: NaiveDateTime,
    status: String,
}

async fn get_user_reservations(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<Vec<ReservationView>>> {
    let reservations = sqlx::query_as::<_, ReservationView>(
        r#"
        SELECT r.id, r.reference, r.car_id, m.name AS make, c.model,
               l.city AS pickup_city, r.dropoff_city,
               r.reservation_start, r.reservation_end, r.status
        FROM reservations r
        JOIN cars c ON c.id = r.car_id
        JOIN car_makes m ON m.id = c.make_id
        JOIN locations l ON l.id = r.pickup_location_id
        WHERE r.user_id = $1
        ORDER BY r.created_at DESC
        "#,
    )
    .bind(user.user_id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(reservations))
}

// PATCH /api/reservations/cancel
#[derive(Debug, Deserialize)]
struct CancelReservationRequest {
    #[serde(rename = "reservationId")]
    reservation_id: i64,
}

async fn cancel_reservation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CancelReservationRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.reservation_id <= 0 {
        return Err(ApiError::BadRequest("reservationId must be > 0".to_string()));
    }

    let reservation = crate::models::Reservation::find_by_id(req.reservation_id, &state.db)
        .await?
        .ok_or(ApiError::NotFound("Reservation"))?;

    // A foreign reservation looks like a missing one
    if reservation.user_id != user.user_id {
        return Err(ApiError::NotFound("Reservation"));
    }

    let car_id = reservation.car_id;
    let city: String = sqlx::query_scalar(
        "SELECT l.city FROM cars c JOIN locations l ON l.id = c.location_id WHERE c.id = $1",
    )
    .bind(car_id)
    .fetch_one(&state.db.pool)
    .await?;

    let status = crate::models::ReservationStatus::parse(&reservation.status)
        .ok_or_else(|| ApiError::Other(anyhow::anyhow!("corrupt reservation status")))?;

    if !status.is_open() {
        return Err(ApiError::Conflict(
            "Reservation is already completed or cancelled".to_string(),
        ));
    }

    let mut tx = state.db.pool.begin().await?;

    let cancelled = sqlx::query(
        "UPDATE reservations SET status = 'CANCELLED'
         WHERE id = $1 AND status IN ('PENDING', 'ACTIVE')",
    )
    .bind(req.reservation_id)
    .execute(&mut *tx)
    .await?;

    if cancelled.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(ApiError::Conflict(
            "Reservation is already completed or cancelled".to_string(),
        ));
    }

    // An in-progress rental hands the car straight back to the fleet
    if status == crate::models::ReservationStatus::Active {
        sqlx::query("UPDATE cars SET status = 'READY_FOR_RENT' WHERE id = $1 AND status = 'RENTED'")
            .bind(car_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    state.cache.invalidate_gallery(&city).await;
    tracing::info!("Reservation {} cancelled by user {}", req.reservation_id, user.user_id);

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "message": "Reservation cancelled" })),
    ))
}
