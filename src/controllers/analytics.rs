//! analytics.rs
//!
//! Staff-facing fleet and reservation statistics:
//! - car counts per lifecycle status, optionally scoped to one city
//! - reservation counts per status and returns due within 24 hours
//! - revenue over completed reservations

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use std::sync::Arc;

use crate::errors::ApiResult;
use crate::middleware::StaffUser;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/analytics/fleet", get(get_fleet_analytics))
}

// GET /api/analytics/fleet
#[derive(Debug, Deserialize)]
struct AnalyticsQuery {
    city: Option<String>,
}

#[derive(Debug, Serialize)]
struct FleetCounts {
    total: i32,
    ready_for_rent: i32,
    rented: i32,
    in_workshop: i32,
}

#[derive(Debug, Serialize)]
struct ReservationCounts {
    pending: i32,
    active: i32,
    completed: i32,
    cancelled: i32,
    returns_due_24h: i32,
}

#[derive(Debug, Serialize)]
struct AnalyticsResponse {
    city: Option<String>,
    fleet: FleetCounts,
    reservations: ReservationCounts,
    total_revenue: String,
}

async fn get_fleet_analytics(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Query(params): Query<AnalyticsQuery>,
) -> ApiResult<impl IntoResponse> {
    let city = params.city.filter(|c| !c.is_empty());

    let fleet_row = sqlx::query(
        r#"
        SELECT
            COUNT(c.id)::int AS total,
            COUNT(c.id) FILTER (WHERE c.status = 'READY_FOR_RENT')::int AS ready_for_rent,
            COUNT(c.id) FILTER (WHERE c.status = 'RENTED')::int AS rented,
            COUNT(c.id) FILTER (
                WHERE c.status IN ('BEFORE_SERVICE', 'IN_SERVICE', 'SERVICED')
            )::int AS in_workshop
        FROM cars c
        JOIN locations l ON l.id = c.location_id
        WHERE ($1::text IS NULL OR l.city = $1)
        "#,
    )
    .bind(city.as_deref())
    .fetch_one(&state.db.pool)
    .await?;

    let reservation_row = sqlx::query(
        r#"
        SELECT
            COUNT(r.id) FILTER (WHERE r.status = 'PENDING')::int AS pending,
            COUNT(r.id) FILTER (WHERE r.status = 'ACTIVE')::int AS active,
            COUNT(r.id) FILTER (WHERE r.status = 'COMPLETED')::int AS completed,
            COUNT(r.id) FILTER (WHERE r.status = 'CANCELLED')::int AS cancelled,
            COUNT(r.id) FILTER (
                WHERE r.status = 'ACTIVE' AND r.reservation_end <= NOW() + interval '24 hours'
            )::int AS returns_due_24h,
            COALESCE(SUM(
                c.price_per_day * GREATEST(1, CEIL(
                    EXTRACT(EPOCH FROM (r.reservation_end - r.reservation_start)) / 86400
                ))
            ) FILTER (WHERE r.status = 'COMPLETED'), 0)::float8 AS total_revenue
        FROM reservations r
        JOIN cars c ON c.id = r.car_id
        JOIN locations l ON l.id = c.location_id
        WHERE ($1::text IS NULL OR l.city = $1)
        "#,
    )
    .bind(city.as_deref())
    .fetch_one(&state.db.pool)
    .await?;

    let total_revenue: f64 = reservation_row.get("total_revenue");

    let response = AnalyticsResponse {
        city,
        fleet: FleetCounts {
            total: fleet_row.get("total"),
            ready_for_rent: fleet_row.get("ready_for_rent"),
            rented: fleet_row.get("rented"),
            in_workshop: fleet_row.get("in_workshop"),
        },
        reservations: ReservationCounts {
            pending: reservation_row.get("pending"),
            active: reservation_row.get("active"),
            completed: reservation_row.get("completed"),
            cancelled: reservation_row.get("cancelled"),
            returns_due_24h: reservation_row.get("returns_due_24h"),
        },
        total_revenue: format!("{:.2}", total_revenue),
    };

    tracing::info!(
        "Fleet analytics{}: {} cars, {} rented, revenue {}",
        response
            .city
            .as_deref()
            .map(|c| format!(" for {}", c))
            .unwrap_or_default(),
        response.fleet.total,
        response.fleet.rented,
        response.total_revenue
    );

    Ok((StatusCode::OK, Json(response)))
}
