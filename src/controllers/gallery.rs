use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::sync::Arc;

use crate::errors::{ApiError, ApiResult};
use crate::models::{car, reservation, CarMake, CarSummary, Location, SeatCount};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cars", get(get_gallery))
        .route("/cars/search", get(search_cars))
        .route("/cars/{id}", get(get_car))
        .route("/cars/{id}/image", get(get_car_image))
        .route("/locations", get(get_locations))
        .route("/makes", get(get_makes))
        .route("/seat-counts", get(get_seat_counts))
}

/* ---------- helpers ---------- */

#[derive(Debug, Default)]
struct GalleryFilters {
    city: Option<String>,
    gearbox: Option<String>,
    chassis: Option<String>,
    seats: Option<i32>,
    year_min: Option<i32>,
    year_max: Option<i32>,
    price_min: Option<f64>,
    price_max: Option<f64>,
    make: Option<String>,
    fuel: Option<String>,
    window: Option<(NaiveDateTime, NaiveDateTime)>,
}

impl GalleryFilters {
    fn city_only(&self) -> bool {
        self.gearbox.is_none()
            && self.chassis.is_none()
            && self.seats.is_none()
            && self.year_min.is_none()
            && self.year_max.is_none()
            && self.price_min.is_none()
            && self.price_max.is_none()
            && self.make.is_none()
            && self.fuel.is_none()
            && self.window.is_none()
    }
}

/// Builds the filtered gallery statement. Placeholders are numbered in the
/// exact order `bind_gallery_filters` binds them, with LIMIT/OFFSET last.
fn gallery_sql(filters: &GalleryFilters) -> String {
    let mut q = String::from(car::SUMMARY_SELECT);
    q.push_str(" WHERE 1=1");
    let mut bind_idx = 1;

    let mut push = |q: &mut String, clause: &str, idx: &mut usize| {
        q.push_str(&clause.replace("$?", &format!("${}", idx)));
        *idx += 1;
    };

    if filters.city.is_some() {
        push(&mut q, " AND l.city = $?", &mut bind_idx);
    }
    if filters.gearbox.is_some() {
        push(&mut q, " AND c.gearbox_type = $?", &mut bind_idx);
    }
    if filters.chassis.is_some() {
        push(&mut q, " AND c.chassis_type = $?", &mut bind_idx);
    }
    if filters.seats.is_some() {
        push(&mut q, " AND sc.seats = $?", &mut bind_idx);
    }
    if filters.year_min.is_some() {
        push(&mut q, " AND c.year_of_production >= $?", &mut bind_idx);
    }
    if filters.year_max.is_some() {
        push(&mut q, " AND c.year_of_production <= $?", &mut bind_idx);
    }
    if filters.price_min.is_some() {
        push(&mut q, " AND c.price_per_day >= $?", &mut bind_idx);
    }
    if filters.price_max.is_some() {
        push(&mut q, " AND c.price_per_day <= $?", &mut bind_idx);
    }
    if filters.make.is_some() {
        push(&mut q, " AND m.name ILIKE $?", &mut bind_idx);
    }
    if filters.fuel.is_some() {
        push(&mut q, " AND c.fuel_type = $?", &mut bind_idx);
    }
    if filters.window.is_some() {
        // Available: bookable now and free of open reservations overlapping
        // the requested window
        q.push_str(&format!(
            " AND c.status = 'READY_FOR_RENT' AND NOT EXISTS (\
               SELECT 1 FROM reservations r \
               WHERE r.car_id = c.id \
                 AND r.status IN ('PENDING', 'ACTIVE') \
                 AND r.reservation_end >= ${} AND r.reservation_start <= ${})",
            bind_idx,
            bind_idx + 1
        ));
        bind_idx += 2;
    }

    q.push_str(&format!(
        " ORDER BY m.name, c.model LIMIT ${} OFFSET ${}",
        bind_idx,
        bind_idx + 1
    ));
    q
}

fn bind_gallery_filters<'q>(
    query: sqlx::query::QueryAs<'q, sqlx::Postgres, CarSummary, sqlx::postgres::PgArguments>,
    filters: &'q GalleryFilters,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, CarSummary, sqlx::postgres::PgArguments> {
    let mut query = query;
    if let Some(ref city) = filters.city {
        query = query.bind(city.as_str());
    }
    if let Some(ref gearbox) = filters.gearbox {
        query = query.bind(gearbox.as_str());
    }
    if let Some(ref chassis) = filters.chassis {
        query = query.bind(chassis.as_str());
    }
    if let Some(seats) = filters.seats {
        query = query.bind(seats);
    }
    if let Some(year_min) = filters.year_min {
        query = query.bind(year_min);
    }
    if let Some(year_max) = filters.year_max {
        query = query.bind(year_max);
    }
    if let Some(price_min) = filters.price_min {
        query = query.bind(price_min);
    }
    if let Some(price_max) = filters.price_max {
        query = query.bind(price_max);
    }
    if let Some(ref make) = filters.make {
        query = query.bind(make.as_str());
    }
    if let Some(ref fuel) = filters.fuel {
        query = query.bind(fuel.as_str());
    }
    if let Some((from, to)) = filters.window {
        query = query.bind(from).bind(to);
    }
    query
}

/* ---------- GALLERY ---------- */

// GET /api/cars
#[derive(Debug, Deserialize)]
struct GalleryQuery {
    city: Option<String>,
    #[serde(rename = "startDate")]
    start_date: Option<NaiveDate>,
    #[serde(rename = "endDate")]
    end_date: Option<NaiveDate>,
    gearbox: Option<String>,
    chassis: Option<String>,
    seats: Option<i32>,
    #[serde(rename = "yearMin")]
    year_min: Option<i32>,
    #[serde(rename = "yearMax")]
    year_max: Option<i32>,
    #[serde(rename = "priceMin")]
    price_min: Option<f64>,
    #[serde(rename = "priceMax")]
    price_max: Option<f64>,
    make: Option<String>,
    fuel: Option<String>,
    page: Option<u32>,
    #[serde(rename = "pageSize")]
    page_size: Option<u32>,
}

async fn get_gallery(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GalleryQuery>,
) -> ApiResult<impl IntoResponse> {
    let window = match (params.start_date, params.end_date) {
        (Some(start), Some(end)) => {
            if start > end {
                return Err(ApiError::BadRequest(
                    "startDate must not be after endDate".to_string(),
                ));
            }
            Some(reservation::day_bounds(start, end))
        }
        (None, None) => None,
        _ => {
            return Err(ApiError::BadRequest(
                "startDate and endDate must be provided together".to_string(),
            ));
        }
    };

    let filters = GalleryFilters {
        city: params.city.filter(|c| !c.is_empty()),
        gearbox: params.gearbox,
        chassis: params.chassis,
        seats: params.seats,
        year_min: params.year_min,
        year_max: params.year_max,
        price_min: params.price_min,
        price_max: params.price_max,
        make: params.make,
        fuel: params.fuel,
        window,
    };

    // The plain per-city (or unfiltered) gallery is the hot path and comes
    // out of Redis
    if filters.city_only() && state.config.features.enable_gallery_cache {
        let cars = state.cache.get_gallery(filters.city.as_deref()).await;
        return Ok(Json(cars));
    }

    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(50).clamp(1, 100);
    let offset = ((page - 1) * page_size) as i64;

    let sql = gallery_sql(&filters);
    let query = sqlx::query_as::<_, CarSummary>(&sql);
    let cars = bind_gallery_filters(query, &filters)
        .bind(page_size as i64)
        .bind(offset)
        .fetch_all(&state.db.pool)
        .await?;

    Ok(Json(cars))
}

// GET /api/cars/{id}
async fn get_car(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CarSummary>> {
    let car = CarSummary::find_by_id(id, &state.db)
        .await?
        .ok_or(ApiError::NotFound("Car"))?;
    Ok(Json(car))
}

// GET /api/cars/{id}/image
async fn get_car_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state
        .images
        .load(id)
        .await
        .ok_or(ApiError::NotFound("Car image"))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "image/jpeg")],
        bytes,
    ))
}

/* ---------- SEARCH ---------- */

// GET /api/cars/search
#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: Option<String>,
    page: Option<u32>,
    #[serde(rename = "pageSize")]
    page_size: Option<u32>,
}

async fn search_cars(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<impl IntoResponse> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(20).clamp(1, 50);
    let offset = ((page - 1) * page_size) as i64;

    let results = state
        .search_client
        .search_cars(params.q.as_deref().unwrap_or_default(), page_size as i64, offset)
        .await?;

    Ok(Json(serde_json::json!({
        "cars": results,
        "count": results.len(),
    })))
}

/* ---------- LOOKUPS ---------- */

async fn get_locations(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Location>>> {
    Ok(Json(Location::list(&state.db).await?))
}

async fn get_makes(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<CarMake>>> {
    Ok(Json(CarMake::list(&state.db).await?))
}

async fn get_seat_counts(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<SeatCount>>> {
    Ok(Json(SeatCount::list_available(&state.db).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfiltered_query_only_pages() {
        let sql = gallery_sql(&GalleryFilters::default());
        assert!(sql.contains("WHERE 1=1 ORDER BY m.name, c.model LIMIT $1 OFFSET $2"));
    }

    #[test]
    fn placeholders_are_numbered_in_bind_order() {
        let filters = GalleryFilters {
            city: Some("Warsaw".into()),
            seats: Some(5),
            price_max: Some(300.0),
            ..Default::default()
        };
        let sql = gallery_sql(&filters);
        assert!(sql.contains("l.city = $1"));
        assert!(sql.contains("sc.seats = $2"));
        assert!(sql.contains("c.price_per_day <= $3"));
        assert!(sql.contains("LIMIT $4 OFFSET $5"));
    }

    #[test]
    fn date_window_adds_the_availability_predicate() {
        let start = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 6, 7).unwrap();
        let filters = GalleryFilters {
            window: Some(reservation::day_bounds(start, end)),
            ..Default::default()
        };
        let sql = gallery_sql(&filters);
        assert!(sql.contains("c.status = 'READY_FOR_RENT'"));
        assert!(sql.contains("r.status IN ('PENDING', 'ACTIVE')"));
        assert!(sql.contains("r.reservation_end >= $1 AND r.reservation_start <= $2"));
        assert!(sql.contains("LIMIT $3 OFFSET $4"));
    }

    #[test]
    fn city_only_ignores_the_cacheable_city_filter() {
        let cached = GalleryFilters {
            city: Some("Warsaw".into()),
            ..Default::default()
        };
        assert!(cached.city_only());

        let filtered = GalleryFilters {
            city: Some("Warsaw".into()),
            fuel: Some("HYBRID".into()),
            ..Default::default()
        };
        assert!(!filtered.city_only());
    }
}
