use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Expand a date range to day granularity: rentals start at midnight and end
/// a second before the next day.
pub fn day_bounds(start: NaiveDate, end: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    (
        start.and_hms_opt(0, 0, 0).expect("midnight is always valid"),
        end.and_hms_opt(23, 59, 59).expect("23:59:59 is always valid"),
    )
}

/// Closed-interval overlap between two timestamp ranges. Mirrors the SQL
/// availability predicate used by the gallery and the booking check.
pub fn ranges_overlap(
    a_start: NaiveDateTime,
    a_end: NaiveDateTime,
    b_start: NaiveDateTime,
    b_end: NaiveDateTime,
) -> bool {
    a_start <= b_end && a_end >= b_start
}

/// State of a booking. Stored as TEXT in the `reservations` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Active => "ACTIVE",
            ReservationStatus::Completed => "COMPLETED",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ReservationStatus::Pending),
            "ACTIVE" => Some(ReservationStatus::Active),
            "COMPLETED" => Some(ReservationStatus::Completed),
            "CANCELLED" => Some(ReservationStatus::Cancelled),
            _ => None,
        }
    }

    /// A reservation that still claims the car: counts against availability
    /// and blocks car deletion.
    pub fn is_open(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Active)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Reservation {
    pub id: i64,
    pub reference: Uuid,
    pub car_id: i64,
    pub user_id: i64,
    pub reservation_start: NaiveDateTime,
    pub reservation_end: NaiveDateTime,
    pub status: String,
    pub pickup_location_id: i64,
    pub dropoff_city: String,
    pub created_at: NaiveDateTime,
}

impl Reservation {
    pub async fn find_by_id(
        id: i64,
        db: &crate::database::Database,
    ) -> Result<Option<Reservation>, sqlx::Error> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&db.pool)
            .await
    }

    /// Does the car have any open reservation? Guards car deletion.
    pub async fn car_has_open(
        car_id: i64,
        db: &crate::database::Database,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(
               SELECT 1 FROM reservations
               WHERE car_id = $1 AND status IN ('PENDING', 'ACTIVE')
             )",
        )
        .bind(car_id)
        .fetch_one(&db.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            ReservationStatus::Pending,
            ReservationStatus::Active,
            ReservationStatus::Completed,
            ReservationStatus::Cancelled,
        ] {
            assert_eq!(ReservationStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn only_pending_and_active_block_the_car() {
        assert!(ReservationStatus::Pending.is_open());
        assert!(ReservationStatus::Active.is_open());
        assert!(!ReservationStatus::Completed.is_open());
        assert!(!ReservationStatus::Cancelled.is_open());
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn day_bounds_cover_the_whole_last_day() {
        let (start, end) = day_bounds(date(2025, 3, 10), date(2025, 3, 12));
        assert_eq!(start, date(2025, 3, 10).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(end, date(2025, 3, 12).and_hms_opt(23, 59, 59).unwrap());
    }

    #[test]
    fn back_to_back_rentals_on_neighbouring_days_do_not_overlap() {
        let (a_start, a_end) = day_bounds(date(2025, 3, 10), date(2025, 3, 12));
        let (b_start, b_end) = day_bounds(date(2025, 3, 13), date(2025, 3, 14));
        assert!(!ranges_overlap(a_start, a_end, b_start, b_end));
    }

    #[test]
    fn sharing_a_single_day_counts_as_overlap() {
        let (a_start, a_end) = day_bounds(date(2025, 3, 10), date(2025, 3, 12));
        let (b_start, b_end) = day_bounds(date(2025, 3, 12), date(2025, 3, 14));
        assert!(ranges_overlap(a_start, a_end, b_start, b_end));
    }

    proptest::proptest! {
        #[test]
        fn overlap_is_symmetric(
            a in 0i64..1000, b in 0i64..1000, c in 0i64..1000, d in 0i64..1000,
        ) {
            let base = date(2025, 1, 1).and_hms_opt(0, 0, 0).unwrap();
            let at = base + chrono::Duration::hours(a.min(b));
            let ae = base + chrono::Duration::hours(a.max(b));
            let bt = base + chrono::Duration::hours(c.min(d));
            let be = base + chrono::Duration::hours(c.max(d));
            proptest::prop_assert_eq!(
                ranges_overlap(at, ae, bt, be),
                ranges_overlap(bt, be, at, ae)
            );
        }

        #[test]
        fn disjoint_ranges_never_overlap(
            start in 0i64..500, len in 0i64..100, gap in 1i64..100, len2 in 0i64..100,
        ) {
            let base = date(2025, 1, 1).and_hms_opt(0, 0, 0).unwrap();
            let a_start = base + chrono::Duration::hours(start);
            let a_end = a_start + chrono::Duration::hours(len);
            let b_start = a_end + chrono::Duration::hours(gap);
            let b_end = b_start + chrono::Duration::hours(len2);
            proptest::prop_assert!(!ranges_overlap(a_start, a_end, b_start, b_end));
        }
    }
}
