//! Background car-status sweep. Reservations whose start date has arrived put
//! their car on the road; reservations whose end date has passed send the car
//! to the service queue. Each transition runs in its own transaction so one
//! bad row cannot wedge the whole sweep.

use sqlx::Row;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::models::CarStatus;
use crate::AppState;

pub struct LifecycleService {
    state: Arc<AppState>,
}

impl LifecycleService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// One full sweep: pickups first, then returns.
    pub async fn run_status_sweep(&self) {
        info!("Starting lifecycle status sweep");

        self.activate_due_reservations().await;
        self.complete_ended_reservations().await;

        info!("Lifecycle status sweep completed");
    }

    /// PENDING reservations whose start has arrived: reservation goes ACTIVE,
    /// car goes RENTED.
    async fn activate_due_reservations(&self) {
        let due: Vec<(i64, i64, String)> = sqlx::query_as(
            r#"
            SELECT r.id, r.car_id, l.city
            FROM reservations r
            JOIN cars c ON c.id = r.car_id
            JOIN locations l ON l.id = c.location_id
            WHERE r.status = 'PENDING'
              AND r.reservation_start <= NOW()
              AND c.status = 'READY_FOR_RENT'
            "#,
        )
        .fetch_all(&self.state.db.pool)
        .await
        .unwrap_or_default();

        if due.is_empty() {
            info!("No reservations due for pickup");
            return;
        }

        info!("Found {} reservations due for pickup", due.len());

        for (reservation_id, car_id, city) in due {
            self.transition(
                reservation_id,
                car_id,
                &city,
                ("PENDING", "ACTIVE"),
                (CarStatus::ReadyForRent, CarStatus::Rented),
            )
            .await;
        }
    }

    /// ACTIVE reservations past their end: reservation goes COMPLETED, car
    /// goes BEFORE_SERVICE and waits for the workshop.
    async fn complete_ended_reservations(&self) {
        let ended: Vec<(i64, i64, String)> = sqlx::query_as(
            r#"
            SELECT r.id, r.car_id, l.city
            FROM reservations r
            JOIN cars c ON c.id = r.car_id
            JOIN locations l ON l.id = c.location_id
            WHERE r.status = 'ACTIVE'
              AND r.reservation_end <= NOW()
            "#,
        )
        .fetch_all(&self.state.db.pool)
        .await
        .unwrap_or_default();

        if ended.is_empty() {
            info!("No reservations due for return");
            return;
        }

        info!("Found {} reservations due for return", ended.len());

        for (reservation_id, car_id, city) in ended {
            self.transition(
                reservation_id,
                car_id,
                &city,
                ("ACTIVE", "COMPLETED"),
                (CarStatus::Rented, CarStatus::BeforeService),
            )
            .await;
        }
    }

    /// Move one reservation and its car to their next states atomically. The
    /// WHERE clauses keep a concurrent manual change from being overwritten.
    async fn transition(
        &self,
        reservation_id: i64,
        car_id: i64,
        city: &str,
        reservation_states: (&str, &str),
        car_states: (CarStatus, CarStatus),
    ) {
        debug_assert!(car_states.0.can_transition_to(car_states.1));

        let mut tx = match self.state.db.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                error!("Failed to start transaction for lifecycle sweep: {}", e);
                return;
            }
        };

        let reservation_updated =
            sqlx::query("UPDATE reservations SET status = $1 WHERE id = $2 AND status = $3")
                .bind(reservation_states.1)
                .bind(reservation_id)
                .bind(reservation_states.0)
                .execute(&mut *tx)
                .await;

        match reservation_updated {
            Ok(result) if result.rows_affected() > 0 => {}
            Ok(_) => {
                warn!(
                    "Reservation {} no longer {} - skipping",
                    reservation_id, reservation_states.0
                );
                let _ = tx.rollback().await;
                return;
            }
            Err(e) => {
                error!("Failed to update reservation {}: {:?}", reservation_id, e);
                let _ = tx.rollback().await;
                return;
            }
        }

        let car_updated = sqlx::query("UPDATE cars SET status = $1 WHERE id = $2 AND status = $3")
            .bind(car_states.1.as_str())
            .bind(car_id)
            .bind(car_states.0.as_str())
            .execute(&mut *tx)
            .await;

        if let Err(e) = car_updated {
            error!("Failed to update car {}: {:?}", car_id, e);
            let _ = tx.rollback().await;
            return;
        }

        if tx.commit().await.is_ok() {
            self.state.cache.invalidate_gallery(city).await;
            info!(
                "Reservation {} -> {}, car {} -> {}",
                reservation_id,
                reservation_states.1,
                car_id,
                car_states.1.as_str()
            );
        } else {
            error!(
                "Failed to commit lifecycle transition for reservation {}",
                reservation_id
            );
        }
    }

    /// Finish a workshop visit after the configured service duration. Spawned
    /// when staff sends a car to service; the guard on IN_SERVICE means a
    /// manual status change during the wait wins.
    pub fn finish_service_later(state: Arc<AppState>, car_id: i64) {
        let delay = Duration::from_secs(state.config.fleet.service_duration_secs);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let row = sqlx::query(
                r#"
                UPDATE cars SET status = 'SERVICED'
                WHERE id = $1 AND status = 'IN_SERVICE'
                RETURNING (SELECT city FROM locations WHERE id = cars.location_id) AS city
                "#,
            )
            .bind(car_id)
            .fetch_optional(&state.db.pool)
            .await;

            match row {
                Ok(Some(row)) => {
                    let city: String = row.get("city");
                    state.cache.invalidate_gallery(&city).await;
                    info!("Car {} serviced", car_id);
                }
                Ok(None) => {
                    warn!("Car {} left IN_SERVICE before the wait elapsed", car_id);
                }
                Err(e) => {
                    error!("Failed to finish service for car {}: {:?}", car_id, e);
                }
            }
        });
    }

    /// Counters for monitoring the sweep backlog.
    pub async fn get_sweep_stats(&self) -> SweepStats {
        let due_pickups: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM reservations r
            JOIN cars c ON c.id = r.car_id
            WHERE r.status = 'PENDING'
              AND r.reservation_start <= NOW()
              AND c.status = 'READY_FOR_RENT'
            "#,
        )
        .fetch_one(&self.state.db.pool)
        .await
        .unwrap_or(0);

        let due_returns: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations
             WHERE status = 'ACTIVE' AND reservation_end <= NOW()",
        )
        .fetch_one(&self.state.db.pool)
        .await
        .unwrap_or(0);

        let awaiting_service: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM cars WHERE status IN ('BEFORE_SERVICE', 'IN_SERVICE')",
        )
        .fetch_one(&self.state.db.pool)
        .await
        .unwrap_or(0);

        SweepStats {
            due_pickups,
            due_returns,
            awaiting_service,
        }
    }
}

#[derive(Debug)]
pub struct SweepStats {
    pub due_pickups: i64,
    pub due_returns: i64,
    pub awaiting_service: i64,
}

impl SweepStats {
    pub fn total_pending_transitions(&self) -> i64 {
        self.due_pickups + self.due_returns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_count_only_reservation_transitions() {
        let stats = SweepStats {
            due_pickups: 2,
            due_returns: 3,
            awaiting_service: 7,
        };
        assert_eq!(stats.total_pending_transitions(), 5);
    }
}
