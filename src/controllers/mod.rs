pub mod analytics;
pub mod auth;
pub mod fleet;
pub mod gallery;
pub mod messages;
pub mod reservations;

use axum::Router;
use std::sync::Arc;

pub fn routes(state: Arc<crate::AppState>) -> Router<Arc<crate::AppState>> {
    let mut router = Router::new()
        .merge(gallery::routes())
        .merge(auth::routes())
        .merge(reservations::routes())
        .merge(fleet::routes())
        .merge(messages::routes());

    if state.config.features.enable_analytics {
        router = router.merge(analytics::routes());
    }

    router
}
