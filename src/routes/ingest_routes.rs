use axum::{Router, routing::{get, post}};
use crate::{AppState, controllers::ingest_controller};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/ingest/listings", post(ingest_controller::post_listings))
        .route("/ingest/dead-letters", get(ingest_controller::get_dead_letters))
}
