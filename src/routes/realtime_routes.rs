use axum::{Router, routing::get};
use crate::{AppState, events};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router.route("/events", get(events::sse_events))
}
