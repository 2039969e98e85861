use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{services::listing_feed::FeedPage, AppState};

pub const INGEST_TOKEN_HEADER: &str = "x-ingest-token";

fn token_ok(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = state.settings.ingest_token.as_deref() else {
        return true;
    };
    headers
        .get(INGEST_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected)
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "bad ingest token" }))).into_response()
}

// POST /ingest/listings
pub async fn post_listings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(page): Json<FeedPage>,
) -> Response {
    if !token_ok(&state, &headers) {
        return unauthorized();
    }

    let report = state.dispatcher.dispatch_batch(page.into_listings()).await;
    (StatusCode::OK, Json(report)).into_response()
}

// GET /ingest/dead-letters
pub async fn get_dead_letters(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !token_ok(&state, &headers) {
        return unauthorized();
    }

    match state.dispatcher.dead_letters().await {
        Ok(letters) => {
            let items: Vec<serde_json::Value> = letters
                .iter()
                .map(|d| {
                    json!({
                        "alertId": d.job.alert_id.to_hex(),
                        "listingId": d.job.listing_id,
                        "ownerId": d.job.owner_id,
                        "attempts": d.attempts,
                        "lastError": d.last_error,
                        "deadLetteredAt": d.dead_lettered_at,
                    })
                })
                .collect();
            (StatusCode::OK, Json(json!({ "deadLetters": items }))).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("{e}") })),
        )
            .into_response(),
    }
}
