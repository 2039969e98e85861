use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{
    error::AlertError,
    models::{AlertCriteria, CurrentUser, YearRange},
    services::{alerts_service, criteria::CreateAlertInput},
    AppState,
};

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" }))).into_response()
}

impl IntoResponse for AlertError {
    fn into_response(self) -> Response {
        match self {
            AlertError::Validation(v) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": "invalid alert", "errors": v.fields })),
            )
                .into_response(),
            AlertError::NotFoundOrForbidden => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": "alert not found" }))).into_response()
            }
            AlertError::Store(e) => {
                tracing::error!("alert store error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "storage unavailable" })),
                )
                    .into_response()
            }
        }
    }
}

fn fmt_cents(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

/// Same notation the create form accepts, so an alert can be posted back as-is.
fn years_label(r: &YearRange) -> String {
    match (r.min, r.max) {
        (Some(a), Some(b)) if a == b => a.to_string(),
        (Some(a), Some(b)) => format!("{a}-{b}"),
        (Some(a), None) => format!("{a}+"),
        (None, Some(b)) => format!("-{b}"),
        (None, None) => String::new(),
    }
}

pub fn alert_json(a: &AlertCriteria) -> serde_json::Value {
    let c = &a.criteria;
    json!({
        "id": a.id.to_hex(),
        "modelQuery": c.model_query,
        "yearRange": { "min": c.year_range.min, "max": c.year_range.max },
        "years": years_label(&c.year_range),
        // whole currency units, like the create input; cents under maxPriceMinor
        "maxPrice": c.max_price.map(|cents| cents as f64 / 100.0),
        "maxPriceMinor": c.max_price,
        "maxPriceDisplay": c.max_price.map(fmt_cents),
        "maxDistanceMiles": c.max_distance_miles,
        "referenceLocation": c.reference_location,
        "createdAt": a.created_at,
    })
}

// GET /alerts
pub async fn get_alerts(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized();
    };

    match alerts_service::list_alerts(&state, &u.id).await {
        Ok(alerts) => {
            let items: Vec<serde_json::Value> = alerts.iter().map(alert_json).collect();
            (StatusCode::OK, Json(json!({ "alerts": items }))).into_response()
        }
        Err(e) => AlertError::from(e).into_response(),
    }
}

// POST /alerts
pub async fn post_create_alert(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Json(input): Json<CreateAlertInput>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized();
    };

    match alerts_service::create_alert(&state, &u.id, &input).await {
        Ok(alert) => (StatusCode::CREATED, Json(alert_json(&alert))).into_response(),
        Err(e) => e.into_response(),
    }
}

// DELETE /alerts/:id  and  POST /alerts/:id/delete
pub async fn delete_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized();
    };

    let Some(oid) = alerts_service::parse_alert_id(&id) else {
        return AlertError::NotFoundOrForbidden.into_response();
    };

    match alerts_service::delete_alert(&state, &u.id, oid).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => AlertError::NotFoundOrForbidden.into_response(),
        Err(e) => AlertError::from(e).into_response(),
    }
}
