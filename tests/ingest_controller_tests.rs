use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    http::{header, Request, StatusCode},
    Router,
};
use dealwatch::error::SinkError;
use dealwatch::models::{Criteria, GeoPoint, NotificationJob, YearRange};
use dealwatch::services::{
    alert_store::MemoryAlertStore,
    ledger::MemoryLedger,
    sink::{LogSink, NotificationSink},
};
use dealwatch::{config, controllers::ingest_controller::INGEST_TOKEN_HEADER, routes, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

const TOKEN: &str = "feed-secret";

struct RefusingSink;

#[async_trait]
impl NotificationSink for RefusingSink {
    async fn deliver(&self, _job: &NotificationJob) -> Result<(), SinkError> {
        Err(SinkError::Other("notifier offline".into()))
    }
}

fn test_state(sink: Arc<dyn NotificationSink>) -> AppState {
    let mut settings = config::load();
    settings.ingest_token = Some(TOKEN.to_string());
    settings.sink_max_attempts = 2;
    settings.sink_timeout_ms = 50;
    settings.sink_backoff_min_ms = 1;
    settings.sink_backoff_max_ms = 5;

    AppState::new(
        settings,
        None,
        Arc::new(MemoryAlertStore::new()),
        Arc::new(MemoryLedger::new()),
        sink,
    )
}

async fn seed_accord_alert(state: &AppState) {
    let criteria = Criteria {
        model_query: "Honda Accord".to_string(),
        year_range: YearRange { min: Some(2017), max: Some(2020) },
        max_price: Some(900_000),
        max_distance_miles: Some(50.0),
        reference_location: GeoPoint::new(40.0, -75.0),
    };
    state.alerts.create("alice", criteria).await.unwrap();
}

fn ingest_request(body: Value, token: Option<&str>) -> Request<axum::body::Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/ingest/listings")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(t) = token {
        builder = builder.header(INGEST_TOKEN_HEADER, t);
    }
    builder.body(axum::body::Body::from(body.to_string())).unwrap()
}

async fn response_json(res: axum::response::Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

fn app(state: AppState) -> Router {
    routes::app(state)
}

#[tokio::test]
async fn ingest_rejects_missing_or_wrong_token() {
    let state = test_state(Arc::new(LogSink));

    let res = app(state.clone())
        .oneshot(ingest_request(json!([]), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app(state)
        .oneshot(ingest_request(json!([]), Some("nope")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response_json(res).await["error"], "bad ingest token");
}

#[tokio::test]
async fn ingest_returns_a_batch_report() {
    let state = test_state(Arc::new(LogSink));
    seed_accord_alert(&state).await;

    let batch = json!([
        {
            "id": "l-1",
            "title": "2018 Honda Accord LX",
            "price": 8500,
            "year": 2018,
            "location": { "lat": 40.1448, "lng": -75.0 }
        },
        { "id": "l-2", "title": "2018 Honda Accord", "price": 9500, "year": 2018 },
        { "title": "no id at all" }
    ]);

    let res = app(state.clone())
        .oneshot(ingest_request(batch, Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let report = response_json(res).await;
    assert_eq!(report["stage"], "DISPATCHED");
    assert_eq!(report["received"], 3);
    assert_eq!(report["normalized"], 2);
    assert_eq!(report["skipped"].as_array().unwrap().len(), 1);
    assert_eq!(report["matched"], 1);
    assert_eq!(report["dispatched"], 1);
    assert!(report["batchId"].is_string());

    let stats = state.dispatcher.stats();
    assert_eq!(stats.delivered, 1);
}

#[tokio::test]
async fn ingest_accepts_search_index_hit_pages() {
    let state = test_state(Arc::new(LogSink));
    seed_accord_alert(&state).await;

    let page = json!({
        "hits": [
            { "objectID": "h-1", "title": "Honda Accord Sport", "price": "$8,000", "year": "2019" }
        ]
    });

    let res = app(state)
        .oneshot(ingest_request(page, Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let report = response_json(res).await;
    assert_eq!(report["received"], 1);
    assert_eq!(report["dispatched"], 1);
}

#[tokio::test]
async fn repeated_ingest_is_suppressed() {
    let state = test_state(Arc::new(LogSink));
    seed_accord_alert(&state).await;
    let batch = json!([{ "id": "l-1", "title": "2019 Honda Accord", "year": 2019 }]);

    let first = response_json(
        app(state.clone())
            .oneshot(ingest_request(batch.clone(), Some(TOKEN)))
            .await
            .unwrap(),
    )
    .await;
    let second = response_json(
        app(state)
            .oneshot(ingest_request(batch, Some(TOKEN)))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(first["dispatched"], 1);
    assert_eq!(second["dispatched"], 0);
    assert_eq!(second["suppressed"], 1);
}

#[tokio::test]
async fn undeliverable_jobs_show_up_as_dead_letters() {
    let state = test_state(Arc::new(RefusingSink));
    seed_accord_alert(&state).await;
    let batch = json!([{ "id": "l-1", "title": "2019 Honda Accord", "year": 2019 }]);

    let report = response_json(
        app(state.clone())
            .oneshot(ingest_request(batch, Some(TOKEN)))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(report["deadLettered"], 1);

    let req = Request::builder()
        .uri("/ingest/dead-letters")
        .header(INGEST_TOKEN_HEADER, TOKEN)
        .body(axum::body::Body::empty())
        .unwrap();
    let res = app(state.clone()).oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = response_json(res).await;
    let letters = body["deadLetters"].as_array().unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0]["listingId"], "l-1");
    assert_eq!(letters[0]["ownerId"], "alice");
    assert_eq!(letters[0]["attempts"], 2);
    assert!(letters[0]["lastError"].as_str().unwrap().contains("notifier offline"));

    let req = Request::builder()
        .uri("/health/dispatch")
        .body(axum::body::Body::empty())
        .unwrap();
    let stats = response_json(app(state).oneshot(req).await.unwrap()).await;
    assert_eq!(stats["deadLettered"], 1);
    assert_eq!(stats["deliveryRetries"], 1);
}
