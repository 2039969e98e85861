use std::sync::Arc;

use axum::{
    http::{header, Request, StatusCode},
    routing::{delete, get},
    Router,
};
use dealwatch::models::{Criteria, CurrentUser, YearRange};
use dealwatch::services::{
    alert_store::MemoryAlertStore,
    ledger::MemoryLedger,
    sink::LogSink,
};
use dealwatch::{config, controllers::alerts_controller, routes, AppState};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use mongodb::bson::oid::ObjectId;
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "test-secret";

fn test_state() -> AppState {
    let mut settings = config::load();
    settings.jwt_secret = SECRET.to_string();
    settings.jwt_cookie_name = "session".to_string();

    AppState::new(
        settings,
        None,
        Arc::new(MemoryAlertStore::new()),
        Arc::new(MemoryLedger::new()),
        Arc::new(LogSink),
    )
}

fn alerts_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/alerts",
            get(alerts_controller::get_alerts).post(alerts_controller::post_create_alert),
        )
        .route("/alerts/:id", delete(alerts_controller::delete_alert))
        .with_state(state)
}

fn as_user(mut req: Request<axum::body::Body>, owner: &str) -> Request<axum::body::Body> {
    req.extensions_mut().insert(CurrentUser { id: owner.to_string() });
    req
}

fn create_request(body: Value) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri("/alerts")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<axum::body::Body> {
    Request::builder().uri(uri).body(axum::body::Body::empty()).unwrap()
}

fn delete_request(id: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("DELETE")
        .uri(format!("/alerts/{id}"))
        .body(axum::body::Body::empty())
        .unwrap()
}

async fn response_json(res: axum::response::Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

async fn response_bytes(res: axum::response::Response) -> Vec<u8> {
    res.into_body().collect().await.unwrap().to_bytes().to_vec()
}

fn token_for(owner: &str) -> String {
    let claims = json!({ "sub": owner, "exp": 4_102_444_800u64 });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

#[tokio::test]
async fn get_alerts_unauthorized_returns_401() {
    let app = alerts_router(test_state());

    let res = app.oneshot(get_request("/alerts")).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let body = response_json(res).await;
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn create_alert_returns_canonical_criteria() {
    let app = alerts_router(test_state());

    let req = as_user(
        create_request(json!({ "model": "Honda Accord", "years": "2017-2020", "price": "9000", "distance": "50" })),
        "alice",
    );
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let body = response_json(res).await;
    assert_eq!(body["modelQuery"], "Honda Accord");
    assert_eq!(body["yearRange"], json!({ "min": 2017, "max": 2020 }));
    assert_eq!(body["maxPrice"], 9000.0);
    assert_eq!(body["maxPriceMinor"], 900_000);
    assert_eq!(body["years"], "2017-2020");
    assert_eq!(body["maxPriceDisplay"], "9000.00");
    assert_eq!(body["maxDistanceMiles"], 50.0);
    assert!(ObjectId::parse_str(body["id"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn invalid_alert_is_rejected_with_field_errors() {
    let state = test_state();
    let app = alerts_router(state.clone());

    let req = as_user(create_request(json!({ "model": "Honda Accord", "maxPrice": -1 })), "alice");
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = response_json(res).await;
    assert!(body["errors"]["maxPrice"].is_string());

    // nothing was persisted
    assert!(state.alerts.list("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn list_shows_only_own_alerts_in_creation_order() {
    let state = test_state();

    for (owner, model) in [("alice", "Honda Accord"), ("bob", "Ford F150"), ("alice", "Toyota Camry")] {
        let req = as_user(create_request(json!({ "model": model })), owner);
        let res = alerts_router(state.clone()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let res = alerts_router(state)
        .oneshot(as_user(get_request("/alerts"), "alice"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = response_json(res).await;
    let models: Vec<&str> = body["alerts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["modelQuery"].as_str().unwrap())
        .collect();
    assert_eq!(models, vec!["Honda Accord", "Toyota Camry"]);
}

#[tokio::test]
async fn delete_own_alert_returns_204() {
    let state = test_state();
    let criteria = Criteria {
        model_query: "civic".to_string(),
        year_range: YearRange::open(),
        max_price: None,
        max_distance_miles: None,
        reference_location: None,
    };
    let alert = state.alerts.create("alice", criteria).await.unwrap();

    let res = alerts_router(state.clone())
        .oneshot(as_user(delete_request(&alert.id.to_hex()), "alice"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(state.alerts.list("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn foreign_and_missing_alerts_are_indistinguishable() {
    let state = test_state();
    let req = as_user(create_request(json!({ "model": "Honda Accord" })), "alice");
    let created = response_json(alerts_router(state.clone()).oneshot(req).await.unwrap()).await;
    let alice_alert = created["id"].as_str().unwrap().to_string();

    let foreign = alerts_router(state.clone())
        .oneshot(as_user(delete_request(&alice_alert), "mallory"))
        .await
        .unwrap();
    let missing = alerts_router(state.clone())
        .oneshot(as_user(delete_request(&ObjectId::new().to_hex()), "mallory"))
        .await
        .unwrap();
    let malformed = alerts_router(state.clone())
        .oneshot(as_user(delete_request("not-an-id"), "mallory"))
        .await
        .unwrap();

    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);
    assert_eq!(missing.status(), foreign.status());
    assert_eq!(malformed.status(), foreign.status());

    let foreign_body = response_bytes(foreign).await;
    assert_eq!(response_bytes(missing).await, foreign_body);
    assert_eq!(response_bytes(malformed).await, foreign_body);

    // alice's alert survived
    assert_eq!(state.alerts.list("alice").await.unwrap().len(), 1);
}

#[tokio::test]
async fn full_app_requires_a_session_token() {
    let app = routes::app(test_state());

    let res = app.clone().oneshot(get_request("/alerts")).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/alerts")
        .header(header::AUTHORIZATION, "Bearer not.a.jwt")
        .body(axum::body::Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn full_app_accepts_bearer_and_cookie_sessions() {
    let app = routes::app(test_state());

    let req = Request::builder()
        .method("POST")
        .uri("/alerts")
        .header(header::AUTHORIZATION, format!("Bearer {}", token_for("alice")))
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(json!({ "model": "Honda Accord" }).to_string()))
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let req = Request::builder()
        .uri("/alerts")
        .header(header::COOKIE, format!("session={}", token_for("alice")))
        .body(axum::body::Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = response_json(res).await;
    assert_eq!(body["alerts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn health_is_public() {
    let app = routes::app(test_state());

    let res = app.clone().oneshot(get_request("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app.oneshot(get_request("/health/db")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(response_bytes(res).await, b"store: memory".to_vec());
}

#[tokio::test]
async fn event_stream_requires_a_session() {
    let app = routes::app(test_state());

    let res = app.clone().oneshot(get_request("/events")).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/events")
        .header(header::AUTHORIZATION, format!("Bearer {}", token_for("alice")))
        .body(axum::body::Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
}

#[tokio::test]
async fn returned_alert_can_be_posted_back_unchanged() {
    let state = test_state();

    let first = as_user(
        create_request(json!({
            "model": "Honda Accord",
            "minYear": 2017,
            "price": "$9,500.25",
            "distance": 50,
            "referenceLat": 40.0,
            "referenceLng": -75.0
        })),
        "alice",
    );
    let original = response_json(alerts_router(state.clone()).oneshot(first).await.unwrap()).await;

    // delete + recreate from the returned representation
    let res = alerts_router(state.clone())
        .oneshot(as_user(create_request(original.clone()), "alice"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let copy = response_json(res).await;

    for field in ["modelQuery", "yearRange", "years", "maxPrice", "maxPriceMinor", "maxDistanceMiles", "referenceLocation"] {
        assert_eq!(copy[field], original[field], "{field}");
    }
    assert_eq!(copy["maxPriceMinor"], 950_025);

    let stored = state.alerts.list("alice").await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].criteria, stored[1].criteria);
}
