//! Library entrypoint for dealwatch.
//!
//! Vehicle deal alerts: users save criteria, incoming listings are matched
//! against every saved alert, and each `(alert, listing)` pair is notified
//! at most once.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod events;
pub mod models;

#[path = "middleware/auth.rs"]
pub mod auth;

pub mod services;

pub mod controllers;
pub mod routes;

use services::{
    alert_store::AlertStore,
    dispatch::{DeliveryPolicy, Dispatcher},
    ledger::NotificationLedger,
    sink::NotificationSink,
};

#[derive(Clone)]
pub struct AppState {
    pub settings: config::Settings,
    // None when running on the in-memory backend
    pub db: Option<mongodb::Database>,
    pub alerts: Arc<dyn AlertStore>,
    pub ledger: Arc<dyn NotificationLedger>,
    pub dispatcher: Dispatcher,
    pub events_tx: tokio::sync::broadcast::Sender<events::OwnerEvent>,
}

impl AppState {
    pub fn new(
        settings: config::Settings,
        db: Option<mongodb::Database>,
        alerts: Arc<dyn AlertStore>,
        ledger: Arc<dyn NotificationLedger>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let (events_tx, _events_rx) = tokio::sync::broadcast::channel(256);
        let dispatcher = Dispatcher::new(
            alerts.clone(),
            ledger.clone(),
            sink,
            DeliveryPolicy::from_settings(&settings),
            Some(events_tx.clone()),
        );

        Self {
            settings,
            db,
            alerts,
            ledger,
            dispatcher,
            events_tx,
        }
    }
}
