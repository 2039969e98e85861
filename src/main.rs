use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mongodb::Client;
use tracing_subscriber::EnvFilter;

use dealwatch::{
    config::{self, StoreBackend},
    routes,
    services::{
        alert_store::{AlertStore, MemoryAlertStore, MongoAlertStore},
        db_init,
        feed_monitor,
        ledger::{MemoryLedger, MongoLedger, NotificationLedger},
        listing_feed::ListingFeedClient,
        sink::{LogSink, NotificationSink, WebhookSink},
    },
    AppState,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        tracing::error!("fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), BoxError> {
    let settings = config::load();

    let (db, alerts, ledger) = match settings.store_backend {
        StoreBackend::Mongo => {
            let client = Client::with_uri_str(&settings.mongodb_uri).await?;
            let db = client.database(&settings.mongodb_db);
            db_init::ensure_indexes(&db).await?;

            let alerts: Arc<dyn AlertStore> = Arc::new(MongoAlertStore::new(db.clone()));
            let ledger: Arc<dyn NotificationLedger> = Arc::new(MongoLedger::new(db.clone()));
            (Some(db), alerts, ledger)
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; alerts are lost on restart");
            let alerts: Arc<dyn AlertStore> = Arc::new(MemoryAlertStore::new());
            let ledger: Arc<dyn NotificationLedger> = Arc::new(MemoryLedger::new());
            (None, alerts, ledger)
        }
    };

    let sink: Arc<dyn NotificationSink> = match settings.notify_webhook_url.clone() {
        Some(url) => Arc::new(WebhookSink::new(url)),
        None => Arc::new(LogSink),
    };

    let state = AppState::new(settings.clone(), db, alerts, ledger, sink);

    if let Some(url) = settings.listing_feed_url.clone() {
        let feed = ListingFeedClient::new(url, settings.listing_feed_api_key.clone());
        feed_monitor::spawn_listing_poller(
            state.clone(),
            feed,
            Duration::from_secs(settings.feed_poll_secs.max(1)),
        );
    }

    let app = routes::app(state);

    let addr = SocketAddr::from((settings.host.parse::<std::net::IpAddr>()?, settings.port));
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
