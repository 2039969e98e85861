use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub mongodb_uri: String,
    pub mongodb_db: String,
    pub store_backend: StoreBackend,
    pub host: String,
    pub port: u16,

    // session tokens are issued by the identity layer; we only read `sub`
    pub jwt_secret: String,
    pub jwt_cookie_name: String,

    // shared secret for POST /ingest/listings; None leaves it open
    pub ingest_token: Option<String>,

    pub notify_webhook_url: Option<String>,
    pub sink_max_attempts: u32,
    pub sink_timeout_ms: u64,
    pub sink_backoff_min_ms: u64,
    pub sink_backoff_max_ms: u64,

    pub listing_feed_url: Option<String>,
    pub listing_feed_api_key: String,
    pub feed_poll_secs: u64,
}

fn opt(key: &str) -> Option<String> {
    env::var(key).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn num<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

pub fn load() -> Settings {
    // Loads .env if present (no crash if missing)
    dotenvy::dotenv().ok();

    let mongodb_uri = env::var("MONGODB_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

    let mongodb_db = env::var("MONGODB_DB")
        .unwrap_or_else(|_| "dealwatch".to_string());

    let store_backend = match opt("STORE_BACKEND").as_deref() {
        Some(s) if s.eq_ignore_ascii_case("memory") => StoreBackend::Memory,
        _ => StoreBackend::Mongo,
    };

    let host = env::var("HOST")
        .unwrap_or_else(|_| "127.0.0.1".to_string());

    let port = num("PORT", 3000u16);

    let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| "change-me-dev-secret".to_string());
    let jwt_cookie_name = env::var("JWT_COOKIE_NAME").unwrap_or_else(|_| "session".to_string());

    Settings {
        mongodb_uri,
        mongodb_db,
        store_backend,
        host,
        port,
        jwt_secret,
        jwt_cookie_name,
        ingest_token: opt("INGEST_TOKEN"),
        notify_webhook_url: opt("NOTIFY_WEBHOOK_URL"),
        sink_max_attempts: num("SINK_MAX_ATTEMPTS", 5),
        sink_timeout_ms: num("SINK_TIMEOUT_MS", 5_000),
        sink_backoff_min_ms: num("SINK_BACKOFF_MIN_MS", 200),
        sink_backoff_max_ms: num("SINK_BACKOFF_MAX_MS", 30_000),
        listing_feed_url: opt("LISTING_FEED_URL"),
        listing_feed_api_key: env::var("LISTING_FEED_API_KEY").unwrap_or_default(),
        feed_poll_secs: num("FEED_POLL_SECS", 60),
    }
}
