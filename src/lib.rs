pub mod appresult;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod donations;
pub mod error;
pub mod identity;
pub mod index;
pub mod lifecycle;
pub mod locks;
pub mod notify;
pub mod requests;
pub mod session;
pub mod users;

use anyhow::Context;
use axum::{
    extract::FromRef,
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use sqlx::SqlitePool;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

pub use appresult::{AppError, AppResult};

use crate::{
    chat::ChatBroker, config::Config, donations::DonationLedger, lifecycle::Lifecycle,
    notify::Notifier, requests::RequestLedger,
};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub lifecycle: Lifecycle,
    pub donations: DonationLedger,
    pub requests: RequestLedger,
    pub broker: ChatBroker,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, notifier: Notifier) -> Self {
        Self {
            lifecycle: Lifecycle::new(db_pool.clone(), notifier.clone()),
            donations: DonationLedger::new(db_pool.clone(), notifier),
            requests: RequestLedger::new(db_pool.clone()),
            broker: ChatBroker::new(db_pool.clone()),
            db_pool,
        }
    }
}

pub fn app(state: AppState, config: &Config) -> anyhow::Result<Router> {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(config.session_inactivity));

    let origins = config
        .frontend_urls
        .iter()
        .map(|url| {
            HeaderValue::from_str(url)
                .with_context(|| format!("FRONTEND_URLS entry {url:?} is not a valid origin"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    Ok(Router::new()
        .route("/", get(index::index))
        .nest("/api/auth", auth::router())
        .nest("/api/users", users::router())
        .nest("/api/donations", donations::router())
        .nest("/api/requests", requests::router())
        .nest("/api/chat", chat::router())
        .with_state(state)
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}
