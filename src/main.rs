use anyhow::Context;
use sharebite::{
    config::Config,
    db,
    notify::{LogSink, Notifier, DEFAULT_CAPACITY},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env()?;
    let db_pool = db::connect(&config).await?;
    let (notifier, _notifications) = Notifier::spawn(LogSink, DEFAULT_CAPACITY);

    let app = sharebite::app(AppState::new(db_pool, notifier), &config)?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("could not bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sharebite=info,tower_http=info,warn"));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}
