use std::sync::Arc;

use axum::Router;
use secretcrush::{
    config::Config,
    db,
    media::DiskMediaStore,
    messenger::TelegramMessenger,
    session::SessionStore,
    store::Repos,
    webhook, AppState,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,secretcrush=debug")),
        )
        .init();

    let config = Config::from_env().unwrap();

    let db_pool = db::connect(&config.database_url, config.db_max_connections).await.unwrap();
    let messenger = TelegramMessenger::new(&config.bot_api_url, &config.bot_token).unwrap();
    let media = DiskMediaStore::new(&config.media_dir, &config.media_base_url).await.unwrap();

    let app_state = AppState {
        repos: Repos::sqlite(db_pool),
        messenger: Arc::new(messenger),
        media: Arc::new(media),
        sessions: SessionStore::default(),
        config: Arc::new(config.clone()),
    };

    let app = Router::new()
        .merge(webhook::router(&config.media_dir))
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await.unwrap();
    info!("listening on {}", config.bind_addr);
    axum::serve(listener, app).await.unwrap();
}
