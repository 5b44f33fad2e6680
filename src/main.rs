mod config;
mod db;
mod frame;
mod room;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use services::auth::TokenVerifier;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = config::Config::from_env().expect("invalid configuration");

    let pool = db::init_pool(&config.database_url, config.db_max_connections)
        .await
        .expect("database init failed");

    let store = Arc::new(db::PgStore::new(pool));
    let state = state::AppState::new(store, TokenVerifier::new(&config.jwt_secret), config.chat_persist_timeout);

    let app = routes::app(state);
    let port = config.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "teamboard listening");
    axum::serve(listener, app).await.expect("server failed");
}
