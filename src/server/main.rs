// src/server/main.rs
// Entry point del server linkup-chat: API HTTP + canale push WebSocket
use actix_web::{middleware::Logger, web, App, HttpServer};
use linkup_chat::server::{
    config::ServerConfig, database::Database, relay, routes, state::AppState, websocket,
    websocket::ChannelHub,
};
use linkup_chat::utils::logger;
use log::{error, info};
use tokio::net::TcpListener;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();
    logger::init(&config.log_level);

    let database = Database::connect(&config.database_url).await?;
    info!("Running database migrations...");
    database.migrate().await.map_err(|e| {
        error!("Database migration failed: {}", e);
        e
    })?;

    // Fan-out Redis solo se configurato
    let mut hub = ChannelHub::new();
    if let Some(redis_url) = &config.redis_url {
        match relay::Relay::connect(redis_url).await {
            Ok(r) => {
                hub = hub.with_relay(r);
                relay::start_subscriber(redis_url.clone(), hub.clone());
            }
            Err(e) => error!("[REDIS] Disabled, could not connect to {}: {}", redis_url, e),
        }
    }

    let state = AppState::new(database, hub, config.clone());

    // Canale push su una porta separata
    let listener = TcpListener::bind(config.websocket_addr()).await?;
    let ws_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = websocket::serve(listener, ws_state).await {
            error!("WebSocket server error: {}", e);
        }
    });

    info!("HTTP API listening on {}", config.http_addr());
    let data = web::Data::new(state);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("[HTTP] %r %s %Dms"))
            .app_data(data.clone())
            .configure(routes::configure)
    })
    .bind(config.http_addr())?
    .run()
    .await?;

    Ok(())
}
