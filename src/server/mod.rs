pub mod auth;
pub mod config;
pub mod connections;
pub mod database;
pub mod messages;
pub mod presence;
pub mod relay;
pub mod routes;
pub mod state;
pub mod users;
pub mod websocket;
