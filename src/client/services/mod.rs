pub mod api;
pub mod messenger;
pub mod websocket_client;
