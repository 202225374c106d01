// Libreria condivisa tra server e client linkup-chat
pub mod common;
pub mod utils;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "client")]
pub mod client;
