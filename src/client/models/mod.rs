pub mod chat_view;
pub mod conversations;
pub mod session;
pub mod timeline;
pub mod typing;
