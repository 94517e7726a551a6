pub mod chat;
pub mod scenario;
pub mod websocket;
