pub mod api;
pub mod avatar;
pub mod chat;
pub mod config;
pub mod connection;
pub mod error;
pub mod http_client;
pub mod retry;
pub mod scheduler;
pub mod sse;
