pub mod articles;
pub mod config;
pub mod error;
pub mod observability;
pub mod routes;
pub mod server;
pub mod users;

pub use server::{AppState, CacheBackend, ServerBuilder, TurnstileServer, build_app};
