//! HTTP API
//!
//! Thin axum adapter over the game engine, ledger and integrity monitor.
//! Player identity is taken from the request; authentication sits in front
//! of this service.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use handlers::AppState;
pub use server::{create_app, init_tracing, ApiServer};
