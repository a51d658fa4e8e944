//! HTTP API Server Module
//!
//! REST API for managing feeds, triggering imports and polling progress.

pub mod auth;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod types;

pub use handlers::AppState;
pub use routes::create_router;
pub use server::HttpServer;
