//! Authenticated link management and analytics API

pub mod analytics;
pub mod handlers;
pub mod routes;

pub use routes::create_api_router;
