//! Public redirect server: resolves short links for visitors

pub mod handlers;
pub mod routes;
pub mod service;

pub use routes::create_redirect_router;
pub use service::{RedirectService, ResolvedRedirect};
