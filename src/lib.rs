pub mod analytics;
pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod errors;
pub mod links;
pub mod models;
pub mod redirect;
pub mod rules;
pub mod storage;

pub use errors::{ServiceError, ServiceResult};
