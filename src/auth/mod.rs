use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ServiceError;

/// Bearer token claims issued by the account service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    pub exp: u64,
}

/// Authenticated caller, inserted as a request extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
}

pub struct AuthService {
    key: Option<DecodingKey>,
    validation: Validation,
}

impl AuthService {
    /// Without a secret every token is rejected
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            key: secret.map(|s| DecodingKey::from_secret(s.as_bytes())),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn validate_token(&self, token: &str) -> Option<Identity> {
        let key = self.key.as_ref()?;
        match decode::<Claims>(token, key, &self.validation) {
            Ok(data) if !data.claims.username.is_empty() => Some(Identity {
                username: data.claims.username,
            }),
            Ok(_) => None,
            Err(e) => {
                debug!("Rejected bearer token: {}", e);
                None
            }
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
}

pub async fn auth_middleware(
    auth_service: std::sync::Arc<AuthService>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    match bearer_token(&headers).and_then(|token| auth_service.validate_token(token)) {
        Some(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        None => ServiceError::Unauthenticated.into_response(),
    }
}
