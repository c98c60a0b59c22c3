//! Identity for incoming requests
//!
//! Registration, passwords and session tokens live outside this service.
//! All the game needs is a verified `UserId`, obtained here from a bearer
//! credential before any handler touches the core.

use super::{errors::ApiError, handlers::AppState, middleware::RequestId};
use crate::{config::AuthConfig, games::UserId};
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use sha2::{Digest, Sha256};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

/// Maps a presented credential to the user it belongs to
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credential: &str) -> Option<UserId>;
}

/// Hash API key using SHA256
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Static API keys, held only as SHA-256 digests
#[derive(Debug, Default, Clone)]
pub struct ApiKeyAuthenticator {
    keys: HashMap<String, UserId>,
}

impl ApiKeyAuthenticator {
    pub fn from_config(config: &AuthConfig) -> Self {
        let keys = config
            .api_keys
            .iter()
            .map(|entry| {
                (
                    entry.key_sha256.to_ascii_lowercase(),
                    UserId::new(entry.user_id.clone()),
                )
            })
            .collect();
        Self { keys }
    }

    /// Register a raw key, hashing it first
    pub fn with_key(mut self, user: UserId, raw_key: &str) -> Self {
        self.keys.insert(hash_api_key(raw_key), user);
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Authenticator for ApiKeyAuthenticator {
    fn authenticate(&self, credential: &str) -> Option<UserId> {
        self.keys.get(&hash_api_key(credential)).cloned()
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Extractor for the authenticated caller. Rejects with 401.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserId);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let request_id = parts
            .extensions
            .get::<RequestId>()
            .cloned()
            .unwrap_or_else(RequestId::unknown);

        match bearer_token(parts).and_then(|token| state.authenticator.authenticate(token)) {
            Some(user) => Ok(AuthUser(user)),
            None => {
                debug!(request_id = %request_id.0, path = %parts.uri.path(), "Unauthenticated request");
                Err(ApiError::unauthorized(request_id.0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKeyEntry;

    #[test]
    fn test_hash_is_sha256_hex() {
        assert_eq!(
            hash_api_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_authenticate_from_config() {
        let config = AuthConfig {
            api_keys: vec![ApiKeyEntry {
                user_id: "alice".to_string(),
                key_sha256: hash_api_key("alice-key").to_ascii_uppercase(),
            }],
        };
        let auth = ApiKeyAuthenticator::from_config(&config);
        assert_eq!(auth.authenticate("alice-key"), Some(UserId::new("alice")));
        assert_eq!(auth.authenticate("bob-key"), None);
        assert_eq!(auth.authenticate(""), None);
    }

    #[test]
    fn test_with_key() {
        let auth = ApiKeyAuthenticator::default().with_key(UserId::new("bob"), "secret");
        assert_eq!(auth.len(), 1);
        assert_eq!(auth.authenticate("secret"), Some(UserId::new("bob")));
    }
}
