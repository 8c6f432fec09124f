use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::error::AuthError;
use super::types::Identity;
use crate::storage::CredentialStore;

/// Stored form of a token secret. Used on issue and on lookup.
pub fn encode_key(raw_key: &str) -> String {
    STANDARD.encode(raw_key.as_bytes())
}

/// A fresh 16 hex character secret.
pub fn generate_key() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..16].to_string()
}

/// Pulls the secret out of a header value: either the bare key or
/// `Bearer <key>`. Anything else is malformed.
pub fn extract_key(header: Option<&str>) -> Option<&str> {
    let mut parts = header?.split_whitespace();
    let key = match (parts.next()?, parts.next()) {
        (key, None) => key,
        (scheme, Some(key)) if scheme.eq_ignore_ascii_case("bearer") => key,
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(key)
}

pub struct TokenAuthenticator {
    store: Arc<dyn CredentialStore>,
}

impl TokenAuthenticator {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub async fn authenticate(&self, presented: Option<&str>) -> Result<Identity, AuthError> {
        self.authenticate_at(presented, Utc::now()).await
    }

    pub async fn authenticate_at(
        &self,
        presented: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Identity, AuthError> {
        let key = extract_key(presented).ok_or(AuthError::Unauthenticated)?;

        let token = self
            .store
            .get_token_by_key(&encode_key(key))
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        if !token.is_active {
            return Err(AuthError::Inactive);
        }

        if token.expires_at <= now {
            return Err(AuthError::Expired);
        }

        debug!(user_id = %token.user_id, "token accepted");
        Ok(Identity {
            user_id: token.user_id,
            token_id: token.id,
        })
    }
}
