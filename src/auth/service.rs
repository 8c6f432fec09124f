use std::sync::Arc;

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::authenticator::{encode_key, generate_key, TokenAuthenticator};
use super::error::AuthError;
use super::password::{hash_password, verify_password};
use super::quota::QuotaEnforcer;
use super::types::{Identity, Token, User};
use crate::storage::CredentialStore;

/// Authenticate, then charge the quota. Either stage short-circuits.
pub struct AdmissionPipeline {
    authenticator: TokenAuthenticator,
    enforcer: QuotaEnforcer,
}

impl AdmissionPipeline {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            authenticator: TokenAuthenticator::new(store.clone()),
            enforcer: QuotaEnforcer::new(store),
        }
    }

    pub async fn admit_request(&self, presented: Option<&str>) -> Result<Identity, AuthError> {
        let identity = self.authenticator.authenticate(presented).await?;
        self.enforcer.admit(&identity).await?;
        Ok(identity)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub subscription_id: Uuid,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Returned once at registration; the raw token is not stored anywhere.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub user: User,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct Registrar {
    store: Arc<dyn CredentialStore>,
}

impl Registrar {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Creates the user, a token valid for one month and a zeroed counter.
    pub async fn register(&self, req: RegisterRequest) -> Result<Registration, AuthError> {
        if req.password.is_empty() {
            return Err(AuthError::PasswordRequired);
        }
        if req.password != req.confirm_password {
            return Err(AuthError::PasswordMismatch);
        }

        let plan = self
            .store
            .get_plan(req.subscription_id)
            .await?
            .ok_or(AuthError::NoSubscription)?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            subscription_id: plan.id,
            name: req.name,
            email: req.email,
            password_hash: hash_password(&req.password)?,
            is_active: true,
            created_at: now,
        };

        let raw_key = generate_key();
        let expires_at = now
            .checked_add_months(Months::new(1))
            .unwrap_or(now + chrono::Duration::days(30));
        let token = Token {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_key: encode_key(&raw_key),
            expires_at,
            is_active: true,
            created_at: now,
        };

        self.store.create_user(&user, &token).await?;
        info!(user_id = %user.id, plan = %plan.subscription_type, "registered user");

        Ok(Registration {
            user,
            token: raw_key,
            expires_at,
        })
    }

    /// Unknown email and wrong password fail the same way.
    pub async fn login(&self, req: LoginRequest) -> Result<User, AuthError> {
        let user = self
            .store
            .get_user_by_email(req.email.trim())
            .await?
            .ok_or(AuthError::InvalidLogin)?;

        if !verify_password(&req.password, &user.password_hash) {
            return Err(AuthError::InvalidLogin);
        }

        info!(user_id = %user.id, "user logged in");
        Ok(user)
    }
}
