use std::sync::Arc;

use tracing::{debug, warn};

use super::error::AuthError;
use super::types::Identity;
use crate::storage::{CredentialStore, QuotaDecision};

/// Charges one request against the caller's daily plan limit.
///
/// A request is admitted iff the counter is strictly below the limit before
/// the increment, so the stored count never exceeds the limit. The compare
/// and the increment are one storage operation (`try_consume_quota`); a
/// refused request is never charged.
pub struct QuotaEnforcer {
    store: Arc<dyn CredentialStore>,
}

impl QuotaEnforcer {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub async fn admit(&self, identity: &Identity) -> Result<(), AuthError> {
        let user = self
            .store
            .get_user(identity.user_id)
            .await?
            .ok_or(AuthError::NoSubscription)?;

        let plan = self
            .store
            .get_plan(user.subscription_id)
            .await?
            .ok_or(AuthError::NoSubscription)?;

        match self
            .store
            .try_consume_quota(identity.user_id, plan.request_per_day)
            .await?
        {
            QuotaDecision::Allowed => {
                debug!(user_id = %identity.user_id, plan = %plan.subscription_type, "request admitted");
                Ok(())
            }
            QuotaDecision::Exhausted => Err(AuthError::QuotaExceeded),
            QuotaDecision::Missing => {
                warn!(user_id = %identity.user_id, "user has no quota counter");
                Err(AuthError::NoCounter)
            }
        }
    }
}
