use crate::storage::StorageError;

/// Every way a request can be refused at the admission boundary.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Unauthorized")]
    Unauthenticated,
    #[error("Token Inactive")]
    Inactive,
    #[error("Token Expired")]
    Expired,
    #[error("Rate Limit Exceeded")]
    QuotaExceeded,
    #[error("No subscription")]
    NoSubscription,
    #[error("No rate limit")]
    NoCounter,
    #[error("Password required")]
    PasswordRequired,
    #[error("Password does not match")]
    PasswordMismatch,
    #[error("Incorrect email or password")]
    InvalidLogin,
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AuthError {
    /// Authentication failures as opposed to quota/admission failures.
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            AuthError::Unauthenticated | AuthError::Inactive | AuthError::Expired
        )
    }
}
