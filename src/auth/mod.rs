pub mod authenticator;
pub mod error;
pub mod middleware;
pub mod password;
pub mod quota;
pub mod service;
pub mod types;

pub use authenticator::{encode_key, extract_key, generate_key, TokenAuthenticator};
pub use error::AuthError;
pub use middleware::{admission_middleware, TOKEN_HEADER};
pub use quota::QuotaEnforcer;
pub use password::{hash_password, verify_password};
pub use service::{AdmissionPipeline, LoginRequest, RegisterRequest, Registrar, Registration};
pub use types::{Identity, QuotaCounter, SubscriptionPlan, Token, User};
