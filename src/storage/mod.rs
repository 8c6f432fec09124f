use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::types::{QuotaCounter, SubscriptionPlan, Token, User};
use crate::statistics::types::{Continent, Country, StatisticRecord, StatisticValues};
use crate::web::Pagination;

pub mod error;
pub mod memory;
pub mod sqlite;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Outcome of a single conditional increment of a quota counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    /// The counter was below the limit and has been incremented by one.
    Allowed,
    /// The counter was already at or above the limit; nothing was charged.
    Exhausted,
    /// No counter row exists for the user.
    Missing,
}

/// Tokens, users, plans and quota counters.
///
/// `try_consume_quota` and the reset operations are the only writers of a
/// counter and each must be a single atomic statement against the stored rows.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    async fn get_token_by_key(&self, token_key: &str) -> StorageResult<Option<Token>>;
    async fn get_token(&self, token_id: Uuid) -> StorageResult<Option<Token>>;
    async fn list_tokens(&self) -> StorageResult<Vec<Token>>;
    async fn get_user(&self, user_id: Uuid) -> StorageResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> StorageResult<Option<User>>;
    async fn get_plan(&self, plan_id: Uuid) -> StorageResult<Option<SubscriptionPlan>>;
    async fn list_plans(&self) -> StorageResult<Vec<SubscriptionPlan>>;
    async fn insert_plan(&self, plan: &SubscriptionPlan) -> StorageResult<()>;
    /// Creates the user, its token and a zeroed quota counter together.
    /// A taken email or token key is a `Conflict` and nothing is written.
    async fn create_user(&self, user: &User, token: &Token) -> StorageResult<()>;
    async fn get_counter(&self, user_id: Uuid) -> StorageResult<Option<QuotaCounter>>;
    async fn list_counters(&self) -> StorageResult<Vec<QuotaCounter>>;
    async fn try_consume_quota(&self, user_id: Uuid, limit: i64) -> StorageResult<QuotaDecision>;
    async fn list_counter_owners(&self) -> StorageResult<Vec<Uuid>>;
    /// Sets one counter to zero. Returns false when it was already zero.
    async fn reset_counter(&self, user_id: Uuid, actor: Uuid) -> StorageResult<bool>;
    /// Zeroes every non-zero counter in one statement; returns how many changed.
    async fn reset_all_counters(&self, actor: Uuid) -> StorageResult<u64>;
}

/// Continents, countries and their current statistic records. Names are
/// unique ignoring case; a duplicate insert is a `Conflict`.
#[async_trait]
pub trait StatisticStore: Send + Sync + 'static {
    async fn list_continents(&self) -> StorageResult<Vec<Continent>>;
    async fn get_continent(&self, continent_id: Uuid) -> StorageResult<Option<Continent>>;
    async fn get_continent_by_name(&self, name: &str) -> StorageResult<Option<Continent>>;
    async fn insert_continent(&self, continent: &Continent) -> StorageResult<()>;
    async fn list_countries(&self) -> StorageResult<Vec<Country>>;
    async fn get_country(&self, country_id: Uuid) -> StorageResult<Option<Country>>;
    async fn insert_country(&self, country: &Country) -> StorageResult<()>;
    /// Inserts the record for `country_id`, or updates the existing one in
    /// place keeping its id and creation fields.
    async fn upsert_statistic(
        &self,
        country_id: Uuid,
        values: &StatisticValues,
        actor: Uuid,
    ) -> StorageResult<StatisticRecord>;
    async fn list_statistics(&self, pagination: &Pagination) -> StorageResult<Vec<StatisticRecord>>;
    async fn list_statistics_by_continent(
        &self,
        continent_id: Uuid,
        pagination: &Pagination,
    ) -> StorageResult<Vec<StatisticRecord>>;
    async fn get_statistic_by_country(&self, country_name: &str) -> StorageResult<Option<StatisticRecord>>;
}
