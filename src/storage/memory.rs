use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{CredentialStore, QuotaDecision, StatisticStore, StorageError, StorageResult};
use crate::auth::types::{QuotaCounter, SubscriptionPlan, Token, User};
use crate::statistics::types::{Continent, Country, StatisticRecord, StatisticValues};
use crate::web::Pagination;

#[derive(Default)]
struct Tables {
    plans: HashMap<Uuid, SubscriptionPlan>,
    users: HashMap<Uuid, User>,
    tokens: HashMap<String, Token>,
    counters: HashMap<Uuid, QuotaCounter>,
    continents: HashMap<Uuid, Continent>,
    countries: HashMap<Uuid, Country>,
    statistics: HashMap<Uuid, StatisticRecord>,
}

/// Process-local store with the same uniqueness and counter semantics as
/// [`super::SqliteStore`]. Nothing is persisted; the unit tests run on it.
/// Every operation holds the table lock for its whole read-check-write.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }

    fn country_name(tables: &Tables, country_id: Uuid) -> String {
        tables
            .countries
            .get(&country_id)
            .map(|c| c.name.clone())
            .unwrap_or_default()
    }

    fn page(
        tables: &Tables,
        mut records: Vec<StatisticRecord>,
        pagination: &Pagination,
    ) -> Vec<StatisticRecord> {
        let pagination = pagination.check();
        records.sort_by_key(|r| Self::country_name(tables, r.country_id).to_lowercase());
        records
            .into_iter()
            .skip(usize::try_from(pagination.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(pagination.limit()).unwrap_or(usize::MAX))
            .collect()
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn get_token_by_key(&self, token_key: &str) -> StorageResult<Option<Token>> {
        Ok(self.read()?.tokens.get(token_key).cloned())
    }

    async fn get_token(&self, token_id: Uuid) -> StorageResult<Option<Token>> {
        Ok(self.read()?.tokens.values().find(|t| t.id == token_id).cloned())
    }

    async fn list_tokens(&self) -> StorageResult<Vec<Token>> {
        let mut tokens: Vec<_> = self.read()?.tokens.values().cloned().collect();
        tokens.sort_by_key(|t| t.created_at);
        Ok(tokens)
    }

    async fn get_user(&self, user_id: Uuid) -> StorageResult<Option<User>> {
        Ok(self.read()?.users.get(&user_id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        Ok(self.read()?.users.values().find(|u| u.email == email).cloned())
    }

    async fn get_plan(&self, plan_id: Uuid) -> StorageResult<Option<SubscriptionPlan>> {
        Ok(self.read()?.plans.get(&plan_id).cloned())
    }

    async fn list_plans(&self) -> StorageResult<Vec<SubscriptionPlan>> {
        let mut plans: Vec<_> = self.read()?.plans.values().cloned().collect();
        plans.sort_by_key(|p| p.request_per_day);
        Ok(plans)
    }

    async fn insert_plan(&self, plan: &SubscriptionPlan) -> StorageResult<()> {
        self.write()?.plans.insert(plan.id, plan.clone());
        Ok(())
    }

    async fn create_user(&self, user: &User, token: &Token) -> StorageResult<()> {
        let mut tables = self.write()?;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StorageError::Conflict(format!(
                "email already registered: {}",
                user.email
            )));
        }
        if tables.tokens.contains_key(&token.token_key) {
            return Err(StorageError::Conflict("token key already issued".to_string()));
        }
        tables.users.insert(user.id, user.clone());
        tables.tokens.insert(token.token_key.clone(), token.clone());
        tables.counters.insert(
            user.id,
            QuotaCounter {
                user_id: user.id,
                total_request: 0,
                updated_by: None,
                updated_at: None,
            },
        );
        Ok(())
    }

    async fn get_counter(&self, user_id: Uuid) -> StorageResult<Option<QuotaCounter>> {
        Ok(self.read()?.counters.get(&user_id).cloned())
    }

    async fn list_counters(&self) -> StorageResult<Vec<QuotaCounter>> {
        Ok(self.read()?.counters.values().cloned().collect())
    }

    async fn try_consume_quota(&self, user_id: Uuid, limit: i64) -> StorageResult<QuotaDecision> {
        let mut tables = self.write()?;
        let Some(counter) = tables.counters.get_mut(&user_id) else {
            return Ok(QuotaDecision::Missing);
        };
        if counter.total_request >= limit {
            return Ok(QuotaDecision::Exhausted);
        }
        counter.total_request += 1;
        counter.updated_by = Some(user_id);
        counter.updated_at = Some(Utc::now());
        Ok(QuotaDecision::Allowed)
    }

    async fn list_counter_owners(&self) -> StorageResult<Vec<Uuid>> {
        Ok(self.read()?.counters.keys().copied().collect())
    }

    async fn reset_counter(&self, user_id: Uuid, actor: Uuid) -> StorageResult<bool> {
        let mut tables = self.write()?;
        match tables.counters.get_mut(&user_id) {
            Some(counter) if counter.total_request != 0 => {
                counter.total_request = 0;
                counter.updated_by = Some(actor);
                counter.updated_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reset_all_counters(&self, actor: Uuid) -> StorageResult<u64> {
        let mut tables = self.write()?;
        let now = Utc::now();
        let mut changed = 0;
        for counter in tables.counters.values_mut().filter(|c| c.total_request != 0) {
            counter.total_request = 0;
            counter.updated_by = Some(actor);
            counter.updated_at = Some(now);
            changed += 1;
        }
        Ok(changed)
    }
}

#[async_trait]
impl StatisticStore for InMemoryStore {
    async fn list_continents(&self) -> StorageResult<Vec<Continent>> {
        let mut continents: Vec<_> = self.read()?.continents.values().cloned().collect();
        continents.sort_by_key(|c| c.name.to_lowercase());
        Ok(continents)
    }

    async fn get_continent(&self, continent_id: Uuid) -> StorageResult<Option<Continent>> {
        Ok(self.read()?.continents.get(&continent_id).cloned())
    }

    async fn get_continent_by_name(&self, name: &str) -> StorageResult<Option<Continent>> {
        Ok(self
            .read()?
            .continents
            .values()
            .find(|c| same_name(&c.name, name))
            .cloned())
    }

    async fn insert_continent(&self, continent: &Continent) -> StorageResult<()> {
        let mut tables = self.write()?;
        if tables.continents.values().any(|c| same_name(&c.name, &continent.name)) {
            return Err(StorageError::Conflict(format!(
                "continent already exists: {}",
                continent.name
            )));
        }
        tables.continents.insert(continent.id, continent.clone());
        Ok(())
    }

    async fn list_countries(&self) -> StorageResult<Vec<Country>> {
        let mut countries: Vec<_> = self.read()?.countries.values().cloned().collect();
        countries.sort_by_key(|c| c.name.to_lowercase());
        Ok(countries)
    }

    async fn get_country(&self, country_id: Uuid) -> StorageResult<Option<Country>> {
        Ok(self.read()?.countries.get(&country_id).cloned())
    }

    async fn insert_country(&self, country: &Country) -> StorageResult<()> {
        let mut tables = self.write()?;
        if tables.countries.values().any(|c| same_name(&c.name, &country.name)) {
            return Err(StorageError::Conflict(format!(
                "country already exists: {}",
                country.name
            )));
        }
        tables.countries.insert(country.id, country.clone());
        Ok(())
    }

    async fn upsert_statistic(
        &self,
        country_id: Uuid,
        values: &StatisticValues,
        actor: Uuid,
    ) -> StorageResult<StatisticRecord> {
        let mut tables = self.write()?;
        let now = Utc::now();
        let record = tables
            .statistics
            .entry(country_id)
            .and_modify(|record| {
                record.values = values.clone();
                record.updated_by = Some(actor);
                record.updated_at = Some(now);
            })
            .or_insert_with(|| StatisticRecord {
                id: Uuid::new_v4(),
                country_id,
                values: values.clone(),
                created_by: actor,
                created_at: now,
                updated_by: None,
                updated_at: None,
            });
        Ok(record.clone())
    }

    async fn list_statistics(&self, pagination: &Pagination) -> StorageResult<Vec<StatisticRecord>> {
        let tables = self.read()?;
        let records = tables.statistics.values().cloned().collect();
        Ok(Self::page(&tables, records, pagination))
    }

    async fn list_statistics_by_continent(
        &self,
        continent_id: Uuid,
        pagination: &Pagination,
    ) -> StorageResult<Vec<StatisticRecord>> {
        let tables = self.read()?;
        let records = tables
            .statistics
            .values()
            .filter(|r| {
                tables
                    .countries
                    .get(&r.country_id)
                    .is_some_and(|c| c.continent_id == Some(continent_id))
            })
            .cloned()
            .collect();
        Ok(Self::page(&tables, records, pagination))
    }

    async fn get_statistic_by_country(&self, country_name: &str) -> StorageResult<Option<StatisticRecord>> {
        let tables = self.read()?;
        let country = tables
            .countries
            .values()
            .find(|c| same_name(&c.name, country_name));
        Ok(country.and_then(|c| tables.statistics.get(&c.id).cloned()))
    }
}
