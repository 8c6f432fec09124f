use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use super::{CredentialStore, QuotaDecision, StatisticStore, StorageError, StorageResult};
use crate::auth::types::{QuotaCounter, SubscriptionPlan, Token, User};
use crate::statistics::types::{Continent, Country, StatisticRecord, StatisticValues};
use crate::web::Pagination;

const SCHEMA: [&str; 7] = [
    r#"
    CREATE TABLE IF NOT EXISTS subscription_plans (
        id TEXT PRIMARY KEY,
        subscription_type TEXT NOT NULL,
        request_per_day INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        subscription_id TEXT NOT NULL REFERENCES subscription_plans(id),
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL DEFAULT '',
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tokens (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id),
        token_key TEXT NOT NULL UNIQUE,
        expired_at TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS quota_counters (
        user_id TEXT PRIMARY KEY REFERENCES users(id),
        total_request INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_by TEXT,
        updated_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS continents (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL COLLATE NOCASE UNIQUE,
        code TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS countries (
        id TEXT PRIMARY KEY,
        continent_id TEXT REFERENCES continents(id),
        name TEXT NOT NULL COLLATE NOCASE UNIQUE,
        code TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS statistics (
        id TEXT PRIMARY KEY,
        country_id TEXT NOT NULL UNIQUE REFERENCES countries(id),
        total_cases TEXT NOT NULL,
        new_cases TEXT NOT NULL,
        total_deaths TEXT NOT NULL,
        new_deaths TEXT NOT NULL,
        total_recovered TEXT NOT NULL,
        active_cases TEXT NOT NULL,
        serious_cases TEXT NOT NULL,
        total_tests TEXT NOT NULL,
        population TEXT NOT NULL,
        created_by TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_by TEXT,
        updated_at TEXT
    )
    "#,
];

/// Credential and statistic storage on one SQLite database.
///
/// Counter mutations are single `UPDATE` statements; SQLite takes the write
/// lock before evaluating the `WHERE` clause, so the compare and the
/// increment cannot interleave with another writer.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> StorageResult<Self> {
        info!("Initializing SQLite storage at {}", database_url);
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn row_to_token(row: &SqliteRow) -> StorageResult<Token> {
        Ok(Token {
            id: parse_uuid("tokens", row.get("id"))?,
            user_id: parse_uuid("tokens", row.get("user_id"))?,
            token_key: row.get("token_key"),
            expires_at: parse_time("tokens", row.get("expired_at"))?,
            is_active: row.get("is_active"),
            created_at: parse_time("tokens", row.get("created_at"))?,
        })
    }

    fn row_to_user(row: &SqliteRow) -> StorageResult<User> {
        Ok(User {
            id: parse_uuid("users", row.get("id"))?,
            subscription_id: parse_uuid("users", row.get("subscription_id"))?,
            name: row.get("name"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            is_active: row.get("is_active"),
            created_at: parse_time("users", row.get("created_at"))?,
        })
    }

    fn row_to_counter(row: &SqliteRow) -> StorageResult<QuotaCounter> {
        Ok(QuotaCounter {
            user_id: parse_uuid("quota_counters", row.get("user_id"))?,
            total_request: row.get("total_request"),
            updated_by: row
                .get::<Option<String>, _>("updated_by")
                .map(|id| parse_uuid("quota_counters", id))
                .transpose()?,
            updated_at: row
                .get::<Option<String>, _>("updated_at")
                .map(|t| parse_time("quota_counters", t))
                .transpose()?,
        })
    }

    fn row_to_continent(row: &SqliteRow) -> StorageResult<Continent> {
        Ok(Continent {
            id: parse_uuid("continents", row.get("id"))?,
            name: row.get("name"),
            code: row.get("code"),
        })
    }

    fn row_to_country(row: &SqliteRow) -> StorageResult<Country> {
        Ok(Country {
            id: parse_uuid("countries", row.get("id"))?,
            continent_id: row
                .get::<Option<String>, _>("continent_id")
                .map(|id| parse_uuid("countries", id))
                .transpose()?,
            name: row.get("name"),
            code: row.get("code"),
        })
    }

    fn row_to_plan(row: &SqliteRow) -> StorageResult<SubscriptionPlan> {
        Ok(SubscriptionPlan {
            id: parse_uuid("subscription_plans", row.get("id"))?,
            subscription_type: row.get("subscription_type"),
            request_per_day: row.get("request_per_day"),
        })
    }

    fn row_to_statistic(row: &SqliteRow) -> StorageResult<StatisticRecord> {
        Ok(StatisticRecord {
            id: parse_uuid("statistics", row.get("id"))?,
            country_id: parse_uuid("statistics", row.get("country_id"))?,
            values: StatisticValues {
                total_cases: row.get("total_cases"),
                new_cases: row.get("new_cases"),
                total_deaths: row.get("total_deaths"),
                new_deaths: row.get("new_deaths"),
                total_recovered: row.get("total_recovered"),
                active_cases: row.get("active_cases"),
                serious_cases: row.get("serious_cases"),
                total_tests: row.get("total_tests"),
                population: row.get("population"),
            },
            created_by: parse_uuid("statistics", row.get("created_by"))?,
            created_at: parse_time("statistics", row.get("created_at"))?,
            updated_by: row
                .get::<Option<String>, _>("updated_by")
                .map(|id| parse_uuid("statistics", id))
                .transpose()?,
            updated_at: row
                .get::<Option<String>, _>("updated_at")
                .map(|t| parse_time("statistics", t))
                .transpose()?,
        })
    }
}

// UNIQUE violations surface as `Conflict` so callers can answer 409.
fn unique_as_conflict(e: sqlx::Error, message: impl FnOnce() -> String) -> StorageError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict(message()),
        e => e.into(),
    }
}

fn parse_uuid(table: &'static str, value: String) -> StorageResult<Uuid> {
    Uuid::parse_str(&value).map_err(|e| StorageError::corrupt(table, e))
}

fn parse_time(table: &'static str, value: String) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::corrupt(table, e))
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn get_token_by_key(&self, token_key: &str) -> StorageResult<Option<Token>> {
        let row = sqlx::query("SELECT * FROM tokens WHERE token_key = ?")
            .bind(token_key)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_token).transpose()
    }

    async fn get_token(&self, token_id: Uuid) -> StorageResult<Option<Token>> {
        let row = sqlx::query("SELECT * FROM tokens WHERE id = ?")
            .bind(token_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_token).transpose()
    }

    async fn list_tokens(&self) -> StorageResult<Vec<Token>> {
        let rows = sqlx::query("SELECT * FROM tokens ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_token).collect()
    }

    async fn get_user(&self, user_id: Uuid) -> StorageResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn get_plan(&self, plan_id: Uuid) -> StorageResult<Option<SubscriptionPlan>> {
        let row = sqlx::query("SELECT * FROM subscription_plans WHERE id = ?")
            .bind(plan_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_plan).transpose()
    }

    async fn list_plans(&self) -> StorageResult<Vec<SubscriptionPlan>> {
        let rows = sqlx::query("SELECT * FROM subscription_plans ORDER BY request_per_day ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_plan).collect()
    }

    async fn insert_plan(&self, plan: &SubscriptionPlan) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscription_plans (id, subscription_type, request_per_day, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(plan.id.to_string())
        .bind(&plan.subscription_type)
        .bind(plan.request_per_day)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_user(&self, user: &User, token: &Token) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, subscription_id, name, email, password_hash, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(user.subscription_id.to_string())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_as_conflict(e, || format!("email already registered: {}", user.email)))?;

        sqlx::query(
            r#"
            INSERT INTO tokens (id, user_id, token_key, expired_at, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(token.id.to_string())
        .bind(token.user_id.to_string())
        .bind(&token.token_key)
        .bind(token.expires_at.to_rfc3339())
        .bind(token.is_active)
        .bind(token.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_as_conflict(e, || "token key already issued".to_string()))?;

        sqlx::query("INSERT INTO quota_counters (user_id, total_request, created_at) VALUES (?, 0, ?)")
            .bind(user.id.to_string())
            .bind(user.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_counter(&self, user_id: Uuid) -> StorageResult<Option<QuotaCounter>> {
        let row = sqlx::query("SELECT * FROM quota_counters WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_counter).transpose()
    }

    async fn list_counters(&self) -> StorageResult<Vec<QuotaCounter>> {
        let rows = sqlx::query("SELECT * FROM quota_counters ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_counter).collect()
    }

    async fn try_consume_quota(&self, user_id: Uuid, limit: i64) -> StorageResult<QuotaDecision> {
        let result = sqlx::query(
            r#"
            UPDATE quota_counters
            SET total_request = total_request + 1,
                updated_by = ?,
                updated_at = ?
            WHERE user_id = ? AND total_request < ?
            "#,
        )
        .bind(user_id.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(user_id.to_string())
        .bind(limit)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(QuotaDecision::Allowed);
        }

        let exists = sqlx::query("SELECT 1 FROM quota_counters WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .is_some();

        Ok(if exists {
            QuotaDecision::Exhausted
        } else {
            QuotaDecision::Missing
        })
    }

    async fn list_counter_owners(&self) -> StorageResult<Vec<Uuid>> {
        let rows = sqlx::query("SELECT user_id FROM quota_counters")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| parse_uuid("quota_counters", row.get("user_id")))
            .collect()
    }

    async fn reset_counter(&self, user_id: Uuid, actor: Uuid) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE quota_counters
            SET total_request = 0,
                updated_by = ?,
                updated_at = ?
            WHERE user_id = ? AND total_request <> 0
            "#,
        )
        .bind(actor.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reset_all_counters(&self, actor: Uuid) -> StorageResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE quota_counters
            SET total_request = 0,
                updated_by = ?,
                updated_at = ?
            WHERE total_request <> 0
            "#,
        )
        .bind(actor.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl StatisticStore for SqliteStore {
    async fn list_continents(&self) -> StorageResult<Vec<Continent>> {
        let rows = sqlx::query("SELECT * FROM continents ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_continent).collect()
    }

    async fn get_continent(&self, continent_id: Uuid) -> StorageResult<Option<Continent>> {
        let row = sqlx::query("SELECT * FROM continents WHERE id = ?")
            .bind(continent_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_continent).transpose()
    }

    async fn get_continent_by_name(&self, name: &str) -> StorageResult<Option<Continent>> {
        let row = sqlx::query("SELECT * FROM continents WHERE name = ?")
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_continent).transpose()
    }

    async fn insert_continent(&self, continent: &Continent) -> StorageResult<()> {
        sqlx::query("INSERT INTO continents (id, name, code) VALUES (?, ?, ?)")
            .bind(continent.id.to_string())
            .bind(&continent.name)
            .bind(&continent.code)
            .execute(&self.pool)
            .await
            .map_err(|e| unique_as_conflict(e, || format!("continent already exists: {}", continent.name)))?;

        Ok(())
    }

    async fn list_countries(&self) -> StorageResult<Vec<Country>> {
        let rows = sqlx::query("SELECT * FROM countries ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_country).collect()
    }

    async fn get_country(&self, country_id: Uuid) -> StorageResult<Option<Country>> {
        let row = sqlx::query("SELECT * FROM countries WHERE id = ?")
            .bind(country_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_country).transpose()
    }

    async fn insert_country(&self, country: &Country) -> StorageResult<()> {
        sqlx::query("INSERT INTO countries (id, continent_id, name, code) VALUES (?, ?, ?, ?)")
            .bind(country.id.to_string())
            .bind(country.continent_id.map(|id| id.to_string()))
            .bind(&country.name)
            .bind(&country.code)
            .execute(&self.pool)
            .await
            .map_err(|e| unique_as_conflict(e, || format!("country already exists: {}", country.name)))?;

        Ok(())
    }

    async fn upsert_statistic(
        &self,
        country_id: Uuid,
        values: &StatisticValues,
        actor: Uuid,
    ) -> StorageResult<StatisticRecord> {
        let now = Utc::now().to_rfc3339();

        // On conflict the incoming created_by/created_at become the update
        // marker and the stored creation fields are left alone.
        let row = sqlx::query(
            r#"
            INSERT INTO statistics
            (id, country_id, total_cases, new_cases, total_deaths, new_deaths, total_recovered,
             active_cases, serious_cases, total_tests, population, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(country_id) DO UPDATE SET
                total_cases = excluded.total_cases,
                new_cases = excluded.new_cases,
                total_deaths = excluded.total_deaths,
                new_deaths = excluded.new_deaths,
                total_recovered = excluded.total_recovered,
                active_cases = excluded.active_cases,
                serious_cases = excluded.serious_cases,
                total_tests = excluded.total_tests,
                population = excluded.population,
                updated_by = excluded.created_by,
                updated_at = excluded.created_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(country_id.to_string())
        .bind(&values.total_cases)
        .bind(&values.new_cases)
        .bind(&values.total_deaths)
        .bind(&values.new_deaths)
        .bind(&values.total_recovered)
        .bind(&values.active_cases)
        .bind(&values.serious_cases)
        .bind(&values.total_tests)
        .bind(&values.population)
        .bind(actor.to_string())
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_statistic(&row)
    }

    async fn list_statistics(&self, pagination: &Pagination) -> StorageResult<Vec<StatisticRecord>> {
        let pagination = pagination.check();
        let rows = sqlx::query(
            r#"
            SELECT s.* FROM statistics s
            JOIN countries c ON c.id = s.country_id
            ORDER BY c.name ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(pagination.limit() as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_statistic).collect()
    }

    async fn list_statistics_by_continent(
        &self,
        continent_id: Uuid,
        pagination: &Pagination,
    ) -> StorageResult<Vec<StatisticRecord>> {
        let pagination = pagination.check();
        let rows = sqlx::query(
            r#"
            SELECT s.* FROM statistics s
            JOIN countries c ON c.id = s.country_id
            WHERE c.continent_id = ?
            ORDER BY c.name ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(continent_id.to_string())
        .bind(pagination.limit() as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_statistic).collect()
    }

    async fn get_statistic_by_country(&self, country_name: &str) -> StorageResult<Option<StatisticRecord>> {
        let row = sqlx::query(
            r#"
            SELECT s.* FROM statistics s
            JOIN countries c ON c.id = s.country_id
            WHERE LOWER(c.name) = LOWER(?)
            "#,
        )
        .bind(country_name.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_statistic).transpose()
    }
}
