use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Continent {
    pub id: Uuid,
    pub name: String,
    pub code: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Country {
    pub id: Uuid,
    #[serde(default)]
    pub continent_id: Option<Uuid>,
    pub name: String,
    pub code: String,
}

/// The numeric-as-text columns shared by snapshots and stored records.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatisticValues {
    #[serde(default)]
    pub total_cases: String,
    #[serde(default)]
    pub new_cases: String,
    #[serde(default)]
    pub total_deaths: String,
    #[serde(default)]
    pub new_deaths: String,
    #[serde(default)]
    pub total_recovered: String,
    #[serde(default)]
    pub active_cases: String,
    #[serde(default)]
    pub serious_cases: String,
    #[serde(default)]
    pub total_tests: String,
    #[serde(default)]
    pub population: String,
}

impl StatisticValues {
    /// Empty cells are reported as "0", the way the upstream table shows them.
    pub fn fill_blanks(&mut self) {
        for field in [
            &mut self.total_cases,
            &mut self.new_cases,
            &mut self.total_deaths,
            &mut self.new_deaths,
            &mut self.total_recovered,
            &mut self.active_cases,
            &mut self.serious_cases,
            &mut self.total_tests,
            &mut self.population,
        ] {
            let trimmed = field.trim();
            *field = if trimmed.is_empty() {
                "0".to_string()
            } else {
                trimmed.to_string()
            };
        }
    }
}

/// One country's figures as produced by the external source, keyed by name.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StatisticSnapshot {
    pub country: String,
    #[serde(flatten)]
    pub values: StatisticValues,
}

/// The current record for a country. At most one exists per `country_id`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StatisticRecord {
    pub id: Uuid,
    pub country_id: Uuid,
    #[serde(flatten)]
    pub values: StatisticValues,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
}
