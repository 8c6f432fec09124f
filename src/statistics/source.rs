use std::time::Duration;

use async_trait::async_trait;

use super::types::StatisticSnapshot;
use crate::utils::http::{client, fetch_json};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("statistic source request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("statistic source returned no rows")]
    Empty,
}

/// Where per-country snapshots come from.
#[async_trait]
pub trait StatisticSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<Vec<StatisticSnapshot>, SourceError>;
}

/// Upstream short names mapped to the names used in the country table.
const COUNTRY_ALIASES: [(&str, &str); 8] = [
    ("Czechia", "Czech Republic"),
    ("DRC", "DR Congo"),
    ("Ivory Coast", "Cote D'Ivoire"),
    ("CAR", "Central African Republic"),
    ("UAE", "United Arab Emirates"),
    ("UK", "United Kingdom"),
    ("USA", "United States"),
    ("S.Korea", "South Korea"),
];

pub fn canonical_country(name: &str) -> String {
    let name = name.trim();
    COUNTRY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Snapshot list served as JSON over HTTP.
pub struct HttpStatisticSource {
    client: reqwest::Client,
    url: String,
}

impl HttpStatisticSource {
    pub fn new(url: impl Into<String>) -> Result<Self, SourceError> {
        Ok(Self {
            client: client(Duration::from_secs(30))?,
            url: url.into(),
        })
    }

    fn normalize(mut snapshots: Vec<StatisticSnapshot>) -> Vec<StatisticSnapshot> {
        for snapshot in &mut snapshots {
            snapshot.country = canonical_country(&snapshot.country);
            snapshot.values.fill_blanks();
        }
        snapshots
    }
}

#[async_trait]
impl StatisticSource for HttpStatisticSource {
    async fn fetch(&self) -> Result<Vec<StatisticSnapshot>, SourceError> {
        let snapshots: Vec<StatisticSnapshot> = fetch_json(&self.client, &self.url).await?;
        if snapshots.is_empty() {
            return Err(SourceError::Empty);
        }
        Ok(Self::normalize(snapshots))
    }
}
