pub mod source;
pub mod types;

pub use source::{canonical_country, HttpStatisticSource, SourceError, StatisticSource};
pub use types::{Continent, Country, StatisticRecord, StatisticSnapshot, StatisticValues};
