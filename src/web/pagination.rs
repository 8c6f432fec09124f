use serde::{Deserialize, Serialize};

const MAX_PAGE_SIZE: u64 = 100;
// Keeps `offset()` representable as an SQL integer.
const MAX_PAGE_INDEX: u64 = i64::MAX as u64 / MAX_PAGE_SIZE;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Pagination {
    #[serde(default = "default_index")]
    pub index: u64,
    #[serde(default = "default_size")]
    pub size: u64,
}

fn default_index() -> u64 {
    1
}

fn default_size() -> u64 {
    10
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            index: default_index(),
            size: default_size(),
        }
    }
}

impl Pagination {
    pub fn new(index: u64, size: u64) -> Self {
        Self { index, size }
    }

    pub fn offset(&self) -> u64 {
        self.index.saturating_sub(1).saturating_mul(self.size)
    }

    pub fn limit(&self) -> u64 {
        self.size
    }

    /// Falls back to the defaults on a zero index or size and caps both.
    pub fn check(&self) -> Self {
        if self.index < 1 || self.size < 1 {
            return Self::default();
        }
        Self {
            index: self.index.min(MAX_PAGE_INDEX),
            size: self.size.min(MAX_PAGE_SIZE),
        }
    }
}
