use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Envelope for every JSON body the API returns.
#[derive(Debug, Deserialize, Serialize)]
pub struct HttpResponse<T> {
    pub code: u16,
    pub message: String,
    pub body: T,
}

impl<T> HttpResponse<T> {
    pub fn new(code: u16, message: String, body: T) -> Self {
        Self { code, message, body }
    }
}

pub fn client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// GET `url` and decode the JSON body, failing on a non-success status.
pub async fn fetch_json<T: DeserializeOwned>(client: &reqwest::Client, url: &str) -> reqwest::Result<T> {
    info!("visiting {}", url);
    client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<T>()
        .await
}
