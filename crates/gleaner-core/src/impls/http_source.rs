//! Listing service over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::domain::RawJob;
use crate::error::{SourceFetchError, truncate_reason};
use crate::ports::JobSource;

/// `GET {url}?query=..&limit=..`, answered with a JSON array of listings.
pub struct HttpJobSource {
    client: Client,
    url: String,
}

impl HttpJobSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl JobSource for HttpJobSource {
    async fn fetch_listings(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RawJob>, SourceFetchError> {
        tracing::debug!(url = %self.url, query, limit, "fetching listings");

        let limit_param = limit.to_string();
        let response = self
            .client
            .get(&self.url)
            .query(&[("query", query), ("limit", limit_param.as_str())])
            .send()
            .await
            .map_err(|e| SourceFetchError(truncate_reason(&e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceFetchError(truncate_reason(&format!(
                "status {}: {body}",
                status.as_u16()
            ))));
        }

        let mut listings: Vec<RawJob> = response
            .json()
            .await
            .map_err(|e| SourceFetchError(format!("invalid listing response: {e}")))?;
        listings.truncate(limit);
        Ok(listings)
    }
}
