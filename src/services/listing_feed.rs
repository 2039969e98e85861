use reqwest::Client;
use serde::Deserialize;

use crate::{error::FeedError, models::RawListing};

/// Pulls fresh listings from the hosted search index.
#[derive(Clone)]
pub struct ListingFeedClient {
    http: Client,
    url: String,
    api_key: String,
}

/// The index answers with either a bare array or an `{ "hits": [...] }` page.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FeedPage {
    Hits { hits: Vec<RawListing> },
    Listings { listings: Vec<RawListing> },
    Bare(Vec<RawListing>),
}

impl FeedPage {
    pub fn into_listings(self) -> Vec<RawListing> {
        match self {
            FeedPage::Hits { hits } => hits,
            FeedPage::Listings { listings } => listings,
            FeedPage::Bare(v) => v,
        }
    }
}

impl ListingFeedClient {
    pub fn new(url: String, api_key: String) -> Self {
        Self {
            http: Client::new(),
            url,
            api_key,
        }
    }

    /// Listings updated after `since` (unix millis), or everything the feed
    /// offers when `since` is `None`.
    pub async fn fetch(&self, since: Option<i64>) -> Result<Vec<RawListing>, FeedError> {
        let mut req = self.http.get(&self.url);
        if let Some(since) = since {
            req = req.query(&[("since", since)]);
        }
        if !self.api_key.trim().is_empty() {
            req = req.header("X-Api-Key", &self.api_key);
        }

        let res = req.send().await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(FeedError::Status { status, body });
        }

        Ok(res.json::<FeedPage>().await?.into_listings())
    }
}
