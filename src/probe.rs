//! Image URL reachability probe

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait UrlProbe: Send + Sync {
    /// Whether the URL answers a HEAD request with 200 OK
    async fn probe(&self, url: &str) -> bool;
}

pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl UrlProbe for HttpProbe {
    async fn probe(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(resp) => {
                debug!("HEAD {} -> {}", url, resp.status());
                resp.status() == reqwest::StatusCode::OK
            }
            Err(e) => {
                debug!("HEAD {} failed: {}", url, e);
                false
            }
        }
    }
}

/// Probe that answers the same for every URL; for offline runs and tests
pub struct StaticProbe(pub bool);

#[async_trait]
impl UrlProbe for StaticProbe {
    async fn probe(&self, _url: &str) -> bool {
        self.0
    }
}
