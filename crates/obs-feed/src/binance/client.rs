//! HTTP client for the P2P advertisement search endpoint.

use std::time::Duration;

use async_trait::async_trait;
use obs_core::{FeedError, QuoteQuery};
use tracing::debug;

use crate::transport;

/// One quote search round trip. Returns the raw response body.
#[async_trait]
pub trait QuoteApi: Send + Sync {
    async fn search(&self, query: &QuoteQuery) -> Result<Vec<u8>, FeedError>;
}

/// `POST {address}` with the query as JSON body.
pub struct HttpQuoteApi {
    http: reqwest::Client,
    address: String,
}

impl HttpQuoteApi {
    pub fn new(address: String, timeout: Duration) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Config(format!("building http client: {e}")))?;
        Ok(Self { http, address })
    }
}

#[async_trait]
impl QuoteApi for HttpQuoteApi {
    async fn search(&self, query: &QuoteQuery) -> Result<Vec<u8>, FeedError> {
        let label = query.label();
        let resp = self
            .http
            .post(&self.address)
            .json(query)
            .send()
            .await
            .map_err(|e| transport(&label, e))?;

        let status = resp.status();
        let body = resp.bytes().await.map_err(|e| transport(&label, e))?;
        if !status.is_success() {
            let snippet: String = String::from_utf8_lossy(&body).chars().take(200).collect();
            return Err(FeedError::Transport(format!("{label}: status {status}: {snippet}")));
        }

        debug!("[binance] {label}: {} bytes", body.len());
        Ok(body.to_vec())
    }
}
