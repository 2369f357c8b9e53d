pub mod alpha_vantage;
pub mod error;
pub mod finnhub;
pub mod gate;
pub mod karenai;

use crate::config::parsed_var;
use crate::domain::stock::{AlphaMetrics, MarketMetrics, RecommendationRecord};
use anyhow::Context;
use error::SourceError;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Source of analyst recommendations.
#[async_trait::async_trait]
pub trait RatingSource: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_ratings(&self) -> Result<Vec<RecommendationRecord>, SourceError>;
}

/// Source of quote and fundamentals per ticker.
#[async_trait::async_trait]
pub trait MarketSource: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_market(&self, ticker: &str) -> Result<MarketMetrics, SourceError>;
}

/// Source of the alpha metric per ticker.
#[async_trait::async_trait]
pub trait AlphaSource: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_alpha(&self, ticker: &str) -> Result<AlphaMetrics, SourceError>;
}

/// One timeout for every upstream call, so a hung provider cannot stall a cycle forever.
pub fn source_timeout() -> Duration {
    Duration::from_secs(parsed_var("SOURCE_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS))
}

pub fn build_http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build source http client")
}

/// Sends a prepared request and returns the status with the full body text.
async fn send_and_read(
    req: reqwest::RequestBuilder,
    provider: &'static str,
    stage: &'static str,
) -> Result<(reqwest::StatusCode, String), SourceError> {
    let res = req
        .send()
        .await
        .map_err(|e| SourceError::transport(provider, stage, e))?;

    let status = res.status();
    let text = res
        .text()
        .await
        .map_err(|e| SourceError::transport(provider, stage, e))?;

    tracing::debug!(provider, stage, %status, body = %text, "source response");
    Ok((status, text))
}

fn ensure_success(
    status: reqwest::StatusCode,
    text: &str,
    provider: &'static str,
    stage: &'static str,
) -> Result<(), SourceError> {
    if status.is_success() {
        return Ok(());
    }
    Err(SourceError::Status {
        provider,
        stage,
        status: status.as_u16(),
        body: text.to_string(),
    })
}

fn decode<T: serde::de::DeserializeOwned>(
    text: &str,
    provider: &'static str,
    stage: &'static str,
) -> Result<T, SourceError> {
    serde_json::from_str::<T>(text).map_err(|e| SourceError::Decode {
        provider,
        stage,
        detail: e.to_string(),
        body: text.to_string(),
    })
}
