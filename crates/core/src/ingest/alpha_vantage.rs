use crate::config::{non_empty_var, parsed_var, Settings};
use crate::domain::nullable;
use crate::domain::stock::AlphaMetrics;
use crate::ingest::error::SourceError;
use crate::ingest::gate::{FixedDelay, RequestGate};
use crate::ingest::AlphaSource;
use crate::ingest::{build_http_client, decode, ensure_success, send_and_read, source_timeout};
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";
pub const DEFAULT_DELAY_SECS: u64 = 15;

const PROVIDER: &str = "alpha_vantage";
const QUOTE_KEY: &str = "Global Quote";
const TRADING_DAY_KEY: &str = "07. latest trading day";

/// GLOBAL_QUOTE client. The free tier allows a handful of calls per minute, so every request
/// first passes through the configured [`RequestGate`].
#[derive(Clone)]
pub struct AlphaVantageClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    gate: Arc<dyn RequestGate>,
}

impl std::fmt::Debug for AlphaVantageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlphaVantageClient")
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

impl AlphaVantageClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = non_empty_var("ALPHA_VANTAGE_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let delay = Duration::from_secs(parsed_var("ALPHA_VANTAGE_DELAY_SECS", DEFAULT_DELAY_SECS));
        let http = build_http_client(source_timeout())?;

        Ok(Self::new(
            http,
            base_url,
            settings.alpha_vantage_api_key.clone(),
            Arc::new(FixedDelay::new(delay)),
        ))
    }

    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        gate: Arc<dyn RequestGate>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
            gate,
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn RequestGate>) -> Self {
        self.gate = gate;
        self
    }
}

#[async_trait::async_trait]
impl AlphaSource for AlphaVantageClient {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_alpha(&self, ticker: &str) -> Result<AlphaMetrics, SourceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(SourceError::MissingCredential {
                provider: PROVIDER,
                var: "ALPHA_VANTAGE_API_KEY",
            })?;

        self.gate.wait().await;

        let req = self.http.get(&self.base_url).query(&[
            ("function", "GLOBAL_QUOTE"),
            ("symbol", ticker),
            ("apikey", api_key),
        ]);
        let (status, text) = send_and_read(req, PROVIDER, "global_quote").await?;
        let metrics = parse_global_quote(status, &text)?;

        if metrics.latest_trading_day.is_none() {
            tracing::warn!(%ticker, "alpha vantage quote has no latest trading day");
        }
        Ok(metrics)
    }
}

fn reported(message: String) -> SourceError {
    SourceError::Reported {
        provider: PROVIDER,
        message,
    }
}

fn text_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(Value::as_str)
}

fn parse_global_quote(status: StatusCode, text: &str) -> Result<AlphaMetrics, SourceError> {
    ensure_success(status, text, PROVIDER, "global_quote")?;
    let body: Value = decode(text, PROVIDER, "global_quote")?;

    if let Some(msg) = text_field(&body, "Error Message") {
        return Err(reported(format!("error message: {msg}")));
    }
    if let Some(note) = text_field(&body, "Note").or_else(|| text_field(&body, "Information")) {
        return Err(reported(format!("rate limit note: {note}")));
    }

    let quote = body
        .get(QUOTE_KEY)
        .and_then(Value::as_object)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| reported(format!("'{QUOTE_KEY}' missing from response")))?;

    let latest_trading_day = match quote.get(TRADING_DAY_KEY).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Some(
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| SourceError::Decode {
                provider: PROVIDER,
                stage: "global_quote",
                detail: format!("invalid '{TRADING_DAY_KEY}' {s:?}: {e}"),
                body: text.to_string(),
            })?,
        ),
        _ => None,
    };

    let alpha = match quote.get("alpha") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()),
        Some(Value::String(s)) => nullable::parse_number(s).map_err(|detail| SourceError::Decode {
            provider: PROVIDER,
            stage: "global_quote",
            detail,
            body: text.to_string(),
        })?,
        Some(other) => {
            return Err(SourceError::Decode {
                provider: PROVIDER,
                stage: "global_quote",
                detail: format!("unexpected alpha value {other}"),
                body: text.to_string(),
            })
        }
    };

    Ok(AlphaMetrics {
        alpha,
        latest_trading_day,
    })
}
