use crate::config::{non_empty_var, Settings};
use crate::domain::stock::MarketMetrics;
use crate::ingest::error::SourceError;
use crate::ingest::MarketSource;
use crate::ingest::{build_http_client, decode, ensure_success, send_and_read, source_timeout};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";

const PROVIDER: &str = "finnhub";

/// Quote and fundamentals client.
///
/// Every ticker costs two requests (`/stock/metric` and `/quote`). They fail independently:
/// an outage of one endpoint still yields the other half in [`PartialMarket`].
#[derive(Debug, Clone)]
pub struct FinnhubClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fundamentals {
    pub pe_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub market_capitalization: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub current_price: f64,
    pub latest_trading_day: Option<DateTime<Utc>>,
}

/// Outcome of both sub-requests for one ticker.
#[derive(Debug)]
pub struct PartialMarket {
    pub fundamentals: Result<Fundamentals, SourceError>,
    pub quote: Result<Quote, SourceError>,
}

impl PartialMarket {
    /// Collapses both halves. Any failing half makes the whole fetch fail, with every
    /// failure listed in the combined error.
    pub fn into_result(self) -> Result<MarketMetrics, SourceError> {
        match (self.fundamentals, self.quote) {
            (Ok(f), Ok(q)) => Ok(MarketMetrics {
                current_price: q.current_price,
                pe_ratio: f.pe_ratio,
                dividend_yield: f.dividend_yield,
                market_capitalization: f.market_capitalization,
                latest_trading_day: q.latest_trading_day,
            }),
            (f, q) => {
                let errors: Vec<SourceError> = [f.err(), q.err()].into_iter().flatten().collect();
                Err(SourceError::Combined(errors))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct MetricResponse {
    #[serde(default)]
    metric: MetricBody,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetricBody {
    #[serde(default, rename = "peExclExtraTTM")]
    pe_excl_extra_ttm: Option<f64>,
    #[serde(default)]
    pe_ratio: Option<f64>,
    #[serde(default)]
    dividend_yield_annually: Option<f64>,
    #[serde(default)]
    dividend_yield: Option<f64>,
    #[serde(default)]
    market_capitalization: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    c: f64,
    #[serde(default)]
    t: Option<i64>,
}

impl FinnhubClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let base_url =
            non_empty_var("FINNHUB_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let http = build_http_client(source_timeout())?;
        Ok(Self::new(http, base_url, settings.finnhub_api_key.clone()))
    }

    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn credential(&self) -> Result<&str, SourceError> {
        self.api_key
            .as_deref()
            .ok_or(SourceError::MissingCredential {
                provider: PROVIDER,
                var: "FINNHUB_API_KEY",
            })
    }

    /// Runs both sub-requests, keeping each half's outcome.
    pub async fn fetch_partial(&self, ticker: &str) -> Result<PartialMarket, SourceError> {
        let token = self.credential()?;

        let fundamentals = self.fetch_fundamentals(ticker, token).await;
        if let Err(err) = &fundamentals {
            tracing::warn!(%ticker, error = %err, "finnhub metric request failed");
        }

        let quote = self.fetch_quote(ticker, token).await;
        if let Err(err) = &quote {
            tracing::warn!(%ticker, error = %err, "finnhub quote request failed");
        }

        Ok(PartialMarket {
            fundamentals,
            quote,
        })
    }

    async fn fetch_fundamentals(
        &self,
        ticker: &str,
        token: &str,
    ) -> Result<Fundamentals, SourceError> {
        let req = self.http.get(self.url("stock/metric")).query(&[
            ("symbol", ticker),
            ("metricType", "all"),
            ("token", token),
        ]);
        let (status, text) = send_and_read(req, PROVIDER, "metric").await?;
        parse_metric(status, &text)
    }

    async fn fetch_quote(&self, ticker: &str, token: &str) -> Result<Quote, SourceError> {
        let req = self
            .http
            .get(self.url("quote"))
            .query(&[("symbol", ticker), ("token", token)]);
        let (status, text) = send_and_read(req, PROVIDER, "quote").await?;
        parse_quote(status, &text)
    }
}

#[async_trait::async_trait]
impl MarketSource for FinnhubClient {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_market(&self, ticker: &str) -> Result<MarketMetrics, SourceError> {
        self.fetch_partial(ticker).await?.into_result()
    }
}

/// A preferred value of exactly zero counts as missing and defers to the alternate.
fn prefer_non_zero(preferred: Option<f64>, alternate: Option<f64>) -> Option<f64> {
    match preferred {
        Some(v) if v != 0.0 => Some(v),
        _ => alternate,
    }
}

fn parse_metric(status: StatusCode, text: &str) -> Result<Fundamentals, SourceError> {
    ensure_success(status, text, PROVIDER, "metric")?;
    let parsed: MetricResponse = decode(text, PROVIDER, "metric")?;
    let m = parsed.metric;

    Ok(Fundamentals {
        pe_ratio: prefer_non_zero(m.pe_excl_extra_ttm, m.pe_ratio),
        dividend_yield: prefer_non_zero(m.dividend_yield_annually, m.dividend_yield),
        market_capitalization: m.market_capitalization,
    })
}

fn parse_quote(status: StatusCode, text: &str) -> Result<Quote, SourceError> {
    ensure_success(status, text, PROVIDER, "quote")?;
    let parsed: QuoteResponse = decode(text, PROVIDER, "quote")?;

    let latest_trading_day = match parsed.t {
        Some(ts) if ts != 0 => Some(DateTime::<Utc>::from_timestamp(ts, 0).ok_or_else(|| {
            SourceError::Decode {
                provider: PROVIDER,
                stage: "quote",
                detail: format!("timestamp {ts} out of range"),
                body: text.to_string(),
            }
        })?),
        _ => None,
    };

    Ok(Quote {
        current_price: parsed.c,
        latest_trading_day,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn metric_prefers_primary_fields() {
        let body = json!({
            "metric": {
                "peExclExtraTTM": 28.4,
                "peRatio": 30.1,
                "dividendYieldAnnually": 0.52,
                "dividendYield": 0.49,
                "marketCapitalization": 2_950_000.0
            },
            "symbol": "AAPL"
        })
        .to_string();

        let f = parse_metric(StatusCode::OK, &body).unwrap();
        assert_eq!(f.pe_ratio, Some(28.4));
        assert_eq!(f.dividend_yield, Some(0.52));
        assert_eq!(f.market_capitalization, Some(2_950_000.0));
    }

    #[test]
    fn metric_falls_back_when_primary_is_zero_or_missing() {
        let body = json!({
            "metric": {
                "peExclExtraTTM": 0,
                "peRatio": 30.1,
                "dividendYieldAnnually": null,
                "dividendYield": 0.49
            }
        })
        .to_string();

        let f = parse_metric(StatusCode::OK, &body).unwrap();
        assert_eq!(f.pe_ratio, Some(30.1));
        assert_eq!(f.dividend_yield, Some(0.49));
        assert_eq!(f.market_capitalization, None);
    }

    #[test]
    fn metric_without_any_value_is_absent_not_zero() {
        let f = parse_metric(StatusCode::OK, "{\"metric\":{}}").unwrap();
        assert_eq!(f, Fundamentals::default());

        let f = parse_metric(StatusCode::OK, "{}").unwrap();
        assert_eq!(f.pe_ratio, None);
    }

    #[test]
    fn quote_zero_timestamp_means_no_trading_day() {
        let q = parse_quote(StatusCode::OK, "{\"c\": 187.3, \"t\": 0}").unwrap();
        assert_eq!(q.current_price, 187.3);
        assert_eq!(q.latest_trading_day, None);

        let q = parse_quote(StatusCode::OK, "{\"c\": 187.3, \"t\": 1746216000}").unwrap();
        assert_eq!(
            q.latest_trading_day,
            Some(Utc.with_ymd_and_hms(2025, 5, 2, 20, 0, 0).unwrap())
        );
    }

    #[test]
    fn quote_without_price_is_malformed() {
        let err = parse_quote(StatusCode::OK, "{\"t\": 1746216000}").unwrap_err();
        assert!(matches!(err, SourceError::Decode { stage: "quote", .. }));
    }

    #[test]
    fn partial_failure_collapses_into_combined_error() {
        let partial = PartialMarket {
            fundamentals: Ok(Fundamentals {
                pe_ratio: Some(12.0),
                ..Fundamentals::default()
            }),
            quote: parse_quote(StatusCode::TOO_MANY_REQUESTS, "limit"),
        };

        match partial.into_result().unwrap_err() {
            SourceError::Combined(errs) => {
                assert_eq!(errs.len(), 1);
                assert!(matches!(errs[0], SourceError::Status { status: 429, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn both_halves_merge_into_metrics() {
        let partial = PartialMarket {
            fundamentals: parse_metric(
                StatusCode::OK,
                "{\"metric\":{\"peRatio\":15.0,\"marketCapitalization\":900.0}}",
            ),
            quote: parse_quote(StatusCode::OK, "{\"c\": 42.0, \"t\": 0}"),
        };

        let m = partial.into_result().unwrap();
        assert_eq!(m.current_price, 42.0);
        assert_eq!(m.pe_ratio, Some(15.0));
        assert_eq!(m.dividend_yield, None);
        assert_eq!(m.market_capitalization, Some(900.0));
        assert_eq!(m.latest_trading_day, None);
    }

    #[tokio::test]
    async fn missing_credential_fails_fast() {
        let client = FinnhubClient::new(reqwest::Client::new(), DEFAULT_BASE_URL, None);
        let err = client.fetch_market("AAPL").await.unwrap_err();
        assert!(matches!(
            err,
            SourceError::MissingCredential {
                var: "FINNHUB_API_KEY",
                ..
            }
        ));
    }

    #[test]
    fn builds_urls_without_double_slashes() {
        let client = FinnhubClient::new(reqwest::Client::new(), "http://localhost:8080/", None);
        assert_eq!(client.url("quote"), "http://localhost:8080/quote");
    }

    #[test]
    fn metric_reads_preferred_pe_on_its_own() {
        let f = parse_metric(StatusCode::OK, "{\"metric\":{\"peExclExtraTTM\":28.4}}").unwrap();
        assert_eq!(f.pe_ratio, Some(28.4));
    }

    #[tokio::test]
    async fn quote_is_still_requested_when_metric_fails() {
        let client = FinnhubClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            Some("secret-token".to_string()),
        );

        let partial = client.fetch_partial("AAPL").await.unwrap();
        assert!(matches!(
            partial.fundamentals,
            Err(SourceError::Transport { stage: "metric", .. })
        ));
        assert!(matches!(
            partial.quote,
            Err(SourceError::Transport { stage: "quote", .. })
        ));

        let err = partial.into_result().unwrap_err();
        match &err {
            SourceError::Combined(errs) => assert_eq!(errs.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!err.to_string().contains("secret-token"), "{err}");
    }
}
