use crate::config::{non_empty_var, Settings};
use crate::domain::stock::RecommendationRecord;
use crate::ingest::error::SourceError;
use crate::ingest::{build_http_client, decode, ensure_success, send_and_read, source_timeout};
use crate::ingest::RatingSource;
use reqwest::StatusCode;
use serde::Deserialize;

pub const DEFAULT_LIST_URL: &str = "https://api.karenai.click/swechallenge/list";

const PROVIDER: &str = "karenai";

/// Analyst recommendation feed.
///
/// Only the first page is read. The feed hands out a `next_page` token, but following it is
/// left for later; the token is logged so a truncated feed is visible.
#[derive(Debug, Clone)]
pub struct KarenaiClient {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<RecommendationRecord>,
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RatingsPage {
    pub items: Vec<RecommendationRecord>,
    pub next_page: Option<String>,
}

impl KarenaiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let url = non_empty_var("KARENAI_API_URL").unwrap_or_else(|| DEFAULT_LIST_URL.to_string());
        let http = build_http_client(source_timeout())?;
        Ok(Self::new(http, url, settings.karenai_api_key.clone()))
    }

    pub fn new(http: reqwest::Client, url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            url: url.into(),
            api_key,
        }
    }

    pub async fn fetch_page(&self) -> Result<RatingsPage, SourceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(SourceError::MissingCredential {
                provider: PROVIDER,
                var: "KARENAI_API_KEY",
            })?;

        tracing::debug!(url = %self.url, "requesting recommendations");
        let req = self
            .http
            .get(&self.url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json");

        let (status, text) = send_and_read(req, PROVIDER, "list").await?;
        parse_list(status, &text)
    }
}

#[async_trait::async_trait]
impl RatingSource for KarenaiClient {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_ratings(&self) -> Result<Vec<RecommendationRecord>, SourceError> {
        let page = self.fetch_page().await?;
        if let Some(next) = page.next_page.as_deref().filter(|s| !s.is_empty()) {
            tracing::info!(
                next_page = %next,
                items = page.items.len(),
                "recommendation feed has more pages; only the first is used"
            );
        }
        Ok(page.items)
    }
}

fn parse_list(status: StatusCode, text: &str) -> Result<RatingsPage, SourceError> {
    ensure_success(status, text, PROVIDER, "list")?;
    let parsed: ListResponse = decode(text, PROVIDER, "list")?;

    let mut items = Vec::with_capacity(parsed.items.len());
    for mut item in parsed.items {
        let ticker = item.ticker.trim().to_ascii_uppercase();
        if ticker.is_empty() {
            tracing::warn!(company = %item.company, "dropping recommendation without ticker");
            continue;
        }
        item.ticker = ticker;
        items.push(item);
    }

    Ok(RatingsPage {
        items,
        next_page: parsed.next_page,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_items_and_next_page() {
        let body = json!({
            "items": [
                {
                    "ticker": "bsbr ",
                    "target_from": "$4.20",
                    "target_to": "$4.70",
                    "company": "Banco Santander (Brasil)",
                    "action": "upgraded by",
                    "brokerage": "The Goldman Sachs Group",
                    "rating_from": "Sell",
                    "rating_to": "Neutral",
                    "time": "2025-01-13T00:30:05.813548892Z"
                },
                {
                    "ticker": "VYGR",
                    "target_from": "",
                    "target_to": "14",
                    "company": "Voyager Therapeutics",
                    "action": "Buy",
                    "brokerage": "Wedbush",
                    "rating_from": "",
                    "rating_to": "Outperform"
                }
            ],
            "next_page": "VYGR"
        })
        .to_string();

        let page = parse_list(StatusCode::OK, &body).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].ticker, "BSBR");
        assert_eq!(page.items[0].target_to, Some(4.70));
        assert_eq!(page.items[1].target_from, None);
        assert_eq!(page.items[1].target_to, Some(14.0));
        assert_eq!(page.next_page.as_deref(), Some("VYGR"));
    }

    #[test]
    fn drops_items_without_ticker() {
        let body = json!({"items": [{"ticker": "  "}, {"ticker": "AAPL"}]}).to_string();
        let page = parse_list(StatusCode::OK, &body).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].ticker, "AAPL");
    }

    #[test]
    fn non_success_status_keeps_body() {
        let err = parse_list(StatusCode::UNAUTHORIZED, "{\"error\":\"bad token\"}").unwrap_err();
        match err {
            SourceError::Status { status, body, .. } => {
                assert_eq!(status, 401);
                assert_eq!(body, "{\"error\":\"bad token\"}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let err = parse_list(StatusCode::OK, "not json").unwrap_err();
        assert!(matches!(err, SourceError::Decode { .. }));

        let body = json!({"items": [{"ticker": "X", "target_to": "soon"}]}).to_string();
        let err = parse_list(StatusCode::OK, &body).unwrap_err();
        assert!(matches!(err, SourceError::Decode { .. }));
    }

    #[tokio::test]
    async fn missing_credential_fails_without_a_request() {
        let client = KarenaiClient::new(reqwest::Client::new(), "http://127.0.0.1:9", None);
        let err = client.fetch_ratings().await.unwrap_err();
        assert!(matches!(
            err,
            SourceError::MissingCredential {
                var: "KARENAI_API_KEY",
                ..
            }
        ));
    }
}
