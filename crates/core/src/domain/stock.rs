use crate::domain::nullable;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One analyst recommendation as reported by the rating source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub ticker: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub brokerage: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub rating_from: String,
    #[serde(default)]
    pub rating_to: String,
    #[serde(default, with = "nullable::number")]
    pub target_from: Option<f64>,
    #[serde(default, with = "nullable::number")]
    pub target_to: Option<f64>,
}

/// Quote and fundamentals for one ticker.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarketMetrics {
    pub current_price: f64,
    pub pe_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub market_capitalization: Option<f64>,
    pub latest_trading_day: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlphaMetrics {
    pub alpha: Option<f64>,
    pub latest_trading_day: Option<NaiveDate>,
}

/// A recommendation after a full enrichment pass. This is what gets persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedStock {
    pub ticker: String,
    pub company: String,
    pub brokerage: String,
    pub action: String,
    pub rating_from: String,
    pub rating_to: String,
    #[serde(default, with = "nullable::number")]
    pub target_from: Option<f64>,
    #[serde(default, with = "nullable::number")]
    pub target_to: Option<f64>,
    pub current_price: f64,
    #[serde(default, with = "nullable::number")]
    pub pe_ratio: Option<f64>,
    #[serde(default, with = "nullable::number")]
    pub dividend_yield: Option<f64>,
    #[serde(default, with = "nullable::number")]
    pub market_capitalization: Option<f64>,
    #[serde(default, with = "nullable::number")]
    pub alpha: Option<f64>,
    #[serde(default, with = "nullable::datetime")]
    pub latest_trading_day: Option<DateTime<Utc>>,
    pub recommendation_score: f64,
}

/// An enriched stock together with the fields assigned by storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredStock {
    pub id: Uuid,
    #[serde(flatten)]
    pub stock: EnrichedStock,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample() -> EnrichedStock {
        EnrichedStock {
            ticker: "AAPL".to_string(),
            company: "Apple Inc.".to_string(),
            brokerage: "Morgan Stanley".to_string(),
            action: "Buy".to_string(),
            rating_from: "".to_string(),
            rating_to: "Overweight".to_string(),
            target_from: None,
            target_to: Some(240.0),
            current_price: 0.0,
            pe_ratio: None,
            dividend_yield: None,
            market_capitalization: None,
            alpha: None,
            latest_trading_day: None,
            recommendation_score: 5.0,
        }
    }

    #[test]
    fn decodes_rating_source_item() {
        let v = json!({
            "ticker": "BSBR",
            "target_from": "4.20",
            "target_to": "$4.70",
            "company": "Banco Santander (Brasil)",
            "action": "upgraded by",
            "brokerage": "The Goldman Sachs Group",
            "rating_from": "Sell",
            "rating_to": "Neutral",
            "time": "2025-01-13T00:30:05.813548892Z"
        });

        let rec: RecommendationRecord = serde_json::from_value(v).unwrap();
        assert_eq!(rec.ticker, "BSBR");
        assert_eq!(rec.target_from, Some(4.20));
        assert_eq!(rec.target_to, Some(4.70));
        assert_eq!(rec.rating_to, "Neutral");
    }

    #[test]
    fn missing_targets_stay_absent() {
        let rec: RecommendationRecord =
            serde_json::from_value(json!({"ticker": "X", "target_to": "N/A"})).unwrap();
        assert_eq!(rec.target_from, None);
        assert_eq!(rec.target_to, None);
        assert_eq!(rec.company, "");
    }

    #[test]
    fn absent_fields_round_trip_as_null() {
        let stock = sample();
        let v = serde_json::to_value(&stock).unwrap();
        assert_eq!(v["pe_ratio"], json!(null));
        assert_eq!(v["alpha"], json!(null));
        assert_eq!(v["latest_trading_day"], json!(null));
        assert_eq!(v["target_from"], json!(null));
        assert_eq!(v["current_price"], json!(0.0));

        let back: EnrichedStock = serde_json::from_value(v).unwrap();
        assert_eq!(back, stock);
    }

    #[test]
    fn stored_stock_flattens_enriched_fields() {
        let created = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let stored = StoredStock {
            id: Uuid::nil(),
            stock: sample(),
            created_at: created,
            updated_at: created,
        };

        let v = serde_json::to_value(&stored).unwrap();
        assert_eq!(v["ticker"], json!("AAPL"));
        assert_eq!(v["id"], json!(Uuid::nil()));

        let back: StoredStock = serde_json::from_value(v).unwrap();
        assert_eq!(back, stored);
    }
}
