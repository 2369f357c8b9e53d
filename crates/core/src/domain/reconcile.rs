use crate::domain::stock::{AlphaMetrics, EnrichedStock, MarketMetrics, RecommendationRecord};

const ACTION_SCORE: f64 = 5.0;
const TARGET_SCORE: f64 = 3.0;
const TARGET_UPSIDE: f64 = 1.1;

/// Merges one recommendation with whatever the two market-data sources returned for it.
///
/// A failed market fetch blanks every market field and leaves `current_price` at zero. A
/// failed alpha fetch blanks `alpha`. The alpha source's trading day is never used, so the
/// record's `latest_trading_day` only ever comes from the market source.
pub fn merge<E>(
    base: RecommendationRecord,
    market: Result<MarketMetrics, E>,
    alpha: Result<AlphaMetrics, E>,
) -> EnrichedStock {
    let market = market.unwrap_or_default();
    let alpha = alpha.map(|a| a.alpha).unwrap_or(None);

    let mut stock = EnrichedStock {
        ticker: base.ticker,
        company: base.company,
        brokerage: base.brokerage,
        action: base.action,
        rating_from: base.rating_from,
        rating_to: base.rating_to,
        target_from: base.target_from,
        target_to: base.target_to,
        current_price: market.current_price,
        pe_ratio: market.pe_ratio,
        dividend_yield: market.dividend_yield,
        market_capitalization: market.market_capitalization,
        alpha,
        latest_trading_day: market.latest_trading_day,
        recommendation_score: 0.0,
    };
    stock.recommendation_score = score(&stock);
    stock
}

pub fn score(stock: &EnrichedStock) -> f64 {
    let mut total = 0.0;

    if matches!(stock.action.as_str(), "Buy" | "Strong Buy") {
        total += ACTION_SCORE;
    }

    if stock.current_price > 0.0 {
        if let Some(target) = stock.target_to {
            if target > stock.current_price * TARGET_UPSIDE {
                total += TARGET_SCORE;
            }
        }
    }

    total
}
