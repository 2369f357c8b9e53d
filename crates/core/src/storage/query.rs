use crate::domain::stock::StoredStock;
use std::cmp::Ordering;

pub const DEFAULT_LIMIT: i64 = 10;
pub const DEFAULT_RECOMMENDED_LIMIT: i64 = 5;

/// Columns the stock table may be sorted by. Anything else falls back to `Ticker`, so user
/// input never reaches the SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortColumn {
    #[default]
    Ticker,
    Company,
    CurrentPrice,
    Action,
    RecommendationScore,
    PeRatio,
    DividendYield,
    MarketCapitalization,
    Alpha,
}

impl SortColumn {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "company" => Self::Company,
            "current_price" => Self::CurrentPrice,
            "action" => Self::Action,
            "recommendation_score" => Self::RecommendationScore,
            "pe_ratio" => Self::PeRatio,
            "dividend_yield" => Self::DividendYield,
            "market_capitalization" => Self::MarketCapitalization,
            "alpha" => Self::Alpha,
            _ => Self::Ticker,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::Company => "company",
            Self::CurrentPrice => "current_price",
            Self::Action => "action",
            Self::RecommendationScore => "recommendation_score",
            Self::PeRatio => "pe_ratio",
            Self::DividendYield => "dividend_yield",
            Self::MarketCapitalization => "market_capitalization",
            Self::Alpha => "alpha",
        }
    }

    /// Orders two rows by this column the way the SQL `ORDER BY .. NULLS LAST` does.
    pub fn compare(self, a: &StoredStock, b: &StoredStock, order: SortOrder) -> Ordering {
        let (a, b) = (&a.stock, &b.stock);
        match self {
            Self::Ticker => order.apply(a.ticker.cmp(&b.ticker)),
            Self::Company => order.apply(a.company.cmp(&b.company)),
            Self::Action => order.apply(a.action.cmp(&b.action)),
            Self::CurrentPrice => order.apply(a.current_price.total_cmp(&b.current_price)),
            Self::RecommendationScore => {
                order.apply(a.recommendation_score.total_cmp(&b.recommendation_score))
            }
            Self::PeRatio => cmp_nulls_last(a.pe_ratio, b.pe_ratio, order),
            Self::DividendYield => cmp_nulls_last(a.dividend_yield, b.dividend_yield, order),
            Self::MarketCapitalization => {
                cmp_nulls_last(a.market_capitalization, b.market_capitalization, order)
            }
            Self::Alpha => cmp_nulls_last(a.alpha, b.alpha, order),
        }
    }
}

fn cmp_nulls_last(a: Option<f64>, b: Option<f64>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => order.apply(x.total_cmp(&y)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            Self::Asc => ord,
            Self::Desc => ord.reverse(),
        }
    }
}

/// One page of the stock table.
#[derive(Debug, Clone, PartialEq)]
pub struct StockQuery {
    pub search: Option<String>,
    pub sort_by: SortColumn,
    pub order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

impl Default for StockQuery {
    fn default() -> Self {
        Self {
            search: None,
            sort_by: SortColumn::default(),
            order: SortOrder::default(),
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl StockQuery {
    /// Builds a query from raw request parameters. Invalid or out-of-range values fall back
    /// to the defaults instead of failing the request.
    pub fn from_params(
        limit: Option<&str>,
        offset: Option<&str>,
        search: Option<&str>,
        sort_by: Option<&str>,
        order: Option<&str>,
    ) -> Self {
        Self {
            search: normalize_search(search),
            sort_by: sort_by.map(SortColumn::parse).unwrap_or_default(),
            order: order.map(SortOrder::parse).unwrap_or_default(),
            limit: parse_limit(limit, DEFAULT_LIMIT),
            offset: offset
                .and_then(|s| s.trim().parse::<i64>().ok())
                .filter(|n| *n >= 0)
                .unwrap_or(0),
        }
    }
}

pub fn parse_limit(limit: Option<&str>, default: i64) -> i64 {
    limit
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
}

pub fn normalize_search(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `%term%` for ILIKE, with the LIKE metacharacters in `term` escaped.
pub fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

/// Case-insensitive substring match on ticker or company.
pub fn matches_search(stock: &StoredStock, search: Option<&str>) -> bool {
    let Some(term) = search else {
        return true;
    };
    let term = term.to_lowercase();
    stock.stock.ticker.to_lowercase().contains(&term)
        || stock.stock.company.to_lowercase().contains(&term)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sort_column_falls_back_to_ticker() {
        assert_eq!(SortColumn::parse("alpha"), SortColumn::Alpha);
        assert_eq!(SortColumn::parse("ticker; DROP TABLE stocks"), SortColumn::Ticker);
        assert_eq!(SortColumn::parse(""), SortColumn::Ticker);
    }

    #[test]
    fn only_desc_sorts_descending() {
        assert_eq!(SortOrder::parse("desc"), SortOrder::Desc);
        assert_eq!(SortOrder::parse("DESC"), SortOrder::Desc);
        assert_eq!(SortOrder::parse("down"), SortOrder::Asc);
    }

    #[test]
    fn params_fall_back_to_defaults() {
        let q = StockQuery::from_params(Some("-3"), Some("x"), Some("  "), None, None);
        assert_eq!(q, StockQuery::default());

        let q = StockQuery::from_params(
            Some("25"),
            Some("50"),
            Some(" app "),
            Some("recommendation_score"),
            Some("desc"),
        );
        assert_eq!(q.limit, 25);
        assert_eq!(q.offset, 50);
        assert_eq!(q.search.as_deref(), Some("app"));
        assert_eq!(q.sort_by, SortColumn::RecommendationScore);
        assert_eq!(q.order, SortOrder::Desc);
    }

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("app"), "%app%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn nulls_sort_last_in_both_directions() {
        assert_eq!(
            cmp_nulls_last(Some(1.0), None, SortOrder::Asc),
            Ordering::Less
        );
        assert_eq!(
            cmp_nulls_last(Some(1.0), None, SortOrder::Desc),
            Ordering::Less
        );
        assert_eq!(
            cmp_nulls_last(Some(1.0), Some(2.0), SortOrder::Desc),
            Ordering::Greater
        );
    }
}
