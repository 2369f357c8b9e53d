use crate::config::parsed_var;
use crate::domain::stock::{EnrichedStock, StoredStock};
use crate::storage::query::{like_pattern, StockQuery};
use crate::storage::{dedupe_by_ticker, PersistenceError, StockStore};
use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const DEFAULT_UPSERT_BATCH: usize = 200;

const COLUMNS: &str = "id, ticker, company, brokerage, action, rating_from, rating_to, \
     target_from, target_to, current_price, pe_ratio, dividend_yield, market_capitalization, \
     alpha, latest_trading_day, recommendation_score, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgStockStore {
    pool: PgPool,
    chunk_size: usize,
}

impl PgStockStore {
    pub fn new(pool: PgPool) -> Self {
        let chunk_size = parsed_var("STOCKS_UPSERT_BATCH", DEFAULT_UPSERT_BATCH).max(1);
        Self { pool, chunk_size }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StockRow {
    id: Uuid,
    ticker: String,
    company: String,
    brokerage: String,
    action: String,
    rating_from: String,
    rating_to: String,
    target_from: Option<f64>,
    target_to: Option<f64>,
    current_price: f64,
    pe_ratio: Option<f64>,
    dividend_yield: Option<f64>,
    market_capitalization: Option<f64>,
    alpha: Option<f64>,
    latest_trading_day: Option<DateTime<Utc>>,
    recommendation_score: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StockRow> for StoredStock {
    fn from(r: StockRow) -> Self {
        StoredStock {
            id: r.id,
            stock: EnrichedStock {
                ticker: r.ticker,
                company: r.company,
                brokerage: r.brokerage,
                action: r.action,
                rating_from: r.rating_from,
                rating_to: r.rating_to,
                target_from: r.target_from,
                target_to: r.target_to,
                current_price: r.current_price,
                pe_ratio: r.pe_ratio,
                dividend_yield: r.dividend_yield,
                market_capitalization: r.market_capitalization,
                alpha: r.alpha,
                latest_trading_day: r.latest_trading_day,
                recommendation_score: r.recommendation_score,
            },
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

fn push_search<'a>(qb: &mut QueryBuilder<'a, Postgres>, search: Option<&str>) {
    if let Some(term) = search {
        let pattern = like_pattern(term);
        qb.push(" WHERE ticker ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR company ILIKE ")
            .push_bind(pattern);
    }
}

#[async_trait::async_trait]
impl StockStore for PgStockStore {
    async fn upsert_batch(&self, stocks: &[EnrichedStock]) -> Result<u64, PersistenceError> {
        let rows = dedupe_by_ticker(stocks);
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(PersistenceError::db("begin transaction"))?;

        let now = Utc::now();
        let mut affected: u64 = 0;
        for (batch_idx, chunk) in rows.chunks(self.chunk_size).enumerate() {
            let t0 = std::time::Instant::now();
            let mut qb = QueryBuilder::<Postgres>::new(format!("INSERT INTO stocks ({COLUMNS}) "));
            qb.push_values(chunk, |mut b, s| {
                b.push_bind(Uuid::new_v4())
                    .push_bind(&s.ticker)
                    .push_bind(&s.company)
                    .push_bind(&s.brokerage)
                    .push_bind(&s.action)
                    .push_bind(&s.rating_from)
                    .push_bind(&s.rating_to)
                    .push_bind(s.target_from)
                    .push_bind(s.target_to)
                    .push_bind(s.current_price)
                    .push_bind(s.pe_ratio)
                    .push_bind(s.dividend_yield)
                    .push_bind(s.market_capitalization)
                    .push_bind(s.alpha)
                    .push_bind(s.latest_trading_day)
                    .push_bind(s.recommendation_score)
                    .push_bind(now)
                    .push_bind(now);
            });
            qb.push(
                " ON CONFLICT (ticker) DO UPDATE SET \
                   company = EXCLUDED.company, \
                   brokerage = EXCLUDED.brokerage, \
                   action = EXCLUDED.action, \
                   rating_from = EXCLUDED.rating_from, \
                   rating_to = EXCLUDED.rating_to, \
                   target_from = EXCLUDED.target_from, \
                   target_to = EXCLUDED.target_to, \
                   current_price = EXCLUDED.current_price, \
                   pe_ratio = EXCLUDED.pe_ratio, \
                   dividend_yield = EXCLUDED.dividend_yield, \
                   market_capitalization = EXCLUDED.market_capitalization, \
                   alpha = EXCLUDED.alpha, \
                   latest_trading_day = EXCLUDED.latest_trading_day, \
                   recommendation_score = EXCLUDED.recommendation_score, \
                   updated_at = EXCLUDED.updated_at",
            );

            let res = qb
                .build()
                .persistent(false)
                .execute(&mut *tx)
                .await
                .map_err(PersistenceError::db("batch upsert stocks"))?;
            affected += res.rows_affected();

            tracing::debug!(
                batch_idx,
                batch_size = chunk.len(),
                elapsed_ms = t0.elapsed().as_millis(),
                "stocks batch upsert"
            );
        }

        tx.commit()
            .await
            .map_err(PersistenceError::db("commit transaction"))?;
        Ok(affected)
    }

    async fn list(&self, query: &StockQuery) -> anyhow::Result<Vec<StoredStock>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM stocks"));
        push_search(&mut qb, query.search.as_deref());
        qb.push(format!(
            " ORDER BY {} {} NULLS LAST, ticker ASC LIMIT ",
            query.sort_by.as_sql(),
            query.order.as_sql()
        ))
        .push_bind(query.limit)
        .push(" OFFSET ")
        .push_bind(query.offset);

        let rows = qb
            .build_query_as::<StockRow>()
            .fetch_all(&self.pool)
            .await
            .context("select stocks failed")?;
        Ok(rows.into_iter().map(StoredStock::from).collect())
    }

    async fn count(&self, search: Option<&str>) -> anyhow::Result<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM stocks");
        push_search(&mut qb, search);

        let n: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .context("count stocks failed")?;
        Ok(n)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<StoredStock>> {
        let row = sqlx::query_as::<_, StockRow>(&format!(
            "SELECT {COLUMNS} FROM stocks WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("select stock {id} failed"))?;
        Ok(row.map(StoredStock::from))
    }

    async fn recommended(&self, limit: i64) -> anyhow::Result<Vec<StoredStock>> {
        let rows = sqlx::query_as::<_, StockRow>(&format!(
            "SELECT {COLUMNS} FROM stocks \
             ORDER BY recommendation_score DESC, ticker ASC \
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("select recommended stocks failed")?;
        Ok(rows.into_iter().map(StoredStock::from).collect())
    }
}
