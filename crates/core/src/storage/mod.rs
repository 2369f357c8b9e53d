pub mod memory;
pub mod query;
pub mod stocks;

use crate::domain::stock::{EnrichedStock, StoredStock};
use anyhow::Context;
use query::StockQuery;
use std::collections::HashMap;
use uuid::Uuid;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("{stage} failed: {source}")]
    Database {
        stage: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("storage rejected batch: {0}")]
    Rejected(String),
}

impl PersistenceError {
    fn db(stage: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Database { stage, source }
    }
}

/// Where enriched stocks live, keyed by ticker.
///
/// `upsert_batch` is all-or-nothing. A ticker that already exists keeps its id and
/// `created_at`; everything else is overwritten and `updated_at` moves forward.
#[async_trait::async_trait]
pub trait StockStore: Send + Sync {
    async fn upsert_batch(&self, stocks: &[EnrichedStock]) -> Result<u64, PersistenceError>;

    async fn list(&self, query: &StockQuery) -> anyhow::Result<Vec<StoredStock>>;

    async fn count(&self, search: Option<&str>) -> anyhow::Result<i64>;

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<StoredStock>>;

    /// Highest recommendation scores first.
    async fn recommended(&self, limit: i64) -> anyhow::Result<Vec<StoredStock>>;
}

/// Collapses repeated tickers to their last occurrence, keeping first-seen order.
///
/// A single `INSERT .. ON CONFLICT DO UPDATE` cannot touch the same row twice, and the
/// rating feed may list a ticker once per brokerage.
pub fn dedupe_by_ticker(stocks: &[EnrichedStock]) -> Vec<&EnrichedStock> {
    let mut slot: HashMap<&str, usize> = HashMap::with_capacity(stocks.len());
    let mut out: Vec<&EnrichedStock> = Vec::with_capacity(stocks.len());
    for stock in stocks {
        match slot.get(stock.ticker.as_str()) {
            Some(&i) => out[i] = stock,
            None => {
                slot.insert(stock.ticker.as_str(), out.len());
                out.push(stock);
            }
        }
    }
    out
}
