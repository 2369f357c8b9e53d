use crate::domain::stock::{EnrichedStock, StoredStock};
use crate::storage::query::{matches_search, SortColumn, SortOrder, StockQuery};
use crate::storage::{dedupe_by_ticker, PersistenceError, StockStore};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local store for dry runs and tests. Same upsert semantics as Postgres.
#[derive(Debug, Default)]
pub struct MemoryStockStore {
    rows: RwLock<HashMap<String, StoredStock>>,
    upserts: AtomicUsize,
}

impl MemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `upsert_batch` calls seen so far, including empty ones.
    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    pub async fn by_ticker(&self, ticker: &str) -> Option<StoredStock> {
        self.rows.read().await.get(ticker).cloned()
    }

    async fn sorted(&self, search: Option<&str>, query: &StockQuery) -> Vec<StoredStock> {
        let rows = self.rows.read().await;
        let mut out: Vec<StoredStock> = rows
            .values()
            .filter(|s| matches_search(s, search))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            query
                .sort_by
                .compare(a, b, query.order)
                .then_with(|| a.stock.ticker.cmp(&b.stock.ticker))
        });
        out
    }
}

fn window(rows: Vec<StoredStock>, offset: i64, limit: i64) -> Vec<StoredStock> {
    rows.into_iter()
        .skip(usize::try_from(offset).unwrap_or(0))
        .take(usize::try_from(limit).unwrap_or(0))
        .collect()
}

#[async_trait::async_trait]
impl StockStore for MemoryStockStore {
    async fn upsert_batch(&self, stocks: &[EnrichedStock]) -> Result<u64, PersistenceError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);

        let batch = dedupe_by_ticker(stocks);
        let now = Utc::now();
        let mut rows = self.rows.write().await;
        for stock in &batch {
            match rows.get_mut(&stock.ticker) {
                Some(existing) => {
                    existing.stock = (*stock).clone();
                    existing.updated_at = now;
                }
                None => {
                    rows.insert(
                        stock.ticker.clone(),
                        StoredStock {
                            id: Uuid::new_v4(),
                            stock: (*stock).clone(),
                            created_at: now,
                            updated_at: now,
                        },
                    );
                }
            }
        }
        Ok(batch.len() as u64)
    }

    async fn list(&self, query: &StockQuery) -> anyhow::Result<Vec<StoredStock>> {
        let rows = self.sorted(query.search.as_deref(), query).await;
        Ok(window(rows, query.offset, query.limit))
    }

    async fn count(&self, search: Option<&str>) -> anyhow::Result<i64> {
        let rows = self.rows.read().await;
        Ok(rows.values().filter(|s| matches_search(s, search)).count() as i64)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<StoredStock>> {
        let rows = self.rows.read().await;
        Ok(rows.values().find(|s| s.id == id).cloned())
    }

    async fn recommended(&self, limit: i64) -> anyhow::Result<Vec<StoredStock>> {
        let query = StockQuery {
            sort_by: SortColumn::RecommendationScore,
            order: SortOrder::Desc,
            ..StockQuery::default()
        };
        let rows = self.sorted(None, &query).await;
        Ok(window(rows, 0, limit))
    }
}
