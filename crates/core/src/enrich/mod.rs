use crate::domain::reconcile;
use crate::domain::stock::EnrichedStock;
use crate::ingest::error::SourceError;
use crate::ingest::{AlphaSource, MarketSource, RatingSource};
use crate::storage::{PersistenceError, StockStore};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};

pub const DEFAULT_INTERVAL_HOURS: u64 = 24;

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("fetching ratings failed: {0}")]
    Ratings(#[source] SourceError),

    #[error("persisting enriched stocks failed: {0}")]
    Persist(#[source] PersistenceError),

    #[error("an enrichment cycle is already running")]
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub tickers: usize,
    pub market_failures: usize,
    pub alpha_failures: usize,
    pub persisted: u64,
    pub elapsed: Duration,
}

/// Runs enrichment cycles: ratings, then market and alpha data per ticker, then one upsert.
pub struct Enricher {
    ratings: Arc<dyn RatingSource>,
    market: Arc<dyn MarketSource>,
    alpha: Arc<dyn AlphaSource>,
    store: Arc<dyn StockStore>,
    running: Mutex<()>,
}

impl Enricher {
    pub fn new(
        ratings: Arc<dyn RatingSource>,
        market: Arc<dyn MarketSource>,
        alpha: Arc<dyn AlphaSource>,
        store: Arc<dyn StockStore>,
    ) -> Self {
        Self {
            ratings,
            market,
            alpha,
            store,
            running: Mutex::new(()),
        }
    }

    /// One full cycle. A ratings failure ends it before any market call; per-ticker failures
    /// only blank that ticker's fields.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let _running = self
            .running
            .try_lock()
            .map_err(|_| CycleError::AlreadyRunning)?;
        let started = Instant::now();

        let records = self.ratings.fetch_ratings().await.map_err(|err| {
            tracing::error!(
                provider = self.ratings.provider_name(),
                error = %err,
                "ratings fetch failed; skipping cycle"
            );
            CycleError::Ratings(err)
        })?;

        let total = records.len();
        tracing::info!(tickers = total, "fetched analyst ratings");

        let mut market_failures = 0;
        let mut alpha_failures = 0;
        let mut enriched: Vec<EnrichedStock> = Vec::with_capacity(total);

        for (i, record) in records.into_iter().enumerate() {
            let ticker = record.ticker.clone();

            let market = self.market.fetch_market(&ticker).await;
            if let Err(err) = &market {
                market_failures += 1;
                tracing::warn!(
                    %ticker,
                    provider = self.market.provider_name(),
                    error = %err,
                    "market data unavailable"
                );
            }

            let alpha = self.alpha.fetch_alpha(&ticker).await;
            if let Err(err) = &alpha {
                alpha_failures += 1;
                tracing::warn!(
                    %ticker,
                    provider = self.alpha.provider_name(),
                    error = %err,
                    "alpha data unavailable"
                );
            }

            let stock = reconcile::merge(record, market, alpha);
            tracing::info!(
                %ticker,
                progress = i + 1,
                total,
                score = stock.recommendation_score,
                "enriched ticker"
            );
            enriched.push(stock);
        }

        let persisted = if enriched.is_empty() {
            0
        } else {
            self.store.upsert_batch(&enriched).await.map_err(|err| {
                tracing::error!(rows = enriched.len(), error = %err, "batch upsert failed");
                CycleError::Persist(err)
            })?
        };

        let report = CycleReport {
            tickers: total,
            market_failures,
            alpha_failures,
            persisted,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            tickers = report.tickers,
            market_failures = report.market_failures,
            alpha_failures = report.alpha_failures,
            persisted = report.persisted,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "enrichment cycle finished"
        );
        Ok(report)
    }

    /// Runs a cycle now and then once per `period` until `shutdown` resolves. Cycles never
    /// overlap: ticks that pass while a cycle is still running are skipped. Returns how many
    /// cycles completed.
    pub async fn run_scheduled<F>(&self, period: Duration, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let period = period.max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(period_secs = period.as_secs(), "enrichment scheduler started");

        let mut completed = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::warn!("shutdown during enrichment cycle; abandoning it");
                    break;
                }
                outcome = self.run_cycle() => {
                    completed += 1;
                    if let Err(err) = outcome {
                        // Already logged where it happened; this is the per-cycle summary.
                        tracing::error!(error = %err, "enrichment cycle failed");
                    }
                }
            }
        }

        tracing::info!(cycles = completed, "enrichment scheduler stopped");
        completed
    }
}
