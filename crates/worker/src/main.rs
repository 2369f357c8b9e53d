use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use stockpick_core::config::{parsed_var, Settings};
use stockpick_core::enrich::{Enricher, DEFAULT_INTERVAL_HOURS};
use stockpick_core::ingest::alpha_vantage::AlphaVantageClient;
use stockpick_core::ingest::finnhub::FinnhubClient;
use stockpick_core::ingest::gate::Immediate;
use stockpick_core::ingest::karenai::KarenaiClient;
use stockpick_core::storage::memory::MemoryStockStore;
use stockpick_core::storage::stocks::PgStockStore;
use stockpick_core::storage::StockStore;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "stockpick_worker")]
struct Args {
    /// Run a single enrichment cycle and exit.
    #[arg(long)]
    once: bool,

    /// Keep results in memory instead of writing to the database.
    #[arg(long)]
    dry_run: bool,

    /// Hours between cycles. Defaults to ENRICH_INTERVAL_HOURS, then 24.
    #[arg(long)]
    interval_hours: Option<u64>,

    /// Skip the Alpha Vantage pause between requests (local runs against mocks).
    #[arg(long)]
    no_delay: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let store = build_store(&settings, args.dry_run).await?;
    let enricher = build_enricher(&settings, store, args.no_delay)?;

    if args.once {
        return match enricher.run_cycle().await {
            Ok(report) => {
                tracing::info!(?report, dry_run = args.dry_run, "single cycle done");
                Ok(())
            }
            Err(err) => {
                let err = anyhow::Error::new(err);
                sentry_anyhow::capture_anyhow(&err);
                Err(err)
            }
        };
    }

    let hours = args
        .interval_hours
        .unwrap_or_else(|| parsed_var("ENRICH_INTERVAL_HOURS", DEFAULT_INTERVAL_HOURS))
        .max(1);
    let period = Duration::from_secs(hours * 3600);

    let cycles = enricher.run_scheduled(period, shutdown_signal()).await;
    tracing::info!(cycles, "worker exiting");
    Ok(())
}

async fn build_store(settings: &Settings, dry_run: bool) -> anyhow::Result<Arc<dyn StockStore>> {
    if dry_run {
        tracing::info!(dry_run = true, "using in-memory stock store");
        return Ok(Arc::new(MemoryStockStore::new()));
    }

    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    stockpick_core::storage::migrate(&pool).await?;

    Ok(Arc::new(PgStockStore::new(pool)))
}

fn build_enricher(
    settings: &Settings,
    store: Arc<dyn StockStore>,
    no_delay: bool,
) -> anyhow::Result<Enricher> {
    let ratings = KarenaiClient::from_settings(settings)?;
    let market = FinnhubClient::from_settings(settings)?;
    let mut alpha = AlphaVantageClient::from_settings(settings)?;
    if no_delay {
        tracing::warn!("alpha vantage request delay disabled");
        alpha = alpha.with_gate(Arc::new(Immediate));
    }

    Ok(Enricher::new(
        Arc::new(ratings),
        Arc::new(market),
        Arc::new(alpha),
        store,
    ))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from([
            "stockpick_worker",
            "--once",
            "--dry-run",
            "--interval-hours",
            "6",
            "--no-delay",
        ])
        .unwrap();
        assert!(args.once && args.dry_run && args.no_delay);
        assert_eq!(args.interval_hours, Some(6));

        let args = Args::try_parse_from(["stockpick_worker"]).unwrap();
        assert!(!args.once && !args.dry_run);
        assert_eq!(args.interval_hours, None);
    }

    #[tokio::test]
    async fn dry_run_needs_no_database() {
        let store = build_store(&Settings::default(), true).await.unwrap();
        assert_eq!(store.count(None).await.unwrap(), 0);

        let err = build_store(&Settings::default(), false).await.err().unwrap();
        assert!(err.to_string().contains("DATABASE_URL"));
    }
}
