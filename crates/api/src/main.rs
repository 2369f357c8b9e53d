use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::{header::HeaderName, HeaderMap, HeaderValue, Method, StatusCode},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use stockpick_core::config::{non_empty_var, Settings};
use stockpick_core::domain::stock::StoredStock;
use stockpick_core::storage::query::{parse_limit, StockQuery, DEFAULT_RECOMMENDED_LIMIT};
use stockpick_core::storage::stocks::PgStockStore;
use stockpick_core::storage::StockStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const DEFAULT_PORT: u16 = 8081;
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";
const TOTAL_COUNT: HeaderName = HeaderName::from_static("x-total-count");

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

    let store: Option<Arc<dyn StockStore>> = match connect(&settings).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(
                error = %format!("{e:#}"),
                "database unavailable; starting API in degraded mode"
            );
            None
        }
    };

    let origin =
        non_empty_var("CORS_ALLOWED_ORIGIN").unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_string());
    let app = router(AppState { store }, &origin)?;

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, %origin, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn connect(settings: &Settings) -> anyhow::Result<PgStockStore> {
    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;
    stockpick_core::storage::migrate(&pool).await?;
    Ok(PgStockStore::new(pool))
}

fn router(state: AppState, cors_origin: &str) -> anyhow::Result<Router> {
    let origin = HeaderValue::from_str(cors_origin)
        .with_context(|| format!("invalid CORS_ALLOWED_ORIGIN {cors_origin:?}"))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([TOTAL_COUNT]);

    Ok(Router::new()
        .route("/healthz", get(healthz))
        .route("/api/v1/stocks", get(list_stocks))
        .route("/api/v1/stocks/recommended", get(recommended_stocks))
        .route("/api/v1/stocks/:id", get(get_stock))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    store: Option<Arc<dyn StockStore>>,
}

impl AppState {
    fn store(&self) -> Result<&dyn StockStore, StatusCode> {
        self.store
            .as_deref()
            .ok_or(StatusCode::SERVICE_UNAVAILABLE)
    }
}

fn internal(err: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&err);
    tracing::error!(error = %format!("{err:#}"), "stock query failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    limit: Option<String>,
    offset: Option<String>,
    search: Option<String>,
    sort_by: Option<String>,
    order: Option<String>,
}

async fn list_stocks(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<(HeaderMap, Json<Vec<StoredStock>>), StatusCode> {
    let store = state.store()?;

    let query = StockQuery::from_params(
        params.limit.as_deref(),
        params.offset.as_deref(),
        params.search.as_deref(),
        params.sort_by.as_deref(),
        params.order.as_deref(),
    );

    let total = store
        .count(query.search.as_deref())
        .await
        .map_err(internal)?;
    let rows = store.list(&query).await.map_err(internal)?;

    let mut headers = HeaderMap::new();
    headers.insert(TOTAL_COUNT, HeaderValue::from(total));
    Ok((headers, Json(rows)))
}

#[derive(Debug, Default, Deserialize)]
struct RecommendedParams {
    limit: Option<String>,
}

async fn recommended_stocks(
    State(state): State<AppState>,
    Query(params): Query<RecommendedParams>,
) -> Result<Json<Vec<StoredStock>>, StatusCode> {
    let store = state.store()?;
    let limit = parse_limit(params.limit.as_deref(), DEFAULT_RECOMMENDED_LIMIT);
    let rows = store.recommended(limit).await.map_err(internal)?;
    Ok(Json(rows))
}

async fn get_stock(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StoredStock>, StatusCode> {
    let store = state.store()?;
    let id = Uuid::parse_str(&id).map_err(|_| StatusCode::BAD_REQUEST)?;

    store
        .get(id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
