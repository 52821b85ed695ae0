use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kconsensus_core::aggregate::SCORING_WINDOW_DAYS;
use kconsensus_core::config::{parse_list, Settings};
use kconsensus_core::domain::market::MarketIndex;
use kconsensus_core::domain::score::StoredScore;
use kconsensus_core::domain::sector::SectorOverview;
use kconsensus_core::ingest::financials::FinancialTableClient;
use kconsensus_core::ingest::naver::{NaverChartClient, NaverQuoteClient};
use kconsensus_core::ingest::provider::IndexFeed;
use kconsensus_core::sector::sector_overview;
use kconsensus_core::stock::{
    annual_financials, stock_consensus, watch_list_quotes, AnnualFinancials, ConsensusSources,
    StockConsensus, WatchQuote,
};
use kconsensus_core::storage::reports::PgReportStore;
use kconsensus_core::storage::scores::PgScoreStore;
use kconsensus_core::storage::ScoreStore;
use kconsensus_core::time::kr_market::{kst_today, window_start};

const MAX_WATCH_LIST: usize = 100;

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
    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match kconsensus_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(
                        error = %e,
                        "db migrations failed; starting API in degraded mode"
                    );
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let financials = match FinancialTableClient::from_settings(&settings) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "financials view disabled");
            None
        }
    };

    let state = AppState {
        stores: pool.map(|pool| Stores {
            reports: PgReportStore::new(pool.clone()),
            scores: PgScoreStore::new(pool),
        }),
        quotes: Arc::new(NaverQuoteClient::from_settings(&settings)?),
        series: Arc::new(NaverChartClient::from_settings(&settings)?),
        financials,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/scores/:stock_id", get(get_score))
        .route("/sectors/:sector", get(get_sector))
        .route("/stocks/:stock_id/consensus", get(get_consensus))
        .route("/stocks/:stock_id/financials", get(get_financials))
        .route("/quotes", get(get_quotes))
        .route("/indices", get(get_indices))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct Stores {
    reports: PgReportStore,
    scores: PgScoreStore,
}

#[derive(Clone)]
struct AppState {
    stores: Option<Stores>,
    quotes: Arc<NaverQuoteClient>,
    series: Arc<NaverChartClient>,
    financials: Option<Arc<FinancialTableClient>>,
}

impl AppState {
    fn stores(&self) -> Result<&Stores, StatusCode> {
        self.stores.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)
    }
}

#[derive(Debug, Deserialize)]
struct SinceQuery {
    since: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuotesQuery {
    ids: String,
}

fn internal_error(e: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&e);
    tracing::error!(error = %format!("{e:#}"), "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

fn is_stock_id(s: &str) -> bool {
    s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit())
}

/// Explicit `since`, or the start of the scoring window ending today (KST).
fn resolve_since(q: &SinceQuery) -> Result<NaiveDate, StatusCode> {
    match q.since.as_deref() {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| StatusCode::BAD_REQUEST),
        None => {
            let today = kst_today(chrono::Utc::now()).map_err(internal_error)?;
            Ok(window_start(today, SCORING_WINDOW_DAYS))
        }
    }
}

async fn get_score(
    State(state): State<AppState>,
    Path(stock_id): Path<String>,
) -> Result<Json<StoredScore>, StatusCode> {
    let stores = state.stores()?;
    if !is_stock_id(&stock_id) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let row = stores
        .scores
        .read_score(&stock_id)
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(row))
}

async fn get_sector(
    State(state): State<AppState>,
    Path(sector): Path<String>,
    Query(q): Query<SinceQuery>,
) -> Result<Json<SectorOverview>, StatusCode> {
    let stores = state.stores()?;
    let since = resolve_since(&q)?;

    let overview = sector_overview(
        &stores.reports,
        state.quotes.as_ref(),
        &stores.scores,
        sector.trim(),
        since,
    )
    .await
    .map_err(internal_error)?;
    Ok(Json(overview))
}

async fn get_consensus(
    State(state): State<AppState>,
    Path(stock_id): Path<String>,
    Query(q): Query<SinceQuery>,
) -> Result<Json<StockConsensus>, StatusCode> {
    let stores = state.stores()?;
    if !is_stock_id(&stock_id) {
        return Err(StatusCode::BAD_REQUEST);
    }
    let since = resolve_since(&q)?;
    let today = kst_today(chrono::Utc::now()).map_err(internal_error)?;

    let src = ConsensusSources {
        reports: &stores.reports,
        quotes: state.quotes.as_ref(),
        series: state.series.as_ref(),
        scores: &stores.scores,
    };
    let consensus = stock_consensus(&src, &stock_id, since, today)
        .await
        .map_err(internal_error)?;
    if consensus.reports.is_empty() && consensus.trade_price.is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(consensus))
}

async fn get_quotes(
    State(state): State<AppState>,
    Query(q): Query<QuotesQuery>,
) -> Result<Json<Vec<WatchQuote>>, StatusCode> {
    let ids = parse_list(&q.ids);
    if ids.is_empty() || ids.len() > MAX_WATCH_LIST || !ids.iter().all(|id| is_stock_id(id)) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let quotes = watch_list_quotes(state.quotes.as_ref(), &ids)
        .await
        .map_err(|e| {
            tracing::warn!(error = %format!("{e:#}"), "quote feed unavailable");
            StatusCode::BAD_GATEWAY
        })?;
    Ok(Json(quotes))
}

async fn get_financials(
    State(state): State<AppState>,
    Path(stock_id): Path<String>,
) -> Result<Json<Vec<AnnualFinancials>>, StatusCode> {
    let feed = state
        .financials
        .as_ref()
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    if !is_stock_id(&stock_id) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let rows = annual_financials(feed.as_ref(), &stock_id)
        .await
        .map_err(|e| {
            tracing::warn!(%stock_id, error = %format!("{e:#}"), "financial table unavailable");
            StatusCode::BAD_GATEWAY
        })?;
    Ok(Json(rows))
}

async fn get_indices(State(state): State<AppState>) -> Result<Json<Vec<MarketIndex>>, StatusCode> {
    let indices = state.quotes.fetch_kr_indices().await.map_err(|e| {
        tracing::warn!(error = %format!("{e:#}"), "index feed unavailable");
        StatusCode::BAD_GATEWAY
    })?;
    Ok(Json(indices))
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
