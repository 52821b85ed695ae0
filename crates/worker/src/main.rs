use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kconsensus_core::config::{parse_list, Settings};
use kconsensus_core::domain::sector::WICS_LARGE_SECTORS;
use kconsensus_core::ingest::collector::{CollectorOptions, SignalCollector};
use kconsensus_core::ingest::financials::FinancialTableClient;
use kconsensus_core::ingest::naver::{NaverChartClient, NaverQuoteClient};
use kconsensus_core::score::pipeline::{compute_scores, persist_scores};
use kconsensus_core::storage::lock::ScoreRunLock;
use kconsensus_core::storage::reports::PgReportStore;
use kconsensus_core::storage::runs::{self, RunSummary};
use kconsensus_core::storage::scores::PgScoreStore;
use kconsensus_core::time::kr_market::MarketCalendar;

mod import;

#[derive(Debug, Parser)]
#[command(name = "kconsensus_worker")]
struct Args {
    /// Do everything except writing to the database.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Daily scoring run over recent analyst reports.
    Score {
        /// Market as-of date (YYYY-MM-DD). Defaults to the latest closed KRX session.
        #[arg(long)]
        as_of_date: Option<String>,

        /// Trailing report window in days.
        #[arg(long)]
        window_days: Option<i64>,

        /// Comma-separated large sectors. Defaults to SCORE_SECTORS, then all WICS sectors.
        #[arg(long)]
        sectors: Option<String>,
    },
    /// Load normalized report records (JSON array or JSON lines) into the report store.
    ImportReports {
        path: std::path::PathBuf,
    },
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

    let res = match args.command {
        Command::Score {
            as_of_date,
            window_days,
            sectors,
        } => {
            run_score(
                &settings,
                as_of_date.as_deref(),
                window_days,
                sectors.as_deref(),
                args.dry_run,
            )
            .await
        }
        Command::ImportReports { path } => run_import(&settings, &path, args.dry_run).await,
    };

    if let Err(err) = &res {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "worker run failed");
    }
    res
}

async fn connect(settings: &Settings) -> anyhow::Result<sqlx::PgPool> {
    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;
    kconsensus_core::storage::migrate(&pool).await?;
    Ok(pool)
}

fn resolve_sectors(arg: Option<&str>, configured: &[String]) -> Vec<String> {
    let from_arg = arg.map(parse_list).unwrap_or_default();
    if !from_arg.is_empty() {
        return from_arg;
    }
    if !configured.is_empty() {
        return configured.to_vec();
    }
    WICS_LARGE_SECTORS.iter().map(|s| s.to_string()).collect()
}

fn build_collector(settings: &Settings) -> anyhow::Result<SignalCollector> {
    let quotes = NaverQuoteClient::from_settings(settings)?;
    let financials = FinancialTableClient::from_settings(settings)?;
    let series = NaverChartClient::from_settings(settings)?;
    Ok(SignalCollector::new(
        Arc::new(quotes),
        Arc::new(financials),
        Arc::new(series),
        CollectorOptions::from_settings(settings),
    ))
}

async fn run_score(
    settings: &Settings,
    as_of_date_arg: Option<&str>,
    window_days: Option<i64>,
    sectors_arg: Option<&str>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let calendar = MarketCalendar::from_list(&settings.market_holidays);
    let as_of_date = calendar.resolve_as_of_date(as_of_date_arg, chrono::Utc::now())?;
    let window_days = window_days.unwrap_or(settings.score_window_days);
    let sectors = resolve_sectors(sectors_arg, &settings.score_sectors);
    let collector = build_collector(settings)?;

    let pool = connect(settings).await?;
    let reports = PgReportStore::new(pool.clone());

    if dry_run {
        let results =
            compute_scores(&reports, &collector, &sectors, window_days, as_of_date).await?;
        let summary = summarize(&results, 0);
        tracing::info!(
            %as_of_date,
            dry_run = true,
            stocks_scored = summary.stocks_scored,
            insufficient = summary.insufficient,
            "scoring run complete (dry-run)"
        );
        return Ok(());
    }

    let Some(lock) = ScoreRunLock::try_acquire(&pool, as_of_date).await? else {
        tracing::warn!(%as_of_date, "as_of_date lock not acquired; another run in progress");
        return Ok(());
    };

    let run_id = runs::start_run(&pool, as_of_date).await?;
    tracing::info!(
        %as_of_date,
        %run_id,
        window_days,
        sectors = sectors.len(),
        "scoring run started"
    );

    let scores = PgScoreStore::new(pool.clone());
    let outcome = async {
        let results =
            compute_scores(&reports, &collector, &sectors, window_days, as_of_date).await?;
        let written = persist_scores(&scores, &results, settings.enrich_concurrency).await;
        anyhow::Ok(summarize(&results, written))
    }
    .await;

    match &outcome {
        Ok(summary) => {
            runs::finish_run(&pool, run_id, summary).await?;
            tracing::info!(
                %as_of_date,
                %run_id,
                stocks_scored = summary.stocks_scored,
                scores_written = summary.scores_written,
                insufficient = summary.insufficient,
                "scoring run complete"
            );
        }
        Err(err) => {
            if let Err(e) = runs::fail_run(&pool, run_id, &format!("{err:#}")).await {
                tracing::error!(%run_id, error = %e, "failed to record run failure");
            }
        }
    }

    if let Err(e) = lock.release().await {
        tracing::warn!(%as_of_date, error = %e, "advisory lock release failed");
    }
    outcome.map(|_| ())
}

fn summarize(
    results: &std::collections::BTreeMap<String, kconsensus_core::domain::score::ScoreResult>,
    written: usize,
) -> RunSummary {
    RunSummary {
        stocks_scored: results.len(),
        scores_written: written,
        insufficient: results
            .values()
            .filter(|r| r.composite_score.is_insufficient())
            .count(),
    }
}

async fn run_import(
    settings: &Settings,
    path: &std::path::Path,
    dry_run: bool,
) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {} failed", path.display()))?;
    let batch = import::parse_reports(&text)?;
    tracing::info!(
        path = %path.display(),
        valid = batch.reports.len(),
        rejected = batch.rejected,
        "parsed report records"
    );

    if dry_run {
        tracing::info!(dry_run = true, "skipping report store writes");
        return Ok(());
    }

    let pool = connect(settings).await?;
    let inserted = PgReportStore::new(pool)
        .upsert_reports(&batch.reports)
        .await?;
    tracing::info!(
        inserted,
        duplicates = batch.reports.len() as u64 - inserted,
        "report import complete"
    );
    Ok(())
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
