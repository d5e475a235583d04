use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marketaday_core::config::Settings;
use marketaday_core::generate::MarketGenerator;
use marketaday_core::storage::markets::PgMarketStore;
use marketaday_core::storage::memory::MemoryMarketStore;
use marketaday_core::time::schedule::DailySchedule;
use marketaday_core::time::target_date::resolve_target_date;

#[derive(Debug, Parser)]
#[command(name = "marketaday_worker")]
struct Args {
    /// Target date (YYYY-MM-DD). Defaults to tomorrow (UTC).
    #[arg(long)]
    date: Option<String>,

    /// Run the full pipeline against an in-memory store and print the record.
    #[arg(long)]
    dry_run: bool,

    /// Stay alive and generate once a day at GENERATION_SCHEDULE_UTC.
    #[arg(long, conflicts_with = "date")]
    daemon: bool,
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

    if args.dry_run {
        let target_date = resolve_target_date(args.date.as_deref(), Utc::now())?;
        return dry_run(&settings, target_date).await;
    }

    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    marketaday_core::storage::migrate(&pool).await?;

    let store = Arc::new(PgMarketStore::new(pool.clone()));
    let generator = MarketGenerator::from_settings(&settings, store)?;

    if !args.daemon {
        let target_date = resolve_target_date(args.date.as_deref(), Utc::now())?;
        return run_scheduled(&pool, &generator, target_date).await;
    }

    let schedule = DailySchedule::from_env()?;
    tracing::info!(run_at_utc = %schedule.run_at, "worker daemon started");

    loop {
        let now = Utc::now();
        let next = schedule.next_run_after(now);
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::info!(%next, "next generation scheduled");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested; stopping daemon");
                return Ok(());
            }
        }

        let target_date = resolve_target_date(None, Utc::now())?;
        if let Err(e) = run_scheduled(&pool, &generator, target_date).await {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(%target_date, error = %e, "scheduled run could not start");
        }
    }
}

/// One scheduled generation guarded by the per-date advisory lock. Generation
/// failures are reported, not retried.
async fn run_scheduled(
    pool: &sqlx::PgPool,
    generator: &MarketGenerator,
    target_date: NaiveDate,
) -> anyhow::Result<()> {
    let mut conn = pool.acquire().await.context("acquire lock connection failed")?;

    let acquired =
        marketaday_core::storage::lock::try_acquire_target_date_lock(&mut conn, target_date).await?;
    if !acquired {
        tracing::warn!(%target_date, "target date lock not acquired; another run in progress");
        return Ok(());
    }

    match generator.run(Some(target_date)).await {
        Ok(report) => {
            tracing::info!(
                %target_date,
                location = %report.location,
                country = %report.country,
                "daily market generated"
            );
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%target_date, error = ?err, "daily market generation failed");
        }
    }

    if let Err(e) =
        marketaday_core::storage::lock::release_target_date_lock(&mut conn, target_date).await
    {
        tracing::warn!(%target_date, error = %e, "failed to release target date lock");
    }
    Ok(())
}

async fn dry_run(settings: &Settings, target_date: NaiveDate) -> anyhow::Result<()> {
    let store = Arc::new(MemoryMarketStore::new());
    let generator = MarketGenerator::from_settings(settings, store.clone())?;

    let report = generator.run(Some(target_date)).await?;
    tracing::info!(%target_date, dry_run = true, country = %report.country, "market generated");

    let markets = store.markets().await;
    let record = markets
        .get(&target_date)
        .context("dry run finished without a stored record")?;
    println!("{}", serde_json::to_string_pretty(record)?);
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
