pub mod lock;
pub mod markets;
pub mod memory;
pub mod objects;

use crate::domain::market::MarketRecord;
use anyhow::Context;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Which stored market counts as "the previous one" when picking the continent
/// to avoid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PriorMarketPolicy {
    /// Greatest date key strictly before the target date.
    #[default]
    LatestDate,
    /// Most recently written document, whatever its date.
    LatestWritten,
    /// Any single stored document.
    Arbitrary,
}

impl PriorMarketPolicy {
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var("PRIOR_MARKET_POLICY") {
            Ok(s) if !s.trim().is_empty() => s.parse(),
            _ => Ok(Self::default()),
        }
    }
}

impl FromStr for PriorMarketPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest_date" => Ok(Self::LatestDate),
            "latest_written" => Ok(Self::LatestWritten),
            "arbitrary" => Ok(Self::Arbitrary),
            other => anyhow::bail!(
                "unknown PRIOR_MARKET_POLICY {other:?} (expected latest_date, latest_written or arbitrary)"
            ),
        }
    }
}

impl fmt::Display for PriorMarketPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LatestDate => "latest_date",
            Self::LatestWritten => "latest_written",
            Self::Arbitrary => "arbitrary",
        })
    }
}

/// Daily market documents plus the set of countries already used.
#[async_trait::async_trait]
pub trait MarketStore: Send + Sync {
    async fn prior_market(
        &self,
        policy: PriorMarketPolicy,
        target_date: NaiveDate,
    ) -> anyhow::Result<Option<MarketRecord>>;

    async fn used_countries(&self) -> anyhow::Result<BTreeSet<String>>;

    async fn market_for_date(&self, date: NaiveDate) -> anyhow::Result<Option<MarketRecord>>;

    /// Writes the record for `date`, replacing any existing one.
    async fn save_market(&self, date: NaiveDate, record: &MarketRecord) -> anyhow::Result<()>;

    /// Upserts the anti-repetition marker with a store-assigned timestamp.
    async fn mark_country_used(&self, country: &str) -> anyhow::Result<()>;
}
