use crate::domain::market::MarketRecord;
use crate::storage::{MarketStore, PriorMarketPolicy};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

/// Process-local store used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryMarketStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    markets: BTreeMap<NaiveDate, StoredMarket>,
    countries: BTreeMap<String, DateTime<Utc>>,
    writes: u64,
}

#[derive(Debug, Clone)]
struct StoredMarket {
    record: MarketRecord,
    write_seq: u64,
}

impl MemoryMarketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a country marker, as if a previous run had used it.
    pub async fn seed_country(&self, country: &str) {
        self.inner
            .write()
            .await
            .countries
            .insert(country.to_string(), Utc::now());
    }

    pub async fn markets(&self) -> BTreeMap<NaiveDate, MarketRecord> {
        self.inner
            .read()
            .await
            .markets
            .iter()
            .map(|(date, stored)| (*date, stored.record.clone()))
            .collect()
    }

    pub async fn country_markers(&self) -> BTreeMap<String, DateTime<Utc>> {
        self.inner.read().await.countries.clone()
    }
}

#[async_trait::async_trait]
impl MarketStore for MemoryMarketStore {
    async fn prior_market(
        &self,
        policy: PriorMarketPolicy,
        target_date: NaiveDate,
    ) -> anyhow::Result<Option<MarketRecord>> {
        let inner = self.inner.read().await;
        let found = match policy {
            PriorMarketPolicy::LatestDate => inner
                .markets
                .range(..target_date)
                .next_back()
                .map(|(_, m)| m),
            PriorMarketPolicy::LatestWritten => {
                inner.markets.values().max_by_key(|m| m.write_seq)
            }
            PriorMarketPolicy::Arbitrary => inner.markets.values().next(),
        };
        Ok(found.map(|m| m.record.clone()))
    }

    async fn used_countries(&self) -> anyhow::Result<BTreeSet<String>> {
        Ok(self.inner.read().await.countries.keys().cloned().collect())
    }

    async fn market_for_date(&self, date: NaiveDate) -> anyhow::Result<Option<MarketRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .markets
            .get(&date)
            .map(|m| m.record.clone()))
    }

    async fn save_market(&self, date: NaiveDate, record: &MarketRecord) -> anyhow::Result<()> {
        let mut inner = self.inner.write().await;
        inner.writes += 1;
        let write_seq = inner.writes;
        inner.markets.insert(
            date,
            StoredMarket {
                record: record.clone(),
                write_seq,
            },
        );
        Ok(())
    }

    async fn mark_country_used(&self, country: &str) -> anyhow::Result<()> {
        self.inner
            .write()
            .await
            .countries
            .insert(country.to_string(), Utc::now());
        Ok(())
    }
}
