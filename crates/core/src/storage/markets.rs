use crate::domain::market::MarketRecord;
use crate::storage::{MarketStore, PriorMarketPolicy};
use anyhow::Context;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeSet;

/// Postgres-backed store: one JSONB document per date key.
#[derive(Debug, Clone)]
pub struct PgMarketStore {
    pool: sqlx::PgPool,
}

impl PgMarketStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

fn decode_document(date: Option<NaiveDate>, document: Value) -> anyhow::Result<MarketRecord> {
    serde_json::from_value::<MarketRecord>(document)
        .with_context(|| format!("invalid market document in DB (date_key={date:?})"))
}

#[async_trait::async_trait]
impl MarketStore for PgMarketStore {
    async fn prior_market(
        &self,
        policy: PriorMarketPolicy,
        target_date: NaiveDate,
    ) -> anyhow::Result<Option<MarketRecord>> {
        let row = match policy {
            PriorMarketPolicy::LatestDate => {
                sqlx::query_as::<_, (NaiveDate, Value)>(
                    "SELECT date_key, document FROM daily_markets \
                     WHERE date_key < $1 \
                     ORDER BY date_key DESC \
                     LIMIT 1",
                )
                .persistent(false)
                .bind(target_date)
                .fetch_optional(&self.pool)
                .await
            }
            PriorMarketPolicy::LatestWritten => {
                sqlx::query_as::<_, (NaiveDate, Value)>(
                    "SELECT date_key, document FROM daily_markets \
                     ORDER BY written_at DESC \
                     LIMIT 1",
                )
                .persistent(false)
                .fetch_optional(&self.pool)
                .await
            }
            PriorMarketPolicy::Arbitrary => {
                sqlx::query_as::<_, (NaiveDate, Value)>(
                    "SELECT date_key, document FROM daily_markets LIMIT 1",
                )
                .persistent(false)
                .fetch_optional(&self.pool)
                .await
            }
        }
        .with_context(|| format!("select prior daily_markets failed (policy={policy})"))?;

        row.map(|(date, document)| decode_document(Some(date), document))
            .transpose()
    }

    async fn used_countries(&self) -> anyhow::Result<BTreeSet<String>> {
        let rows: Vec<String> = sqlx::query_scalar("SELECT country FROM generated_countries")
            .persistent(false)
            .fetch_all(&self.pool)
            .await
            .context("select generated_countries failed")?;
        Ok(rows.into_iter().collect())
    }

    async fn market_for_date(&self, date: NaiveDate) -> anyhow::Result<Option<MarketRecord>> {
        let document: Option<Value> =
            sqlx::query_scalar("SELECT document FROM daily_markets WHERE date_key = $1")
                .persistent(false)
                .bind(date)
                .fetch_optional(&self.pool)
                .await
                .context("select daily_markets failed")?;

        document
            .map(|doc| decode_document(Some(date), doc))
            .transpose()
    }

    async fn save_market(&self, date: NaiveDate, record: &MarketRecord) -> anyhow::Result<()> {
        let document = serde_json::to_value(record).context("market record serialize failed")?;

        sqlx::query(
            "INSERT INTO daily_markets (date_key, document, written_at) \
             VALUES ($1, $2, now()) \
             ON CONFLICT (date_key) DO UPDATE \
               SET document = EXCLUDED.document, written_at = EXCLUDED.written_at",
        )
        .persistent(false)
        .bind(date)
        .bind(document)
        .execute(&self.pool)
        .await
        .context("upsert daily_markets failed")?;

        Ok(())
    }

    async fn mark_country_used(&self, country: &str) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO generated_countries (country, last_generated) \
             VALUES ($1, now()) \
             ON CONFLICT (country) DO UPDATE SET last_generated = EXCLUDED.last_generated",
        )
        .persistent(false)
        .bind(country)
        .execute(&self.pool)
        .await
        .context("upsert generated_countries failed")?;

        Ok(())
    }
}
