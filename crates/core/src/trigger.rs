//! Key-gated manual invocation of the generator.

use crate::generate::{GenerationReport, MarketGenerator};
use crate::time::target_date::resolve_target_date;
use chrono::{DateTime, Utc};

pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized: Invalid key";

/// Exact comparison after trimming both sides. An unset or blank secret
/// matches nothing.
pub fn manual_key_matches(supplied: Option<&str>, configured: Option<&str>) -> bool {
    let Some(configured) = configured.map(str::trim).filter(|s| !s.is_empty()) else {
        return false;
    };
    supplied.map(str::trim) == Some(configured)
}

#[derive(Debug)]
pub enum ManualOutcome {
    Unauthorized,
    Generated(GenerationReport),
    Failed(anyhow::Error),
}

impl ManualOutcome {
    pub fn confirmation(report: &GenerationReport) -> String {
        format!(
            "Generated market for {}: {}",
            report.target_date, report.location
        )
    }
}

/// Checks the key, resolves the optional `date` and runs one generation.
/// Nothing downstream is touched when the key does not match.
pub async fn run_manual(
    generator: &MarketGenerator,
    supplied_key: Option<&str>,
    configured_key: Option<&str>,
    date: Option<&str>,
    now_utc: DateTime<Utc>,
) -> ManualOutcome {
    if !manual_key_matches(supplied_key, configured_key) {
        tracing::warn!("manual trigger rejected: invalid key");
        return ManualOutcome::Unauthorized;
    }

    let target_date = match resolve_target_date(date, now_utc) {
        Ok(d) => d,
        Err(err) => return ManualOutcome::Failed(err),
    };

    tracing::info!(%target_date, "manual generation requested");
    match generator.run_at(Some(target_date), now_utc).await {
        Ok(report) => ManualOutcome::Generated(report),
        Err(err) => {
            tracing::error!(%target_date, error = ?err, "manual generation failed");
            ManualOutcome::Failed(err)
        }
    }
}
