use anyhow::Context;
use chrono::{Datelike, NaiveDate};

// Advisory locks are scoped to the Postgres session, so acquire and release must run on the same
// connection. Best-effort guard against two scheduled runs generating the same target date at once.
const LOCK_NAMESPACE: i64 = 0x4D41_524B_4554; // "MARKET"

fn lock_key_for_date(target_date: NaiveDate) -> i64 {
    LOCK_NAMESPACE ^ (target_date.num_days_from_ce() as i64)
}

pub async fn try_acquire_target_date_lock(
    conn: &mut sqlx::PgConnection,
    target_date: NaiveDate,
) -> anyhow::Result<bool> {
    let key = lock_key_for_date(target_date);
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;
    Ok(acquired.0)
}

pub async fn release_target_date_lock(
    conn: &mut sqlx::PgConnection,
    target_date: NaiveDate,
) -> anyhow::Result<()> {
    let key = lock_key_for_date(target_date);
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .persistent(false)
        .bind(key)
        .execute(conn)
        .await
        .with_context(|| format!("failed to release advisory lock (key={key})"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_keys_differ_per_date() {
        let a = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        assert_ne!(lock_key_for_date(a), lock_key_for_date(b));
        assert_eq!(lock_key_for_date(a), lock_key_for_date(a));
    }
}
