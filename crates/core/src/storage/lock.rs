use crate::domain::recommendation::Session;
use anyhow::Context;
use chrono::{Datelike, NaiveDate};

// Advisory locks are scoped to the Postgres session. Used as a best-effort guard
// against a scheduled run overlapping a previous run of the same session.
const LOCK_NAMESPACE: i64 = 0x4C45_4447_4552; // "LEDGER"

fn lock_key(date: NaiveDate, session: Session) -> i64 {
    let session_bits: i64 = match session {
        Session::Morning => 1,
        Session::Afternoon => 2,
        Session::Emergency => 3,
    };
    LOCK_NAMESPACE ^ (((date.num_days_from_ce() as i64) << 2) | session_bits)
}

pub async fn try_acquire_session_lock(
    pool: &sqlx::PgPool,
    date: NaiveDate,
    session: Session,
) -> anyhow::Result<bool> {
    let key = lock_key(date, session);
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;
    Ok(acquired.0)
}

pub async fn release_session_lock(
    pool: &sqlx::PgPool,
    date: NaiveDate,
    session: Session,
) -> anyhow::Result<()> {
    let key = lock_key(date, session);
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .persistent(false)
        .bind(key)
        .execute(pool)
        .await
        .with_context(|| format!("failed to release advisory lock (key={key})"))?;
    Ok(())
}
