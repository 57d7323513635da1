use crate::domain::recommendation::Session;
use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Utc};

// Runs before local noon are the morning digest; everything after is afternoon.
const AFTERNOON_FROM_HOUR: u32 = 12;

fn local_offset(utc_offset_hours: i32) -> anyhow::Result<FixedOffset> {
    FixedOffset::east_opt(utc_offset_hours * 3600)
        .with_context(|| format!("invalid UTC offset: {utc_offset_hours}h"))
}

/// The ledger's "today": an explicit `YYYY-MM-DD` wins, otherwise the local
/// wall-clock date at the configured offset. Weekends and holidays are plain
/// calendar days here; nothing is rolled back.
pub fn resolve_today(
    date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
    utc_offset_hours: i32,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = date_arg {
        return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid date (expected YYYY-MM-DD): {s}"));
    }

    let offset = local_offset(utc_offset_hours)?;
    Ok(now_utc.with_timezone(&offset).date_naive())
}

pub fn local_now(now_utc: DateTime<Utc>, utc_offset_hours: i32) -> anyhow::Result<NaiveDateTime> {
    let offset = local_offset(utc_offset_hours)?;
    Ok(now_utc.with_timezone(&offset).naive_local())
}

/// Scheduled session implied by the local time. Emergency runs are never
/// inferred; they are always requested explicitly.
pub fn resolve_session(
    session_arg: Option<&str>,
    now_utc: DateTime<Utc>,
    utc_offset_hours: i32,
) -> anyhow::Result<Session> {
    if let Some(s) = session_arg {
        return s.parse();
    }

    let offset = local_offset(utc_offset_hours)?;
    let local = now_utc.with_timezone(&offset);
    Ok(if local.hour() < AFTERNOON_FROM_HOUR {
        Session::Morning
    } else {
        Session::Afternoon
    })
}
