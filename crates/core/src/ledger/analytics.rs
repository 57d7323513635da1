//! Pure functions over loaded ledger rows. Everything here takes "today"
//! explicitly and never touches storage or the wall clock.

use crate::domain::outcome::{Outcome, PerformanceStats};
use crate::domain::recommendation::{RecommendationRecord, RepeatDecision, BUY_ACTION};
use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};

/// Gains beyond this (in percent, either direction) count as a notable call.
pub const NOTABLE_MOVE_PCT: f64 = 5.0;

/// Calendar-day window ending today: `today - window_days < date <= today`.
///
/// A record made exactly `window_days` ago is outside the window, so a 7-day
/// window on a Monday does not see the previous Monday. A window reaching
/// past the earliest representable date has no lower bound.
pub fn in_window(date: NaiveDate, today: NaiveDate, window_days: u32) -> bool {
    if date > today {
        return false;
    }
    match today.checked_sub_signed(Duration::days(i64::from(window_days))) {
        Some(cutoff) => date > cutoff,
        None => true,
    }
}

/// Records inside the window, optionally for one ticker, newest date first.
/// Ties within a date are ordered by ticker.
pub fn recent(
    records: &[RecommendationRecord],
    ticker: Option<&str>,
    window_days: u32,
    today: NaiveDate,
) -> Vec<RecommendationRecord> {
    let mut out: Vec<RecommendationRecord> = records
        .iter()
        .filter(|r| in_window(r.date, today, window_days))
        .filter(|r| ticker.map_or(true, |t| r.ticker == t))
        .cloned()
        .collect();
    sort_newest_first(&mut out);
    out
}

pub fn sort_newest_first(records: &mut [RecommendationRecord]) {
    records.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.ticker.cmp(&b.ticker)));
}

/// One outcome per record whose ticker has a current price. Records without a
/// quote, or with a non-positive recommended price, are skipped.
pub fn outcomes(
    records: &[RecommendationRecord],
    current_prices: &BTreeMap<String, f64>,
    today: NaiveDate,
) -> Vec<Outcome> {
    let mut out = Vec::new();
    for rec in records {
        let Some(&current_price) = current_prices.get(&rec.ticker) else {
            continue;
        };
        if !(rec.price.is_finite() && rec.price > 0.0) {
            tracing::debug!(ticker = %rec.ticker, date = %rec.date, price = rec.price, "skipping outcome with unusable recommended price");
            continue;
        }
        out.push(Outcome::from_record(rec, current_price, today));
    }
    out.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.ticker.cmp(&b.ticker)));
    out
}

/// BUY recommendations (exact match) for tickers the user does not hold.
pub fn ignored(
    recent: &[RecommendationRecord],
    held_tickers: &BTreeSet<String>,
) -> Vec<RecommendationRecord> {
    recent
        .iter()
        .filter(|r| r.action == BUY_ACTION && !held_tickers.contains(&r.ticker))
        .cloned()
        .collect()
}

/// Tickers appearing at least twice, with their counts.
pub fn repeated(recent: &[RecommendationRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::<String, usize>::new();
    for rec in recent {
        *counts.entry(rec.ticker.clone()).or_default() += 1;
    }
    counts.retain(|_, c| *c >= 2);
    counts
}

pub fn performance(outcomes: &[Outcome]) -> PerformanceStats {
    if outcomes.is_empty() {
        return PerformanceStats::default();
    }

    let total = outcomes.len();
    let winners = outcomes.iter().filter(|o| o.gain_pct > 0.0).count();
    let avg_gain = outcomes.iter().map(|o| o.gain_pct).sum::<f64>() / total as f64;

    let mut winning_trades: Vec<Outcome> = outcomes
        .iter()
        .filter(|o| o.gain_pct > NOTABLE_MOVE_PCT)
        .cloned()
        .collect();
    winning_trades.sort_by(|a, b| {
        b.gain_pct
            .partial_cmp(&a.gain_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut losing_trades: Vec<Outcome> = outcomes
        .iter()
        .filter(|o| o.gain_pct < -NOTABLE_MOVE_PCT)
        .cloned()
        .collect();
    losing_trades.sort_by(|a, b| {
        a.gain_pct
            .partial_cmp(&b.gain_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    PerformanceStats {
        total_calls: total,
        win_rate: winners as f64 / total as f64,
        avg_gain,
        winning_trades,
        losing_trades,
    }
}

/// Flat day-count gate. Price movement since the last call is not considered;
/// callers that want a price-drop override apply it themselves.
pub fn repeat_decision(recent_for_ticker: &[RecommendationRecord], min_days_since_last: u32) -> RepeatDecision {
    if recent_for_ticker.is_empty() {
        return RepeatDecision {
            allowed: true,
            reason: "first time recommending".to_string(),
        };
    }

    RepeatDecision {
        allowed: false,
        reason: format!(
            "already recommended {} times in last {} days",
            recent_for_ticker.len(),
            min_days_since_last
        ),
    }
}
