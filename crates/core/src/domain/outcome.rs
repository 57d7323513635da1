use crate::domain::recommendation::RecommendationRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Winning,
    Losing,
}

/// How a past recommendation has done against a current price. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub date: NaiveDate,
    pub ticker: String,
    pub action: String,
    pub recommended_price: f64,
    pub current_price: f64,
    pub gain_pct: f64,
    pub days_elapsed: i64,
    pub status: OutcomeStatus,
}

impl Outcome {
    pub fn from_record(rec: &RecommendationRecord, current_price: f64, today: NaiveDate) -> Self {
        let gain_pct = (current_price - rec.price) / rec.price * 100.0;
        Self {
            date: rec.date,
            ticker: rec.ticker.clone(),
            action: rec.action.clone(),
            recommended_price: rec.price,
            current_price,
            gain_pct,
            days_elapsed: (today - rec.date).num_days(),
            status: if gain_pct > 0.0 {
                OutcomeStatus::Winning
            } else {
                OutcomeStatus::Losing
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub total_calls: usize,
    /// Fraction of outcomes with a positive gain, in `[0, 1]`.
    pub win_rate: f64,
    pub avg_gain: f64,
    /// Outcomes up more than the notable-move threshold, best first.
    pub winning_trades: Vec<Outcome>,
    /// Outcomes down more than the notable-move threshold, worst first.
    pub losing_trades: Vec<Outcome>,
}

/// Everything the prompt side needs from the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySummary {
    pub as_of: Option<NaiveDate>,
    pub recent_recommendations_count: usize,
    pub outcomes: Vec<Outcome>,
    pub performance: PerformanceStats,
    pub ignored: Vec<RecommendationRecord>,
    pub repeated: BTreeMap<String, usize>,
}

impl MemorySummary {
    pub fn is_empty(&self) -> bool {
        self.recent_recommendations_count == 0 && self.outcomes.is_empty()
    }
}
