use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Action string the ignored-recommendation check matches against (case-sensitive).
pub const BUY_ACTION: &str = "BUY";

/// Which scheduled run produced a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Session {
    Morning,
    Afternoon,
    Emergency,
}

impl Session {
    pub fn as_str(&self) -> &'static str {
        match self {
            Session::Morning => "morning",
            Session::Afternoon => "afternoon",
            Session::Emergency => "emergency",
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Session {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "morning" => Ok(Session::Morning),
            "afternoon" => Ok(Session::Afternoon),
            "emergency" => Ok(Session::Emergency),
            other => anyhow::bail!("unknown session: {other} (expected morning|afternoon|emergency)"),
        }
    }
}

/// One stored recommendation. Keyed by `(date, ticker)`; a later write for the
/// same key replaces the earlier one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub date: NaiveDate,
    pub session: Session,
    pub ticker: String,
    pub action: String,
    pub price: f64,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

/// A `(ticker, action, price, reason)` tuple as emitted by the scoring step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecommendation {
    pub ticker: String,
    pub action: String,
    pub price: f64,
    #[serde(default)]
    pub reason: String,
}

impl NewRecommendation {
    pub fn new(
        ticker: impl Into<String>,
        action: impl Into<String>,
        price: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            action: action.into(),
            price,
            reason: reason.into(),
        }
    }

    pub fn into_record(
        self,
        date: NaiveDate,
        session: Session,
        recorded_at: DateTime<Utc>,
    ) -> RecommendationRecord {
        RecommendationRecord {
            date,
            session,
            ticker: self.ticker,
            action: self.action,
            price: self.price,
            reason: self.reason,
            recorded_at,
        }
    }
}

/// Result of the re-recommendation gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatDecision {
    pub allowed: bool,
    pub reason: String,
}
