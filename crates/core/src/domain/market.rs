use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContextSnapshot {
    pub date: NaiveDate,
    pub tsx_level: f64,
    pub oil_price: f64,
    pub usd_cad_rate: f64,
    #[serde(default)]
    pub events: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Market state as supplied by the quote-fetching side, before it is dated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContextInput {
    pub tsx_level: f64,
    pub oil_price: f64,
    pub usd_cad_rate: f64,
    #[serde(default)]
    pub events: Vec<String>,
}

impl MarketContextInput {
    pub fn into_snapshot(self, date: NaiveDate, recorded_at: DateTime<Utc>) -> MarketContextSnapshot {
        MarketContextSnapshot {
            date,
            tsx_level: self.tsx_level,
            oil_price: self.oil_price,
            usd_cad_rate: self.usd_cad_rate,
            events: self.events,
            recorded_at,
        }
    }
}
