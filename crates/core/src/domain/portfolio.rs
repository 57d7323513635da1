use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ticker → share count.
pub type Holdings = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub date: NaiveDate,
    pub holdings: Holdings,
    pub cash: f64,
    pub total_value: f64,
    pub recorded_at: DateTime<Utc>,
}

/// What the user did between two portfolio snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortfolioChange {
    NewPosition {
        ticker: String,
        shares: f64,
    },
    AddedTo {
        ticker: String,
        added_shares: f64,
        total_shares: f64,
    },
    Sold {
        ticker: String,
        shares: f64,
    },
    Reduced {
        ticker: String,
        reduced_shares: f64,
        remaining_shares: f64,
    },
}

impl PortfolioChange {
    pub fn ticker(&self) -> &str {
        match self {
            PortfolioChange::NewPosition { ticker, .. }
            | PortfolioChange::AddedTo { ticker, .. }
            | PortfolioChange::Sold { ticker, .. }
            | PortfolioChange::Reduced { ticker, .. } => ticker,
        }
    }
}

/// A holding as written in the portfolio file: either a bare share count or a
/// tracked position with an average buy price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HoldingSpec {
    Shares(f64),
    Tracked {
        #[serde(default)]
        shares: f64,
        #[serde(default)]
        avg_buy_price: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub shares: f64,
    pub avg_buy_price: Option<f64>,
}

impl From<HoldingSpec> for Position {
    fn from(spec: HoldingSpec) -> Self {
        match spec {
            HoldingSpec::Shares(shares) => Position {
                shares,
                avg_buy_price: None,
            },
            HoldingSpec::Tracked {
                shares,
                avg_buy_price,
            } => Position {
                shares,
                avg_buy_price,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionGain {
    pub cost_basis: f64,
    pub current_value: f64,
    pub gain_amount: f64,
    pub gain_pct: f64,
    pub avg_buy_price: f64,
}

impl Position {
    /// `None` when there is no buy price to compare against or no shares held.
    pub fn gain(&self, current_price: f64) -> Option<PositionGain> {
        let avg_buy_price = self.avg_buy_price.filter(|p| *p > 0.0)?;
        if self.shares == 0.0 {
            return None;
        }

        let cost_basis = self.shares * avg_buy_price;
        let current_value = self.shares * current_price;
        let gain_amount = current_value - cost_basis;
        Some(PositionGain {
            cost_basis,
            current_value,
            gain_amount,
            gain_pct: gain_amount / cost_basis * 100.0,
            avg_buy_price,
        })
    }
}

pub fn share_counts(positions: &BTreeMap<String, Position>) -> Holdings {
    positions
        .iter()
        .map(|(ticker, p)| (ticker.clone(), p.shares))
        .collect()
}

/// Cash plus the market value of every holding that has a price. Holdings
/// without a quote contribute nothing.
pub fn total_value(holdings: &Holdings, cash: f64, prices: &BTreeMap<String, f64>) -> f64 {
    holdings.iter().fold(cash, |acc, (ticker, shares)| {
        match prices.get(ticker) {
            Some(price) => acc + shares * price,
            None => acc,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn holding_spec_accepts_simple_and_tracked_forms() {
        let v = json!({
            "VFV.TO": 30,
            "RY.TO": {"shares": 12, "avg_buy_price": 120.5},
            "ENB.TO": {"shares": 4}
        });
        let parsed: BTreeMap<String, HoldingSpec> = serde_json::from_value(v).unwrap();
        let positions: BTreeMap<String, Position> =
            parsed.into_iter().map(|(k, v)| (k, v.into())).collect();

        assert_eq!(positions["VFV.TO"].shares, 30.0);
        assert_eq!(positions["VFV.TO"].avg_buy_price, None);
        assert_eq!(positions["RY.TO"].avg_buy_price, Some(120.5));
        assert_eq!(positions["ENB.TO"].shares, 4.0);
    }

    #[test]
    fn gain_requires_buy_price() {
        let p = Position {
            shares: 10.0,
            avg_buy_price: Some(50.0),
        };
        let g = p.gain(55.0).unwrap();
        assert_eq!(g.cost_basis, 500.0);
        assert_eq!(g.gain_amount, 50.0);
        assert!((g.gain_pct - 10.0).abs() < 1e-9);

        let untracked = Position {
            shares: 10.0,
            avg_buy_price: None,
        };
        assert!(untracked.gain(55.0).is_none());
    }

    #[test]
    fn total_value_skips_unquoted_holdings() {
        let holdings: Holdings = [("A".to_string(), 2.0), ("B".to_string(), 5.0)].into();
        let prices: BTreeMap<String, f64> = [("A".to_string(), 10.0)].into();
        assert_eq!(total_value(&holdings, 100.0, &prices), 120.0);
    }

    #[test]
    fn change_serializes_with_action_tag() {
        let c = PortfolioChange::AddedTo {
            ticker: "RY.TO".to_string(),
            added_shares: 5.0,
            total_shares: 15.0,
        };
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["action"], "ADDED_TO");
        assert_eq!(v["added_shares"], 5.0);
    }
}
