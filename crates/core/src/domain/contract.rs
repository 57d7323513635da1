use crate::domain::market::MarketContextInput;
use crate::domain::portfolio::{share_counts, total_value, HoldingSpec, Holdings, Position};
use crate::domain::recommendation::NewRecommendation;
use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Raw per-session input handed over by the quote/scoring side, as read from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSessionInput {
    #[serde(default)]
    pub portfolio: BTreeMap<String, HoldingSpec>,
    #[serde(default)]
    pub cash: f64,
    #[serde(default)]
    pub current_prices: BTreeMap<String, f64>,
    #[serde(default)]
    pub recommendations: Vec<NewRecommendation>,
    #[serde(default)]
    pub market: Option<MarketContextInput>,
    #[serde(default)]
    pub watchlist: Vec<String>,
}

/// Session input after normalisation: tickers trimmed, positions in tracking form.
#[derive(Debug, Clone)]
pub struct SessionInput {
    pub positions: BTreeMap<String, Position>,
    pub cash: f64,
    pub current_prices: BTreeMap<String, f64>,
    pub recommendations: Vec<NewRecommendation>,
    pub market: Option<MarketContextInput>,
    pub watchlist: Vec<String>,
}

impl RawSessionInput {
    pub fn from_json_str(s: &str) -> anyhow::Result<SessionInput> {
        let raw = serde_json::from_str::<RawSessionInput>(s)
            .context("session input is not valid JSON for the session schema")?;
        raw.validate_and_into_input()
    }

    pub fn validate_and_into_input(self) -> anyhow::Result<SessionInput> {
        ensure!(self.cash.is_finite(), "cash must be a finite number");

        let mut positions = BTreeMap::new();
        for (ticker, spec) in self.portfolio {
            let ticker = normalize_ticker(&ticker)?;
            let position = Position::from(spec);
            ensure!(
                position.shares.is_finite(),
                "shares for {ticker} must be a finite number"
            );
            positions.insert(ticker, position);
        }

        let current_prices = usable_quotes(self.current_prices)?;

        let mut recommendations = Vec::with_capacity(self.recommendations.len());
        for mut rec in self.recommendations {
            rec.ticker = normalize_ticker(&rec.ticker)?;
            rec.action = rec.action.trim().to_string();
            recommendations.push(rec);
        }

        let watchlist = self
            .watchlist
            .iter()
            .map(|t| normalize_ticker(t))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(SessionInput {
            positions,
            cash: self.cash,
            current_prices,
            recommendations,
            market: self.market,
            watchlist,
        })
    }
}

impl SessionInput {
    pub fn holdings(&self) -> Holdings {
        share_counts(&self.positions)
    }

    /// Tickers the user currently holds a non-zero position in.
    pub fn held_tickers(&self) -> BTreeSet<String> {
        self.positions
            .iter()
            .filter(|(_, p)| p.shares > 0.0)
            .map(|(t, _)| t.clone())
            .collect()
    }

    pub fn total_value(&self) -> f64 {
        total_value(&self.holdings(), self.cash, &self.current_prices)
    }
}

/// Trims tickers and drops quotes that are zero, negative or not finite.
/// Missing or unusable quotes are treated as absent, never fabricated.
pub fn usable_quotes(raw: BTreeMap<String, f64>) -> anyhow::Result<BTreeMap<String, f64>> {
    let mut out = BTreeMap::new();
    for (ticker, price) in raw {
        let ticker = normalize_ticker(&ticker)?;
        if price.is_finite() && price > 0.0 {
            out.insert(ticker, price);
        } else {
            tracing::warn!(%ticker, price, "dropping unusable quote");
        }
    }
    Ok(out)
}

fn normalize_ticker(raw: &str) -> anyhow::Result<String> {
    let ticker = raw.trim().to_string();
    ensure!(!ticker.is_empty(), "ticker must be non-empty");
    Ok(ticker)
}
