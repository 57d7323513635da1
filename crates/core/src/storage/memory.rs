use crate::domain::market::MarketContextSnapshot;
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::recommendation::RecommendationRecord;
use crate::storage::LedgerStore;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    recommendations: BTreeMap<(NaiveDate, String), RecommendationRecord>,
    portfolio_history: BTreeMap<NaiveDate, PortfolioSnapshot>,
    market_context: BTreeMap<NaiveDate, MarketContextSnapshot>,
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn tables(&self) -> anyhow::Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store mutex poisoned"))
    }
}

#[async_trait::async_trait]
impl LedgerStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn upsert_recommendation(&self, record: &RecommendationRecord) -> anyhow::Result<()> {
        self.tables()?
            .recommendations
            .insert((record.date, record.ticker.clone()), record.clone());
        Ok(())
    }

    async fn load_recommendations(&self) -> anyhow::Result<Vec<RecommendationRecord>> {
        Ok(self.tables()?.recommendations.values().cloned().collect())
    }

    async fn upsert_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> anyhow::Result<()> {
        self.tables()?
            .portfolio_history
            .insert(snapshot.date, snapshot.clone());
        Ok(())
    }

    async fn load_portfolio_snapshots(&self) -> anyhow::Result<Vec<PortfolioSnapshot>> {
        Ok(self.tables()?.portfolio_history.values().cloned().collect())
    }

    async fn upsert_market_context(&self, snapshot: &MarketContextSnapshot) -> anyhow::Result<()> {
        self.tables()?
            .market_context
            .insert(snapshot.date, snapshot.clone());
        Ok(())
    }

    async fn load_market_contexts(&self) -> anyhow::Result<Vec<MarketContextSnapshot>> {
        Ok(self.tables()?.market_context.values().cloned().collect())
    }
}
