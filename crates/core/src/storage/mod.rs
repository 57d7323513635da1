use crate::config::{LedgerBackend, Settings};
use crate::domain::market::MarketContextSnapshot;
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::recommendation::{RecommendationRecord, Session};
use chrono::NaiveDate;
use std::fmt;
use std::sync::Arc;

pub mod error;
pub mod json_file;
pub mod lock;
pub mod memory;
pub mod postgres;

/// The three independently persisted ledger tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Recommendations,
    PortfolioHistory,
    MarketContext,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Recommendations => "recommendations",
            Table::PortfolioHistory => "portfolio_history",
            Table::MarketContext => "market_context",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Upsert-by-key storage for the ledger.
///
/// Recommendations are keyed by `(date, ticker)`, portfolio and market
/// snapshots by `date`. Each upsert replaces any existing row for its key and
/// is atomic per table. Loads return every stored row in no particular order;
/// callers sort.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn upsert_recommendation(&self, record: &RecommendationRecord) -> anyhow::Result<()>;

    async fn load_recommendations(&self) -> anyhow::Result<Vec<RecommendationRecord>>;

    async fn upsert_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> anyhow::Result<()>;

    async fn load_portfolio_snapshots(&self) -> anyhow::Result<Vec<PortfolioSnapshot>>;

    async fn upsert_market_context(&self, snapshot: &MarketContextSnapshot) -> anyhow::Result<()>;

    async fn load_market_contexts(&self) -> anyhow::Result<Vec<MarketContextSnapshot>>;

    /// Guard against two runs of the same session overlapping. Backends without
    /// a shared lock service always grant it.
    async fn try_acquire_session_lock(
        &self,
        _date: NaiveDate,
        _session: Session,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn release_session_lock(&self, _date: NaiveDate, _session: Session) -> anyhow::Result<()> {
        Ok(())
    }
}

pub async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn LedgerStore>> {
    let store: Arc<dyn LedgerStore> = match settings.ledger_backend {
        LedgerBackend::Memory => Arc::new(memory::MemoryStore::default()),
        LedgerBackend::JsonFile => {
            Arc::new(json_file::JsonFileStore::open(&settings.ledger_dir).await?)
        }
        LedgerBackend::Postgres => {
            let db_url = settings.require_database_url()?;
            Arc::new(postgres::PgStore::connect(db_url).await?)
        }
    };

    tracing::info!(backend = store.backend_name(), "ledger store opened");
    Ok(store)
}
