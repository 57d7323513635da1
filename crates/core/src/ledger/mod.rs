//! The recommendation ledger: what was recommended, what the portfolio looked
//! like, and what can be inferred from the two over time.
//!
//! Reads never fail from the caller's point of view. A table that cannot be
//! loaded is logged and treated as empty ("no memory yet"). Writes propagate
//! a [`StorageError`] so the caller knows a record was not kept; nothing is
//! retried here.

use crate::domain::market::{MarketContextInput, MarketContextSnapshot};
use crate::domain::outcome::{MemorySummary, Outcome};
use crate::domain::portfolio::{Holdings, PortfolioChange, PortfolioSnapshot};
use crate::domain::recommendation::{
    NewRecommendation, RecommendationRecord, RepeatDecision, Session,
};
use crate::storage::error::StorageError;
use crate::storage::{LedgerStore, Table};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub mod analytics;
pub mod reconcile;

pub const DEFAULT_REPEAT_WINDOW_DAYS: u32 = 3;
pub const SUMMARY_WINDOW_DAYS: u32 = 7;
pub const MAX_IGNORED_IN_SUMMARY: usize = 5;

/// Per-ticker result of recording a session's recommendations.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub recorded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub async fn record_recommendation(
        &self,
        rec: NewRecommendation,
        session: Session,
        date: NaiveDate,
    ) -> anyhow::Result<RecommendationRecord> {
        let record = rec.into_record(date, session, Utc::now());
        self.store
            .upsert_recommendation(&record)
            .await
            .map_err(|err| {
                StorageError::write(
                    Table::Recommendations,
                    format!("{date}/{}", record.ticker),
                    err,
                )
            })?;

        tracing::debug!(%date, %session, ticker = %record.ticker, action = %record.action, "recommendation recorded");
        Ok(record)
    }

    /// Records every tuple independently; one failure does not stop the rest.
    pub async fn record_recommendations(
        &self,
        batch: Vec<NewRecommendation>,
        session: Session,
        date: NaiveDate,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for rec in batch {
            let ticker = rec.ticker.clone();
            match self.record_recommendation(rec, session, date).await {
                Ok(_) => report.recorded.push(ticker),
                Err(err) => {
                    tracing::warn!(%date, %session, %ticker, error = %err, "failed to record recommendation");
                    report.failed.push((ticker, format!("{err:#}")));
                }
            }
        }
        report
    }

    pub async fn record_portfolio_snapshot(
        &self,
        holdings: Holdings,
        cash: f64,
        total_value: f64,
        date: NaiveDate,
    ) -> anyhow::Result<PortfolioSnapshot> {
        let snapshot = PortfolioSnapshot {
            date,
            holdings,
            cash,
            total_value,
            recorded_at: Utc::now(),
        };
        self.store
            .upsert_portfolio_snapshot(&snapshot)
            .await
            .map_err(|err| StorageError::write(Table::PortfolioHistory, date.to_string(), err))?;

        tracing::debug!(%date, positions = snapshot.holdings.len(), total_value, "portfolio snapshot recorded");
        Ok(snapshot)
    }

    pub async fn record_market_context(
        &self,
        input: MarketContextInput,
        date: NaiveDate,
    ) -> anyhow::Result<MarketContextSnapshot> {
        let snapshot = input.into_snapshot(date, Utc::now());
        self.store
            .upsert_market_context(&snapshot)
            .await
            .map_err(|err| StorageError::write(Table::MarketContext, date.to_string(), err))?;

        tracing::debug!(%date, events = snapshot.events.len(), "market context recorded");
        Ok(snapshot)
    }

    async fn recommendations(&self) -> Vec<RecommendationRecord> {
        match self.store.load_recommendations().await {
            Ok(rows) => rows,
            Err(err) => {
                self.log_read_failure(Table::Recommendations, &err);
                Vec::new()
            }
        }
    }

    async fn portfolio_snapshots(&self) -> Vec<PortfolioSnapshot> {
        match self.store.load_portfolio_snapshots().await {
            Ok(rows) => rows,
            Err(err) => {
                self.log_read_failure(Table::PortfolioHistory, &err);
                Vec::new()
            }
        }
    }

    async fn market_contexts(&self) -> Vec<MarketContextSnapshot> {
        match self.store.load_market_contexts().await {
            Ok(rows) => rows,
            Err(err) => {
                self.log_read_failure(Table::MarketContext, &err);
                Vec::new()
            }
        }
    }

    fn log_read_failure(&self, table: Table, err: &anyhow::Error) {
        let err = StorageError::read(table, err);
        tracing::warn!(
            backend = self.store.backend_name(),
            error = %err,
            "treating table as empty"
        );
    }

    pub async fn recent_recommendations(
        &self,
        ticker: Option<&str>,
        window_days: u32,
        today: NaiveDate,
    ) -> Vec<RecommendationRecord> {
        analytics::recent(&self.recommendations().await, ticker, window_days, today)
    }

    pub async fn count_recommendations(
        &self,
        ticker: &str,
        window_days: u32,
        today: NaiveDate,
    ) -> usize {
        self.recent_recommendations(Some(ticker), window_days, today)
            .await
            .len()
    }

    pub async fn was_recommended_recently(
        &self,
        ticker: &str,
        window_days: u32,
        today: NaiveDate,
    ) -> bool {
        self.count_recommendations(ticker, window_days, today).await > 0
    }

    pub async fn portfolio_changes(&self, window_days: u32) -> Vec<PortfolioChange> {
        let snapshots = self.portfolio_snapshots().await;
        match reconcile::comparison_pair(&snapshots, window_days) {
            Some((past, current)) => reconcile::diff_holdings(&past.holdings, &current.holdings),
            None => Vec::new(),
        }
    }

    pub async fn portfolio_snapshot(&self, date: NaiveDate) -> Option<PortfolioSnapshot> {
        self.portfolio_snapshots()
            .await
            .into_iter()
            .find(|s| s.date == date)
    }

    pub async fn latest_market_context(&self) -> Option<MarketContextSnapshot> {
        self.market_contexts()
            .await
            .into_iter()
            .max_by_key(|m| m.date)
    }

    pub async fn compute_outcomes(
        &self,
        current_prices: &BTreeMap<String, f64>,
        today: NaiveDate,
    ) -> Vec<Outcome> {
        analytics::outcomes(&self.recommendations().await, current_prices, today)
    }

    pub async fn ignored_recommendations(
        &self,
        held_tickers: &BTreeSet<String>,
        window_days: u32,
        today: NaiveDate,
    ) -> Vec<RecommendationRecord> {
        let recent = self.recent_recommendations(None, window_days, today).await;
        analytics::ignored(&recent, held_tickers)
    }

    pub async fn should_recommend_again(
        &self,
        ticker: &str,
        min_days_since_last: u32,
        today: NaiveDate,
    ) -> RepeatDecision {
        let recent = self
            .recent_recommendations(Some(ticker), min_days_since_last, today)
            .await;
        analytics::repeat_decision(&recent, min_days_since_last)
    }

    /// Everything the prompt needs in one pass over the recommendations table.
    pub async fn summarize(
        &self,
        held_tickers: &BTreeSet<String>,
        current_prices: &BTreeMap<String, f64>,
        today: NaiveDate,
    ) -> MemorySummary {
        let all = self.recommendations().await;
        let recent = analytics::recent(&all, None, SUMMARY_WINDOW_DAYS, today);
        let outcomes = analytics::outcomes(&all, current_prices, today);
        let performance = analytics::performance(&outcomes);

        let mut ignored = analytics::ignored(&recent, held_tickers);
        ignored.truncate(MAX_IGNORED_IN_SUMMARY);

        MemorySummary {
            as_of: Some(today),
            recent_recommendations_count: recent.len(),
            repeated: analytics::repeated(&recent),
            outcomes,
            performance,
            ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::outcome::OutcomeStatus;
    use crate::storage::memory::MemoryStore;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ledger() -> Ledger {
        Ledger::new(Arc::new(MemoryStore::default()))
    }

    fn buy(ticker: &str, price: f64) -> NewRecommendation {
        NewRecommendation::new(ticker, "BUY", price, "quality 8/10")
    }

    /// Fails writes for one ticker and every read.
    struct FlakyStore {
        inner: MemoryStore,
        poisoned_ticker: &'static str,
    }

    #[async_trait::async_trait]
    impl LedgerStore for FlakyStore {
        fn backend_name(&self) -> &'static str {
            "flaky"
        }

        async fn upsert_recommendation(&self, record: &RecommendationRecord) -> anyhow::Result<()> {
            anyhow::ensure!(record.ticker != self.poisoned_ticker, "disk full");
            self.inner.upsert_recommendation(record).await
        }

        async fn load_recommendations(&self) -> anyhow::Result<Vec<RecommendationRecord>> {
            anyhow::bail!("table unreadable")
        }

        async fn upsert_portfolio_snapshot(&self, _: &PortfolioSnapshot) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }

        async fn load_portfolio_snapshots(&self) -> anyhow::Result<Vec<PortfolioSnapshot>> {
            anyhow::bail!("table unreadable")
        }

        async fn upsert_market_context(&self, _: &MarketContextSnapshot) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }

        async fn load_market_contexts(&self) -> anyhow::Result<Vec<MarketContextSnapshot>> {
            anyhow::bail!("table unreadable")
        }
    }

    #[tokio::test]
    async fn last_write_wins_per_day_and_ticker() {
        let ledger = ledger();
        let today = d(2024, 3, 4);
        ledger
            .record_recommendation(buy("RY.TO", 120.0), Session::Morning, today)
            .await
            .unwrap();
        ledger
            .record_recommendation(
                NewRecommendation::new("RY.TO", "HOLD", 121.0, "afternoon view"),
                Session::Afternoon,
                today,
            )
            .await
            .unwrap();

        let recent = ledger.recent_recommendations(Some("RY.TO"), 7, today).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].action, "HOLD");
        assert_eq!(recent[0].price, 121.0);
        assert_eq!(recent[0].session, Session::Afternoon);
    }

    #[tokio::test]
    async fn count_and_recently_agree_with_recent() {
        let ledger = ledger();
        for (day, ticker) in [(1, "A"), (3, "A"), (5, "A"), (5, "B")] {
            ledger
                .record_recommendation(buy(ticker, 10.0), Session::Morning, d(2024, 3, day))
                .await
                .unwrap();
        }

        let today = d(2024, 3, 6);
        for window in [0, 1, 2, 3, 5, 7, 30] {
            for ticker in ["A", "B", "C"] {
                let count = ledger.count_recommendations(ticker, window, today).await;
                let recent = ledger.recent_recommendations(Some(ticker), window, today).await;
                assert_eq!(count, recent.len());
                assert_eq!(
                    ledger.was_recommended_recently(ticker, window, today).await,
                    count > 0
                );
            }
        }
        assert_eq!(ledger.count_recommendations("A", 3, today).await, 1);
        assert_eq!(ledger.count_recommendations("A", 30, today).await, 3);
    }

    #[tokio::test]
    async fn weekly_repeat_tally_ignores_last_weeks_call() {
        let ledger = ledger();
        ledger
            .record_recommendation(buy("AAPL", 100.0), Session::Morning, d(2024, 1, 1))
            .await
            .unwrap();
        ledger
            .record_recommendation(buy("AAPL", 100.0), Session::Morning, d(2024, 1, 8))
            .await
            .unwrap();

        let today = d(2024, 1, 8);
        let recent = ledger.recent_recommendations(Some("AAPL"), 7, today).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].date, today);

        let summary = ledger
            .summarize(&BTreeSet::new(), &BTreeMap::new(), today)
            .await;
        assert!(!summary.repeated.contains_key("AAPL"));
        assert_eq!(summary.recent_recommendations_count, 1);
    }

    #[tokio::test]
    async fn portfolio_snapshot_round_trip() {
        let ledger = ledger();
        let date = d(2024, 2, 1);
        let holdings: Holdings = [("VFV.TO".to_string(), 30.0), ("RY.TO".to_string(), 12.5)].into();
        ledger
            .record_portfolio_snapshot(holdings.clone(), 1500.25, 9800.75, date)
            .await
            .unwrap();

        let back = ledger.portfolio_snapshot(date).await.unwrap();
        assert_eq!(back.holdings, holdings);
        assert_eq!(back.cash, 1500.25);
        assert_eq!(back.total_value, 9800.75);
    }

    #[tokio::test]
    async fn same_date_snapshots_keep_the_last_write() {
        let ledger = ledger();
        let date = d(2024, 2, 1);
        ledger
            .record_portfolio_snapshot([("RY.TO".to_string(), 5.0)].into(), 1.0, 100.0, date)
            .await
            .unwrap();
        ledger
            .record_portfolio_snapshot([("TD.TO".to_string(), 8.0)].into(), 2.0, 200.0, date)
            .await
            .unwrap();

        let back = ledger.portfolio_snapshot(date).await.unwrap();
        assert_eq!(back.cash, 2.0);
        assert_eq!(back.holdings, [("TD.TO".to_string(), 8.0)].into());
        assert_eq!(ledger.store().load_portfolio_snapshots().await.unwrap().len(), 1);

        for (tsx, event) in [(25_000.0, "CPI print"), (25_400.0, "BoC decision")] {
            ledger
                .record_market_context(
                    MarketContextInput {
                        tsx_level: tsx,
                        oil_price: 78.0,
                        usd_cad_rate: 1.36,
                        events: vec![event.to_string()],
                    },
                    date,
                )
                .await
                .unwrap();
        }
        let contexts = ledger.store().load_market_contexts().await.unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].tsx_level, 25_400.0);
        assert_eq!(contexts[0].events, vec!["BoC decision".to_string()]);
    }

    #[tokio::test]
    async fn unbounded_window_counts_everything_up_to_today() {
        let ledger = ledger();
        ledger
            .record_recommendation(buy("A", 10.0), Session::Morning, d(2020, 3, 2))
            .await
            .unwrap();
        let today = d(2024, 1, 8);

        assert_eq!(ledger.count_recommendations("A", u32::MAX, today).await, 1);
        assert!(ledger.was_recommended_recently("A", u32::MAX, today).await);
        assert!(!ledger.should_recommend_again("A", u32::MAX, today).await.allowed);
        assert_eq!(
            ledger
                .ignored_recommendations(&BTreeSet::new(), u32::MAX, today)
                .await
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn portfolio_changes_between_snapshots() {
        let ledger = ledger();
        assert!(ledger.portfolio_changes(7).await.is_empty());

        ledger
            .record_portfolio_snapshot([("X".to_string(), 0.0)].into(), 0.0, 0.0, d(2024, 2, 1))
            .await
            .unwrap();
        assert!(ledger.portfolio_changes(7).await.is_empty());

        ledger
            .record_portfolio_snapshot([("X".to_string(), 10.0)].into(), 0.0, 0.0, d(2024, 2, 2))
            .await
            .unwrap();
        let changes = ledger.portfolio_changes(7).await;
        assert_eq!(
            changes,
            vec![PortfolioChange::NewPosition {
                ticker: "X".to_string(),
                shares: 10.0
            }]
        );
    }

    #[tokio::test]
    async fn outcomes_over_all_dates() {
        let ledger = ledger();
        ledger
            .record_recommendation(buy("XYZ", 50.0), Session::Morning, d(2023, 6, 1))
            .await
            .unwrap();
        ledger
            .record_recommendation(buy("NOPE", 50.0), Session::Morning, d(2024, 1, 1))
            .await
            .unwrap();

        let prices: BTreeMap<String, f64> = [("XYZ".to_string(), 60.0)].into();
        let outcomes = ledger.compute_outcomes(&prices, d(2024, 1, 2)).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].ticker, "XYZ");
        assert!((outcomes[0].gain_pct - 20.0).abs() < 1e-9);
        assert_eq!(outcomes[0].status, OutcomeStatus::Winning);
    }

    #[tokio::test]
    async fn ignored_buy_drops_out_once_held() {
        let ledger = ledger();
        let today = d(2024, 5, 10);
        ledger
            .record_recommendation(buy("ABC", 10.0), Session::Morning, today)
            .await
            .unwrap();

        let mut held = BTreeSet::new();
        let ignored = ledger.ignored_recommendations(&held, 7, today).await;
        assert_eq!(ignored.len(), 1);
        assert_eq!(ignored[0].ticker, "ABC");

        held.insert("ABC".to_string());
        assert!(ledger.ignored_recommendations(&held, 7, today).await.is_empty());
    }

    #[tokio::test]
    async fn should_recommend_again_is_a_day_count_gate() {
        let ledger = ledger();
        let today = d(2024, 5, 10);

        let first = ledger.should_recommend_again("T", 3, today).await;
        assert_eq!(
            first,
            RepeatDecision {
                allowed: true,
                reason: "first time recommending".to_string()
            }
        );

        ledger
            .record_recommendation(buy("T", 10.0), Session::Morning, today)
            .await
            .unwrap();
        let again = ledger.should_recommend_again("T", 3, today).await;
        assert!(!again.allowed);
        assert!(again.reason.contains("1 times"));

        // Three days later the earlier call has aged out.
        let later = ledger.should_recommend_again("T", 3, d(2024, 5, 13)).await;
        assert!(later.allowed);
    }

    #[tokio::test]
    async fn summary_aggregates_everything() {
        let ledger = ledger();
        let today = d(2024, 5, 10);
        for day in [8, 9, 10] {
            ledger
                .record_recommendation(buy("ENB.TO", 50.0), Session::Morning, d(2024, 5, day))
                .await
                .unwrap();
        }
        ledger
            .record_recommendation(buy("RY.TO", 100.0), Session::Morning, today)
            .await
            .unwrap();

        let held: BTreeSet<String> = ["RY.TO".to_string()].into();
        let prices: BTreeMap<String, f64> =
            [("ENB.TO".to_string(), 45.0), ("RY.TO".to_string(), 110.0)].into();
        let summary = ledger.summarize(&held, &prices, today).await;

        assert_eq!(summary.recent_recommendations_count, 4);
        assert_eq!(summary.repeated.get("ENB.TO"), Some(&3));
        assert_eq!(summary.performance.total_calls, 4);
        assert!((summary.performance.win_rate - 0.25).abs() < 1e-9);
        assert!((summary.performance.avg_gain - (-5.0)).abs() < 1e-9);
        assert_eq!(summary.ignored.len(), 3);
        assert!(summary.ignored.iter().all(|r| r.ticker == "ENB.TO"));
        assert_eq!(summary.performance.winning_trades.len(), 1);
        assert_eq!(summary.performance.losing_trades.len(), 3);
    }

    #[tokio::test]
    async fn write_failure_surfaces_but_batch_continues() {
        let ledger = Ledger::new(Arc::new(FlakyStore {
            inner: MemoryStore::default(),
            poisoned_ticker: "BAD",
        }));
        let today = d(2024, 5, 10);

        let err = ledger
            .record_recommendation(buy("BAD", 1.0), Session::Morning, today)
            .await
            .unwrap_err();
        let storage = err.downcast_ref::<StorageError>().unwrap();
        assert_eq!(storage.table, Table::Recommendations);

        let report = ledger
            .record_recommendations(vec![buy("A", 1.0), buy("BAD", 1.0), buy("B", 1.0)], Session::Morning, today)
            .await;
        assert_eq!(report.recorded, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "BAD");
        assert!(!report.is_complete());

        assert!(ledger
            .record_portfolio_snapshot(Holdings::new(), 0.0, 0.0, today)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn read_failure_is_empty_not_error() {
        let ledger = Ledger::new(Arc::new(FlakyStore {
            inner: MemoryStore::default(),
            poisoned_ticker: "BAD",
        }));
        let today = d(2024, 5, 10);

        assert!(ledger.recent_recommendations(None, 7, today).await.is_empty());
        assert!(ledger.portfolio_changes(7).await.is_empty());
        assert!(ledger.latest_market_context().await.is_none());
        let summary = ledger
            .summarize(&BTreeSet::new(), &BTreeMap::new(), today)
            .await;
        assert!(summary.is_empty());
        assert!(ledger.should_recommend_again("A", 3, today).await.allowed);
    }

    #[tokio::test]
    async fn latest_market_context_by_date() {
        let ledger = ledger();
        for (day, tsx) in [(3, 25_100.0), (5, 25_300.0), (4, 25_200.0)] {
            ledger
                .record_market_context(
                    MarketContextInput {
                        tsx_level: tsx,
                        oil_price: 78.0,
                        usd_cad_rate: 1.36,
                        events: vec!["BoC decision".to_string()],
                    },
                    d(2024, 5, day),
                )
                .await
                .unwrap();
        }
        let latest = ledger.latest_market_context().await.unwrap();
        assert_eq!(latest.date, d(2024, 5, 5));
        assert_eq!(latest.tsx_level, 25_300.0);
        assert_eq!(latest.events, vec!["BoC decision".to_string()]);
    }
}
