use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockmemo_core::config::Settings;
use stockmemo_core::domain::contract::usable_quotes;
use stockmemo_core::domain::market::MarketContextSnapshot;
use stockmemo_core::domain::outcome::MemorySummary;
use stockmemo_core::domain::portfolio::{PortfolioChange, PortfolioSnapshot};
use stockmemo_core::domain::recommendation::{RecommendationRecord, RepeatDecision};
use stockmemo_core::ledger::{Ledger, DEFAULT_REPEAT_WINDOW_DAYS, SUMMARY_WINDOW_DAYS};
use stockmemo_core::time::clock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let ledger = match stockmemo_core::storage::open_store(&settings).await {
        Ok(store) => Some(Ledger::new(store)),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "ledger store unavailable; starting API in degraded mode");
            None
        }
    };

    let state = AppState {
        ledger,
        utc_offset_hours: settings.ledger_utc_offset_hours,
    };

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/recommendations/recent", get(recent_recommendations))
        .route(
            "/recommendations/:ticker/should-recommend",
            get(should_recommend),
        )
        .route("/portfolio/changes", get(portfolio_changes))
        .route("/portfolio/snapshots/:as_of_date", get(portfolio_snapshot))
        .route("/market-context/latest", get(latest_market_context))
        .route("/memory/summary", post(memory_summary))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    ledger: Option<Ledger>,
    utc_offset_hours: i32,
}

impl AppState {
    fn ledger(&self) -> Result<&Ledger, StatusCode> {
        self.ledger.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)
    }

    fn today(&self, as_of: Option<&str>) -> Result<NaiveDate, StatusCode> {
        clock::resolve_today(as_of, chrono::Utc::now(), self.utc_offset_hours)
            .map_err(|_| StatusCode::BAD_REQUEST)
    }
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    ticker: Option<String>,
    days: Option<u32>,
    as_of: Option<String>,
}

#[derive(Debug, Serialize)]
struct RecentResponse {
    as_of: NaiveDate,
    window_days: u32,
    count: usize,
    recommendations: Vec<RecommendationRecord>,
}

async fn recent_recommendations(
    State(state): State<AppState>,
    Query(q): Query<RecentQuery>,
) -> Result<Json<RecentResponse>, StatusCode> {
    let ledger = state.ledger()?;
    let today = state.today(q.as_of.as_deref())?;
    let window_days = q.days.unwrap_or(SUMMARY_WINDOW_DAYS);

    let recommendations = ledger
        .recent_recommendations(q.ticker.as_deref(), window_days, today)
        .await;

    Ok(Json(RecentResponse {
        as_of: today,
        window_days,
        count: recommendations.len(),
        recommendations,
    }))
}

#[derive(Debug, Deserialize)]
struct ShouldRecommendQuery {
    min_days: Option<u32>,
    as_of: Option<String>,
}

async fn should_recommend(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(q): Query<ShouldRecommendQuery>,
) -> Result<Json<RepeatDecision>, StatusCode> {
    let ledger = state.ledger()?;
    let today = state.today(q.as_of.as_deref())?;
    let min_days = q.min_days.unwrap_or(DEFAULT_REPEAT_WINDOW_DAYS);

    Ok(Json(
        ledger.should_recommend_again(&ticker, min_days, today).await,
    ))
}

#[derive(Debug, Deserialize)]
struct ChangesQuery {
    days: Option<u32>,
}

async fn portfolio_changes(
    State(state): State<AppState>,
    Query(q): Query<ChangesQuery>,
) -> Result<Json<Vec<PortfolioChange>>, StatusCode> {
    let ledger = state.ledger()?;
    let window_days = q.days.unwrap_or(SUMMARY_WINDOW_DAYS);
    Ok(Json(ledger.portfolio_changes(window_days).await))
}

async fn portfolio_snapshot(
    State(state): State<AppState>,
    Path(as_of_date): Path<String>,
) -> Result<Json<PortfolioSnapshot>, StatusCode> {
    let ledger = state.ledger()?;
    let as_of_date =
        NaiveDate::parse_from_str(&as_of_date, "%Y-%m-%d").map_err(|_| StatusCode::BAD_REQUEST)?;

    ledger
        .portfolio_snapshot(as_of_date)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn latest_market_context(
    State(state): State<AppState>,
) -> Result<Json<MarketContextSnapshot>, StatusCode> {
    let ledger = state.ledger()?;
    ledger
        .latest_market_context()
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Debug, Deserialize)]
struct SummaryRequest {
    #[serde(default)]
    portfolio_tickers: Vec<String>,
    #[serde(default)]
    current_prices: BTreeMap<String, f64>,
    as_of: Option<String>,
}

#[derive(Debug, Serialize)]
struct SummaryResponse {
    summary: MemorySummary,
    changes: Vec<PortfolioChange>,
    context: String,
}

async fn memory_summary(
    State(state): State<AppState>,
    Json(req): Json<SummaryRequest>,
) -> Result<Json<SummaryResponse>, StatusCode> {
    let ledger = state.ledger()?;
    let today = state.today(req.as_of.as_deref())?;

    let held: BTreeSet<String> = req
        .portfolio_tickers
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let current_prices =
        usable_quotes(req.current_prices).map_err(|_| StatusCode::BAD_REQUEST)?;

    let summary = ledger.summarize(&held, &current_prices, today).await;
    let changes = ledger.portfolio_changes(SUMMARY_WINDOW_DAYS).await;
    let context = stockmemo_core::digest::format_memory_context(Some(&summary), &changes);

    Ok(Json(SummaryResponse {
        summary,
        changes,
        context,
    }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stockmemo_core::domain::recommendation::{NewRecommendation, Session};
    use stockmemo_core::storage::memory::MemoryStore;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    async fn seeded_state() -> AppState {
        let ledger = Ledger::new(Arc::new(MemoryStore::default()));
        for (ticker, date) in [("ENB.TO", d(2024, 1, 5)), ("ENB.TO", d(2024, 1, 7)), ("RY.TO", d(2024, 1, 7))] {
            ledger
                .record_recommendation(
                    NewRecommendation::new(ticker, "BUY", 50.0, "steady dividend"),
                    Session::Morning,
                    date,
                )
                .await
                .unwrap();
        }
        ledger
            .record_portfolio_snapshot([("ENB.TO".to_string(), 10.0)].into(), 500.0, 1000.0, d(2024, 1, 7))
            .await
            .unwrap();

        AppState {
            ledger: Some(ledger),
            utc_offset_hours: -5,
        }
    }

    #[tokio::test]
    async fn degraded_state_returns_503() {
        let state = AppState {
            ledger: None,
            utc_offset_hours: -5,
        };
        let res = latest_market_context(State(state)).await;
        assert_eq!(res.err(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn recent_filters_by_ticker_and_window() {
        let state = seeded_state().await;
        let Json(res) = recent_recommendations(
            State(state),
            Query(RecentQuery {
                ticker: Some("ENB.TO".to_string()),
                days: Some(7),
                as_of: Some("2024-01-08".to_string()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(res.count, 2);
        assert_eq!(res.recommendations[0].date, d(2024, 1, 7));
    }

    #[tokio::test]
    async fn max_window_returns_all_history() {
        let state = seeded_state().await;
        let Json(res) = recent_recommendations(
            State(state),
            Query(RecentQuery {
                ticker: None,
                days: Some(u32::MAX),
                as_of: Some("2024-01-08".to_string()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(res.window_days, u32::MAX);
        assert_eq!(res.count, 3);
    }

    #[tokio::test]
    async fn should_recommend_reports_repeat() {
        let state = seeded_state().await;
        let Json(decision) = should_recommend(
            State(state),
            Path("ENB.TO".to_string()),
            Query(ShouldRecommendQuery {
                min_days: Some(3),
                as_of: Some("2024-01-08".to_string()),
            }),
        )
        .await
        .unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.reason, "already recommended 1 times in last 3 days");
    }

    #[tokio::test]
    async fn bad_dates_are_rejected() {
        let state = seeded_state().await;
        let res = portfolio_snapshot(State(state.clone()), Path("08/01/2024".to_string())).await;
        assert_eq!(res.err(), Some(StatusCode::BAD_REQUEST));

        let res = portfolio_snapshot(State(state), Path("2024-01-01".to_string())).await;
        assert_eq!(res.err(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn summary_ignores_unusable_prices() {
        let state = seeded_state().await;
        let Json(res) = memory_summary(
            State(state.clone()),
            Json(SummaryRequest {
                portfolio_tickers: vec!["ENB.TO".to_string()],
                current_prices: [("ENB.TO".to_string(), 0.0), ("RY.TO".to_string(), -3.0)].into(),
                as_of: Some("2024-01-08".to_string()),
            }),
        )
        .await
        .unwrap();

        assert!(res.summary.outcomes.is_empty());
        assert_eq!(res.summary.performance.total_calls, 0);

        let res = memory_summary(
            State(state),
            Json(SummaryRequest {
                portfolio_tickers: Vec::new(),
                current_prices: [("  ".to_string(), 10.0)].into(),
                as_of: None,
            }),
        )
        .await;
        assert_eq!(res.err(), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn summary_includes_rendered_context() {
        let state = seeded_state().await;
        let Json(res) = memory_summary(
            State(state),
            Json(SummaryRequest {
                portfolio_tickers: vec!["ENB.TO".to_string()],
                current_prices: [("RY.TO".to_string(), 60.0)].into(),
                as_of: Some("2024-01-08".to_string()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(res.summary.recent_recommendations_count, 3);
        assert_eq!(res.summary.ignored.len(), 1);
        assert_eq!(res.summary.ignored[0].ticker, "RY.TO");
        assert!(res.context.contains("RY.TO: BUY @ $50.00 on 2024-01-07 - user passed"));
    }
}
