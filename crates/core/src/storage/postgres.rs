use crate::domain::market::MarketContextSnapshot;
use crate::domain::portfolio::{Holdings, PortfolioSnapshot};
use crate::domain::recommendation::{RecommendationRecord, Session};
use crate::storage::{lock, LedgerStore};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub async fn connect(db_url: &str) -> anyhow::Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .context("connect DATABASE_URL failed")?;
        migrate(&pool).await?;
        Ok(Self { pool })
    }
}

type RecommendationRow = (
    NaiveDate,
    String,
    String,
    String,
    f64,
    String,
    DateTime<Utc>,
);

#[async_trait::async_trait]
impl LedgerStore for PgStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn upsert_recommendation(&self, record: &RecommendationRecord) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO ledger_recommendations (as_of_date, ticker, session, action, price, reason, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (as_of_date, ticker) DO UPDATE \
               SET session = EXCLUDED.session, action = EXCLUDED.action, price = EXCLUDED.price, \
                   reason = EXCLUDED.reason, recorded_at = EXCLUDED.recorded_at",
        )
        .persistent(false)
        .bind(record.date)
        .bind(&record.ticker)
        .bind(record.session.as_str())
        .bind(&record.action)
        .bind(record.price)
        .bind(&record.reason)
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await
        .context("upsert ledger_recommendations failed")?;
        Ok(())
    }

    async fn load_recommendations(&self) -> anyhow::Result<Vec<RecommendationRecord>> {
        let rows = sqlx::query_as::<_, RecommendationRow>(
            "SELECT as_of_date, ticker, session, action, price, reason, recorded_at \
             FROM ledger_recommendations",
        )
        .persistent(false)
        .fetch_all(&self.pool)
        .await
        .context("select ledger_recommendations failed")?;

        let mut out = Vec::with_capacity(rows.len());
        for (date, ticker, session, action, price, reason, recorded_at) in rows {
            let session = match session.parse::<Session>() {
                Ok(s) => s,
                Err(err) => {
                    tracing::warn!(%date, %ticker, error = %err, "skipping row with unknown session");
                    continue;
                }
            };
            out.push(RecommendationRecord {
                date,
                session,
                ticker,
                action,
                price,
                reason,
                recorded_at,
            });
        }
        Ok(out)
    }

    async fn upsert_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO ledger_portfolio_history (as_of_date, holdings, cash, total_value, recorded_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (as_of_date) DO UPDATE \
               SET holdings = EXCLUDED.holdings, cash = EXCLUDED.cash, \
                   total_value = EXCLUDED.total_value, recorded_at = EXCLUDED.recorded_at",
        )
        .persistent(false)
        .bind(snapshot.date)
        .bind(Json(&snapshot.holdings))
        .bind(snapshot.cash)
        .bind(snapshot.total_value)
        .bind(snapshot.recorded_at)
        .execute(&self.pool)
        .await
        .context("upsert ledger_portfolio_history failed")?;
        Ok(())
    }

    async fn load_portfolio_snapshots(&self) -> anyhow::Result<Vec<PortfolioSnapshot>> {
        let rows = sqlx::query_as::<_, (NaiveDate, Json<Holdings>, f64, f64, DateTime<Utc>)>(
            "SELECT as_of_date, holdings, cash, total_value, recorded_at \
             FROM ledger_portfolio_history",
        )
        .persistent(false)
        .fetch_all(&self.pool)
        .await
        .context("select ledger_portfolio_history failed")?;

        Ok(rows
            .into_iter()
            .map(|(date, holdings, cash, total_value, recorded_at)| PortfolioSnapshot {
                date,
                holdings: holdings.0,
                cash,
                total_value,
                recorded_at,
            })
            .collect())
    }

    async fn upsert_market_context(&self, snapshot: &MarketContextSnapshot) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO ledger_market_context (as_of_date, tsx_level, oil_price, usd_cad_rate, events, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (as_of_date) DO UPDATE \
               SET tsx_level = EXCLUDED.tsx_level, oil_price = EXCLUDED.oil_price, \
                   usd_cad_rate = EXCLUDED.usd_cad_rate, events = EXCLUDED.events, \
                   recorded_at = EXCLUDED.recorded_at",
        )
        .persistent(false)
        .bind(snapshot.date)
        .bind(snapshot.tsx_level)
        .bind(snapshot.oil_price)
        .bind(snapshot.usd_cad_rate)
        .bind(snapshot.events.clone())
        .bind(snapshot.recorded_at)
        .execute(&self.pool)
        .await
        .context("upsert ledger_market_context failed")?;
        Ok(())
    }

    async fn load_market_contexts(&self) -> anyhow::Result<Vec<MarketContextSnapshot>> {
        let rows = sqlx::query_as::<_, (NaiveDate, f64, f64, f64, Vec<String>, DateTime<Utc>)>(
            "SELECT as_of_date, tsx_level, oil_price, usd_cad_rate, events, recorded_at \
             FROM ledger_market_context",
        )
        .persistent(false)
        .fetch_all(&self.pool)
        .await
        .context("select ledger_market_context failed")?;

        Ok(rows
            .into_iter()
            .map(
                |(date, tsx_level, oil_price, usd_cad_rate, events, recorded_at)| {
                    MarketContextSnapshot {
                        date,
                        tsx_level,
                        oil_price,
                        usd_cad_rate,
                        events,
                        recorded_at,
                    }
                },
            )
            .collect())
    }

    async fn try_acquire_session_lock(
        &self,
        date: NaiveDate,
        session: Session,
    ) -> anyhow::Result<bool> {
        lock::try_acquire_session_lock(&self.pool, date, session).await
    }

    async fn release_session_lock(&self, date: NaiveDate, session: Session) -> anyhow::Result<()> {
        lock::release_session_lock(&self.pool, date, session).await
    }
}
