use crate::domain::market::MarketContextSnapshot;
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::recommendation::RecommendationRecord;
use crate::storage::{LedgerStore, Table};
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// On-disk layout: each table is one JSON object keyed by ISO date.
type RecommendationsFile = BTreeMap<String, BTreeMap<String, RecommendationRecord>>;
type PortfolioHistoryFile = BTreeMap<String, PortfolioSnapshot>;
type MarketContextFile = BTreeMap<String, MarketContextSnapshot>;

/// One JSON file per table under a directory.
///
/// Every upsert is a whole-table read-modify-write: load, mutate, write to a
/// temp file, rename over the table. A process-local mutex serialises writers.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    write_guard: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub async fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create ledger dir {}", dir.display()))?;
        Ok(Self {
            dir,
            write_guard: tokio::sync::Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, table: Table) -> PathBuf {
        self.dir.join(format!("{}.json", table.name()))
    }

    async fn read_bytes(&self, table: Table) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.path(table);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        }
    }

    async fn read_table<T>(&self, table: Table) -> anyhow::Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let Some(bytes) = self.read_bytes(table).await? else {
            return Ok(T::default());
        };
        serde_json::from_slice::<T>(&bytes)
            .with_context(|| format!("{} is not a valid {table} table", self.path(table).display()))
    }

    /// Like `read_table`, but a corrupt file is moved aside and replaced by an
    /// empty table so recording can continue.
    async fn read_table_for_write<T>(&self, table: Table) -> anyhow::Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let Some(bytes) = self.read_bytes(table).await? else {
            return Ok(T::default());
        };
        match serde_json::from_slice::<T>(&bytes) {
            Ok(parsed) => Ok(parsed),
            Err(err) => {
                let path = self.path(table);
                let aside = self.dir.join(format!(
                    "{}.json.corrupt-{}",
                    table.name(),
                    chrono::Utc::now().format("%Y%m%dT%H%M%S")
                ));
                tokio::fs::rename(&path, &aside).await.with_context(|| {
                    format!("failed to move corrupt table {} aside", path.display())
                })?;
                tracing::warn!(
                    %table,
                    error = %err,
                    moved_to = %aside.display(),
                    "corrupt ledger table moved aside; starting empty"
                );
                Ok(T::default())
            }
        }
    }

    async fn write_table<T: Serialize>(&self, table: Table, value: &T) -> anyhow::Result<()> {
        let path = self.path(table);
        let bytes = serde_json::to_vec_pretty(value)
            .with_context(|| format!("failed to serialize {table} table"))?;

        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", table.name(), uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        if let Err(err) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err).with_context(|| format!("failed to replace {}", path.display()));
        }

        tracing::debug!(%table, bytes = bytes.len(), "ledger table written");
        Ok(())
    }
}

#[async_trait::async_trait]
impl LedgerStore for JsonFileStore {
    fn backend_name(&self) -> &'static str {
        "json_file"
    }

    async fn upsert_recommendation(&self, record: &RecommendationRecord) -> anyhow::Result<()> {
        let _guard = self.write_guard.lock().await;
        let mut file: RecommendationsFile = self.read_table_for_write(Table::Recommendations).await?;
        file.entry(record.date.to_string())
            .or_default()
            .insert(record.ticker.clone(), record.clone());
        self.write_table(Table::Recommendations, &file).await
    }

    async fn load_recommendations(&self) -> anyhow::Result<Vec<RecommendationRecord>> {
        let file: RecommendationsFile = self.read_table(Table::Recommendations).await?;
        Ok(file.into_values().flat_map(|day| day.into_values()).collect())
    }

    async fn upsert_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> anyhow::Result<()> {
        let _guard = self.write_guard.lock().await;
        let mut file: PortfolioHistoryFile =
            self.read_table_for_write(Table::PortfolioHistory).await?;
        file.insert(snapshot.date.to_string(), snapshot.clone());
        self.write_table(Table::PortfolioHistory, &file).await
    }

    async fn load_portfolio_snapshots(&self) -> anyhow::Result<Vec<PortfolioSnapshot>> {
        let file: PortfolioHistoryFile = self.read_table(Table::PortfolioHistory).await?;
        Ok(file.into_values().collect())
    }

    async fn upsert_market_context(&self, snapshot: &MarketContextSnapshot) -> anyhow::Result<()> {
        let _guard = self.write_guard.lock().await;
        let mut file: MarketContextFile = self.read_table_for_write(Table::MarketContext).await?;
        file.insert(snapshot.date.to_string(), snapshot.clone());
        self.write_table(Table::MarketContext, &file).await
    }

    async fn load_market_contexts(&self) -> anyhow::Result<Vec<MarketContextSnapshot>> {
        let file: MarketContextFile = self.read_table(Table::MarketContext).await?;
        Ok(file.into_values().collect())
    }
}
