use crate::storage::Table;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    Read,
    Write,
}

/// A ledger table could not be read or written. Write failures reach the
/// caller as this type inside `anyhow::Error`, so a session can tell a failed
/// recording apart from other errors with `downcast_ref`.
#[derive(Debug, Clone)]
pub struct StorageError {
    pub table: Table,
    pub op: StorageOp,
    pub key: Option<String>,
    pub detail: String,
}

impl StorageError {
    pub fn read(table: Table, err: &anyhow::Error) -> Self {
        StorageError {
            table,
            op: StorageOp::Read,
            key: None,
            detail: format!("{err:#}"),
        }
    }

    pub fn write(table: Table, key: impl Into<String>, err: anyhow::Error) -> anyhow::Error {
        StorageError {
            table,
            op: StorageOp::Write,
            key: Some(key.into()),
            detail: format!("{err:#}"),
        }
        .into()
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            StorageOp::Read => "read",
            StorageOp::Write => "write",
        };
        match &self.key {
            Some(key) => write!(
                f,
                "ledger {op} failed (table={}, key={key}): {}",
                self.table, self.detail
            ),
            None => write!(f, "ledger {op} failed (table={}): {}", self.table, self.detail),
        }
    }
}

impl std::error::Error for StorageError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_operation_table_and_key() {
        let read = StorageError::read(Table::PortfolioHistory, &anyhow::anyhow!("bad json"));
        assert_eq!(read.op, StorageOp::Read);
        assert_eq!(
            read.to_string(),
            "ledger read failed (table=portfolio_history): bad json"
        );

        let write = StorageError::write(Table::Recommendations, "2024-01-08/RY.TO", anyhow::anyhow!("disk full"));
        let write = write.downcast_ref::<StorageError>().unwrap();
        assert_eq!(write.op, StorageOp::Write);
        assert_eq!(
            write.to_string(),
            "ledger write failed (table=recommendations, key=2024-01-08/RY.TO): disk full"
        );
    }
}
