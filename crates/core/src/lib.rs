pub mod digest;
pub mod domain;
pub mod ledger;
pub mod llm;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    const DEFAULT_LEDGER_DIR: &str = "agent_memory";
    const DEFAULT_UTC_OFFSET_HOURS: i32 = -5;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum LedgerBackend {
        Memory,
        JsonFile,
        Postgres,
    }

    impl std::str::FromStr for LedgerBackend {
        type Err = anyhow::Error;

        fn from_str(s: &str) -> anyhow::Result<Self> {
            match s.trim().to_ascii_lowercase().as_str() {
                "memory" => Ok(Self::Memory),
                "file" | "json" => Ok(Self::JsonFile),
                "postgres" | "pg" => Ok(Self::Postgres),
                other => anyhow::bail!("unknown LEDGER_BACKEND: {other}"),
            }
        }
    }

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub ledger_backend: LedgerBackend,
        pub ledger_dir: PathBuf,
        pub ledger_utc_offset_hours: i32,
        pub database_url: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub digest_output_dir: Option<PathBuf>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let ledger_backend = match std::env::var("LEDGER_BACKEND") {
                Ok(s) if !s.trim().is_empty() => s.parse()?,
                _ => LedgerBackend::JsonFile,
            };

            let ledger_utc_offset_hours = match std::env::var("LEDGER_UTC_OFFSET_HOURS") {
                Ok(s) => s
                    .trim()
                    .parse::<i32>()
                    .with_context(|| format!("LEDGER_UTC_OFFSET_HOURS is not an integer: {s}"))?,
                Err(_) => DEFAULT_UTC_OFFSET_HOURS,
            };
            anyhow::ensure!(
                (-12..=14).contains(&ledger_utc_offset_hours),
                "LEDGER_UTC_OFFSET_HOURS must be -12..=14 (got {ledger_utc_offset_hours})"
            );

            Ok(Self {
                ledger_backend,
                ledger_dir: std::env::var("LEDGER_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_LEDGER_DIR)),
                ledger_utc_offset_hours,
                database_url: std::env::var("DATABASE_URL").ok(),
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                digest_output_dir: std::env::var("DIGEST_OUTPUT_DIR").ok().map(PathBuf::from),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }
    }

}
