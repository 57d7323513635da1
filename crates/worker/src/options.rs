use std::path::PathBuf;
use stockmemo_core::ledger::SUMMARY_WINDOW_DAYS;

const DEFAULT_OUTPUT_DIR: &str = "digests";

#[derive(Debug, Clone)]
pub struct DigestOptions {
    /// How far back the portfolio-changes comparison looks.
    pub memory_window_days: u32,

    pub output_dir: PathBuf,
}

impl Default for DigestOptions {
    fn default() -> Self {
        Self {
            memory_window_days: SUMMARY_WINDOW_DAYS,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl DigestOptions {
    pub fn from_env(output_dir: Option<PathBuf>) -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("MEMORY_WINDOW_DAYS") {
            match s.trim().parse::<u32>() {
                Ok(n) if n > 0 => out.memory_window_days = n,
                _ => tracing::warn!(value = %s, "ignoring invalid MEMORY_WINDOW_DAYS"),
            }
        }

        if let Some(dir) = output_dir {
            out.output_dir = dir;
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_output_dir_wins() {
        let opts = DigestOptions::from_env(Some(PathBuf::from("/tmp/out")));
        assert_eq!(opts.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn defaults_match_summary_window() {
        let opts = DigestOptions::default();
        assert_eq!(opts.memory_window_days, 7);
        assert_eq!(opts.output_dir, PathBuf::from("digests"));
    }
}
