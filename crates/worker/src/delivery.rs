use anyhow::Context;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use stockmemo_core::domain::recommendation::Session;

const BORDER_WIDTH: usize = 80;

pub fn digest_file_name(local_now: NaiveDateTime, session: Session) -> String {
    format!("digest_{}_{session}.txt", local_now.format("%Y%m%d_%H%M"))
}

pub fn render_console(digest: &str, session: Session, local_now: NaiveDateTime) -> String {
    let border = "=".repeat(BORDER_WIDTH);
    format!(
        "{border}\n{} DIGEST - {}\n{border}\n\n{}\n\n{border}",
        session.as_str().to_uppercase(),
        local_now.format("%Y-%m-%d %H:%M"),
        digest.trim_end()
    )
}

/// Writes the digest under `dir`, creating it if needed. Returns the file path.
pub async fn save_digest(
    dir: &Path,
    local_now: NaiveDateTime,
    session: Session,
    digest: &str,
) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create digest dir {}", dir.display()))?;

    let path = dir.join(digest_file_name(local_now, session));
    tokio::fs::write(&path, digest)
        .await
        .with_context(|| format!("failed to write digest {}", path.display()))?;
    Ok(path)
}
