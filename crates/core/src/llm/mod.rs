use crate::domain::recommendation::Session;
use std::fmt;

pub mod anthropic;
pub mod error;

/// A fully assembled digest prompt for one session.
#[derive(Debug, Clone)]
pub struct DigestRequest {
    pub as_of_date: chrono::NaiveDate,
    pub session: Session,
    pub prompt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Anthropic => f.write_str("anthropic"),
        }
    }
}

/// Prompt in, digest text out. Any failure is the caller's to degrade on.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate_digest(&self, request: DigestRequest) -> anyhow::Result<String>;
}
