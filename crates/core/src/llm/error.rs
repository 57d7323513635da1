use crate::llm::Provider;
use std::fmt;

/// Model call failed in a way worth keeping the raw body for.
#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub status: Option<u16>,
    pub detail: String,
    pub raw_output: Option<String>,
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(
                f,
                "LLM error (provider={}, stage={}, status={status}): {}",
                self.provider, self.stage, self.detail
            ),
            None => write!(
                f,
                "LLM error (provider={}, stage={}): {}",
                self.provider, self.stage, self.detail
            ),
        }
    }
}

impl std::error::Error for LlmDiagnosticsError {}
