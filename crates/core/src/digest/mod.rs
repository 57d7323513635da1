//! Everything that turns ledger state and session input into text for the model.

pub mod memory;
pub mod prompt;

pub use memory::format_memory_context;
pub use prompt::{build_digest_prompt, error_digest};
