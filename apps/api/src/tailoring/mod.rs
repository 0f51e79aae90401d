// Tailoring module: gap analysis, edit application and the staged pipeline behind the
// Tailoring API.
//
// Pipeline:
//   extract (format converter) → analyze_gaps (LLM) → apply_edits (document copy) → export
//
// LLM calls go through `crate::llm_client::LlmCompletion` only.
// CPU-bound conversion and export run inside `tokio::task::spawn_blocking`.

pub mod analyzer;
pub mod applicator;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod preview;
pub mod prompts;
