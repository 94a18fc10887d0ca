pub mod answer_store;
pub mod llm_service;
pub mod prompt;
pub mod retry;

pub use answer_store::AnswerStore;
pub use llm_service::{AnswerGenerator, LlmService};
pub use retry::{with_backoff, AttemptError, RetryPolicy};
