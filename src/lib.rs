//! Query adapters between a RAP-style planner and language-model backends.
//!
//! [`QueryLlama`] drives a batched LLaMA-style generator and exposes a
//! "Yes"/"No" next-token distribution; [`QueryHfModel`] drives a generic ids-in,
//! ids-out model. [`CandleLlama`] implements both backend shapes over
//! quantized GGUF weights.

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod generation_log;
pub mod inference;
pub mod prompting;
pub mod query;

#[cfg(test)]
mod testing;

pub use backend::{BatchedGenerator, LogitsSource, PieceTokenizer, TensorTokenizer, TextGenerationModel};
pub use config::RapConfig;
pub use engine::{CandleLlama, TextTokenizer};
pub use error::{QueryError, Result};
pub use prompting::GenerationOptions;
pub use query::{AgentModel, NextTokenDistribution, QueryHfModel, QueryLlama, QueryLm, WorldModel};
